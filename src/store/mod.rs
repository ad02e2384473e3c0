//! Persistence collaborators.
//!
//! Traits for the project, comparison and entitlement stores, with a Supabase
//! backend for production and an in-memory backend for development and tests.

pub mod memory;
pub mod supabase;

use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::schema::{NewComparison, NewProject, Project, SavedComparison};

#[async_trait::async_trait]
pub trait ProjectStore: Send + Sync {
    /// Insert and return the stored row, id and timestamp assigned.
    async fn insert_project(&self, project: NewProject) -> Result<Project>;
    /// Fetch the projects that exist among `ids`, in no particular order.
    async fn fetch_projects(&self, ids: &[String]) -> Result<Vec<Project>>;
    /// Most recent first.
    async fn fetch_projects_by_owner(&self, owner_id: &str) -> Result<Vec<Project>>;
    async fn fetch_project(&self, id: &str) -> Result<Option<Project>>;
}

#[async_trait::async_trait]
pub trait ComparisonStore: Send + Sync {
    async fn insert_comparison(&self, comparison: NewComparison) -> Result<SavedComparison>;
    /// Most recent first, with both project addresses joined in.
    async fn fetch_comparisons_by_owner(&self, owner_id: &str) -> Result<Vec<SavedComparison>>;
}

/// Source of the payment-derived premium expiry on a user profile.
#[async_trait::async_trait]
pub trait EntitlementSource: Send + Sync {
    async fn premium_until(&self, user_id: &str) -> Result<Option<DateTime<Utc>>>;
}
