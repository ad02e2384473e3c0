//! In-memory store used when no Supabase project is configured.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use anyhow::Result;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{ComparisonStore, EntitlementSource, ProjectStore};
use crate::schema::{NewComparison, NewProject, Project, ProjectRef, SavedComparison};

#[derive(Debug, Default)]
struct Inner {
    projects: Vec<Project>,
    comparisons: Vec<SavedComparison>,
    premium_until: HashMap<String, DateTime<Utc>>,
}

/// Process-local store. Clones share the same data.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a premium expiry, as a confirmed payment would.
    #[cfg(test)]
    pub fn set_premium_until(&self, user_id: &str, until: DateTime<Utc>) {
        let mut inner = self.inner.write().unwrap();
        inner.premium_until.insert(user_id.to_string(), until);
    }

    fn address_of(inner: &Inner, project_id: &str) -> Option<ProjectRef> {
        inner
            .projects
            .iter()
            .find(|p| p.id == project_id)
            .map(|p| ProjectRef {
                address: p.address.clone(),
            })
    }
}

/// Newest first; rows inserted later win ties.
fn newest_first<T>(rows: Vec<T>, created_at: impl Fn(&T) -> Option<DateTime<Utc>>) -> Vec<T> {
    let mut rows: Vec<T> = rows.into_iter().rev().collect();
    rows.sort_by(|a, b| created_at(b).cmp(&created_at(a)));
    rows
}

#[async_trait::async_trait]
impl ProjectStore for MemoryStore {
    async fn insert_project(&self, project: NewProject) -> Result<Project> {
        let stored = Project {
            id: Uuid::new_v4().to_string(),
            address: project.address,
            files: project.files,
            status: project.status,
            report: Some(project.report),
            created_at: Some(Utc::now()),
            user_id: project.user_id,
        };
        let mut inner = self.inner.write().unwrap();
        inner.projects.push(stored.clone());
        tracing::debug!("MemoryStore: stored project '{}'", stored.id);
        Ok(stored)
    }

    async fn fetch_projects(&self, ids: &[String]) -> Result<Vec<Project>> {
        let inner = self.inner.read().unwrap();
        Ok(inner
            .projects
            .iter()
            .filter(|p| ids.contains(&p.id))
            .cloned()
            .collect())
    }

    async fn fetch_projects_by_owner(&self, owner_id: &str) -> Result<Vec<Project>> {
        let inner = self.inner.read().unwrap();
        let owned = inner
            .projects
            .iter()
            .filter(|p| p.user_id.as_deref() == Some(owner_id))
            .cloned()
            .collect();
        Ok(newest_first(owned, |p| p.created_at))
    }

    async fn fetch_project(&self, id: &str) -> Result<Option<Project>> {
        let inner = self.inner.read().unwrap();
        Ok(inner.projects.iter().find(|p| p.id == id).cloned())
    }
}

#[async_trait::async_trait]
impl ComparisonStore for MemoryStore {
    async fn insert_comparison(&self, comparison: NewComparison) -> Result<SavedComparison> {
        let mut inner = self.inner.write().unwrap();
        let saved = SavedComparison {
            id: Uuid::new_v4().to_string(),
            user_id: comparison.user_id,
            project_a_id: comparison.project_a_id,
            project_b_id: comparison.project_b_id,
            data: comparison.data,
            created_at: Some(Utc::now()),
            project_a: None,
            project_b: None,
        };
        inner.comparisons.push(saved.clone());
        tracing::debug!("MemoryStore: stored comparison '{}'", saved.id);
        Ok(saved)
    }

    async fn fetch_comparisons_by_owner(&self, owner_id: &str) -> Result<Vec<SavedComparison>> {
        let inner = self.inner.read().unwrap();
        let owned = inner
            .comparisons
            .iter()
            .filter(|c| c.user_id == owner_id)
            .map(|c| SavedComparison {
                project_a: Self::address_of(&inner, &c.project_a_id),
                project_b: Self::address_of(&inner, &c.project_b_id),
                ..c.clone()
            })
            .collect();
        Ok(newest_first(owned, |c| c.created_at))
    }
}

#[async_trait::async_trait]
impl EntitlementSource for MemoryStore {
    async fn premium_until(&self, user_id: &str) -> Result<Option<DateTime<Utc>>> {
        let inner = self.inner.read().unwrap();
        Ok(inner.premium_until.get(user_id).copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ProjectStatus;
    use crate::testutil::{comparison_result, report_with_budget};

    fn new_project(address: &str, owner: &str) -> NewProject {
        NewProject {
            address: address.to_string(),
            files: Vec::new(),
            status: ProjectStatus::Completed,
            report: report_with_budget(Some(address), 0.0, 10.0),
            user_id: Some(owner.to_string()),
        }
    }

    #[tokio::test]
    async fn test_insert_and_fetch() {
        let store = MemoryStore::new();
        let stored = store.insert_project(new_project("Vej 1", "u1")).await.unwrap();

        assert!(!stored.id.is_empty());
        assert!(stored.created_at.is_some());

        let fetched = store.fetch_project(&stored.id).await.unwrap().unwrap();
        assert_eq!(fetched, stored);
        assert!(store.fetch_project("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_fetch_by_owner_is_newest_first() {
        let store = MemoryStore::new();
        store.insert_project(new_project("Vej 1", "u1")).await.unwrap();
        store.insert_project(new_project("Vej 2", "u2")).await.unwrap();
        store.insert_project(new_project("Vej 3", "u1")).await.unwrap();

        let owned = store.fetch_projects_by_owner("u1").await.unwrap();
        let addresses: Vec<_> = owned.iter().map(|p| p.address.as_str()).collect();
        assert_eq!(addresses, vec!["Vej 3", "Vej 1"]);
    }

    #[tokio::test]
    async fn test_fetch_many_skips_unknown_ids() {
        let store = MemoryStore::new();
        let a = store.insert_project(new_project("Vej 1", "u1")).await.unwrap();
        let found = store
            .fetch_projects(&[a.id.clone(), "nope".to_string()])
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
    }

    #[tokio::test]
    async fn test_comparisons_join_addresses() {
        let store = MemoryStore::new();
        let a = store.insert_project(new_project("Vej 1", "u1")).await.unwrap();
        let b = store.insert_project(new_project("Vej 2", "u1")).await.unwrap();

        store
            .insert_comparison(NewComparison {
                user_id: "u1".to_string(),
                project_a_id: a.id.clone(),
                project_b_id: b.id.clone(),
                data: comparison_result(),
            })
            .await
            .unwrap();

        let saved = store.fetch_comparisons_by_owner("u1").await.unwrap();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].project_a.as_ref().unwrap().address, "Vej 1");
        assert_eq!(saved[0].project_b.as_ref().unwrap().address, "Vej 2");
        assert!(store.fetch_comparisons_by_owner("u2").await.unwrap().is_empty());
    }
}
