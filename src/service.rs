//! Analysis and comparison operations exposed over HTTP.
//!
//! Every collaborator is injected, so the whole flow runs against stubs in
//! tests. Errors are mapped to [`AnalysisError`] here and nowhere else.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::comparator::ReportComparator;
use crate::entitlement::{ComparisonView, Entitlement, ProjectView};
use crate::error::AnalysisError;
use crate::extractor::ReportExtractor;
use crate::normalizer::{NormalizedInput, Normalizer, UploadedFile};
use crate::schema::{
    AnalysisReport, ComparisonResult, FileMetadata, NewComparison, NewProject, ProjectStatus,
    Project, SavedComparison,
};
use crate::store::{ComparisonStore, EntitlementSource, ProjectStore};

pub const UNKNOWN_ADDRESS: &str = "Unknown address";

/// Result of an analysis: either durably stored or only computed.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "storage", rename_all = "snake_case")]
pub enum AnalysisOutcome {
    Stored(Project),
    /// The store rejected the write; the id is synthetic and resolves to nothing.
    ComputedButNotPersisted(TransientProject),
}

#[derive(Debug, Clone, Serialize)]
pub struct TransientProject {
    pub id: String,
    pub address: String,
    pub files: Vec<FileMetadata>,
    pub status: ProjectStatus,
    pub report: AnalysisReport,
    pub created_at: DateTime<Utc>,
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonResponse {
    pub project_a: ProjectView,
    pub project_b: ProjectView,
    pub comparison: ComparisonView,
    pub locked: bool,
}

/// Body of a save-comparison request; every field is required.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveComparisonRequest {
    pub user_id: Option<String>,
    pub project_a_id: Option<String>,
    pub project_b_id: Option<String>,
    pub data: Option<ComparisonResult>,
}

/// Stores used by the service.
#[derive(Clone)]
pub struct Stores {
    pub projects: Arc<dyn ProjectStore>,
    pub comparisons: Arc<dyn ComparisonStore>,
    pub entitlements: Arc<dyn EntitlementSource>,
}

#[derive(Clone)]
pub struct AnalysisService {
    normalizer: Normalizer,
    extractor: ReportExtractor,
    comparator: ReportComparator,
    stores: Stores,
}

impl AnalysisService {
    pub fn new(
        normalizer: Normalizer,
        extractor: ReportExtractor,
        comparator: ReportComparator,
        stores: Stores,
    ) -> Self {
        Self {
            normalizer,
            extractor,
            comparator,
            stores,
        }
    }

    /// Analyse uploaded files and store the resulting project.
    pub async fn analyze_files(
        &self,
        owner: Option<String>,
        files: Vec<UploadedFile>,
    ) -> Result<AnalysisOutcome, AnalysisError> {
        let input = self.normalizer.from_files(files)?;
        self.analyze(input, owner).await
    }

    /// Analyse a listing page and store the resulting project.
    pub async fn analyze_url(
        &self,
        owner: Option<String>,
        url: &str,
    ) -> Result<AnalysisOutcome, AnalysisError> {
        let input = self.normalizer.from_url(url).await?;
        self.analyze(input, owner).await
    }

    async fn analyze(
        &self,
        input: NormalizedInput,
        owner: Option<String>,
    ) -> Result<AnalysisOutcome, AnalysisError> {
        let report = self.extractor.extract(&input.artifacts).await.map_err(|e| {
            error!("Analysis failed: {:#}", e);
            AnalysisError::extraction(&e)
        })?;

        let address = report
            .address
            .clone()
            .or(input.title)
            .unwrap_or_else(|| UNKNOWN_ADDRESS.to_string());

        let project = NewProject {
            address,
            files: input.files,
            status: ProjectStatus::Completed,
            report,
            user_id: owner,
        };

        match self.stores.projects.insert_project(project.clone()).await {
            Ok(stored) => {
                info!("Analysis stored as project {}", stored.id);
                Ok(AnalysisOutcome::Stored(stored))
            }
            Err(e) => {
                let id = format!("temp_{}", Uuid::new_v4().simple());
                warn!("Failed to store analysis, returning it as {}: {:#}", id, e);
                Ok(AnalysisOutcome::ComputedButNotPersisted(TransientProject {
                    id,
                    address: project.address,
                    files: project.files,
                    status: project.status,
                    report: project.report,
                    created_at: Utc::now(),
                    user_id: project.user_id,
                }))
            }
        }
    }

    /// Compare two stored projects; the first id becomes property A.
    pub async fn compare(
        &self,
        project_ids: &[String],
        viewer: Option<&str>,
    ) -> Result<ComparisonResponse, AnalysisError> {
        let (id_a, id_b) = match project_ids {
            [a, b] if !a.trim().is_empty() && !b.trim().is_empty() => (a, b),
            _ => return Err(AnalysisError::input("Exactly two project IDs are required")),
        };
        if id_a == id_b {
            return Err(AnalysisError::input("Cannot compare a project with itself"));
        }

        let projects = self
            .stores
            .projects
            .fetch_projects(project_ids)
            .await
            .map_err(|e| AnalysisError::persistence(&e))?;

        let find = |id: &String| {
            projects
                .iter()
                .find(|p| &p.id == id)
                .cloned()
                .ok_or_else(|| AnalysisError::NotFound(format!("project {}", id)))
        };
        let project_a = find(id_a)?;
        let project_b = find(id_b)?;

        let report_a = report_of(&project_a)?;
        let report_b = report_of(&project_b)?;

        // Resolved first so a failed lookup never discards a model call.
        let entitlement = self.viewer_entitlement(viewer).await?;

        let comparison = self
            .comparator
            .compare(report_a, report_b)
            .await
            .map_err(|e| {
                error!("Comparison failed: {:#}", e);
                AnalysisError::comparison(&e)
            })?;

        Ok(ComparisonResponse {
            project_a: ProjectView::new(project_a, entitlement),
            project_b: ProjectView::new(project_b, entitlement),
            comparison: ComparisonView::new(comparison, entitlement),
            locked: !entitlement.entitled,
        })
    }

    /// Persist a comparison the user chose to keep. No fallback on failure.
    pub async fn save_comparison(
        &self,
        request: SaveComparisonRequest,
    ) -> Result<SavedComparison, AnalysisError> {
        let (Some(user_id), Some(project_a_id), Some(project_b_id), Some(data)) = (
            non_empty(request.user_id),
            non_empty(request.project_a_id),
            non_empty(request.project_b_id),
            request.data,
        ) else {
            return Err(AnalysisError::input("Missing required fields"));
        };
        data.validate()
            .map_err(|e| AnalysisError::input(format!("Invalid comparison data: {:#}", e)))?;

        let saved = self
            .stores
            .comparisons
            .insert_comparison(NewComparison {
                user_id,
                project_a_id,
                project_b_id,
                data,
            })
            .await
            .map_err(|e| {
                error!("Error saving comparison: {:#}", e);
                AnalysisError::persistence(&e)
            })?;

        info!("Saved comparison {}", saved.id);
        Ok(saved)
    }

    pub async fn list_comparisons(
        &self,
        owner: Option<&str>,
    ) -> Result<Vec<SavedComparison>, AnalysisError> {
        let owner = require_user(owner)?;
        self.stores
            .comparisons
            .fetch_comparisons_by_owner(owner)
            .await
            .map_err(|e| AnalysisError::persistence(&e))
    }

    /// The owner's projects, most recent first, gated by the owner's entitlement.
    pub async fn list_projects(
        &self,
        owner: Option<&str>,
    ) -> Result<Vec<ProjectView>, AnalysisError> {
        let owner = require_user(owner)?;
        let projects = self
            .stores
            .projects
            .fetch_projects_by_owner(owner)
            .await
            .map_err(|e| AnalysisError::persistence(&e))?;
        let entitlement = self.entitlement(owner).await?;
        Ok(projects
            .into_iter()
            .map(|p| ProjectView::new(p, entitlement))
            .collect())
    }

    pub async fn get_project(
        &self,
        id: &str,
        viewer: Option<&str>,
    ) -> Result<ProjectView, AnalysisError> {
        let project = self
            .stores
            .projects
            .fetch_project(id)
            .await
            .map_err(|e| AnalysisError::persistence(&e))?
            .ok_or_else(|| AnalysisError::NotFound(format!("project {}", id)))?;
        let entitlement = self.viewer_entitlement(viewer).await?;
        Ok(ProjectView::new(project, entitlement))
    }

    pub async fn entitlement(&self, user_id: &str) -> Result<Entitlement, AnalysisError> {
        let premium_until = self
            .stores
            .entitlements
            .premium_until(user_id)
            .await
            .map_err(|e| AnalysisError::persistence(&e))?;
        Ok(Entitlement::evaluate(premium_until, Utc::now()))
    }

    async fn viewer_entitlement(&self, viewer: Option<&str>) -> Result<Entitlement, AnalysisError> {
        match viewer.filter(|v| !v.trim().is_empty()) {
            Some(user_id) => self.entitlement(user_id).await,
            None => Ok(Entitlement::none()),
        }
    }
}

fn report_of(project: &Project) -> Result<&AnalysisReport, AnalysisError> {
    project
        .report
        .as_ref()
        .ok_or_else(|| AnalysisError::input(format!("Project {} has no report", project.id)))
}

fn require_user(user_id: Option<&str>) -> Result<&str, AnalysisError> {
    user_id
        .filter(|u| !u.trim().is_empty())
        .ok_or_else(|| AnalysisError::input("Missing userId"))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
