//! Premium entitlement and the gated project view.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::schema::{
    AnalysisReport, ComparisonPoint, ComparisonResult, Condition, FileMetadata, Financials,
    Project, ProjectStatus, Winner,
};

/// Whether a user may see premium detail right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Entitlement {
    pub entitled: bool,
    pub premium_until: Option<DateTime<Utc>>,
}

impl Entitlement {
    pub fn none() -> Self {
        Self {
            entitled: false,
            premium_until: None,
        }
    }

    /// Entitled while the stored expiry lies in the future.
    pub fn evaluate(premium_until: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Self {
        Self {
            entitled: premium_until.is_some_and(|until| until > now),
            premium_until,
        }
    }
}

/// Report with the premium sections (budget and repair list) withheld.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportPreview {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    pub summary: String,
    pub condition: Condition,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub financials: Option<Financials>,
    pub repair_count: usize,
}

impl From<AnalysisReport> for ReportPreview {
    fn from(report: AnalysisReport) -> Self {
        Self {
            address: report.address,
            summary: report.summary,
            condition: report.condition,
            financials: report.financials,
            repair_count: report.required_repairs.len(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ReportView {
    Full(AnalysisReport),
    Preview(ReportPreview),
}

/// A project as shown to one viewer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectView {
    pub id: String,
    pub address: String,
    pub files: Vec<FileMetadata>,
    pub status: ProjectStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<ReportView>,
    pub created_at: Option<DateTime<Utc>>,
    pub user_id: Option<String>,
    pub locked: bool,
}

impl ProjectView {
    pub fn new(project: Project, entitlement: Entitlement) -> Self {
        let locked = !entitlement.entitled;
        let report = project.report.map(|report| {
            if locked {
                ReportView::Preview(report.into())
            } else {
                ReportView::Full(report)
            }
        });
        Self {
            id: project.id,
            address: project.address,
            files: project.files,
            status: project.status,
            report,
            created_at: project.created_at,
            user_id: project.user_id,
            locked,
        }
    }
}

/// Comparison with the budget-derived cost difference withheld.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonPreview {
    pub winner: Winner,
    pub winner_reason: String,
    pub comparison_points: Vec<ComparisonPoint>,
    pub recommendation: String,
}

impl From<ComparisonResult> for ComparisonPreview {
    fn from(result: ComparisonResult) -> Self {
        Self {
            winner: result.winner,
            winner_reason: result.winner_reason,
            comparison_points: result.comparison_points,
            recommendation: result.recommendation,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ComparisonView {
    Full(ComparisonResult),
    Preview(ComparisonPreview),
}

impl ComparisonView {
    pub fn new(result: ComparisonResult, entitlement: Entitlement) -> Self {
        if entitlement.entitled {
            ComparisonView::Full(result)
        } else {
            ComparisonView::Preview(result.into())
        }
    }

    pub fn winner(&self) -> Winner {
        match self {
            ComparisonView::Full(result) => result.winner,
            ComparisonView::Preview(preview) => preview.winner,
        }
    }

    /// `None` while locked.
    pub fn cost_difference(&self) -> Option<f64> {
        match self {
            ComparisonView::Full(result) => Some(result.cost_difference),
            ComparisonView::Preview(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{comparison_result, report_with_budget};
    use chrono::Duration;

    fn project() -> Project {
        Project {
            id: "p1".to_string(),
            address: "Vej 1".to_string(),
            files: Vec::new(),
            status: ProjectStatus::Completed,
            report: Some(report_with_budget(Some("Vej 1"), 10.0, 20.0)),
            created_at: None,
            user_id: Some("u1".to_string()),
        }
    }

    #[test]
    fn test_evaluate_expiry() {
        let now = Utc::now();
        assert!(Entitlement::evaluate(Some(now + Duration::days(3)), now).entitled);
        assert!(!Entitlement::evaluate(Some(now - Duration::seconds(1)), now).entitled);
        assert!(!Entitlement::evaluate(Some(now), now).entitled);
        assert!(!Entitlement::evaluate(None, now).entitled);
    }

    #[test]
    fn test_locked_view_withholds_budget_and_repairs() {
        let view = ProjectView::new(project(), Entitlement::none());
        assert!(view.locked);

        let json = serde_json::to_value(&view).unwrap();
        assert!(json["report"].get("estimatedBudget").is_none());
        assert!(json["report"].get("requiredRepairs").is_none());
        assert_eq!(json["report"]["repairCount"], 1);
        assert_eq!(json["report"]["summary"], "Test summary.");
    }

    #[test]
    fn test_entitled_view_is_complete() {
        let now = Utc::now();
        let entitlement = Entitlement::evaluate(Some(now + Duration::days(7)), now);
        let view = ProjectView::new(project(), entitlement);
        assert!(!view.locked);
        assert!(matches!(view.report, Some(ReportView::Full(_))));
    }

    #[test]
    fn test_locked_comparison_withholds_cost_difference() {
        let view = ComparisonView::new(comparison_result(), Entitlement::none());
        assert_eq!(view.winner(), Winner::A);
        assert_eq!(view.cost_difference(), None);

        let json = serde_json::to_value(&view).unwrap();
        assert!(json.get("costDifference").is_none());
        assert_eq!(json["recommendation"], "Buy A.");

        let now = Utc::now();
        let entitled = Entitlement::evaluate(Some(now + Duration::days(1)), now);
        let view = ComparisonView::new(comparison_result(), entitled);
        assert_eq!(view.cost_difference(), Some(-20000.0));
    }
}
