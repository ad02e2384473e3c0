//! Report, comparison and project types.
//!
//! Field names follow the camelCase JSON shape the model is asked to emit.
//! Stored rows (`Project`, `SavedComparison`) keep the snake_case column names.

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

pub const DEFAULT_CURRENCY: &str = "DKK";

/// Overall state of the property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Condition {
    #[serde(alias = "god")]
    Good,
    #[serde(alias = "middel")]
    Medium,
    #[serde(alias = "dårlig", alias = "darlig")]
    Bad,
    #[serde(alias = "kritisk")]
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    #[serde(alias = "høj", alias = "hoj")]
    High,
    #[serde(alias = "middel")]
    Medium,
    #[serde(alias = "lav")]
    Low,
}

/// Structured inspection report for one property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisReport {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    pub summary: String,
    pub condition: Condition,
    pub required_repairs: Vec<RepairItem>,
    pub estimated_budget: EstimatedBudget,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub financials: Option<Financials>,
}

impl AnalysisReport {
    /// Check the invariants serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.summary.trim().is_empty() {
            bail!("report summary is empty");
        }
        self.estimated_budget.validate()?;
        for repair in &self.required_repairs {
            if !(repair.estimated_cost >= 0.0) {
                bail!(
                    "repair '{}' has invalid estimatedCost {}",
                    repair.id,
                    repair.estimated_cost
                );
            }
        }
        if let Some(financials) = &self.financials {
            financials.validate()?;
        }
        Ok(())
    }

    /// Trim the address and drop placeholders the model uses for "unknown".
    pub fn normalize(mut self) -> Self {
        self.address = self
            .address
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty() && !a.eq_ignore_ascii_case("null"));
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepairItem {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub title: String,
    pub description: String,
    pub priority: Priority,
    pub estimated_cost: f64,
}

/// Total repair budget range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimatedBudget {
    pub min: f64,
    pub max: f64,
    #[serde(default = "default_currency")]
    pub currency: String,
}

impl EstimatedBudget {
    pub fn midpoint(&self) -> f64 {
        (self.min + self.max) / 2.0
    }

    fn validate(&self) -> Result<()> {
        if !(self.min >= 0.0) || !(self.max >= 0.0) {
            bail!(
                "estimatedBudget must be non-negative (min={}, max={})",
                self.min,
                self.max
            );
        }
        if self.min > self.max {
            bail!(
                "estimatedBudget.min ({}) exceeds estimatedBudget.max ({})",
                self.min,
                self.max
            );
        }
        Ok(())
    }
}

fn default_currency() -> String {
    DEFAULT_CURRENCY.to_string()
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Financials {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(default, alias = "gross", skip_serializing_if = "Option::is_none")]
    pub gross_monthly_cost: Option<f64>,
    #[serde(default, alias = "sqmPrice", skip_serializing_if = "Option::is_none")]
    pub price_per_sqm: Option<f64>,
}

impl Financials {
    fn validate(&self) -> Result<()> {
        let figures = [
            ("price", self.price),
            ("grossMonthlyCost", self.gross_monthly_cost),
            ("pricePerSqm", self.price_per_sqm),
        ];
        for (name, value) in figures {
            if let Some(v) = value {
                if !(v >= 0.0) {
                    bail!("financials.{} must be non-negative, got {}", name, v);
                }
            }
        }
        Ok(())
    }
}

// ============================================================================
// Comparison
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Winner {
    A,
    B,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonResult {
    pub winner: Winner,
    pub winner_reason: String,
    /// Midpoint of A's repair budget minus midpoint of B's.
    pub cost_difference: f64,
    pub comparison_points: Vec<ComparisonPoint>,
    pub recommendation: String,
}

impl ComparisonResult {
    pub fn validate(&self) -> Result<()> {
        if self.winner_reason.trim().is_empty() {
            bail!("winnerReason is empty");
        }
        if self.recommendation.trim().is_empty() {
            bail!("recommendation is empty");
        }
        if !self.cost_difference.is_finite() {
            bail!("costDifference is not a finite number");
        }
        for point in &self.comparison_points {
            for score in [point.score_a, point.score_b] {
                if !(1.0..=10.0).contains(&score) {
                    bail!(
                        "score {} for category '{}' is outside 1-10",
                        score,
                        point.category
                    );
                }
            }
        }
        Ok(())
    }

    /// Display label for the winning property: its address when known.
    pub fn winning_label(&self, report_a: &AnalysisReport, report_b: &AnalysisReport) -> String {
        let (report, fallback) = match self.winner {
            Winner::A => (report_a, "Property A"),
            Winner::B => (report_b, "Property B"),
        };
        report
            .address
            .clone()
            .unwrap_or_else(|| fallback.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonPoint {
    pub category: String,
    #[serde(alias = "p1Score")]
    pub score_a: f64,
    #[serde(alias = "p2Score")]
    pub score_b: f64,
    pub comment: String,
}

// ============================================================================
// Stored entities
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectStatus {
    Idle,
    Analyzing,
    Completed,
    Error,
}

/// Metadata of one analysed input; the content itself is never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileMetadata {
    pub id: String,
    pub name: String,
    pub size: u64,
    #[serde(rename = "type")]
    pub mime_type: String,
}

/// A stored analysis: one report plus its owner and input metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub address: String,
    #[serde(default)]
    pub files: Vec<FileMetadata>,
    pub status: ProjectStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report: Option<AnalysisReport>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub user_id: Option<String>,
}

/// Insert payload for the `projects` table.
#[derive(Debug, Clone, Serialize)]
pub struct NewProject {
    pub address: String,
    pub files: Vec<FileMetadata>,
    pub status: ProjectStatus,
    pub report: AnalysisReport,
    pub user_id: Option<String>,
}

/// Address of a project joined into a saved comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectRef {
    pub address: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedComparison {
    pub id: String,
    pub user_id: String,
    pub project_a_id: String,
    pub project_b_id: String,
    pub data: ComparisonResult,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(rename = "projectA", default, skip_serializing_if = "Option::is_none")]
    pub project_a: Option<ProjectRef>,
    #[serde(rename = "projectB", default, skip_serializing_if = "Option::is_none")]
    pub project_b: Option<ProjectRef>,
}

/// Insert payload for the `saved_comparisons` table.
#[derive(Debug, Clone, Serialize)]
pub struct NewComparison {
    pub user_id: String,
    pub project_a_id: String,
    pub project_b_id: String,
    pub data: ComparisonResult,
}

/// Repair ids come back as `"1"` or `1` depending on the model's mood.
fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Text(String),
        Int(i64),
        Float(f64),
    }

    Ok(match Id::deserialize(deserializer)? {
        Id::Text(s) => s,
        Id::Int(n) => n.to_string(),
        Id::Float(f) => f.to_string(),
    })
}
