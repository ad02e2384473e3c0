//! Side-by-side comparison of two extracted reports.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::config::PromptSettings;
use crate::extractor::parse_llm_json;
use crate::model::{GenerationRequest, GenerativeModel};
use crate::schema::{AnalysisReport, ComparisonResult};

/// Tolerance before a disagreeing model cost figure is logged.
const COST_TOLERANCE: f64 = 1.0;

#[derive(Clone)]
pub struct ReportComparator {
    model: Arc<dyn GenerativeModel>,
    settings: PromptSettings,
}

impl ReportComparator {
    pub fn new(model: Arc<dyn GenerativeModel>, settings: PromptSettings) -> Self {
        Self { model, settings }
    }

    /// Compare two reports, A first.
    ///
    /// `costDifference` is recomputed from the two budget midpoints; the
    /// model's own arithmetic is only used for a consistency warning.
    pub async fn compare(
        &self,
        report_a: &AnalysisReport,
        report_b: &AnalysisReport,
    ) -> Result<ComparisonResult> {
        info!(
            "Comparing {} with {} using {}",
            display_address(report_a),
            display_address(report_b),
            self.model.name()
        );

        let prompt = build_prompt(report_a, report_b, &self.settings);
        let response = self
            .model
            .generate(GenerationRequest::json(prompt))
            .await
            .context("Model call failed")?;

        debug!("Raw comparison response length: {} chars", response.len());
        anyhow::ensure!(!response.trim().is_empty(), "Empty response from model");

        let mut result: ComparisonResult =
            parse_llm_json(&response).context("Failed to parse comparison")?;
        result.validate().context("Comparison failed validation")?;

        let expected = cost_difference(report_a, report_b);
        if (result.cost_difference - expected).abs() > COST_TOLERANCE {
            warn!(
                "Model costDifference {} disagrees with budget midpoints ({}), using the latter",
                result.cost_difference, expected
            );
        }
        result.cost_difference = expected;

        info!(
            "Comparison complete: winner {:?} ({}), cost difference {}",
            result.winner,
            result.winning_label(report_a, report_b),
            result.cost_difference
        );

        Ok(result)
    }
}

/// Midpoint of A's repair budget minus midpoint of B's.
pub fn cost_difference(report_a: &AnalysisReport, report_b: &AnalysisReport) -> f64 {
    report_a.estimated_budget.midpoint() - report_b.estimated_budget.midpoint()
}

pub fn build_prompt(
    report_a: &AnalysisReport,
    report_b: &AnalysisReport,
    settings: &PromptSettings,
) -> String {
    format!(
        r#"You are an experienced estate agent and building surveyor. Your task is to compare two properties based on their condition reports, analyses and finances.

{house_a}

{house_b}

Output JSON format:
{{
  "winner": "A" | "B",
  "winnerReason": "Short explanation of why the winner is the better buy. Refer to the properties by address rather than 'Property A/B' where an address is known.",
  "costDifference": 0,
  "comparisonPoints": [
    {{
      "category": "Roof",
      "scoreA": 8,
      "scoreB": 4,
      "comment": "Property B has cracked roof tiles."
    }},
    {{
      "category": "Finances",
      "scoreA": 5,
      "scoreB": 8,
      "comment": "Property A has a considerably higher monthly cost."
    }}
  ],
  "recommendation": "A concluding recommendation to the buyer that weighs both condition and finances."
}}

Instructions:
1. "winner" is the property that is the better buy when weighing condition and price.
2. "costDifference" is the difference in average repair cost: the midpoint of Property A's repair budget minus the midpoint of Property B's, in {currency}. A positive number means Property A is the more expensive to fix.
3. Give one entry in "comparisonPoints" per inspection category (roof, facade, installations, moisture, finances and so on), scoring each property from 1 to 10 (10 is best) with a short justification.
4. Write all narrative text in {language}.
5. Respond ONLY with JSON."#,
        house_a = describe("PROPERTY A", report_a, &settings.currency),
        house_b = describe("PROPERTY B", report_b, &settings.currency),
        currency = settings.currency,
        language = settings.language,
    )
}

/// Labeled plain-text block for one property.
fn describe(label: &str, report: &AnalysisReport, currency: &str) -> String {
    let financials = report.financials.clone().unwrap_or_default();
    let amount = |value: Option<f64>, suffix: &str| match value {
        Some(v) => format!("{} {}{}", v, currency, suffix),
        None => "Not stated".to_string(),
    };
    let repairs =
        serde_json::to_string(&report.required_repairs).unwrap_or_else(|_| "[]".to_string());

    format!(
        "{label}:\nAddress: {address}\nPrice: {price}\nMonthly cost: {monthly}\nCondition: {condition}\nSummary: {summary}\nEstimated repairs: {min} - {max} {budget_currency}\nSignificant damage: {repairs}",
        label = label,
        address = display_address(report),
        price = amount(financials.price, ""),
        monthly = amount(financials.gross_monthly_cost, "/month"),
        condition = condition_label(report),
        summary = report.summary,
        min = report.estimated_budget.min,
        max = report.estimated_budget.max,
        budget_currency = report.estimated_budget.currency,
        repairs = repairs,
    )
}

fn display_address(report: &AnalysisReport) -> &str {
    report.address.as_deref().unwrap_or("Not stated")
}

fn condition_label(report: &AnalysisReport) -> &'static str {
    use crate::schema::Condition::*;
    match report.condition {
        Good => "good",
        Medium => "medium",
        Bad => "bad",
        Critical => "critical",
    }
}
