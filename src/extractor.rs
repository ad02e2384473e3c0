//! Report extraction: artifacts in, validated `AnalysisReport` out.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::config::PromptSettings;
use crate::model::{GenerationRequest, GenerativeModel, Part};
use crate::normalizer::{Artifact, ArtifactPayload};
use crate::schema::AnalysisReport;

/// Extraction pipeline: prompt construction, model call, validation.
#[derive(Clone)]
pub struct ReportExtractor {
    model: Arc<dyn GenerativeModel>,
    settings: PromptSettings,
}

impl ReportExtractor {
    pub fn new(model: Arc<dyn GenerativeModel>, settings: PromptSettings) -> Self {
        Self { model, settings }
    }

    /// Extract a report from a non-empty artifact list.
    ///
    /// Fails on a model error, an empty response, or output that does not
    /// match the report shape. There is no retry and no partial report.
    pub async fn extract(&self, artifacts: &[Artifact]) -> Result<AnalysisReport> {
        anyhow::ensure!(!artifacts.is_empty(), "no artifacts to analyse");

        let parts = build_parts(artifacts);
        let media = parts.iter().filter(|p| p.is_media()).count();
        info!(
            "Extracting report from {} artifacts ({} inline media) with {}",
            artifacts.len(),
            media,
            self.model.name()
        );

        let request = GenerationRequest::json(build_prompt(artifacts, &self.settings))
            .with_parts(parts);
        let response = self
            .model
            .generate(request)
            .await
            .context("Model call failed")?;

        debug!("Raw model response length: {} chars", response.len());
        anyhow::ensure!(!response.trim().is_empty(), "Empty response from model");

        let report: AnalysisReport =
            parse_llm_json(&response).context("Failed to parse report")?;
        report.validate().context("Report failed validation")?;
        let report = report.normalize();

        info!(
            "Extraction complete: condition={:?}, {} repairs, budget {}-{} {}",
            report.condition,
            report.required_repairs.len(),
            report.estimated_budget.min,
            report.estimated_budget.max,
            report.estimated_budget.currency
        );

        Ok(report)
    }
}

/// One line per artifact, numbered in attachment order.
pub fn build_manifest(artifacts: &[Artifact]) -> String {
    artifacts
        .iter()
        .enumerate()
        .map(|(i, a)| format!("File {}: [{}]", i + 1, a.declared_type))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn build_prompt(artifacts: &[Artifact], settings: &PromptSettings) -> String {
    let manifest = build_manifest(artifacts);
    let currency = &settings.currency;
    format!(
        r#"You are an experienced building surveyor. Your task is to analyse technical property documents and write a short, precise risk assessment for a prospective home buyer.

The documents you receive are attached in this order:
{manifest}
(Use this to understand the context of each attachment.)

The output must be valid JSON following exactly this structure:
{{
  "address": "The property address found in the documents (e.g. 'Strandvejen 1, 9990 Skagen') or null",
  "summary": "An overall, easy to understand conclusion on the condition of the house based on ALL documents",
  "condition": "One of: 'good', 'medium', 'bad', 'critical'",
  "requiredRepairs": [
    {{
      "id": "1",
      "title": "Short headline for the damage",
      "description": "Explanation of the problem, citing the source document (e.g. 'According to the Tilstandsrapport ...')",
      "priority": "high" | "medium" | "low",
      "estimatedCost": 0
    }}
  ],
  "estimatedBudget": {{
    "min": 0,
    "max": 0,
    "currency": "{currency}"
  }},
  "financials": {{
    "price": 0,
    "grossMonthlyCost": 0,
    "pricePerSqm": 0
  }}
}}

Field notes:
- estimatedCost is a rough estimate in {currency}, digits only.
- estimatedBudget.min and estimatedBudget.max are the total repair cost range, min <= max.
- financials holds the cash price, the monthly cost of ownership and the price per square metre when stated; omit figures that are not found.

Instructions:
1. Base your assessment ONLY on the supplied material (text and images).
2. Cite concrete facts from the documents where possible and name the document type they come from.
3. If images are attached, inspect them for visible damage or warning signs (e.g. cracks, moisture, mould) and mention them explicitly.
4. If the material is empty, unintelligible or very short, SAY SO in the summary instead of drawing conclusions.
5. Do NOT guess the age or condition of the house if it is not supported by the material.
6. Write all narrative text in {language}.
7. Respond ONLY with JSON."#,
        manifest = manifest,
        currency = currency,
        language = settings.language,
    )
}

/// Text artifacts become delimited blocks, everything else inline media.
pub fn build_parts(artifacts: &[Artifact]) -> Vec<Part> {
    artifacts
        .iter()
        .map(|artifact| match &artifact.payload {
            ArtifactPayload::Text(text) => Part::Text(format!(
                "\n--- DOCUMENT START ({}) ---\n{}\n--- DOCUMENT END ---\n",
                artifact.declared_type, text
            )),
            ArtifactPayload::Base64(data) => Part::InlineMedia {
                mime_type: artifact.mime_type.clone(),
                base64_data: data.clone(),
            },
        })
        .collect()
}

/// Parse model output, tolerating a Markdown code fence around the JSON.
pub fn parse_llm_json<T: serde::de::DeserializeOwned>(response: &str) -> Result<T> {
    let json_str = if response.contains("```json") {
        response
            .split("```json")
            .nth(1)
            .and_then(|s| s.split("```").next())
            .unwrap_or(response)
            .trim()
    } else if response.contains("```") {
        response.split("```").nth(1).unwrap_or(response).trim()
    } else {
        response.trim()
    };

    // First validate syntax
    let _: serde_json::Value = serde_json::from_str(json_str).context(format!(
        "Invalid JSON syntax: {}",
        &json_str.chars().take(200).collect::<String>()
    ))?;

    // Parse as expected type
    serde_json::from_str(json_str).context(format!(
        "JSON structure mismatch: {}",
        &json_str.chars().take(200).collect::<String>()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Condition;
    use crate::testutil::{StubModel, MINIMAL_REPORT};

    fn pdf(declared_type: &str) -> Artifact {
        Artifact {
            mime_type: "application/pdf".to_string(),
            payload: ArtifactPayload::Base64("JVBERi0=".to_string()),
            declared_type: declared_type.to_string(),
        }
    }

    fn listing() -> Artifact {
        Artifact {
            mime_type: "text/plain".to_string(),
            payload: ArtifactPayload::Text("Title: Villa".to_string()),
            declared_type: "Listing (Web)".to_string(),
        }
    }

    fn extractor(model: &StubModel) -> ReportExtractor {
        ReportExtractor::new(Arc::new(model.clone()), PromptSettings::default())
    }

    #[test]
    fn test_manifest_is_positional() {
        let manifest = build_manifest(&[pdf("Tilstandsrapport"), pdf("Elinstallationsrapport")]);
        assert_eq!(
            manifest,
            "File 1: [Tilstandsrapport]\nFile 2: [Elinstallationsrapport]"
        );
    }

    #[test]
    fn test_prompt_embeds_manifest_and_settings() {
        let settings = PromptSettings {
            language: "English".to_string(),
            currency: "EUR".to_string(),
        };
        let prompt = build_prompt(&[pdf("Tilstandsrapport")], &settings);
        assert!(prompt.contains("File 1: [Tilstandsrapport]"));
        assert!(prompt.contains("\"currency\": \"EUR\""));
        assert!(prompt.contains("Write all narrative text in English."));
        assert!(prompt.contains("Respond ONLY with JSON."));
    }

    #[test]
    fn test_parts_by_payload_kind() {
        let parts = build_parts(&[listing(), pdf("Tilstandsrapport")]);
        assert_eq!(
            parts[0],
            Part::Text(
                "\n--- DOCUMENT START (Listing (Web)) ---\nTitle: Villa\n--- DOCUMENT END ---\n"
                    .to_string()
            )
        );
        assert_eq!(
            parts[1],
            Part::InlineMedia {
                mime_type: "application/pdf".to_string(),
                base64_data: "JVBERi0=".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_extract_returns_parsed_report() {
        let model = StubModel::replying([MINIMAL_REPORT]);
        let report = extractor(&model)
            .extract(&[pdf("Tilstandsrapport"), pdf("Elinstallationsrapport")])
            .await
            .unwrap();

        let expected: AnalysisReport = serde_json::from_str(MINIMAL_REPORT).unwrap();
        assert_eq!(report, expected);

        let requests = model.requests();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].json_output);
        assert_eq!(requests[0].parts.iter().filter(|p| p.is_media()).count(), 2);
    }

    #[tokio::test]
    async fn test_extract_accepts_fenced_json() {
        let fenced = format!("```json\n{}\n```", MINIMAL_REPORT);
        let model = StubModel::replying([fenced.as_str()]);
        let report = extractor(&model).extract(&[listing()]).await.unwrap();
        assert_eq!(report.condition, Condition::Medium);
    }

    #[tokio::test]
    async fn test_extract_rejects_non_json() {
        let model = StubModel::replying(["not json"]);
        let err = extractor(&model).extract(&[listing()]).await.unwrap_err();
        assert!(format!("{:#}", err).contains("Invalid JSON syntax"));
    }

    #[tokio::test]
    async fn test_extract_rejects_empty_response() {
        let model = StubModel::replying(["  "]);
        let err = extractor(&model).extract(&[listing()]).await.unwrap_err();
        assert!(err.to_string().contains("Empty response"));
    }

    #[tokio::test]
    async fn test_extract_rejects_inverted_budget() {
        let inverted = MINIMAL_REPORT.replace("\"min\": 60000", "\"min\": 600000");
        let model = StubModel::replying([inverted.as_str()]);
        let err = extractor(&model).extract(&[listing()]).await.unwrap_err();
        assert!(format!("{:#}", err).contains("exceeds"));
    }

    #[tokio::test]
    async fn test_extract_propagates_model_failure() {
        let model = StubModel::failing("quota exceeded");
        let err = extractor(&model).extract(&[listing()]).await.unwrap_err();
        assert!(format!("{:#}", err).contains("quota exceeded"));
    }
}
