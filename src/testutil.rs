//! Fixtures and stub collaborators shared by the unit tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use reqwest::Url;

use crate::error::AnalysisError;
use crate::model::{GenerationRequest, GenerativeModel};
use crate::normalizer::PageFetcher;
use crate::schema::{
    AnalysisReport, ComparisonPoint, ComparisonResult, Condition, EstimatedBudget, NewComparison,
    NewProject, Priority, Project, RepairItem, SavedComparison, Winner, DEFAULT_CURRENCY,
};
use crate::store::{ComparisonStore, EntitlementSource, ProjectStore};

pub const MINIMAL_REPORT: &str = r#"{
    "address": "Strandvejen 1, 9990 Skagen",
    "summary": "Solid house with an old roof.",
    "condition": "medium",
    "requiredRepairs": [
        {"id": 1, "title": "Roof", "description": "Worn tiles", "priority": "high", "estimatedCost": 80000}
    ],
    "estimatedBudget": {"min": 60000, "max": 100000, "currency": "DKK"}
}"#;

pub fn report_with_budget(address: Option<&str>, min: f64, max: f64) -> AnalysisReport {
    AnalysisReport {
        address: address.map(str::to_string),
        summary: "Test summary.".to_string(),
        condition: Condition::Medium,
        required_repairs: vec![RepairItem {
            id: "1".to_string(),
            title: "Roof".to_string(),
            description: "Worn tiles".to_string(),
            priority: Priority::High,
            estimated_cost: max,
        }],
        estimated_budget: EstimatedBudget {
            min,
            max,
            currency: DEFAULT_CURRENCY.to_string(),
        },
        financials: None,
    }
}

pub fn comparison_result() -> ComparisonResult {
    ComparisonResult {
        winner: Winner::A,
        winner_reason: "Newer roof.".to_string(),
        cost_difference: -20000.0,
        comparison_points: vec![ComparisonPoint {
            category: "Roof".to_string(),
            score_a: 8.0,
            score_b: 4.0,
            comment: "B needs a new roof.".to_string(),
        }],
        recommendation: "Buy A.".to_string(),
    }
}

#[derive(Debug, Default)]
enum Behaviour {
    #[default]
    Exhausted,
    Replies(Mutex<VecDeque<String>>),
    Fail(String),
    /// Pick whichever property carries this address.
    Prefer(String),
}

/// Scripted model that records every request it receives.
#[derive(Clone, Default)]
pub struct StubModel {
    behaviour: Arc<Behaviour>,
    requests: Arc<Mutex<Vec<GenerationRequest>>>,
}

impl StubModel {
    fn with(behaviour: Behaviour) -> Self {
        Self {
            behaviour: Arc::new(behaviour),
            requests: Arc::default(),
        }
    }

    pub fn replying<'a>(replies: impl IntoIterator<Item = &'a str>) -> Self {
        let replies = replies.into_iter().map(str::to_string).collect();
        Self::with(Behaviour::Replies(Mutex::new(replies)))
    }

    pub fn failing(message: &str) -> Self {
        Self::with(Behaviour::Fail(message.to_string()))
    }

    pub fn preferring(address: &str) -> Self {
        Self::with(Behaviour::Prefer(address.to_string()))
    }

    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl GenerativeModel for StubModel {
    fn name(&self) -> &str {
        "stub"
    }

    async fn generate(&self, request: GenerationRequest) -> Result<String> {
        let prompt = request.prompt.clone();
        self.requests.lock().unwrap().push(request);

        match self.behaviour.as_ref() {
            Behaviour::Exhausted => Err(anyhow!("no scripted reply")),
            Behaviour::Replies(replies) => replies
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| anyhow!("no scripted reply")),
            Behaviour::Fail(message) => Err(anyhow!(message.clone())),
            Behaviour::Prefer(address) => {
                let marker = format!("PROPERTY A:\nAddress: {}", address);
                let winner = if prompt.contains(&marker) { "A" } else { "B" };
                Ok(serde_json::json!({
                    "winner": winner,
                    "winnerReason": format!("{} needs fewer repairs.", address),
                    "costDifference": 0,
                    "comparisonPoints": [
                        {"category": "Roof", "scoreA": 5, "scoreB": 5, "comment": "Similar."}
                    ],
                    "recommendation": format!("Buy {}.", address),
                })
                .to_string())
            }
        }
    }
}

#[derive(Debug, Default)]
enum Page {
    #[default]
    Empty,
    Html(String),
    Status(u16),
}

/// Page fetcher serving a fixed response and recording requested URLs.
#[derive(Clone, Default)]
pub struct StubFetcher {
    page: Arc<Page>,
    requested: Arc<Mutex<Vec<String>>>,
}

impl StubFetcher {
    pub fn html(html: &str) -> Self {
        Self {
            page: Arc::new(Page::Html(html.to_string())),
            requested: Arc::default(),
        }
    }

    pub fn status(status: u16) -> Self {
        Self {
            page: Arc::new(Page::Status(status)),
            requested: Arc::default(),
        }
    }

    pub fn requested(&self) -> Vec<String> {
        self.requested.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl PageFetcher for StubFetcher {
    async fn fetch(&self, url: &Url) -> Result<String, AnalysisError> {
        self.requested.lock().unwrap().push(url.to_string());
        match self.page.as_ref() {
            Page::Empty => Ok(String::new()),
            Page::Html(html) => Ok(html.clone()),
            Page::Status(status) => Err(AnalysisError::Fetch {
                url: url.to_string(),
                status: Some(*status),
                reason: format!("HTTP {}", status),
            }),
        }
    }
}

/// Store whose every call fails, as an unreachable backend would.
pub struct FailingStore;

#[async_trait::async_trait]
impl ProjectStore for FailingStore {
    async fn insert_project(&self, _project: NewProject) -> Result<Project> {
        Err(anyhow!("store unavailable"))
    }

    async fn fetch_projects(&self, _ids: &[String]) -> Result<Vec<Project>> {
        Err(anyhow!("store unavailable"))
    }

    async fn fetch_projects_by_owner(&self, _owner_id: &str) -> Result<Vec<Project>> {
        Err(anyhow!("store unavailable"))
    }

    async fn fetch_project(&self, _id: &str) -> Result<Option<Project>> {
        Err(anyhow!("store unavailable"))
    }
}

#[async_trait::async_trait]
impl ComparisonStore for FailingStore {
    async fn insert_comparison(&self, _comparison: NewComparison) -> Result<SavedComparison> {
        Err(anyhow!("store unavailable"))
    }

    async fn fetch_comparisons_by_owner(&self, _owner_id: &str) -> Result<Vec<SavedComparison>> {
        Err(anyhow!("store unavailable"))
    }
}

#[async_trait::async_trait]
impl EntitlementSource for FailingStore {
    async fn premium_until(&self, _user_id: &str) -> Result<Option<DateTime<Utc>>> {
        Err(anyhow!("store unavailable"))
    }
}
