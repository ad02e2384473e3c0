//! Error taxonomy surfaced at the boundary of every exposed operation.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use thiserror::Error;

/// Failure of an analysis, comparison or lookup, as reported to the caller.
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// Missing or malformed caller input (no files, bad ids, bad URL).
    #[error("{0}")]
    Input(String),

    /// The listing page could not be retrieved.
    #[error("failed to fetch {url}: {reason}")]
    Fetch {
        url: String,
        status: Option<u16>,
        reason: String,
    },

    /// The model call failed or its output did not match the report shape.
    #[error("analysis failed: {0}")]
    Extraction(String),

    /// Same as `Extraction`, scoped to the comparison call.
    #[error("comparison failed: {0}")]
    Comparison(String),

    /// The store rejected a read or write.
    #[error("storage error: {0}")]
    Persistence(String),

    #[error("not found: {0}")]
    NotFound(String),
}

impl AnalysisError {
    pub fn input(msg: impl Into<String>) -> Self {
        Self::Input(msg.into())
    }

    /// Wrap a collaborator error, flattening its context chain to one line.
    pub fn extraction(err: &anyhow::Error) -> Self {
        Self::Extraction(one_line(err))
    }

    pub fn comparison(err: &anyhow::Error) -> Self {
        Self::Comparison(one_line(err))
    }

    pub fn persistence(err: &anyhow::Error) -> Self {
        Self::Persistence(one_line(err))
    }

    /// Short machine-readable kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Input(_) => "input_error",
            Self::Fetch { .. } => "fetch_error",
            Self::Extraction(_) => "extraction_error",
            Self::Comparison(_) => "comparison_error",
            Self::Persistence(_) => "persistence_error",
            Self::NotFound(_) => "not_found",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Input(_) => StatusCode::BAD_REQUEST,
            Self::Fetch { .. } => StatusCode::BAD_GATEWAY,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Extraction(_) | Self::Comparison(_) | Self::Persistence(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AnalysisError {
    fn into_response(self) -> Response {
        let body = json!({
            "error": self.kind(),
            "details": self.to_string(),
        });
        (self.status_code(), Json(body)).into_response()
    }
}

fn one_line(err: &anyhow::Error) -> String {
    format!("{:#}", err).replace('\n', " ")
}
