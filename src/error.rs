use serde::Deserialize;
use thiserror::Error;

/// Every way a single user action against the tracker can fail.
///
/// None of these are fatal: the caller clears its busy flag, shows a toast
/// and keeps the list it already had.
#[derive(Debug, Error)]
pub enum ApiError {
    /// No response was received.
    #[error("could not reach the tracker: {0}")]
    Transport(#[from] reqwest::Error),

    /// The backend answered with a non-success status.
    #[error("request rejected with status {status}{}", suffix(.detail))]
    Rejected { status: u16, detail: Option<String> },

    #[error("unexpected response body: {0}")]
    Decode(String),

    /// Refused locally; the request never left the client.
    #[error("{0}")]
    Precondition(String),
}

impl ApiError {
    pub fn precondition(message: impl Into<String>) -> Self {
        ApiError::Precondition(message.into())
    }

    /// Human-readable text for a toast, falling back to `fallback` when the
    /// server gave no detail.
    pub fn user_message(&self, fallback: &str) -> String {
        match self {
            ApiError::Rejected {
                detail: Some(detail),
                ..
            } => detail.clone(),
            ApiError::Precondition(message) => message.clone(),
            _ => fallback.to_string(),
        }
    }
}

fn suffix(detail: &Option<String>) -> String {
    detail.as_deref().map(|d| format!(": {d}")).unwrap_or_default()
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    detail: DetailField,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DetailField {
    Text(String),
    Validation(Vec<ValidationIssue>),
}

#[derive(Debug, Deserialize)]
struct ValidationIssue {
    msg: String,
}

/// Pulls the `detail` message out of an error body, if there is one.
pub fn extract_detail(body: &str) -> Option<String> {
    let parsed: ErrorBody = serde_json::from_str(body).ok()?;
    let detail = match parsed.detail {
        DetailField::Text(text) => text,
        DetailField::Validation(issues) => issues
            .into_iter()
            .map(|issue| issue.msg)
            .collect::<Vec<_>>()
            .join("; "),
    };
    let detail = detail.trim().to_string();
    (!detail.is_empty()).then_some(detail)
}
