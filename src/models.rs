use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    NotStarted,
    Applied,
    InProgress,
    Offer,
    Rejected,
    NoAnswer,
}

impl Stage {
    pub const ALL: [Stage; 6] = [
        Stage::NotStarted,
        Stage::Applied,
        Stage::InProgress,
        Stage::Offer,
        Stage::Rejected,
        Stage::NoAnswer,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::NotStarted => "not_started",
            Stage::Applied => "applied",
            Stage::InProgress => "in_progress",
            Stage::Offer => "offer",
            Stage::Rejected => "rejected",
            Stage::NoAnswer => "no_answer",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Stage::NotStarted => "Not Started",
            Stage::Applied => "Applied",
            Stage::InProgress => "In Progress",
            Stage::Offer => "Offer",
            Stage::Rejected => "Rejected",
            Stage::NoAnswer => "No Answer",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase().replace([' ', '-'], "_");
        Stage::ALL
            .into_iter()
            .find(|stage| stage.as_str() == wanted)
            .ok_or_else(|| {
                format!(
                    "unknown stage '{}' (expected one of: not_started, applied, in_progress, offer, rejected, no_answer)",
                    s
                )
            })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Application {
    pub id: i64,
    pub company_name: String,
    pub role_name: String,
    pub stage: Stage,
    pub job_ad_content: Option<String>,
    pub cover_letter: Option<String>,
    pub application_notes: Option<String>,
    pub notes: Option<String>,
    pub match_percentage: Option<f64>, // 0-100
    #[serde(default)]
    pub match_reasoning: Option<String>,
    #[serde(default)]
    pub stage_date: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageHistoryEntry {
    pub id: i64,
    pub previous_stage: Option<Stage>,
    pub new_stage: Stage,
    pub changed_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lead {
    pub id: i64,
    pub company_name: String,
    pub role_name: String,
    pub job_ad_content: String,
    #[serde(default)]
    pub job_url: Option<String>,
    #[serde(default, alias = "job_match_percentage")]
    pub match_percentage: Option<f64>,
    #[serde(default)]
    pub match_reasoning: Option<String>,
    #[serde(default)]
    pub is_promoted: bool,
    #[serde(default)]
    pub promoted_to_application_id: Option<i64>,
    pub created_at: String,
    #[serde(default)]
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resume {
    pub id: i64,
    pub content: String,
    pub file_name: Option<String>, // display label
    pub is_active: bool,
    pub created_at: String,
    #[serde(default)]
    pub updated_at: Option<String>,
}

impl Resume {
    pub fn label(&self) -> String {
        self.file_name
            .clone()
            .unwrap_or_else(|| format!("Resume #{}", self.id))
    }
}

// --- Request payloads ---

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewApplication {
    pub company_name: String,
    pub role_name: String,
    pub stage: Stage,
    pub job_ad_content: Option<String>,
    pub cover_letter: Option<String>,
    pub application_notes: Option<String>,
    pub notes: Option<String>,
    pub match_percentage: Option<f64>,
}

/// Partial update; unset fields are left out of the request body.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ApplicationUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<Stage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_ad_content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cover_letter: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub application_notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// `Some(None)` clears the score, `None` leaves it untouched.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub match_percentage: Option<Option<f64>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewLead {
    pub company_name: String,
    pub role_name: String,
    pub job_ad_content: String,
    pub job_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LeadUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_ad_content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_url: Option<Option<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewResume {
    pub content: String,
    pub file_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResumeUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
}

// --- Queries and action responses ---

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApplicationQuery {
    pub stage: Option<Stage>,
    pub company: Option<String>,
    pub skip: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LeadQuery {
    pub sort_by_match: bool,
    pub company: Option<String>,
    pub promoted: Option<bool>,
    pub skip: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchAnalysis {
    pub match_percentage: f64,
    pub reasoning: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Promotion {
    pub job_application: Application,
    #[serde(default)]
    pub message: String,
}
