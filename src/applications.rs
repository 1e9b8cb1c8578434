use chrono::{DateTime, NaiveDateTime};
use tracing::info;

use crate::api::TrackerApi;
use crate::error::ApiError;
use crate::models::{
    Application, ApplicationQuery, ApplicationUpdate, NewApplication, Stage, StageHistoryEntry,
};
use crate::notify::Confirm;

/// Raw form buffers, exactly as typed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApplicationForm {
    pub company_name: String,
    pub role_name: String,
    pub stage: Option<Stage>,
    pub job_ad_content: String,
    pub cover_letter: String,
    pub application_notes: String,
    pub notes: String,
    pub match_percentage: String,
}

impl ApplicationForm {
    pub fn from_application(app: &Application) -> Self {
        Self {
            company_name: app.company_name.clone(),
            role_name: app.role_name.clone(),
            stage: Some(app.stage),
            job_ad_content: app.job_ad_content.clone().unwrap_or_default(),
            cover_letter: app.cover_letter.clone().unwrap_or_default(),
            application_notes: app.application_notes.clone().unwrap_or_default(),
            notes: app.notes.clone().unwrap_or_default(),
            match_percentage: app
                .match_percentage
                .map(|m| m.to_string())
                .unwrap_or_default(),
        }
    }

    pub fn to_new(&self) -> Result<NewApplication, ApiError> {
        Ok(NewApplication {
            company_name: required("Company name", &self.company_name)?,
            role_name: required("Role name", &self.role_name)?,
            stage: self.stage.unwrap_or(Stage::NotStarted),
            job_ad_content: optional(&self.job_ad_content),
            cover_letter: optional(&self.cover_letter),
            application_notes: optional(&self.application_notes),
            notes: optional(&self.notes),
            match_percentage: parse_match_percentage(&self.match_percentage)?,
        })
    }

    /// Full replacement of the editable fields; an emptied score is cleared.
    pub fn to_update(&self) -> Result<ApplicationUpdate, ApiError> {
        let new = self.to_new()?;
        Ok(ApplicationUpdate {
            company_name: Some(new.company_name),
            role_name: Some(new.role_name),
            stage: self.stage,
            job_ad_content: Some(new.job_ad_content.unwrap_or_default()),
            cover_letter: Some(new.cover_letter.unwrap_or_default()),
            application_notes: Some(new.application_notes.unwrap_or_default()),
            notes: Some(new.notes.unwrap_or_default()),
            match_percentage: Some(new.match_percentage),
        })
    }
}

pub(crate) fn required(field: &str, value: &str) -> Result<String, ApiError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ApiError::precondition(format!("{field} is required")));
    }
    Ok(value.to_string())
}

pub(crate) fn optional(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

/// Empty input means "no score", never zero.
pub fn parse_match_percentage(input: &str) -> Result<Option<f64>, ApiError> {
    let input = input.trim().trim_end_matches('%').trim();
    if input.is_empty() {
        return Ok(None);
    }
    let value: f64 = input
        .parse()
        .map_err(|_| ApiError::precondition(format!("Match percentage '{input}' is not a number")))?;
    if !(0.0..=100.0).contains(&value) {
        return Err(ApiError::precondition(
            "Match percentage must be between 0 and 100",
        ));
    }
    Ok(Some(value))
}

// --- Actions ---

/// Creates when `editing` is `None`, otherwise updates that application.
pub async fn save(
    api: &dyn TrackerApi,
    editing: Option<i64>,
    form: &ApplicationForm,
) -> Result<Application, ApiError> {
    let saved = match editing {
        Some(id) => api.update_application(id, &form.to_update()?).await?,
        None => api.create_application(&form.to_new()?).await?,
    };
    info!(id = saved.id, stage = %saved.stage, "application saved");
    Ok(saved)
}

/// Any stage may follow any other; the backend decides legality and records
/// the history row.
pub async fn change_stage(api: &dyn TrackerApi, id: i64, stage: Stage) -> Result<Application, ApiError> {
    let update = ApplicationUpdate {
        stage: Some(stage),
        ..Default::default()
    };
    let updated = api.update_application(id, &update).await?;
    info!(id, stage = %updated.stage, "application stage changed");
    Ok(updated)
}

/// Returns `false` without touching the network when the user declines.
pub async fn delete(api: &dyn TrackerApi, confirm: &dyn Confirm, id: i64) -> Result<bool, ApiError> {
    if !confirm
        .confirm("Are you sure you want to delete this application?")
        .await
    {
        return Ok(false);
    }
    api.delete_application(id).await?;
    info!(id, "application deleted");
    Ok(true)
}

/// Stage history, oldest first.
pub async fn history(api: &dyn TrackerApi, id: i64) -> Result<Vec<StageHistoryEntry>, ApiError> {
    let mut entries = api.application_history(id).await?;
    sort_oldest_first(&mut entries);
    Ok(entries)
}

pub fn sort_oldest_first(entries: &mut [StageHistoryEntry]) {
    entries.sort_by(|a, b| {
        parse_timestamp(&a.changed_at)
            .cmp(&parse_timestamp(&b.changed_at))
            .then(a.id.cmp(&b.id))
    });
}

pub fn describe_transition(entry: &StageHistoryEntry) -> String {
    let from = entry.previous_stage.map(Stage::label).unwrap_or("—");
    format!("{} → {}", from, entry.new_stage.label())
}

/// Backend timestamps come without an offset; RFC 3339 is accepted too.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|d| d.naive_utc()))
}

pub fn display_date(raw: &str) -> String {
    parse_timestamp(raw)
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| raw.to_string())
}

// --- Page state ---

#[derive(Debug, Default)]
pub struct ApplicationsPage {
    pub applications: Vec<Application>,
    pub stage_filter: Option<Stage>,
}

impl ApplicationsPage {
    pub fn query(&self) -> ApplicationQuery {
        ApplicationQuery {
            stage: self.stage_filter,
            ..Default::default()
        }
    }

    /// Replaces the list wholesale; on failure the old list stays.
    pub async fn refresh(&mut self, api: &dyn TrackerApi) -> Result<(), ApiError> {
        self.applications = api.list_applications(&self.query()).await?;
        Ok(())
    }
}
