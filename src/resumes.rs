use tracing::info;

use crate::api::TrackerApi;
use crate::applications::{optional, required};
use crate::error::ApiError;
use crate::models::{NewResume, Resume, ResumeUpdate};
use crate::notify::Confirm;

pub async fn create(api: &dyn TrackerApi, content: &str, file_name: Option<&str>) -> Result<Resume, ApiError> {
    let resume = NewResume {
        content: required("Resume content", content)?,
        file_name: file_name.and_then(optional),
    };
    let created = api.create_resume(&resume).await?;
    info!(id = created.id, "resume created");
    Ok(created)
}

pub async fn edit(
    api: &dyn TrackerApi,
    id: i64,
    content: Option<&str>,
    file_name: Option<&str>,
) -> Result<Resume, ApiError> {
    let update = ResumeUpdate {
        content: content.map(|c| required("Resume content", c)).transpose()?,
        file_name: file_name.map(str::to_string),
        is_active: None,
    };
    api.update_resume(id, &update).await
}

/// Sends only the intent to make `id` active, then reloads every resume so
/// the previously active one shows the backend's new truth.
pub async fn activate(api: &dyn TrackerApi, id: i64) -> Result<Vec<Resume>, ApiError> {
    let update = ResumeUpdate {
        is_active: Some(true),
        ..Default::default()
    };
    api.update_resume(id, &update).await?;
    info!(id, "resume activated");
    api.list_resumes().await
}

pub async fn delete(api: &dyn TrackerApi, confirm: &dyn Confirm, id: i64) -> Result<bool, ApiError> {
    if !confirm.confirm("Are you sure you want to delete this resume?").await {
        return Ok(false);
    }
    api.delete_resume(id).await?;
    info!(id, "resume deleted");
    Ok(true)
}

#[derive(Debug, Default)]
pub struct ResumesPage {
    pub resumes: Vec<Resume>,
}

impl ResumesPage {
    pub async fn refresh(&mut self, api: &dyn TrackerApi) -> Result<(), ApiError> {
        self.resumes = api.list_resumes().await?;
        Ok(())
    }

    pub fn active(&self) -> Option<&Resume> {
        self.resumes.iter().find(|r| r.is_active)
    }
}
