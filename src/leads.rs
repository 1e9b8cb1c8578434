use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::info;

use crate::api::TrackerApi;
use crate::applications::{optional, required};
use crate::error::ApiError;
use crate::models::{Lead, LeadQuery, LeadUpdate, MatchAnalysis, NewLead, Promotion, Resume};
use crate::notify::Confirm;

pub const NO_ACTIVE_RESUME: &str = "Please create and activate a resume first!";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeadState {
    Draft,
    Analyzed,
    Promoted,
}

impl LeadState {
    pub fn of(lead: &Lead) -> Self {
        if lead.is_promoted {
            LeadState::Promoted
        } else if lead.match_percentage.is_some() {
            LeadState::Analyzed
        } else {
            LeadState::Draft
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Hidden,
    Disabled,
    Enabled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeadControls {
    pub analyze: Control,
    pub promote: Control,
}

/// Which of analyze/promote a lead row offers right now.
pub fn lead_controls(lead: &Lead, has_active_resume: bool, busy: bool) -> LeadControls {
    if lead.is_promoted {
        return LeadControls {
            analyze: Control::Hidden,
            promote: Control::Hidden,
        };
    }
    let ready = if busy { Control::Disabled } else { Control::Enabled };
    LeadControls {
        analyze: if has_active_resume { ready } else { Control::Disabled },
        promote: ready,
    }
}

// --- Per-id busy flags ---

/// Lead ids with a request in flight.
#[derive(Debug, Clone, Default)]
pub struct BusySet {
    ids: Arc<Mutex<HashSet<i64>>>,
}

impl BusySet {
    /// `None` when the id is already busy.
    pub fn try_acquire(&self, id: i64) -> Option<BusyGuard> {
        let mut ids = self.ids.lock().unwrap_or_else(PoisonError::into_inner);
        ids.insert(id).then(|| BusyGuard {
            ids: Arc::clone(&self.ids),
            id,
        })
    }

    pub fn is_busy(&self, id: i64) -> bool {
        self.ids
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&id)
    }
}

/// Clears the id's flag when the request finishes, however it finishes.
#[derive(Debug)]
pub struct BusyGuard {
    ids: Arc<Mutex<HashSet<i64>>>,
    id: i64,
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.ids
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.id);
    }
}

// --- Form ---

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LeadForm {
    pub company_name: String,
    pub role_name: String,
    pub job_ad_content: String,
    pub job_url: String,
}

impl LeadForm {
    pub fn from_lead(lead: &Lead) -> Self {
        Self {
            company_name: lead.company_name.clone(),
            role_name: lead.role_name.clone(),
            job_ad_content: lead.job_ad_content.clone(),
            job_url: lead.job_url.clone().unwrap_or_default(),
        }
    }

    pub fn to_new(&self) -> Result<NewLead, ApiError> {
        Ok(NewLead {
            company_name: required("Company name", &self.company_name)?,
            role_name: required("Role name", &self.role_name)?,
            job_ad_content: required("Job ad content", &self.job_ad_content)?,
            job_url: optional(&self.job_url),
        })
    }

    pub fn to_update(&self) -> Result<LeadUpdate, ApiError> {
        let new = self.to_new()?;
        Ok(LeadUpdate {
            company_name: Some(new.company_name),
            role_name: Some(new.role_name),
            job_ad_content: Some(new.job_ad_content),
            job_url: Some(new.job_url),
        })
    }
}

// --- Actions ---

pub async fn save(api: &dyn TrackerApi, editing: Option<i64>, form: &LeadForm) -> Result<Lead, ApiError> {
    let saved = match editing {
        Some(id) => api.update_lead(id, &form.to_update()?).await?,
        None => api.create_lead(&form.to_new()?).await?,
    };
    info!(id = saved.id, company = %saved.company_name, "lead saved");
    Ok(saved)
}

/// Asks the backend to score the lead against a resume.
///
/// Refused locally, with no request sent, when no active resume is loaded or
/// the lead was already promoted.
pub async fn analyze(
    api: &dyn TrackerApi,
    lead: &Lead,
    active_resume: Option<&Resume>,
    resume_id: Option<i64>,
) -> Result<MatchAnalysis, ApiError> {
    if lead.is_promoted {
        return Err(ApiError::precondition("This lead has already been promoted."));
    }
    if active_resume.is_none() {
        return Err(ApiError::precondition(NO_ACTIVE_RESUME));
    }
    let analysis = api.analyze_lead(lead.id, resume_id).await?;
    info!(
        id = lead.id,
        match_percentage = analysis.match_percentage,
        "lead analyzed"
    );
    Ok(analysis)
}

/// One-way conversion into an application. `None` when the user declines.
pub async fn promote(
    api: &dyn TrackerApi,
    confirm: &dyn Confirm,
    lead: &Lead,
) -> Result<Option<Promotion>, ApiError> {
    if lead.is_promoted {
        return Err(ApiError::precondition("This lead has already been promoted."));
    }
    if !confirm.confirm("Promote this lead to a job application?").await {
        return Ok(None);
    }
    let promotion = api.promote_lead(lead.id).await?;
    info!(
        id = lead.id,
        application_id = promotion.job_application.id,
        "lead promoted"
    );
    Ok(Some(promotion))
}

pub async fn delete(api: &dyn TrackerApi, confirm: &dyn Confirm, id: i64) -> Result<bool, ApiError> {
    if !confirm.confirm("Are you sure you want to delete this lead?").await {
        return Ok(false);
    }
    api.delete_lead(id).await?;
    info!(id, "lead deleted");
    Ok(true)
}

// --- Page state ---

#[derive(Debug, Default)]
pub struct LeadsPage {
    pub leads: Vec<Lead>,
    pub sort_by_match: bool,
    pub active_resume: Option<Resume>,
    pub busy: BusySet,
}

impl LeadsPage {
    pub fn query(&self) -> LeadQuery {
        LeadQuery {
            sort_by_match: self.sort_by_match,
            ..Default::default()
        }
    }

    pub async fn refresh(&mut self, api: &dyn TrackerApi) -> Result<(), ApiError> {
        self.leads = api.list_leads(&self.query()).await?;
        Ok(())
    }

    pub async fn load_active_resume(&mut self, api: &dyn TrackerApi) -> Result<(), ApiError> {
        self.active_resume = api.active_resume().await?;
        Ok(())
    }

    pub fn controls(&self, lead: &Lead) -> LeadControls {
        lead_controls(lead, self.active_resume.is_some(), self.busy.is_busy(lead.id))
    }
}
