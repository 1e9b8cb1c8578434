//! In-memory tracker backend for workflow tests.
//!
//! Upholds the rules the real backend owns: history rows on stage changes,
//! one active resume, promotion creating an application.

use async_trait::async_trait;
use chrono::{Duration, NaiveDate};
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::api::{NO_ACTIVE_RESUME_DETAIL, TrackerApi};
use crate::error::ApiError;
use crate::models::{
    Application, ApplicationQuery, ApplicationUpdate, Lead, LeadQuery, LeadUpdate, MatchAnalysis,
    NewApplication, NewLead, NewResume, Promotion, Resume, ResumeUpdate, Stage, StageHistoryEntry,
};
use crate::notify::Confirm;

/// Answers "no" to every confirmation.
pub struct Decline;

#[async_trait]
impl Confirm for Decline {
    async fn confirm(&self, _prompt: &str) -> bool {
        false
    }
}

#[derive(Default)]
struct State {
    next_id: i64,
    tick: i64,
    resumes: Vec<Resume>,
    applications: Vec<Application>,
    history: HashMap<i64, Vec<StageHistoryEntry>>,
    leads: Vec<Lead>,
}

impl State {
    fn id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn now(&mut self) -> String {
        self.tick += 1;
        let base = NaiveDate::from_ymd_opt(2024, 3, 1)
            .and_then(|d| d.and_hms_opt(9, 0, 0))
            .unwrap();
        (base + Duration::seconds(self.tick))
            .format("%Y-%m-%dT%H:%M:%S")
            .to_string()
    }

    fn record_stage(&mut self, application_id: i64, previous: Option<Stage>, new: Stage) {
        let entry = StageHistoryEntry {
            id: self.id(),
            previous_stage: previous,
            new_stage: new,
            changed_at: self.now(),
        };
        self.history.entry(application_id).or_default().push(entry);
    }

    fn insert_application(&mut self, new: &NewApplication, match_reasoning: Option<String>) -> Application {
        let now = self.now();
        let application = Application {
            id: self.id(),
            company_name: new.company_name.clone(),
            role_name: new.role_name.clone(),
            stage: new.stage,
            job_ad_content: new.job_ad_content.clone(),
            cover_letter: new.cover_letter.clone(),
            application_notes: new.application_notes.clone(),
            notes: new.notes.clone(),
            match_percentage: new.match_percentage,
            match_reasoning,
            stage_date: Some(now.clone()),
            created_at: now.clone(),
            updated_at: now,
        };
        self.applications.push(application.clone());
        self.record_stage(application.id, None, application.stage);
        application
    }
}

fn not_found(what: &str) -> ApiError {
    ApiError::Rejected {
        status: 404,
        detail: Some(format!("{what} not found")),
    }
}

#[derive(Default)]
pub struct FakeTracker {
    state: Mutex<State>,
    calls: AtomicUsize,
    fail_next: Mutex<Option<ApiError>>,
}

impl FakeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests that reached the "network".
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// The next call is rejected with this status and detail.
    pub fn reject_next(&self, status: u16, detail: Option<&str>) {
        *self.fail_next.lock().unwrap() = Some(ApiError::Rejected {
            status,
            detail: detail.map(str::to_string),
        });
    }

    pub fn seed_resume(&self, content: &str, active: bool) -> Resume {
        let mut state = self.state.lock().unwrap();
        if active {
            state.resumes.iter_mut().for_each(|r| r.is_active = false);
        }
        let resume = Resume {
            id: state.id(),
            content: content.to_string(),
            file_name: None,
            is_active: active,
            created_at: state.now(),
            updated_at: None,
        };
        state.resumes.push(resume.clone());
        resume
    }

    pub fn seed_lead(&self, company: &str, score: Option<f64>) -> Lead {
        let mut state = self.state.lock().unwrap();
        let lead = Lead {
            id: state.id(),
            company_name: company.to_string(),
            role_name: "Engineer".to_string(),
            job_ad_content: format!("{company} is hiring"),
            job_url: None,
            match_percentage: score,
            match_reasoning: score.map(|s| format!("scored {s}")),
            is_promoted: false,
            promoted_to_application_id: None,
            created_at: state.now(),
            updated_at: None,
        };
        state.leads.push(lead.clone());
        lead
    }

    fn enter(&self) -> Result<std::sync::MutexGuard<'_, State>, ApiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.fail_next.lock().unwrap().take() {
            return Err(err);
        }
        Ok(self.state.lock().unwrap())
    }
}

#[async_trait]
impl TrackerApi for FakeTracker {
    async fn list_resumes(&self) -> Result<Vec<Resume>, ApiError> {
        Ok(self.enter()?.resumes.clone())
    }

    async fn active_resume(&self) -> Result<Option<Resume>, ApiError> {
        Ok(self.enter()?.resumes.iter().find(|r| r.is_active).cloned())
    }

    async fn get_resume(&self, id: i64) -> Result<Resume, ApiError> {
        let state = self.enter()?;
        state
            .resumes
            .iter()
            .find(|r| r.id == id)
            .cloned()
            .ok_or_else(|| not_found("Resume"))
    }

    async fn create_resume(&self, resume: &NewResume) -> Result<Resume, ApiError> {
        let mut state = self.enter()?;
        state.resumes.iter_mut().for_each(|r| r.is_active = false);
        let created = Resume {
            id: state.id(),
            content: resume.content.clone(),
            file_name: resume.file_name.clone(),
            is_active: true,
            created_at: state.now(),
            updated_at: None,
        };
        state.resumes.push(created.clone());
        Ok(created)
    }

    async fn update_resume(&self, id: i64, update: &ResumeUpdate) -> Result<Resume, ApiError> {
        let mut state = self.enter()?;
        if !state.resumes.iter().any(|r| r.id == id) {
            return Err(not_found("Resume"));
        }
        if update.is_active == Some(true) {
            state.resumes.iter_mut().for_each(|r| r.is_active = false);
        }
        let now = state.now();
        let resume = state.resumes.iter_mut().find(|r| r.id == id).unwrap();
        if let Some(content) = &update.content {
            resume.content = content.clone();
        }
        if let Some(name) = &update.file_name {
            resume.file_name = Some(name.clone());
        }
        if let Some(active) = update.is_active {
            resume.is_active = active;
        }
        resume.updated_at = Some(now);
        Ok(resume.clone())
    }

    async fn delete_resume(&self, id: i64) -> Result<(), ApiError> {
        let mut state = self.enter()?;
        let before = state.resumes.len();
        state.resumes.retain(|r| r.id != id);
        if state.resumes.len() == before {
            return Err(not_found("Resume"));
        }
        Ok(())
    }

    async fn list_applications(&self, query: &ApplicationQuery) -> Result<Vec<Application>, ApiError> {
        let state = self.enter()?;
        Ok(state
            .applications
            .iter()
            .filter(|a| query.stage.is_none_or(|s| a.stage == s))
            .filter(|a| {
                query.company.as_ref().is_none_or(|c| {
                    a.company_name.to_lowercase().contains(&c.to_lowercase())
                })
            })
            .cloned()
            .collect())
    }

    async fn get_application(&self, id: i64) -> Result<Application, ApiError> {
        let state = self.enter()?;
        state
            .applications
            .iter()
            .find(|a| a.id == id)
            .cloned()
            .ok_or_else(|| not_found("Job application"))
    }

    async fn create_application(&self, application: &NewApplication) -> Result<Application, ApiError> {
        let mut state = self.enter()?;
        Ok(state.insert_application(application, None))
    }

    async fn update_application(
        &self,
        id: i64,
        update: &ApplicationUpdate,
    ) -> Result<Application, ApiError> {
        let mut state = self.enter()?;
        let now = state.now();
        let app = state
            .applications
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or_else(|| not_found("Job application"))?;

        let previous = app.stage;
        if let Some(v) = &update.company_name {
            app.company_name = v.clone();
        }
        if let Some(v) = &update.role_name {
            app.role_name = v.clone();
        }
        if let Some(v) = &update.job_ad_content {
            app.job_ad_content = Some(v.clone());
        }
        if let Some(v) = &update.cover_letter {
            app.cover_letter = Some(v.clone());
        }
        if let Some(v) = &update.application_notes {
            app.application_notes = Some(v.clone());
        }
        if let Some(v) = &update.notes {
            app.notes = Some(v.clone());
        }
        if let Some(v) = update.match_percentage {
            app.match_percentage = v;
        }
        if let Some(stage) = update.stage {
            app.stage = stage;
        }
        app.updated_at = now.clone();
        let changed = update.stage.filter(|s| *s != previous);
        if changed.is_some() {
            app.stage_date = Some(now);
        }
        let updated = app.clone();

        if let Some(stage) = changed {
            state.record_stage(id, Some(previous), stage);
        }
        Ok(updated)
    }

    async fn delete_application(&self, id: i64) -> Result<(), ApiError> {
        let mut state = self.enter()?;
        let before = state.applications.len();
        state.applications.retain(|a| a.id != id);
        if state.applications.len() == before {
            return Err(not_found("Job application"));
        }
        state.history.remove(&id);
        Ok(())
    }

    async fn application_history(&self, id: i64) -> Result<Vec<StageHistoryEntry>, ApiError> {
        let state = self.enter()?;
        if !state.applications.iter().any(|a| a.id == id) {
            return Err(not_found("Job application"));
        }
        Ok(state.history.get(&id).cloned().unwrap_or_default())
    }

    async fn list_leads(&self, query: &LeadQuery) -> Result<Vec<Lead>, ApiError> {
        let state = self.enter()?;
        let mut leads: Vec<Lead> = state
            .leads
            .iter()
            .filter(|l| query.promoted.is_none_or(|p| l.is_promoted == p))
            .cloned()
            .collect();
        if query.sort_by_match {
            // descending, unscored last
            leads.sort_by(|a, b| {
                let a = a.match_percentage.unwrap_or(f64::NEG_INFINITY);
                let b = b.match_percentage.unwrap_or(f64::NEG_INFINITY);
                b.total_cmp(&a)
            });
        }
        Ok(leads)
    }

    async fn get_lead(&self, id: i64) -> Result<Lead, ApiError> {
        let state = self.enter()?;
        state
            .leads
            .iter()
            .find(|l| l.id == id)
            .cloned()
            .ok_or_else(|| not_found("Job lead"))
    }

    async fn create_lead(&self, lead: &NewLead) -> Result<Lead, ApiError> {
        let mut state = self.enter()?;
        let created = Lead {
            id: state.id(),
            company_name: lead.company_name.clone(),
            role_name: lead.role_name.clone(),
            job_ad_content: lead.job_ad_content.clone(),
            job_url: lead.job_url.clone(),
            match_percentage: None,
            match_reasoning: None,
            is_promoted: false,
            promoted_to_application_id: None,
            created_at: state.now(),
            updated_at: None,
        };
        state.leads.push(created.clone());
        Ok(created)
    }

    async fn update_lead(&self, id: i64, update: &LeadUpdate) -> Result<Lead, ApiError> {
        let mut state = self.enter()?;
        let now = state.now();
        let lead = state
            .leads
            .iter_mut()
            .find(|l| l.id == id)
            .ok_or_else(|| not_found("Job lead"))?;
        if let Some(v) = &update.company_name {
            lead.company_name = v.clone();
        }
        if let Some(v) = &update.role_name {
            lead.role_name = v.clone();
        }
        if let Some(v) = &update.job_ad_content {
            lead.job_ad_content = v.clone();
        }
        if let Some(v) = &update.job_url {
            lead.job_url = v.clone();
        }
        lead.updated_at = Some(now);
        Ok(lead.clone())
    }

    async fn delete_lead(&self, id: i64) -> Result<(), ApiError> {
        let mut state = self.enter()?;
        let before = state.leads.len();
        state.leads.retain(|l| l.id != id);
        if state.leads.len() == before {
            return Err(not_found("Job lead"));
        }
        Ok(())
    }

    async fn analyze_lead(&self, id: i64, resume_id: Option<i64>) -> Result<MatchAnalysis, ApiError> {
        let mut state = self.enter()?;
        let resume = match resume_id {
            Some(rid) => state.resumes.iter().find(|r| r.id == rid),
            None => state.resumes.iter().find(|r| r.is_active),
        };
        let Some(resume) = resume else {
            return Err(ApiError::Rejected {
                status: 404,
                detail: Some(NO_ACTIVE_RESUME_DETAIL.into()),
            });
        };
        let reasoning = format!("Resume #{} covers most of the listed requirements.", resume.id);
        let lead = state
            .leads
            .iter_mut()
            .find(|l| l.id == id)
            .ok_or_else(|| not_found("Job lead"))?;
        lead.match_percentage = Some(78.0);
        lead.match_reasoning = Some(reasoning.clone());
        Ok(MatchAnalysis {
            match_percentage: 78.0,
            reasoning,
        })
    }

    async fn promote_lead(&self, id: i64) -> Result<Promotion, ApiError> {
        let mut state = self.enter()?;
        let lead = state
            .leads
            .iter()
            .find(|l| l.id == id)
            .cloned()
            .ok_or_else(|| not_found("Job lead"))?;
        if lead.is_promoted {
            return Err(ApiError::Rejected {
                status: 400,
                detail: Some("Job lead already promoted".into()),
            });
        }
        let new = NewApplication {
            company_name: lead.company_name.clone(),
            role_name: lead.role_name.clone(),
            stage: Stage::NotStarted,
            job_ad_content: Some(lead.job_ad_content.clone()),
            cover_letter: None,
            application_notes: None,
            notes: None,
            match_percentage: lead.match_percentage,
        };
        let application = state.insert_application(&new, lead.match_reasoning.clone());
        if let Some(stored) = state.leads.iter_mut().find(|l| l.id == id) {
            stored.is_promoted = true;
            stored.promoted_to_application_id = Some(application.id);
        }
        Ok(Promotion {
            job_application: application,
            message: "Job lead successfully promoted to application".into(),
        })
    }
}
