use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    ExecutableCommand,
};
use ratatui::{
    prelude::*,
    widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Tabs, Wrap},
};
use std::io::stdout;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

use crate::api::TrackerApi;
use crate::applications::{self, describe_transition, display_date, ApplicationForm, ApplicationsPage};
use crate::leads::{self, BusySet, Control, LeadForm, LeadState, LeadsPage, NO_ACTIVE_RESUME};
use crate::models::{Application, ApplicationQuery, Lead, LeadQuery, Resume, Stage, StageHistoryEntry};
use crate::notify::{ChannelConfirm, ConfirmRequest, Toast, ToastKind, ToastTray};
use crate::resumes::{self, ResumesPage};

const ANALYZE_FAILED: &str = "Error analyzing lead. Please check your AI provider configuration.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tab {
    Applications,
    Leads,
    Resumes,
}

impl Tab {
    const ALL: [Tab; 3] = [Tab::Applications, Tab::Leads, Tab::Resumes];

    fn index(self) -> usize {
        Tab::ALL.iter().position(|t| *t == self).unwrap_or(0)
    }

    fn next(self) -> Tab {
        Tab::ALL[(self.index() + 1) % Tab::ALL.len()]
    }
}

// --- Create/edit form ---

enum FormTarget {
    Application {
        editing: Option<i64>,
        form: ApplicationForm,
    },
    Lead {
        editing: Option<i64>,
        form: LeadForm,
    },
}

const APPLICATION_FIELDS: [&str; 8] = [
    "Company",
    "Role",
    "Stage",
    "Match %",
    "Job Ad",
    "Cover Letter",
    "Application Notes",
    "Notes",
];
const LEAD_FIELDS: [&str; 4] = ["Company", "Role", "Job URL", "Job Ad"];

/// Stage is the only field that is not free text.
const STAGE_FIELD: usize = 2;

struct FormOverlay {
    target: FormTarget,
    focus: usize,
    saving: bool,
}

impl FormOverlay {
    fn new(target: FormTarget) -> Self {
        Self {
            target,
            focus: 0,
            saving: false,
        }
    }

    fn title(&self) -> String {
        match &self.target {
            FormTarget::Application { editing: None, .. } => " New Application ".into(),
            FormTarget::Application { editing: Some(id), .. } => format!(" Edit Application #{id} "),
            FormTarget::Lead { editing: None, .. } => " New Job Lead ".into(),
            FormTarget::Lead { editing: Some(id), .. } => format!(" Edit Job Lead #{id} "),
        }
    }

    fn labels(&self) -> &'static [&'static str] {
        match self.target {
            FormTarget::Application { .. } => &APPLICATION_FIELDS,
            FormTarget::Lead { .. } => &LEAD_FIELDS,
        }
    }

    fn text_mut(&mut self, index: usize) -> Option<&mut String> {
        match &mut self.target {
            FormTarget::Application { form, .. } => match index {
                0 => Some(&mut form.company_name),
                1 => Some(&mut form.role_name),
                3 => Some(&mut form.match_percentage),
                4 => Some(&mut form.job_ad_content),
                5 => Some(&mut form.cover_letter),
                6 => Some(&mut form.application_notes),
                7 => Some(&mut form.notes),
                _ => None,
            },
            FormTarget::Lead { form, .. } => match index {
                0 => Some(&mut form.company_name),
                1 => Some(&mut form.role_name),
                2 => Some(&mut form.job_url),
                3 => Some(&mut form.job_ad_content),
                _ => None,
            },
        }
    }

    fn value(&self, index: usize) -> String {
        match &self.target {
            FormTarget::Application { form, .. } => match index {
                0 => form.company_name.clone(),
                1 => form.role_name.clone(),
                STAGE_FIELD => form.stage.unwrap_or(Stage::NotStarted).label().to_string(),
                3 => form.match_percentage.clone(),
                4 => form.job_ad_content.clone(),
                5 => form.cover_letter.clone(),
                6 => form.application_notes.clone(),
                7 => form.notes.clone(),
                _ => String::new(),
            },
            FormTarget::Lead { form, .. } => match index {
                0 => form.company_name.clone(),
                1 => form.role_name.clone(),
                2 => form.job_url.clone(),
                3 => form.job_ad_content.clone(),
                _ => String::new(),
            },
        }
    }

    /// Enter inserts a newline in these instead of moving on.
    fn is_multiline(&self, index: usize) -> bool {
        match self.target {
            FormTarget::Application { .. } => index >= 4,
            FormTarget::Lead { .. } => index == 3,
        }
    }

    fn on_stage(&self) -> bool {
        matches!(self.target, FormTarget::Application { .. }) && self.focus == STAGE_FIELD
    }

    fn focus_next(&mut self) {
        self.focus = (self.focus + 1) % self.labels().len();
    }

    fn focus_prev(&mut self) {
        let len = self.labels().len();
        self.focus = (self.focus + len - 1) % len;
    }

    fn cycle_stage(&mut self, forward: bool) {
        if let FormTarget::Application { form, .. } = &mut self.target {
            let current = form.stage.unwrap_or(Stage::NotStarted);
            let i = Stage::ALL.iter().position(|s| *s == current).unwrap_or(0);
            let len = Stage::ALL.len();
            let next = if forward { (i + 1) % len } else { (i + len - 1) % len };
            form.stage = Some(Stage::ALL[next]);
        }
    }

    fn type_char(&mut self, c: char) {
        let focus = self.focus;
        if let Some(text) = self.text_mut(focus) {
            text.push(c);
        }
    }

    fn backspace(&mut self) {
        let focus = self.focus;
        if let Some(text) = self.text_mut(focus) {
            text.pop();
        }
    }

    fn enter(&mut self) {
        if self.is_multiline(self.focus) {
            self.type_char('\n');
        } else {
            self.focus_next();
        }
    }
}

/// Results delivered by background requests. Lists carry the query that
/// produced them so a late answer to an older query can be dropped.
enum Update {
    Applications(ApplicationQuery, Vec<Application>),
    Leads(LeadQuery, Vec<Lead>),
    ActiveResume(Option<Resume>),
    Resumes(Vec<Resume>),
    History(i64, Vec<StageHistoryEntry>),
    FormSaved,
    FormFailed,
    Toast(Toast),
}

type Updates = mpsc::UnboundedSender<Update>;

fn toast(tx: &Updates, toast: Toast) {
    let _ = tx.send(Update::Toast(toast));
}

struct AppState {
    tab: Tab,
    applications: ApplicationsPage,
    leads: LeadsPage,
    resumes: ResumesPage,
    app_busy: BusySet,
    resume_busy: BusySet,
    selected: [usize; 3],
    scroll_offset: u16,
    history: Option<(i64, Vec<StageHistoryEntry>)>,
    dialog: Option<ConfirmRequest>,
    form: Option<FormOverlay>,
    toasts: ToastTray,
}

impl AppState {
    fn new(toasts: ToastTray) -> Self {
        Self {
            tab: Tab::Applications,
            applications: ApplicationsPage::default(),
            leads: LeadsPage::default(),
            resumes: ResumesPage::default(),
            app_busy: BusySet::default(),
            resume_busy: BusySet::default(),
            selected: [0; 3],
            scroll_offset: 0,
            history: None,
            dialog: None,
            form: None,
            toasts,
        }
    }

    fn len(&self) -> usize {
        match self.tab {
            Tab::Applications => self.applications.applications.len(),
            Tab::Leads => self.leads.leads.len(),
            Tab::Resumes => self.resumes.resumes.len(),
        }
    }

    fn selected(&self) -> usize {
        self.selected[self.tab.index()]
    }

    fn current_application(&self) -> Option<&Application> {
        self.applications.applications.get(self.selected[0])
    }

    fn current_lead(&self) -> Option<&Lead> {
        self.leads.leads.get(self.selected[1])
    }

    fn current_resume(&self) -> Option<&Resume> {
        self.resumes.resumes.get(self.selected[2])
    }

    fn next(&mut self) {
        let len = self.len();
        let selected = &mut self.selected[self.tab.index()];
        if len > 0 && *selected < len - 1 {
            *selected += 1;
            self.scroll_offset = 0;
        }
    }

    fn prev(&mut self) {
        let selected = &mut self.selected[self.tab.index()];
        if *selected > 0 {
            *selected -= 1;
            self.scroll_offset = 0;
        }
    }

    fn scroll_down(&mut self) {
        self.scroll_offset = self.scroll_offset.saturating_add(3);
    }

    fn scroll_up(&mut self) {
        self.scroll_offset = self.scroll_offset.saturating_sub(3);
    }

    fn clamp_selection(&mut self) {
        let len = self.len();
        let selected = &mut self.selected[self.tab.index()];
        if *selected >= len {
            *selected = len.saturating_sub(1);
        }
    }

    /// Lists are replaced wholesale; nothing is patched in place.
    fn apply(&mut self, update: Update) {
        match update {
            Update::Applications(query, list) => {
                if query == self.applications.query() {
                    self.applications.applications = list;
                } else {
                    debug!(?query, "dropped stale application list");
                }
            }
            Update::Leads(query, list) => {
                if query == self.leads.query() {
                    self.leads.leads = list;
                } else {
                    debug!(?query, "dropped stale lead list");
                }
            }
            Update::ActiveResume(resume) => self.leads.active_resume = resume,
            Update::Resumes(list) => {
                self.leads.active_resume = list.iter().find(|r| r.is_active).cloned();
                self.resumes.resumes = list;
            }
            Update::History(id, entries) => self.history = Some((id, entries)),
            Update::FormSaved => self.form = None,
            Update::FormFailed => {
                if let Some(form) = &mut self.form {
                    form.saving = false;
                }
            }
            Update::Toast(toast) => {
                self.toasts.push(toast);
            }
        }
        for tab in Tab::ALL {
            let len = match tab {
                Tab::Applications => self.applications.applications.len(),
                Tab::Leads => self.leads.leads.len(),
                Tab::Resumes => self.resumes.resumes.len(),
            };
            let selected = &mut self.selected[tab.index()];
            if *selected >= len {
                *selected = len.saturating_sub(1);
            }
        }
    }
}

// --- Background requests ---

async fn refresh_applications(api: &dyn TrackerApi, query: &ApplicationQuery, tx: &Updates) {
    match api.list_applications(query).await {
        Ok(list) => {
            let _ = tx.send(Update::Applications(query.clone(), list));
        }
        Err(e) => toast(tx, Toast::error(e.user_message("Error loading applications."))),
    }
}

async fn refresh_leads(api: &dyn TrackerApi, query: &LeadQuery, tx: &Updates) {
    match api.list_leads(query).await {
        Ok(list) => {
            let _ = tx.send(Update::Leads(query.clone(), list));
        }
        Err(e) => toast(tx, Toast::error(e.user_message("Error loading leads."))),
    }
}

async fn refresh_resumes(api: &dyn TrackerApi, tx: &Updates) {
    match api.list_resumes().await {
        Ok(list) => {
            let _ = tx.send(Update::Resumes(list));
        }
        Err(e) => toast(tx, Toast::error(e.user_message("Error loading resumes."))),
    }
}

struct Ctx {
    api: Arc<dyn TrackerApi>,
    confirm: ChannelConfirm,
    tx: Updates,
}

impl Ctx {
    fn load_all(&self, state: &AppState) {
        let (api, tx) = (Arc::clone(&self.api), self.tx.clone());
        let app_query = state.applications.query();
        let lead_query = state.leads.query();
        tokio::spawn(async move {
            refresh_applications(api.as_ref(), &app_query, &tx).await;
            refresh_leads(api.as_ref(), &lead_query, &tx).await;
            refresh_resumes(api.as_ref(), &tx).await;
            match api.active_resume().await {
                Ok(None) => toast(
                    &tx,
                    Toast::warning("No active resume found. Activate one in the Resumes tab to use AI analysis."),
                ),
                Ok(resume) => {
                    let _ = tx.send(Update::ActiveResume(resume));
                }
                Err(e) => toast(&tx, Toast::error(e.user_message("Error loading resumes."))),
            }
        });
    }

    fn change_stage(&self, state: &AppState, stage: Stage) {
        let Some(app) = state.current_application() else { return };
        if app.stage == stage {
            return;
        }
        let Some(guard) = state.app_busy.try_acquire(app.id) else { return };
        let (api, tx, id) = (Arc::clone(&self.api), self.tx.clone(), app.id);
        let query = state.applications.query();
        tokio::spawn(async move {
            let _guard = guard;
            match applications::change_stage(api.as_ref(), id, stage).await {
                Ok(_) => refresh_applications(api.as_ref(), &query, &tx).await,
                Err(e) => toast(&tx, Toast::error(e.user_message("Error saving application. Please try again."))),
            }
        });
    }

    fn show_history(&self, state: &AppState) {
        let Some(app) = state.current_application() else { return };
        let (api, tx, id) = (Arc::clone(&self.api), self.tx.clone(), app.id);
        tokio::spawn(async move {
            match applications::history(api.as_ref(), id).await {
                Ok(entries) => {
                    let _ = tx.send(Update::History(id, entries));
                }
                Err(e) => toast(&tx, Toast::error(e.user_message("Error loading history."))),
            }
        });
    }

    fn delete_application(&self, state: &AppState) {
        let Some(app) = state.current_application() else { return };
        let Some(guard) = state.app_busy.try_acquire(app.id) else { return };
        let (api, tx, confirm, id) = (Arc::clone(&self.api), self.tx.clone(), self.confirm.clone(), app.id);
        let query = state.applications.query();
        tokio::spawn(async move {
            let _guard = guard;
            match applications::delete(api.as_ref(), &confirm, id).await {
                Ok(true) => {
                    toast(&tx, Toast::success("Application deleted."));
                    refresh_applications(api.as_ref(), &query, &tx).await;
                }
                Ok(false) => {}
                Err(e) => toast(&tx, Toast::error(e.user_message("Error deleting application."))),
            }
        });
    }

    fn analyze_lead(&self, state: &AppState) {
        let Some(lead) = state.current_lead() else { return };
        if state.leads.controls(lead).analyze == Control::Hidden {
            return;
        }
        if state.leads.active_resume.is_none() {
            toast(&self.tx, Toast::error(NO_ACTIVE_RESUME));
            return;
        }
        let Some(guard) = state.leads.busy.try_acquire(lead.id) else { return };
        let (api, tx, lead) = (Arc::clone(&self.api), self.tx.clone(), lead.clone());
        let active = state.leads.active_resume.clone();
        let query = state.leads.query();
        tokio::spawn(async move {
            let _guard = guard;
            match leads::analyze(api.as_ref(), &lead, active.as_ref(), None).await {
                Ok(analysis) => {
                    toast(
                        &tx,
                        Toast::success(format!(
                            "{} scored {:.0}% match",
                            lead.company_name, analysis.match_percentage
                        )),
                    );
                    refresh_leads(api.as_ref(), &query, &tx).await;
                }
                Err(e) => toast(&tx, Toast::error(e.user_message(ANALYZE_FAILED))),
            }
        });
    }

    fn promote_lead(&self, state: &AppState) {
        let Some(lead) = state.current_lead() else { return };
        if state.leads.controls(lead).promote == Control::Hidden {
            return;
        }
        let Some(guard) = state.leads.busy.try_acquire(lead.id) else { return };
        let (api, tx, confirm, lead) = (Arc::clone(&self.api), self.tx.clone(), self.confirm.clone(), lead.clone());
        let lead_query = state.leads.query();
        let app_query = state.applications.query();
        tokio::spawn(async move {
            let _guard = guard;
            match leads::promote(api.as_ref(), &confirm, &lead).await {
                Ok(Some(_)) => {
                    toast(&tx, Toast::success("Lead successfully promoted to application!"));
                    refresh_leads(api.as_ref(), &lead_query, &tx).await;
                    refresh_applications(api.as_ref(), &app_query, &tx).await;
                }
                Ok(None) => {}
                Err(e) => toast(&tx, Toast::error(e.user_message("Error promoting lead. Please try again."))),
            }
        });
    }

    fn delete_lead(&self, state: &AppState) {
        let Some(lead) = state.current_lead() else { return };
        let Some(guard) = state.leads.busy.try_acquire(lead.id) else { return };
        let (api, tx, confirm, id) = (Arc::clone(&self.api), self.tx.clone(), self.confirm.clone(), lead.id);
        let query = state.leads.query();
        tokio::spawn(async move {
            let _guard = guard;
            match leads::delete(api.as_ref(), &confirm, id).await {
                Ok(true) => {
                    toast(&tx, Toast::success("Lead deleted."));
                    refresh_leads(api.as_ref(), &query, &tx).await;
                }
                Ok(false) => {}
                Err(e) => toast(&tx, Toast::error(e.user_message("Error deleting lead."))),
            }
        });
    }

    fn refresh_leads_sorted(&self, state: &AppState) {
        let (api, tx) = (Arc::clone(&self.api), self.tx.clone());
        let query = state.leads.query();
        tokio::spawn(async move { refresh_leads(api.as_ref(), &query, &tx).await });
    }

    fn refresh_applications_filtered(&self, state: &AppState) {
        let (api, tx) = (Arc::clone(&self.api), self.tx.clone());
        let query = state.applications.query();
        tokio::spawn(async move { refresh_applications(api.as_ref(), &query, &tx).await });
    }

    fn activate_resume(&self, state: &AppState) {
        let Some(resume) = state.current_resume() else { return };
        if resume.is_active {
            return;
        }
        let Some(guard) = state.resume_busy.try_acquire(resume.id) else { return };
        let (api, tx, id) = (Arc::clone(&self.api), self.tx.clone(), resume.id);
        tokio::spawn(async move {
            let _guard = guard;
            match resumes::activate(api.as_ref(), id).await {
                Ok(list) => {
                    toast(&tx, Toast::success(format!("Resume #{} is now active.", id)));
                    let _ = tx.send(Update::Resumes(list));
                }
                Err(e) => toast(&tx, Toast::error(e.user_message("Error activating resume."))),
            }
        });
    }

    fn delete_resume(&self, state: &AppState) {
        let Some(resume) = state.current_resume() else { return };
        let Some(guard) = state.resume_busy.try_acquire(resume.id) else { return };
        let (api, tx, confirm, id) = (Arc::clone(&self.api), self.tx.clone(), self.confirm.clone(), resume.id);
        tokio::spawn(async move {
            let _guard = guard;
            match resumes::delete(api.as_ref(), &confirm, id).await {
                Ok(true) => {
                    toast(&tx, Toast::success("Resume deleted."));
                    refresh_resumes(api.as_ref(), &tx).await;
                }
                Ok(false) => {}
                Err(e) => toast(&tx, Toast::error(e.user_message("Error deleting resume."))),
            }
        });
    }
}

impl Ctx {
    /// Validation failures come back as a toast without reaching the backend;
    /// the form stays open until a save succeeds.
    fn save_form(&self, state: &mut AppState) {
        let Some(overlay) = state.form.as_mut() else { return };
        if overlay.saving {
            return;
        }
        overlay.saving = true;
        let (api, tx) = (Arc::clone(&self.api), self.tx.clone());
        match &overlay.target {
            FormTarget::Application { editing, form } => {
                let (editing, form) = (*editing, form.clone());
                let query = state.applications.query();
                tokio::spawn(async move {
                    match applications::save(api.as_ref(), editing, &form).await {
                        Ok(saved) => {
                            toast(&tx, Toast::success(format!("{} saved.", saved.company_name)));
                            let _ = tx.send(Update::FormSaved);
                            refresh_applications(api.as_ref(), &query, &tx).await;
                        }
                        Err(e) => {
                            toast(&tx, Toast::error(e.user_message("Error saving application. Please try again.")));
                            let _ = tx.send(Update::FormFailed);
                        }
                    }
                });
            }
            FormTarget::Lead { editing, form } => {
                let (editing, form) = (*editing, form.clone());
                let query = state.leads.query();
                tokio::spawn(async move {
                    match leads::save(api.as_ref(), editing, &form).await {
                        Ok(saved) => {
                            toast(&tx, Toast::success(format!("{} saved.", saved.company_name)));
                            let _ = tx.send(Update::FormSaved);
                            refresh_leads(api.as_ref(), &query, &tx).await;
                        }
                        Err(e) => {
                            toast(&tx, Toast::error(e.user_message("Error saving job lead. Please try again.")));
                            let _ = tx.send(Update::FormFailed);
                        }
                    }
                });
            }
        }
    }
}

fn open_form(state: &mut AppState, editing: bool) {
    let target = match state.tab {
        Tab::Applications if editing => {
            let Some(app) = state.current_application() else { return };
            FormTarget::Application {
                editing: Some(app.id),
                form: ApplicationForm::from_application(app),
            }
        }
        Tab::Applications => FormTarget::Application {
            editing: None,
            form: ApplicationForm::default(),
        },
        Tab::Leads if editing => {
            let Some(lead) = state.current_lead() else { return };
            FormTarget::Lead {
                editing: Some(lead.id),
                form: LeadForm::from_lead(lead),
            }
        }
        Tab::Leads => FormTarget::Lead {
            editing: None,
            form: LeadForm::default(),
        },
        Tab::Resumes => return,
    };
    state.form = Some(FormOverlay::new(target));
}

/// Keys while the form is open. Returns `true` when the form asks to save.
fn form_key(overlay: &mut FormOverlay, key: KeyEvent) -> bool {
    if overlay.saving {
        return false;
    }
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    match key.code {
        KeyCode::Char('s') if ctrl => return true,
        KeyCode::Tab | KeyCode::Down => overlay.focus_next(),
        KeyCode::BackTab | KeyCode::Up => overlay.focus_prev(),
        KeyCode::Left if overlay.on_stage() => overlay.cycle_stage(false),
        KeyCode::Right | KeyCode::Char(' ') if overlay.on_stage() => overlay.cycle_stage(true),
        KeyCode::Enter => overlay.enter(),
        KeyCode::Backspace => overlay.backspace(),
        KeyCode::Char(c) if !ctrl => overlay.type_char(c),
        _ => {}
    }
    false
}

fn next_filter(current: Option<Stage>) -> Option<Stage> {
    match current {
        None => Some(Stage::ALL[0]),
        Some(stage) => Stage::ALL
            .iter()
            .position(|s| *s == stage)
            .and_then(|i| Stage::ALL.get(i + 1).copied()),
    }
}

pub async fn run_browse(api: Arc<dyn TrackerApi>, toast_ttl: Duration) -> Result<()> {
    let (tray, expired_rx) = ToastTray::new(toast_ttl);
    let (confirm, confirm_rx) = ChannelConfirm::new();
    let (tx, updates_rx) = mpsc::unbounded_channel();

    let mut state = AppState::new(tray);
    let ctx = Ctx { api, confirm, tx };
    ctx.load_all(&state);

    // Setup terminal
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;

    let result = run_loop(&mut terminal, &mut state, &ctx, updates_rx, expired_rx, confirm_rx);

    // Restore terminal
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    result
}

fn run_loop(
    terminal: &mut Terminal<CrosstermBackend<std::io::Stdout>>,
    state: &mut AppState,
    ctx: &Ctx,
    mut updates: mpsc::UnboundedReceiver<Update>,
    mut expired: mpsc::UnboundedReceiver<u64>,
    mut confirms: mpsc::UnboundedReceiver<ConfirmRequest>,
) -> Result<()> {
    let mut list_state = ListState::default();

    loop {
        while let Ok(update) = updates.try_recv() {
            state.apply(update);
        }
        while let Ok(id) = expired.try_recv() {
            state.toasts.expire(id);
        }
        if state.dialog.is_none() {
            if let Ok(request) = confirms.try_recv() {
                state.dialog = Some(request);
            }
        }

        list_state.select(if state.len() == 0 { None } else { Some(state.selected()) });
        terminal.draw(|frame| draw(frame, state, &mut list_state))?;

        let ready = tokio::task::block_in_place(|| event::poll(Duration::from_millis(100)))?;
        if !ready {
            continue;
        }
        let Event::Key(key) = event::read()? else { continue };
        if key.kind != KeyEventKind::Press {
            continue;
        }

        if let Some(request) = state.dialog.take() {
            match key.code {
                KeyCode::Char('y') | KeyCode::Enter => request.answer(true),
                KeyCode::Char('n') | KeyCode::Esc => request.answer(false),
                _ => state.dialog = Some(request),
            }
            continue;
        }

        if let Some(overlay) = state.form.as_mut() {
            if key.code == KeyCode::Esc {
                state.form = None;
            } else if form_key(overlay, key) {
                ctx.save_form(state);
            }
            continue;
        }

        if state.history.is_some() {
            if matches!(key.code, KeyCode::Esc | KeyCode::Char('q') | KeyCode::Char('h')) {
                state.history = None;
            }
            continue;
        }

        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => break,
            KeyCode::Tab => {
                state.tab = state.tab.next();
                state.scroll_offset = 0;
            }
            KeyCode::Down | KeyCode::Char('j') => state.next(),
            KeyCode::Up | KeyCode::Char('k') => state.prev(),
            KeyCode::Char('J') | KeyCode::PageDown => state.scroll_down(),
            KeyCode::Char('K') | KeyCode::PageUp => state.scroll_up(),
            KeyCode::Char('r') => {
                state.toasts.push(Toast::info("Refreshing..."));
                ctx.load_all(state);
            }
            KeyCode::Char('c') => state.toasts.dismiss_latest(),
            KeyCode::Char('n') => open_form(state, false),
            KeyCode::Char('e') => open_form(state, true),
            code => match state.tab {
                Tab::Applications => match code {
                    KeyCode::Char('1') => ctx.change_stage(state, Stage::NotStarted),
                    KeyCode::Char('2') => ctx.change_stage(state, Stage::Applied),
                    KeyCode::Char('3') => ctx.change_stage(state, Stage::InProgress),
                    KeyCode::Char('4') => ctx.change_stage(state, Stage::Offer),
                    KeyCode::Char('5') => ctx.change_stage(state, Stage::Rejected),
                    KeyCode::Char('6') => ctx.change_stage(state, Stage::NoAnswer),
                    KeyCode::Char('h') => ctx.show_history(state),
                    KeyCode::Char('d') => ctx.delete_application(state),
                    KeyCode::Char('f') => {
                        state.applications.stage_filter = next_filter(state.applications.stage_filter);
                        ctx.refresh_applications_filtered(state);
                    }
                    _ => {}
                },
                Tab::Leads => match code {
                    KeyCode::Char('a') => ctx.analyze_lead(state),
                    KeyCode::Char('p') => ctx.promote_lead(state),
                    KeyCode::Char('d') => ctx.delete_lead(state),
                    KeyCode::Char('m') => {
                        state.leads.sort_by_match = !state.leads.sort_by_match;
                        debug!(sort_by_match = state.leads.sort_by_match, "lead sort toggled");
                        ctx.refresh_leads_sorted(state);
                    }
                    _ => {}
                },
                Tab::Resumes => match code {
                    KeyCode::Enter | KeyCode::Char('a') => ctx.activate_resume(state),
                    KeyCode::Char('d') => ctx.delete_resume(state),
                    _ => {}
                },
            },
        }
        state.clamp_selection();
    }
    Ok(())
}

// --- Drawing ---

fn draw(frame: &mut Frame, state: &AppState, list_state: &mut ListState) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(0), Constraint::Length(1)])
        .split(frame.area());

    let tabs = Tabs::new(vec!["Applications", "Leads", "Resumes"])
        .block(Block::default().borders(Borders::ALL).title(" Prospector "))
        .select(state.tab.index())
        .highlight_style(Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD));
    frame.render_widget(tabs, rows[0]);

    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(40), Constraint::Percentage(60)])
        .split(rows[1]);

    // Left panel: list
    let (title, items) = list_items(state);
    let list = List::new(items)
        .block(Block::default().borders(Borders::ALL).title(title))
        .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
        .highlight_symbol("> ");
    frame.render_stateful_widget(list, chunks[0], list_state);

    // Right panel: detail
    let detail = match state.tab {
        Tab::Applications => application_detail(state),
        Tab::Leads => lead_detail(state),
        Tab::Resumes => resume_detail(state),
    };
    let detail_widget = Paragraph::new(detail)
        .block(Block::default().borders(Borders::ALL).title(" Detail "))
        .wrap(Wrap { trim: false })
        .scroll((state.scroll_offset, 0));
    frame.render_widget(detail_widget, chunks[1]);

    // Footer help
    let help = match state.tab {
        Tab::Applications => " n:new  e:edit  1-6:stage  h:history  f:filter  d:delete  r:refresh  tab:switch  q:quit",
        Tab::Leads => " n:new  e:edit  a:analyze  p:promote  m:sort by match  d:delete  r:refresh  tab:switch  q:quit",
        Tab::Resumes => " enter:activate  d:delete  r:refresh  tab:switch  c:dismiss  q:quit",
    };
    frame.render_widget(
        Paragraph::new(help).style(Style::default().fg(Color::DarkGray)),
        rows[2],
    );

    if let Some((id, entries)) = &state.history {
        draw_history(frame, *id, entries);
    }
    if let Some(overlay) = &state.form {
        draw_form(frame, overlay);
    }
    draw_toasts(frame, state);
    if let Some(request) = &state.dialog {
        draw_dialog(frame, &request.prompt);
    }
}

fn list_items(state: &AppState) -> (String, Vec<ListItem<'static>>) {
    match state.tab {
        Tab::Applications => {
            let filter = state
                .applications
                .stage_filter
                .map(|s| format!(" [{}]", s.label()))
                .unwrap_or_default();
            let items = state
                .applications
                .applications
                .iter()
                .map(|app| {
                    let busy = if state.app_busy.is_busy(app.id) { "…" } else { " " };
                    ListItem::new(format!(
                        "{}#{:<4} {:<11} {} | {}",
                        busy,
                        app.id,
                        app.stage.label(),
                        app.company_name,
                        app.role_name
                    ))
                    .style(stage_style(app.stage))
                })
                .collect();
            (
                format!(" Applications ({}){} ", state.applications.applications.len(), filter),
                items,
            )
        }
        Tab::Leads => {
            let items = state
                .leads
                .leads
                .iter()
                .map(|lead| {
                    let marker = if state.leads.busy.is_busy(lead.id) {
                        "…"
                    } else {
                        match LeadState::of(lead) {
                            LeadState::Draft => " ",
                            LeadState::Analyzed => "*",
                            LeadState::Promoted => "+",
                        }
                    };
                    let score = lead
                        .match_percentage
                        .map(|p| format!("{:>3.0}%", p))
                        .unwrap_or_else(|| "   -".to_string());
                    ListItem::new(format!(
                        "{} #{:<4} {} {} | {}",
                        marker, lead.id, score, lead.company_name, lead.role_name
                    ))
                })
                .collect();
            let sort = if state.leads.sort_by_match { " [by match]" } else { "" };
            (format!(" Leads ({}){} ", state.leads.leads.len(), sort), items)
        }
        Tab::Resumes => {
            let items = state
                .resumes
                .resumes
                .iter()
                .map(|resume| {
                    let marker = if state.resume_busy.is_busy(resume.id) {
                        "…"
                    } else if resume.is_active {
                        "*"
                    } else {
                        " "
                    };
                    ListItem::new(format!("{} #{:<4} {}", marker, resume.id, resume.label()))
                })
                .collect();
            (format!(" Resumes ({}) ", state.resumes.resumes.len()), items)
        }
    }
}

fn stage_style(stage: Stage) -> Style {
    match stage {
        Stage::NotStarted | Stage::NoAnswer => Style::default(),
        Stage::Applied => Style::default().fg(Color::Cyan),
        Stage::InProgress => Style::default().fg(Color::Yellow),
        Stage::Offer => Style::default().fg(Color::Green),
        Stage::Rejected => Style::default().fg(Color::Red),
    }
}

fn heading(text: &str) -> Line<'_> {
    Line::from(Span::styled(text, Style::default().add_modifier(Modifier::BOLD)))
}

fn push_section<'a>(lines: &mut Vec<Line<'a>>, title: &'a str, body: Option<&'a str>) {
    let Some(body) = body.filter(|b| !b.trim().is_empty()) else { return };
    lines.push(Line::from(""));
    lines.push(heading(title));
    for line in body.lines() {
        lines.push(Line::from(line));
    }
}

fn application_detail(state: &AppState) -> Text<'_> {
    let Some(app) = state.current_application() else {
        return Text::raw("No applications yet.");
    };

    let mut lines: Vec<Line> = vec![
        heading(&app.company_name),
        Line::from(app.role_name.as_str()),
        Line::from(Span::styled(format!("Stage: {}", app.stage.label()), stage_style(app.stage))),
    ];
    if let Some(pct) = app.match_percentage {
        lines.push(Line::from(format!("Match: {:.0}%", pct)));
    }
    lines.push(Line::from(Span::styled(
        format!("Updated: {}", display_date(&app.updated_at)),
        Style::default().fg(Color::DarkGray),
    )));
    push_section(&mut lines, "Notes", app.notes.as_deref());
    push_section(&mut lines, "Application Notes", app.application_notes.as_deref());
    push_section(&mut lines, "Cover Letter", app.cover_letter.as_deref());
    push_section(&mut lines, "Job Ad", app.job_ad_content.as_deref());
    Text::from(lines)
}

fn control_hint(control: Control, key: &str, label: &str, busy_label: &str) -> Option<String> {
    match control {
        Control::Hidden => None,
        Control::Disabled => Some(format!("{} {}", key, busy_label)),
        Control::Enabled => Some(format!("{} {}", key, label)),
    }
}

fn lead_detail(state: &AppState) -> Text<'_> {
    let mut lines: Vec<Line> = Vec::new();
    if state.leads.active_resume.is_none() {
        lines.push(Line::from(Span::styled(
            "No active resume found. Activate one in the Resumes tab to use AI analysis.",
            Style::default().fg(Color::Yellow),
        )));
        lines.push(Line::from(""));
    }

    let Some(lead) = state.current_lead() else {
        lines.push(Line::from("No job leads yet."));
        return Text::from(lines);
    };

    lines.push(heading(&lead.company_name));
    lines.push(Line::from(lead.role_name.as_str()));
    if let Some(url) = &lead.job_url {
        lines.push(Line::from(format!("URL: {}", url)));
    }
    if let Some(pct) = lead.match_percentage {
        lines.push(Line::from(Span::styled(
            format!("{:.0}% match", pct),
            Style::default().fg(Color::Cyan),
        )));
    }
    if lead.is_promoted {
        lines.push(Line::from(Span::styled("Promoted", Style::default().fg(Color::Green))));
    }

    let busy = state.leads.busy.is_busy(lead.id);
    let controls = state.leads.controls(lead);
    let busy_label = if busy { "(in progress...)" } else { "(needs an active resume)" };
    let hints: Vec<String> = [
        control_hint(controls.analyze, "a", "Analyze", busy_label),
        control_hint(controls.promote, "p", "Promote", "(in progress...)"),
    ]
    .into_iter()
    .flatten()
    .collect();
    if !hints.is_empty() {
        lines.push(Line::from(Span::styled(hints.join("   "), Style::default().fg(Color::DarkGray))));
    }

    if let Some(reasoning) = &lead.match_reasoning {
        lines.push(Line::from(""));
        lines.push(heading("Match Reasoning"));
        for line in textwrap::fill(reasoning, 70).lines() {
            lines.push(Line::from(format!("  {}", line)));
        }
    }
    lines.push(Line::from(Span::styled(
        format!("Added: {}", display_date(&lead.created_at)),
        Style::default().fg(Color::DarkGray),
    )));
    push_section(&mut lines, "Job Ad", Some(lead.job_ad_content.as_str()));
    Text::from(lines)
}

fn resume_detail(state: &AppState) -> Text<'_> {
    let Some(resume) = state.current_resume() else {
        return Text::raw("No resumes yet. Add one with: prospector resumes add <file>");
    };
    let mut lines = vec![
        heading("Resume"),
        Line::from(resume.label()),
        Line::from(if resume.is_active {
            Span::styled("Active", Style::default().fg(Color::Green))
        } else {
            Span::styled("Inactive (enter to activate)", Style::default().fg(Color::DarkGray))
        }),
    ];
    push_section(&mut lines, "Content", Some(resume.content.as_str()));
    Text::from(lines)
}

fn centered(area: Rect, width: u16, height: u16) -> Rect {
    let width = width.min(area.width);
    let height = height.min(area.height);
    Rect {
        x: area.x + (area.width - width) / 2,
        y: area.y + (area.height - height) / 2,
        width,
        height,
    }
}

fn draw_history(frame: &mut Frame, id: i64, entries: &[StageHistoryEntry]) {
    let mut lines: Vec<Line> = entries
        .iter()
        .map(|entry| {
            Line::from(format!(
                "{:<17} {}",
                display_date(&entry.changed_at),
                describe_transition(entry)
            ))
        })
        .collect();
    if lines.is_empty() {
        lines.push(Line::from("No stage changes recorded."));
    }
    let area = centered(frame.area(), 60, lines.len() as u16 + 2);
    frame.render_widget(Clear, area);
    frame.render_widget(
        Paragraph::new(lines).block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!(" Stage History #{} (esc to close) ", id)),
        ),
        area,
    );
}

fn draw_toasts(frame: &mut Frame, state: &AppState) {
    let area = frame.area();
    let width = 48.min(area.width);
    for (i, toast) in state.toasts.toasts().iter().rev().take(4).enumerate() {
        let y = area.y + 3 + (i as u16) * 3;
        if y + 3 > area.bottom() {
            break;
        }
        let rect = Rect {
            x: area.right().saturating_sub(width),
            y,
            width,
            height: 3,
        };
        let color = match toast.kind {
            ToastKind::Success => Color::Green,
            ToastKind::Error => Color::Red,
            ToastKind::Info => Color::Cyan,
            ToastKind::Warning => Color::Yellow,
        };
        frame.render_widget(Clear, rect);
        frame.render_widget(
            Paragraph::new(toast.to_string())
                .wrap(Wrap { trim: true })
                .block(Block::default().borders(Borders::ALL).border_style(Style::default().fg(color))),
            rect,
        );
    }
}

/// One line per field; the focused field shows its tail and a cursor.
fn field_preview(value: &str, width: usize, focused: bool) -> String {
    let flat = value.replace('\n', " ↵ ");
    let count = flat.chars().count();
    if focused {
        let tail: String = flat.chars().skip(count.saturating_sub(width.saturating_sub(1))).collect();
        format!("{tail}_")
    } else if count > width {
        let head: String = flat.chars().take(width.saturating_sub(3)).collect();
        format!("{head}...")
    } else {
        flat
    }
}

fn draw_form(frame: &mut Frame, overlay: &FormOverlay) {
    let labels = overlay.labels();
    let area = centered(frame.area(), 80, labels.len() as u16 + 4);
    let label_width = labels.iter().map(|l| l.len()).max().unwrap_or(0) + 2;
    let value_width = (area.width as usize).saturating_sub(label_width + 4);

    let mut lines: Vec<Line> = labels
        .iter()
        .enumerate()
        .map(|(i, label)| {
            let focused = i == overlay.focus;
            let label_style = if focused {
                Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            };
            let value = if overlay.on_stage() && focused {
                format!("< {} >", overlay.value(i))
            } else {
                field_preview(&overlay.value(i), value_width, focused)
            };
            Line::from(vec![
                Span::styled(format!("{:<width$}", label, width = label_width), label_style),
                Span::raw(value),
            ])
        })
        .collect();
    lines.push(Line::from(""));
    let hint = if overlay.saving {
        "Saving..."
    } else {
        "tab/shift-tab: field  enter: next or newline  ctrl-s: save  esc: cancel"
    };
    lines.push(Line::from(Span::styled(hint, Style::default().fg(Color::DarkGray))));

    frame.render_widget(Clear, area);
    frame.render_widget(
        Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title(overlay.title())),
        area,
    );
}

fn draw_dialog(frame: &mut Frame, prompt: &str) {
    let area = centered(frame.area(), 50, 5);
    frame.render_widget(Clear, area);
    frame.render_widget(
        Paragraph::new(vec![
            Line::from(prompt.to_string()),
            Line::from(""),
            Line::from(Span::styled("y: confirm   n: cancel", Style::default().fg(Color::DarkGray))),
        ])
        .wrap(Wrap { trim: true })
        .block(Block::default().borders(Borders::ALL).title(" Confirm Action ")),
        area,
    );
}
