mod api;
mod applications;
mod config;
mod error;
mod leads;
mod models;
mod notify;
mod resumes;
#[cfg(test)]
mod testing;
mod tui;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use api::{HttpTracker, TrackerApi};
use applications::{ApplicationForm, ApplicationsPage};
use config::Config;
use error::ApiError;
use leads::{LeadForm, LeadsPage};
use models::{Application, Lead, Resume, Stage, StageHistoryEntry};
use notify::{AssumeYes, Confirm, PromptConfirm, Toast};
use resumes::ResumesPage;

#[derive(Parser)]
#[command(name = "prospector")]
#[command(about = "Track job applications, leads, and resumes against a Prospector backend")]
struct Cli {
    /// Backend base URL (overrides config file and PROSPECTOR_API_URL)
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Config file to use instead of the default location
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Answer yes to every confirmation prompt
    #[arg(short, long, global = true)]
    yes: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage job applications
    Apps {
        #[command(subcommand)]
        command: AppCommands,
    },

    /// Manage job leads
    Leads {
        #[command(subcommand)]
        command: LeadCommands,
    },

    /// Manage resumes
    Resumes {
        #[command(subcommand)]
        command: ResumeCommands,
    },

    /// Browse everything interactively
    Browse,
}

#[derive(Subcommand)]
enum AppCommands {
    /// List applications
    List {
        /// Filter by stage (not_started, applied, in_progress, offer, rejected, no_answer)
        #[arg(short, long)]
        stage: Option<Stage>,

        /// Filter by company name (substring)
        #[arg(short, long)]
        company: Option<String>,

        /// Number of applications to skip
        #[arg(long)]
        skip: Option<u32>,

        /// Maximum number to return (the backend defaults to 100)
        #[arg(short, long)]
        limit: Option<u32>,
    },

    /// Show application details
    Show {
        /// Application ID
        id: i64,
    },

    /// Add an application
    Add {
        #[arg(long)]
        company: String,

        #[arg(long)]
        role: String,

        /// Initial stage (defaults to not_started)
        #[arg(long)]
        stage: Option<Stage>,

        /// Job ad text, or @path to read it from a file
        #[arg(long)]
        job_ad: Option<String>,

        /// Cover letter text, or @path
        #[arg(long)]
        cover_letter: Option<String>,

        /// Other inputs given when applying, or @path
        #[arg(long)]
        application_notes: Option<String>,

        #[arg(long)]
        notes: Option<String>,

        /// Match percentage 0-100 (empty for none)
        #[arg(long = "match")]
        match_percentage: Option<String>,
    },

    /// Edit an application; omitted fields keep their value
    Edit {
        id: i64,

        #[arg(long)]
        company: Option<String>,

        #[arg(long)]
        role: Option<String>,

        #[arg(long)]
        stage: Option<Stage>,

        #[arg(long)]
        job_ad: Option<String>,

        #[arg(long)]
        cover_letter: Option<String>,

        #[arg(long)]
        application_notes: Option<String>,

        #[arg(long)]
        notes: Option<String>,

        /// Match percentage 0-100; pass "" to clear it
        #[arg(long = "match")]
        match_percentage: Option<String>,
    },

    /// Move an application to another stage
    Stage {
        id: i64,
        stage: Stage,
    },

    /// Show an application's stage history
    History {
        id: i64,
    },

    /// Delete an application
    Delete {
        id: i64,
    },
}

#[derive(Subcommand)]
enum LeadCommands {
    /// List leads
    List {
        /// Order by match percentage, best first
        #[arg(short = 'm', long)]
        sort_by_match: bool,

        /// Filter by company name (substring)
        #[arg(short, long)]
        company: Option<String>,

        /// Only promoted (true) or unpromoted (false) leads
        #[arg(long)]
        promoted: Option<bool>,

        /// Number of leads to skip
        #[arg(long)]
        skip: Option<u32>,

        /// Maximum number to return (the backend defaults to 100)
        #[arg(short, long)]
        limit: Option<u32>,
    },

    /// Show lead details
    Show {
        id: i64,
    },

    /// Add a lead
    Add {
        #[arg(long)]
        company: String,

        #[arg(long)]
        role: String,

        /// Job ad text, or @path to read it from a file
        content: String,

        /// Link to the posting
        #[arg(long)]
        url: Option<String>,
    },

    /// Edit a lead; omitted fields keep their value
    Edit {
        id: i64,

        #[arg(long)]
        company: Option<String>,

        #[arg(long)]
        role: Option<String>,

        /// Job ad text, or @path
        #[arg(long)]
        content: Option<String>,

        /// Pass "" to clear the link
        #[arg(long)]
        url: Option<String>,
    },

    /// Score a lead against a resume with AI
    Analyze {
        id: i64,

        /// Resume ID to score against (defaults to the active resume)
        #[arg(short, long)]
        resume: Option<i64>,
    },

    /// Promote a lead to a job application
    Promote {
        id: i64,
    },

    /// Delete a lead
    Delete {
        id: i64,
    },
}

#[derive(Subcommand)]
enum ResumeCommands {
    /// List resumes
    List,

    /// Show the active resume
    Active,

    /// Show a resume
    Show {
        id: i64,
    },

    /// Add a resume from a plain-text file
    Add {
        file: PathBuf,

        /// Label for this resume (defaults to the file name)
        #[arg(short, long)]
        name: Option<String>,
    },

    /// Replace a resume's content or label
    Edit {
        id: i64,

        #[arg(short, long)]
        file: Option<PathBuf>,

        #[arg(short, long)]
        name: Option<String>,
    },

    /// Make a resume the active one used for analysis
    Activate {
        id: i64,
    },

    /// Delete a resume
    Delete {
        id: i64,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("{}", Toast::error(format!("{e:#}")));
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load(cli.config.as_deref(), cli.api_url.as_deref())?;
    let browsing = matches!(cli.command, Commands::Browse);
    init_logging(&config, browsing)?;
    let api = HttpTracker::new(&config.api_url);
    tracing::debug!(api_url = api.base_url(), "using tracker backend");
    let confirm: Box<dyn Confirm> = if cli.yes {
        Box::new(AssumeYes)
    } else {
        Box::new(PromptConfirm)
    };

    match cli.command {
        Commands::Apps { command } => run_apps(&api, confirm.as_ref(), command).await,
        Commands::Leads { command } => run_leads(&api, confirm.as_ref(), command).await,
        Commands::Resumes { command } => run_resumes(&api, confirm.as_ref(), command).await,
        Commands::Browse => {
            let api: Arc<dyn TrackerApi> = Arc::new(api);
            tui::run_browse(api, config.toast_ttl()).await
        }
    }
}

fn init_logging(config: &Config, to_file: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), config.log)));

    if to_file {
        let path = Config::log_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open log file: {}", path.display()))?;
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_ansi(false)
            .with_writer(std::sync::Mutex::new(file))
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
    Ok(())
}

/// Turns a failed action into the message shown to the user.
fn report<T>(result: Result<T, ApiError>, fallback: &str) -> Result<T> {
    result.map_err(|e| {
        tracing::warn!(error = %e, "action failed");
        anyhow!(e.user_message(fallback))
    })
}

/// `@path` reads the text from a file; anything else is taken literally.
fn text_arg(value: &str) -> Result<String> {
    match value.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read file: {}", path)),
        None => Ok(value.to_string()),
    }
}

fn opt_text_arg(value: Option<&str>) -> Result<Option<String>> {
    value.map(text_arg).transpose()
}

async fn run_apps(api: &dyn TrackerApi, confirm: &dyn Confirm, command: AppCommands) -> Result<()> {
    match command {
        AppCommands::List {
            stage,
            company,
            skip,
            limit,
        } => {
            let query = models::ApplicationQuery {
                stage,
                company,
                skip,
                limit,
            };
            let apps = report(api.list_applications(&query).await, "Error loading applications.")?;
            print_applications(&apps);
        }

        AppCommands::Show { id } => {
            let app = report(api.get_application(id).await, "Error loading application.")?;
            print_application(&app);
        }

        AppCommands::Add {
            company,
            role,
            stage,
            job_ad,
            cover_letter,
            application_notes,
            notes,
            match_percentage,
        } => {
            let form = ApplicationForm {
                company_name: company,
                role_name: role,
                stage,
                job_ad_content: opt_text_arg(job_ad.as_deref())?.unwrap_or_default(),
                cover_letter: opt_text_arg(cover_letter.as_deref())?.unwrap_or_default(),
                application_notes: opt_text_arg(application_notes.as_deref())?.unwrap_or_default(),
                notes: notes.unwrap_or_default(),
                match_percentage: match_percentage.unwrap_or_default(),
            };
            let app = report(
                applications::save(api, None, &form).await,
                "Error saving application. Please try again.",
            )?;
            println!("{}", Toast::success(format!("Application #{} saved successfully!", app.id)));
        }

        AppCommands::Edit {
            id,
            company,
            role,
            stage,
            job_ad,
            cover_letter,
            application_notes,
            notes,
            match_percentage,
        } => {
            let current = report(api.get_application(id).await, "Error loading application.")?;
            let mut form = ApplicationForm::from_application(&current);
            if let Some(v) = company {
                form.company_name = v;
            }
            if let Some(v) = role {
                form.role_name = v;
            }
            if stage.is_some() {
                form.stage = stage;
            }
            if let Some(v) = opt_text_arg(job_ad.as_deref())? {
                form.job_ad_content = v;
            }
            if let Some(v) = opt_text_arg(cover_letter.as_deref())? {
                form.cover_letter = v;
            }
            if let Some(v) = opt_text_arg(application_notes.as_deref())? {
                form.application_notes = v;
            }
            if let Some(v) = notes {
                form.notes = v;
            }
            if let Some(v) = match_percentage {
                form.match_percentage = v;
            }
            report(
                applications::save(api, Some(id), &form).await,
                "Error saving application. Please try again.",
            )?;
            println!("{}", Toast::success("Application saved successfully!"));
        }

        AppCommands::Stage { id, stage } => {
            let app = report(
                applications::change_stage(api, id, stage).await,
                "Error saving application. Please try again.",
            )?;
            println!(
                "{}",
                Toast::success(format!("Application #{} moved to {}", app.id, app.stage.label()))
            );
        }

        AppCommands::History { id } => {
            let entries = report(applications::history(api, id).await, "Error loading history.")?;
            print_history(id, &entries);
        }

        AppCommands::Delete { id } => {
            let deleted = report(
                applications::delete(api, confirm, id).await,
                "Error deleting application.",
            )?;
            if !deleted {
                println!("Cancelled.");
                return Ok(());
            }
            println!("{}", Toast::success(format!("Application #{} deleted.", id)));
            let mut page = ApplicationsPage::default();
            report(page.refresh(api).await, "Error loading applications.")?;
            print_applications(&page.applications);
        }
    }
    Ok(())
}

async fn run_leads(api: &dyn TrackerApi, confirm: &dyn Confirm, command: LeadCommands) -> Result<()> {
    match command {
        LeadCommands::List {
            sort_by_match,
            company,
            promoted,
            skip,
            limit,
        } => {
            let query = models::LeadQuery {
                sort_by_match,
                company,
                promoted,
                skip,
                limit,
            };
            let found = report(api.list_leads(&query).await, "Error loading leads.")?;
            let active = report(api.active_resume().await, "Error loading resumes.")?;
            if active.is_none() {
                println!(
                    "{}",
                    Toast::warning("No active resume found. Create and activate one to use AI analysis.")
                );
            }
            print_leads(&found);
        }

        LeadCommands::Show { id } => {
            let lead = report(api.get_lead(id).await, "Error loading lead.")?;
            let active = report(api.active_resume().await, "Error loading resumes.")?;
            print_lead(&lead, active.is_some());
        }

        LeadCommands::Add {
            company,
            role,
            content,
            url,
        } => {
            let form = LeadForm {
                company_name: company,
                role_name: role,
                job_ad_content: text_arg(&content)?,
                job_url: url.unwrap_or_default(),
            };
            let lead = report(leads::save(api, None, &form).await, "Error saving lead. Please try again.")?;
            println!("{}", Toast::success(format!("Added lead #{}", lead.id)));
        }

        LeadCommands::Edit {
            id,
            company,
            role,
            content,
            url,
        } => {
            let current = report(api.get_lead(id).await, "Error loading lead.")?;
            let mut form = LeadForm::from_lead(&current);
            if let Some(v) = company {
                form.company_name = v;
            }
            if let Some(v) = role {
                form.role_name = v;
            }
            if let Some(v) = opt_text_arg(content.as_deref())? {
                form.job_ad_content = v;
            }
            if let Some(v) = url {
                form.job_url = v;
            }
            report(leads::save(api, Some(id), &form).await, "Error saving lead. Please try again.")?;
            println!("{}", Toast::success("Lead saved successfully!"));
        }

        LeadCommands::Analyze { id, resume } => {
            let mut page = LeadsPage::default();
            report(page.load_active_resume(api).await, "Error loading resumes.")?;
            let lead = report(api.get_lead(id).await, "Error loading lead.")?;

            println!("Analyzing lead #{}...", id);
            let analysis = report(
                leads::analyze(api, &lead, page.active_resume.as_ref(), resume).await,
                "Error analyzing lead. Please check your AI provider configuration.",
            )?;
            println!(
                "{}",
                Toast::success(format!("Lead #{} scored {:.0}% match", id, analysis.match_percentage))
            );
            println!("{}", textwrap::fill(&analysis.reasoning, 80));
        }

        LeadCommands::Promote { id } => {
            let lead = report(api.get_lead(id).await, "Error loading lead.")?;
            let promotion = report(
                leads::promote(api, confirm, &lead).await,
                "Error promoting lead. Please try again.",
            )?;
            let Some(promotion) = promotion else {
                println!("Cancelled.");
                return Ok(());
            };
            println!(
                "{}",
                Toast::success(format!(
                    "Lead successfully promoted to application #{}!",
                    promotion.job_application.id
                ))
            );
            let mut page = LeadsPage::default();
            report(page.refresh(api).await, "Error loading leads.")?;
            print_leads(&page.leads);
        }

        LeadCommands::Delete { id } => {
            let deleted = report(leads::delete(api, confirm, id).await, "Error deleting lead.")?;
            if !deleted {
                println!("Cancelled.");
                return Ok(());
            }
            println!("{}", Toast::success(format!("Lead #{} deleted.", id)));
            let mut page = LeadsPage::default();
            report(page.refresh(api).await, "Error loading leads.")?;
            print_leads(&page.leads);
        }
    }
    Ok(())
}

async fn run_resumes(api: &dyn TrackerApi, confirm: &dyn Confirm, command: ResumeCommands) -> Result<()> {
    match command {
        ResumeCommands::List => {
            let mut page = ResumesPage::default();
            report(page.refresh(api).await, "Error loading resumes.")?;
            print_resumes(&page.resumes);
        }

        ResumeCommands::Active => {
            match report(api.active_resume().await, "Error loading resumes.")? {
                Some(resume) => print_resume(&resume),
                None => println!("No active resume."),
            }
        }

        ResumeCommands::Show { id } => {
            let resume = report(api.get_resume(id).await, "Error loading resume.")?;
            print_resume(&resume);
        }

        ResumeCommands::Add { file, name } => {
            let content = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read resume file: {}", file.display()))?;
            let label = name.or_else(|| {
                file.file_name()
                    .map(|n| n.to_string_lossy().into_owned())
            });
            let resume = report(
                resumes::create(api, &content, label.as_deref()).await,
                "Error saving resume. Please try again.",
            )?;
            println!("{}", Toast::success(format!("Added resume '{}' (ID: {})", resume.label(), resume.id)));
        }

        ResumeCommands::Edit { id, file, name } => {
            let content = file
                .map(|path| {
                    std::fs::read_to_string(&path)
                        .with_context(|| format!("Failed to read resume file: {}", path.display()))
                })
                .transpose()?;
            report(
                resumes::edit(api, id, content.as_deref(), name.as_deref()).await,
                "Error saving resume. Please try again.",
            )?;
            println!("{}", Toast::success("Resume saved successfully!"));
        }

        ResumeCommands::Activate { id } => {
            let refreshed = report(resumes::activate(api, id).await, "Error activating resume.")?;
            println!("{}", Toast::success(format!("Resume #{} is now active.", id)));
            print_resumes(&refreshed);
        }

        ResumeCommands::Delete { id } => {
            let deleted = report(resumes::delete(api, confirm, id).await, "Error deleting resume.")?;
            if !deleted {
                println!("Cancelled.");
                return Ok(());
            }
            println!("{}", Toast::success(format!("Resume #{} deleted.", id)));
            let mut page = ResumesPage::default();
            report(page.refresh(api).await, "Error loading resumes.")?;
            print_resumes(&page.resumes);
        }
    }
    Ok(())
}

// --- Output ---

fn format_match(pct: Option<f64>) -> String {
    pct.map(|p| format!("{:.0}%", p)).unwrap_or_else(|| "-".to_string())
}

fn print_applications(apps: &[Application]) {
    if apps.is_empty() {
        println!("No applications found.");
        return;
    }
    println!("{:<6} {:<12} {:<24} {:<26} {:>6}", "ID", "STAGE", "COMPANY", "ROLE", "MATCH");
    println!("{}", "-".repeat(78));
    for app in apps {
        println!(
            "{:<6} {:<12} {:<24} {:<26} {:>6}",
            app.id,
            app.stage.label(),
            truncate(&app.company_name, 22),
            truncate(&app.role_name, 24),
            format_match(app.match_percentage)
        );
    }
}

fn print_application(app: &Application) {
    println!("Application #{}", app.id);
    println!("Company: {}", app.company_name);
    println!("Role: {}", app.role_name);
    println!("Stage: {}", app.stage.label());
    if let Some(since) = &app.stage_date {
        println!("Stage since: {}", applications::display_date(since));
    }
    if app.match_percentage.is_some() {
        println!("Match: {}", format_match(app.match_percentage));
    }
    if let Some(reasoning) = &app.match_reasoning {
        println!("{}", textwrap::indent(&textwrap::fill(reasoning, 76), "  "));
    }
    println!("Created: {}", applications::display_date(&app.created_at));
    println!("Updated: {}", applications::display_date(&app.updated_at));
    for (title, body) in [
        ("Notes", &app.notes),
        ("Application Notes", &app.application_notes),
        ("Cover Letter", &app.cover_letter),
        ("Job Ad", &app.job_ad_content),
    ] {
        if let Some(body) = body.as_deref().filter(|b| !b.trim().is_empty()) {
            println!("\n--- {} ---\n{}", title, body);
        }
    }
}

fn print_history(id: i64, entries: &[StageHistoryEntry]) {
    if entries.is_empty() {
        println!("No stage history for application #{}.", id);
        return;
    }
    println!("Stage history for application #{}", id);
    for entry in entries {
        println!(
            "  {:<17} {}",
            applications::display_date(&entry.changed_at),
            applications::describe_transition(entry)
        );
    }
}

fn print_leads(list: &[Lead]) {
    if list.is_empty() {
        println!("No job leads yet.");
        return;
    }
    println!("{:<6} {:<10} {:<24} {:<26} {:>6}", "ID", "STATE", "COMPANY", "ROLE", "MATCH");
    println!("{}", "-".repeat(76));
    for lead in list {
        let state = match leads::LeadState::of(lead) {
            leads::LeadState::Draft => "draft",
            leads::LeadState::Analyzed => "analyzed",
            leads::LeadState::Promoted => "promoted",
        };
        println!(
            "{:<6} {:<10} {:<24} {:<26} {:>6}",
            lead.id,
            state,
            truncate(&lead.company_name, 22),
            truncate(&lead.role_name, 24),
            format_match(lead.match_percentage)
        );
    }
}

fn print_lead(lead: &Lead, has_active_resume: bool) {
    println!("Lead #{}", lead.id);
    println!("Company: {}", lead.company_name);
    println!("Role: {}", lead.role_name);
    if let Some(url) = &lead.job_url {
        println!("URL: {}", url);
    }
    if lead.match_percentage.is_some() {
        println!("Match: {}", format_match(lead.match_percentage));
    }
    if let Some(reasoning) = &lead.match_reasoning {
        println!("{}", textwrap::indent(&textwrap::fill(reasoning, 76), "  "));
    }
    if lead.is_promoted {
        match lead.promoted_to_application_id {
            Some(app_id) => println!("Promoted to application #{}", app_id),
            None => println!("Promoted"),
        }
    } else {
        let controls = leads::lead_controls(lead, has_active_resume, false);
        let mut actions = Vec::new();
        if controls.analyze == leads::Control::Enabled {
            actions.push(format!("prospector leads analyze {}", lead.id));
        }
        if controls.promote == leads::Control::Enabled {
            actions.push(format!("prospector leads promote {}", lead.id));
        }
        if !actions.is_empty() {
            println!("Next: {}", actions.join("  |  "));
        }
    }
    println!("Added: {}", applications::display_date(&lead.created_at));
    println!("\n--- Job Ad ---\n{}", lead.job_ad_content);
}

fn print_resumes(resumes: &[Resume]) {
    if resumes.is_empty() {
        println!("No resumes found.");
        return;
    }
    println!("{:<6} {:<7} {:<30} {:<17}", "ID", "ACTIVE", "NAME", "CREATED");
    println!("{}", "-".repeat(62));
    for resume in resumes {
        println!(
            "{:<6} {:<7} {:<30} {:<17}",
            resume.id,
            if resume.is_active { "*" } else { "" },
            truncate(&resume.label(), 28),
            applications::display_date(&resume.created_at)
        );
    }
}

fn print_resume(resume: &Resume) {
    println!("{} (ID: {})", resume.label(), resume.id);
    println!("Active: {}", if resume.is_active { "yes" } else { "no" });
    println!("Created: {}", applications::display_date(&resume.created_at));
    println!("\n--- Content ---\n{}", resume.content);
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
