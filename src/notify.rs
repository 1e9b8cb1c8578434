//! Toast notifications and the "await user decision" confirmation contract.

use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::io::{self, BufRead, Write};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToastKind {
    Success,
    Error,
    Info,
    Warning,
}

impl ToastKind {
    pub fn icon(self) -> &'static str {
        match self {
            ToastKind::Success => "✓",
            ToastKind::Error => "✕",
            ToastKind::Info => "ℹ",
            ToastKind::Warning => "!",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Toast {
    pub id: u64,
    pub kind: ToastKind,
    pub message: String,
}

impl Toast {
    pub fn success(message: impl Into<String>) -> Self {
        Self::new(ToastKind::Success, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(ToastKind::Error, message)
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(ToastKind::Info, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(ToastKind::Warning, message)
    }

    fn new(kind: ToastKind, message: impl Into<String>) -> Self {
        Self {
            id: 0,
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for Toast {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind.icon(), self.message)
    }
}

/// Aborts its timer task when dropped.
struct ScopedTimer(JoinHandle<()>);

impl Drop for ScopedTimer {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Visible toasts, each with its own auto-dismiss timer.
///
/// Expired ids arrive on the receiver returned by [`ToastTray::new`]; the owner
/// feeds them back through [`ToastTray::expire`].
pub struct ToastTray {
    ttl: Duration,
    next_id: u64,
    toasts: Vec<Toast>,
    timers: HashMap<u64, ScopedTimer>,
    expired_tx: mpsc::UnboundedSender<u64>,
}

impl ToastTray {
    pub fn new(ttl: Duration) -> (Self, mpsc::UnboundedReceiver<u64>) {
        let (expired_tx, expired_rx) = mpsc::unbounded_channel();
        let tray = Self {
            ttl,
            next_id: 1,
            toasts: Vec::new(),
            timers: HashMap::new(),
            expired_tx,
        };
        (tray, expired_rx)
    }

    pub fn push(&mut self, mut toast: Toast) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        toast.id = id;
        debug!(id, kind = ?toast.kind, message = %toast.message, "toast shown");
        self.toasts.push(toast);

        let tx = self.expired_tx.clone();
        let ttl = self.ttl;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            let _ = tx.send(id);
        });
        self.timers.insert(id, ScopedTimer(handle));
        id
    }

    /// Manual removal; the pending timer is cancelled with it.
    pub fn dismiss(&mut self, id: u64) {
        self.timers.remove(&id);
        self.toasts.retain(|toast| toast.id != id);
    }

    pub fn dismiss_latest(&mut self) {
        if let Some(id) = self.toasts.last().map(|toast| toast.id) {
            self.dismiss(id);
        }
    }

    pub fn expire(&mut self, id: u64) {
        self.dismiss(id);
    }

    pub fn toasts(&self) -> &[Toast] {
        &self.toasts
    }
}

// --- Confirmation ---

/// Presents a yes/no question and suspends the calling action until the user
/// answers.
#[async_trait]
pub trait Confirm: Send + Sync {
    async fn confirm(&self, prompt: &str) -> bool;
}

/// Asks on the terminal; anything other than `y`/`yes` is a no.
pub struct PromptConfirm;

#[async_trait]
impl Confirm for PromptConfirm {
    async fn confirm(&self, prompt: &str) -> bool {
        let prompt = prompt.to_string();
        tokio::task::spawn_blocking(move || {
            print!("{} [y/N] ", prompt);
            io::stdout().flush().ok();
            let mut answer = String::new();
            if io::stdin().lock().read_line(&mut answer).is_err() {
                return false;
            }
            matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
        })
        .await
        .unwrap_or(false)
    }
}

/// Answers every question the same way (`--yes`).
pub struct AssumeYes;

#[async_trait]
impl Confirm for AssumeYes {
    async fn confirm(&self, _prompt: &str) -> bool {
        true
    }
}

pub struct ConfirmRequest {
    pub prompt: String,
    reply: oneshot::Sender<bool>,
}

impl ConfirmRequest {
    pub fn answer(self, confirmed: bool) {
        let _ = self.reply.send(confirmed);
    }
}

/// Hands the question to whoever draws the dialog and waits for the reply.
/// A dialog that goes away without answering counts as cancel.
#[derive(Clone)]
pub struct ChannelConfirm {
    tx: mpsc::UnboundedSender<ConfirmRequest>,
}

impl ChannelConfirm {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ConfirmRequest>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl Confirm for ChannelConfirm {
    async fn confirm(&self, prompt: &str) -> bool {
        let (reply, answer) = oneshot::channel();
        let request = ConfirmRequest {
            prompt: prompt.to_string(),
            reply,
        };
        if self.tx.send(request).is_err() {
            return false;
        }
        answer.await.unwrap_or(false)
    }
}
