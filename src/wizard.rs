//! Multi-step chat wizards, one live session per user.

use std::{collections::HashMap, path::PathBuf, sync::Arc};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::{
    config::ServerType,
    download::FetchedFile,
    error::{ControlError, SessionError},
    server::{ServerRecord, ServerSpec},
};

mod create;
mod plugin;

pub use create::{CreateStep, CreateWizard};
pub use plugin::{PluginStep, PluginWizard};

pub type UserId = u64;

const CANCEL_WORDS: [&str; 3] = ["cancel", "stop", "отмена"];
const CONFIRM_WORDS: [&str; 5] = ["yes", "ok", "confirm", "ок", "подтвердить"];

fn matches_word(input: &str, words: &[&str]) -> bool {
    let input = input.trim().to_lowercase();
    words.contains(&input.as_str())
}

pub fn is_cancel(input: &str) -> bool {
    matches_word(input, &CANCEL_WORDS)
}

pub fn is_confirm(input: &str) -> bool {
    matches_word(input, &CONFIRM_WORDS)
}

/// Side effects the wizards complete with.
#[async_trait]
pub trait WizardActions: Send + Sync {
    /// Type of the server on `port`, or `None` if no server uses it.
    async fn server_type(&self, port: u16) -> Option<ServerType>;

    async fn create_server(&self, spec: ServerSpec) -> Result<ServerRecord, ControlError>;

    async fn fetch_plugin(&self, url: &str) -> Result<FetchedFile, ControlError>;

    async fn install_plugin(
        &self,
        port: u16,
        file_name: &str,
        bytes: &[u8],
    ) -> Result<PathBuf, ControlError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WizardKind {
    CreateServer,
    InstallPlugin { port: u16 },
}

/// A file attached to a chat message, already read by the boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WizardReply {
    /// The user has no session; the input is not meant for a wizard.
    Idle,
    Advanced { prompt: String },
    Rejected { prompt: String },
    Completed { success: bool, message: String },
    Cancelled { message: String },
}

/// Result of feeding one input to a wizard step.
#[derive(Debug)]
pub(crate) enum Transition<T> {
    Next(String),
    Retry(String),
    Done(T),
    Abort(String),
}

#[derive(Debug)]
enum Session {
    Create(CreateWizard),
    Plugin(PluginWizard),
}

impl Session {
    fn kind(&self) -> WizardKind {
        match self {
            Session::Create(_) => WizardKind::CreateServer,
            Session::Plugin(w) => WizardKind::InstallPlugin { port: w.port() },
        }
    }
}

type Slot = Arc<Mutex<Option<Session>>>;

pub struct WizardEngine {
    actions: Arc<dyn WizardActions>,
    port_range: (u16, u16),
    sessions: Mutex<HashMap<UserId, Slot>>,
}

impl WizardEngine {
    pub fn new(actions: Arc<dyn WizardActions>, port_range: (u16, u16)) -> Self {
        Self {
            actions,
            port_range,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Opens a session and returns its first prompt. Rejected while the user
    /// has a session of any kind; the existing one is left untouched.
    pub async fn start_session(&self, user: UserId, kind: WizardKind) -> Result<String, SessionError> {
        let session = match kind {
            WizardKind::CreateServer => Session::Create(CreateWizard::new(self.port_range)),
            WizardKind::InstallPlugin { port } => {
                let server_type = self
                    .actions
                    .server_type(port)
                    .await
                    .ok_or(SessionError::ServerNotFound(port))?;
                Session::Plugin(PluginWizard::new(port, server_type))
            }
        };
        let prompt = match &session {
            Session::Create(w) => w.prompt(),
            Session::Plugin(w) => w.prompt(),
        };

        let mut sessions = self.sessions.lock().await;
        if let Some(slot) = sessions.get(&user) {
            let busy = match slot.try_lock() {
                Ok(guard) => guard.is_some(),
                Err(_) => true,
            };
            if busy {
                return Err(SessionError::AlreadyActive);
            }
        }

        sessions.insert(user, Arc::new(Mutex::new(Some(session))));
        info!(user, ?kind, "wizard started");
        Ok(prompt)
    }

    pub async fn active_session(&self, user: UserId) -> Option<WizardKind> {
        let slot = self.sessions.lock().await.get(&user).cloned()?;
        let guard = slot.lock().await;
        guard.as_ref().map(Session::kind)
    }

    pub async fn handle_input(
        &self,
        user: UserId,
        text: &str,
        attachments: &[Attachment],
    ) -> WizardReply {
        let Some(slot) = self.sessions.lock().await.get(&user).cloned() else {
            return WizardReply::Idle;
        };

        let mut guard = slot.lock().await;
        let Some(session) = guard.as_mut() else {
            return WizardReply::Idle;
        };

        if is_cancel(text) {
            info!(user, kind = ?session.kind(), "wizard cancelled");
            *guard = None;
            drop(guard);
            self.forget(user, &slot).await;
            return WizardReply::Cancelled {
                message: "Wizard cancelled.".to_string(),
            };
        }

        let reply = match session {
            Session::Create(w) => match w.advance(text, self.actions.as_ref()).await {
                Transition::Next(prompt) => return WizardReply::Advanced { prompt },
                Transition::Retry(prompt) => return WizardReply::Rejected { prompt },
                Transition::Abort(message) => WizardReply::Cancelled { message },
                Transition::Done(spec) => self.complete_create(user, spec).await,
            },
            Session::Plugin(w) => {
                match w.advance(text, attachments, self.actions.as_ref()).await {
                    Transition::Next(prompt) => return WizardReply::Advanced { prompt },
                    Transition::Retry(prompt) => return WizardReply::Rejected { prompt },
                    Transition::Abort(message) => WizardReply::Cancelled { message },
                    Transition::Done(file) => {
                        let (port, server_type) = (w.port(), w.server_type());
                        self.complete_plugin(user, port, server_type, file).await
                    }
                }
            }
        };

        *guard = None;
        drop(guard);
        self.forget(user, &slot).await;
        reply
    }

    async fn forget(&self, user: UserId, slot: &Slot) {
        let mut sessions = self.sessions.lock().await;
        if sessions.get(&user).is_some_and(|s| Arc::ptr_eq(s, slot)) {
            sessions.remove(&user);
        }
    }

    async fn complete_create(&self, user: UserId, spec: ServerSpec) -> WizardReply {
        let port = spec.port;
        match self.actions.create_server(spec).await {
            Ok(record) => {
                info!(user, port, "wizard created server");
                WizardReply::Completed {
                    success: true,
                    message: format!(
                        "Server created on port {} ({} {}, {}). Status: {}.",
                        record.port, record.server_type, record.version, record.memory, record.status
                    ),
                }
            }
            Err(e) => {
                warn!(user, port, error = %e, "wizard server creation failed");
                WizardReply::Completed {
                    success: false,
                    message: format!("Failed to create server: {e}"),
                }
            }
        }
    }

    async fn complete_plugin(
        &self,
        user: UserId,
        port: u16,
        server_type: ServerType,
        file: FetchedFile,
    ) -> WizardReply {
        let folder = server_type.plugin_folder();
        match self
            .actions
            .install_plugin(port, &file.file_name, &file.bytes)
            .await
        {
            Ok(_) => {
                info!(user, port, file = %file.file_name, "wizard installed plugin");
                WizardReply::Completed {
                    success: true,
                    message: format!(
                        "Installed {} into {folder} on port {port}. A restart may be needed to load it.",
                        file.file_name
                    ),
                }
            }
            Err(e) => {
                warn!(user, port, error = %e, "wizard plugin install failed");
                WizardReply::Completed {
                    success: false,
                    message: format!("Failed to install {}: {e}", file.file_name),
                }
            }
        }
    }
}
