use crate::{
    config::{MemorySpec, ServerType, ServerVersion},
    server::ServerSpec,
};

use super::{Transition, WizardActions};

const STEPS: usize = 4;

/// Each step carries the answers collected so far.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateStep {
    Port,
    ServerType {
        port: u16,
    },
    Version {
        port: u16,
        server_type: ServerType,
    },
    Memory {
        port: u16,
        server_type: ServerType,
        version: ServerVersion,
    },
}

impl CreateStep {
    pub fn number(&self) -> usize {
        match self {
            CreateStep::Port => 1,
            CreateStep::ServerType { .. } => 2,
            CreateStep::Version { .. } => 3,
            CreateStep::Memory { .. } => 4,
        }
    }
}

#[derive(Debug)]
pub struct CreateWizard {
    step: CreateStep,
    port_range: (u16, u16),
}

impl CreateWizard {
    pub fn new(port_range: (u16, u16)) -> Self {
        Self {
            step: CreateStep::Port,
            port_range,
        }
    }

    pub fn step(&self) -> &CreateStep {
        &self.step
    }

    pub fn prompt(&self) -> String {
        let n = self.step.number();
        match &self.step {
            CreateStep::Port => format!(
                "Step {n}/{STEPS}: Enter a port for the new server ({}-{}).",
                self.port_range.0, self.port_range.1
            ),
            CreateStep::ServerType { .. } => {
                let choices: Vec<&str> = ServerType::WIZARD_CHOICES
                    .iter()
                    .map(|t| t.as_str())
                    .collect();
                format!(
                    "Step {n}/{STEPS}: Choose a server type: {}. \
                     For mrpack, upload the .mrpack archive first.",
                    choices.join(", ")
                )
            }
            CreateStep::Version {
                server_type: ServerType::Mrpack,
                ..
            } => format!(
                "Step {n}/{STEPS}: Enter the uploaded modpack as uploaded:<file>, \
                 exactly as returned by the upload."
            ),
            CreateStep::Version { server_type, .. } => format!(
                "Step {n}/{STEPS}: Enter the {server_type} version (for example 1.20.1)."
            ),
            CreateStep::Memory { .. } => {
                format!("Step {n}/{STEPS}: Enter the memory allocation (for example 2G or 4096M).")
            }
        }
    }

    fn retry(&self, problem: impl AsRef<str>) -> Transition<ServerSpec> {
        Transition::Retry(format!("{} {}", problem.as_ref(), self.prompt()))
    }

    fn next(&mut self, step: CreateStep) -> Transition<ServerSpec> {
        self.step = step;
        Transition::Next(self.prompt())
    }

    pub(crate) async fn advance(
        &mut self,
        input: &str,
        actions: &dyn WizardActions,
    ) -> Transition<ServerSpec> {
        let input = input.trim();
        match self.step.clone() {
            CreateStep::Port => {
                let Ok(port) = input.parse::<u16>() else {
                    return self.retry(format!("'{input}' is not a port number."));
                };
                let (min, max) = self.port_range;
                if !(min..=max).contains(&port) {
                    return self.retry(format!("Port {port} is outside the allowed range."));
                }
                if actions.server_type(port).await.is_some() {
                    return self.retry(format!("Port {port} is already in use."));
                }
                self.next(CreateStep::ServerType { port })
            }
            CreateStep::ServerType { port } => {
                let chosen = input
                    .parse::<ServerType>()
                    .ok()
                    .filter(|t| ServerType::WIZARD_CHOICES.contains(t));
                let Some(server_type) = chosen else {
                    return self.retry(format!("'{input}' is not a supported server type."));
                };
                self.next(CreateStep::Version { port, server_type })
            }
            CreateStep::Version { port, server_type } => {
                if input.is_empty() {
                    return self.retry("The version cannot be empty.");
                }
                let version = match input.parse::<ServerVersion>() {
                    Ok(v) => v,
                    Err(e) => return self.retry(format!("{e}.")),
                };
                if version.is_uploaded() != (server_type == ServerType::Mrpack) {
                    return self.retry(format!("'{input}' is not a {server_type} version."));
                }
                self.next(CreateStep::Memory {
                    port,
                    server_type,
                    version,
                })
            }
            CreateStep::Memory {
                port,
                server_type,
                version,
            } => match input.parse::<MemorySpec>() {
                Ok(memory) => Transition::Done(ServerSpec {
                    port,
                    server_type,
                    version,
                    memory,
                    motd: None,
                    max_players: None,
                    auto_start: true,
                }),
                Err(e) => self.retry(format!("{e}.")),
            },
        }
    }
}
