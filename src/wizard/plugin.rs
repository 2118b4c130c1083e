use crate::{config::ServerType, download::FetchedFile, utils::has_jar_extension};

use super::{Attachment, Transition, WizardActions, is_confirm};

const STEPS: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PluginStep {
    Source,
    Confirm { file: FetchedFile },
}

#[derive(Debug)]
pub struct PluginWizard {
    port: u16,
    server_type: ServerType,
    step: PluginStep,
}

impl PluginWizard {
    pub fn new(port: u16, server_type: ServerType) -> Self {
        Self {
            port,
            server_type,
            step: PluginStep::Source,
        }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn server_type(&self) -> ServerType {
        self.server_type
    }

    pub fn step(&self) -> &PluginStep {
        &self.step
    }

    pub fn prompt(&self) -> String {
        match &self.step {
            PluginStep::Source => format!(
                "Step 1/{STEPS}: Attach a .jar file or send a download URL for the server on port {}.",
                self.port
            ),
            PluginStep::Confirm { file } => format!(
                "Step 2/{STEPS}: Install {} into {}/ of the server on port {}? \
                 Reply yes to confirm.",
                file.file_name,
                self.server_type.plugin_folder(),
                self.port
            ),
        }
    }

    fn retry(&self, problem: impl AsRef<str>) -> Transition<FetchedFile> {
        Transition::Retry(format!("{} {}", problem.as_ref(), self.prompt()))
    }

    pub(crate) async fn advance(
        &mut self,
        input: &str,
        attachments: &[Attachment],
        actions: &dyn WizardActions,
    ) -> Transition<FetchedFile> {
        match &self.step {
            PluginStep::Source => {
                let file = if let Some(attachment) = attachments.first() {
                    FetchedFile {
                        file_name: attachment.file_name.clone(),
                        bytes: attachment.bytes.clone(),
                    }
                } else {
                    let url = input.trim();
                    if url.is_empty() {
                        return self.retry("Nothing to install.");
                    }
                    match actions.fetch_plugin(url).await {
                        Ok(file) => file,
                        Err(e) => return self.retry(format!("Download failed: {e}.")),
                    }
                };

                if !has_jar_extension(&file.file_name) {
                    return self.retry(format!("{} is not a .jar file.", file.file_name));
                }
                self.step = PluginStep::Confirm { file };
                Transition::Next(self.prompt())
            }
            PluginStep::Confirm { file } => {
                if is_confirm(input) {
                    Transition::Done(file.clone())
                } else {
                    Transition::Abort(format!("Installation of {} cancelled.", file.file_name))
                }
            }
        }
    }
}
