use crate::cli::{Command, WebhookCommand};

/// Execution contexts that influence how logging is routed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExecutionContext {
    /// One-shot commands a person runs from a terminal.
    Interactive,
    /// Batch runs whose stdout carries JSON records.
    Pipeline,
    /// Long-running webhook listener; stdout carries normalized events.
    Listener,
}

impl ExecutionContext {
    /// Whether stdout is reserved for records and must not receive log lines.
    pub fn reserves_stdout(self) -> bool {
        matches!(self, ExecutionContext::Pipeline | ExecutionContext::Listener)
    }
}

/// Derive the active execution context from a parsed CLI command.
pub fn detect_context(command: &Command) -> ExecutionContext {
    match command {
        Command::Run(_) => ExecutionContext::Pipeline,
        Command::Webhook(webhook) => match webhook.command {
            WebhookCommand::Serve(_) => ExecutionContext::Listener,
            WebhookCommand::Sign(_) => ExecutionContext::Interactive,
        },
        Command::Request(_) | Command::Operations => ExecutionContext::Interactive,
    }
}
