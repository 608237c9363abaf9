use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::error::{YoinkError, PRE_EXEC_FAILURE_CODE};

const MAX_SUMMARY_CHARS: usize = 200;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub status: CommandStatus,
    pub message: String,
    #[serde(default)]
    pub details: Value,
}

impl ExecutionOutcome {
    pub fn success(message: impl Into<String>, details: Value) -> Self {
        Self {
            status: CommandStatus::Ok,
            message: message.into(),
            details,
        }
    }

    pub fn failure(message: impl Into<String>, details: Value) -> Self {
        Self {
            status: CommandStatus::Failure,
            message: message.into(),
            details,
        }
    }

    pub fn user_error(message: impl Into<String>, details: Value) -> Self {
        Self {
            status: CommandStatus::UserError,
            message: message.into(),
            details,
        }
    }

    /// Converts a pipeline error into an outcome carrying the reserved
    /// pre-execution exit code.
    ///
    /// Backend output is included verbatim when `verbose`, otherwise trimmed
    /// to a short summary.
    #[must_use]
    pub fn from_error(err: &YoinkError, verbose: bool) -> Self {
        let mut details = Map::new();
        details.insert("reason".into(), Value::String(err.reason().into()));
        details.insert("exit_code".into(), json!(PRE_EXEC_FAILURE_CODE));
        if let Some(hint) = err.hint() {
            details.insert("hint".into(), Value::String(hint));
        }
        if let Some(diagnostics) = err.diagnostics() {
            let text = if verbose {
                diagnostics.to_string()
            } else {
                summarize(diagnostics)
            };
            details.insert("diagnostics".into(), Value::String(text));
        }
        let details = Value::Object(details);
        if err.is_user_error() {
            Self::user_error(err.to_string(), details)
        } else {
            Self::failure(err.to_string(), details)
        }
    }

    /// Exit code this outcome asks the process to terminate with.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        let explicit = self
            .details
            .get("exit_code")
            .and_then(Value::as_i64)
            .and_then(|code| i32::try_from(code).ok());
        match (explicit, &self.status) {
            (Some(code), _) => code,
            (None, CommandStatus::Ok) => 0,
            (None, _) => PRE_EXEC_FAILURE_CODE,
        }
    }
}

fn summarize(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= MAX_SUMMARY_CHARS {
        return trimmed.to_string();
    }
    let mut short: String = trimmed.chars().take(MAX_SUMMARY_CHARS).collect();
    short.push_str("...");
    short
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub enum CommandStatus {
    Ok,
    UserError,
    Failure,
}
