//! Outcome of one script submission, as returned to the client.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Message used when a script ran without printing anything.
pub const NO_OUTPUT_MESSAGE: &str = "Code executed successfully";
/// Message for compiler-reported failures.
pub const COMPILATION_FAILED: &str = "Compilation failed";
/// Message when the host did not finish the job in time.
pub const TIMED_OUT: &str = "Execution timed out";
/// Message when another job is pending or running.
pub const BUSY: &str = "Another script is already running";
/// Message for a request without any script text.
pub const EMPTY_REQUEST: &str = "Empty script content received.";

/// Broad category of a result, for clients that branch on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultKind {
    Completed,
    Rejected,
    CompileError,
    RuntimeError,
    Timeout,
    Busy,
}

/// Result of executing (or refusing to execute) one submission.
///
/// Values are built once through the constructors and never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    success: bool,
    kind: ResultKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    result_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error_message: Option<String>,
    #[serde(default)]
    error_details: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    script_name: Option<String>,
    /// Milliseconds since the Unix epoch.
    timestamp: u64,
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

impl ExecutionResult {
    fn new(success: bool, kind: ResultKind) -> Self {
        Self {
            success,
            kind,
            result_message: None,
            error_message: None,
            error_details: Vec::new(),
            script_name: None,
            timestamp: now_millis(),
        }
    }

    /// Successful run; `output` are the printed lines in order.
    pub fn completed(output: &[String]) -> Self {
        let message = if output.is_empty() {
            NO_OUTPUT_MESSAGE.to_string()
        } else {
            output.join("\n")
        };
        Self {
            result_message: Some(message),
            ..Self::new(true, ResultKind::Completed)
        }
    }

    /// Request refused before anything ran (malformed, empty, no document).
    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            error_message: Some(message.into()),
            ..Self::new(false, ResultKind::Rejected)
        }
    }

    /// Compiler diagnostics, one entry per error.
    pub fn compilation_failed(details: Vec<String>) -> Self {
        Self {
            error_message: Some(COMPILATION_FAILED.to_string()),
            error_details: details,
            ..Self::new(false, ResultKind::CompileError)
        }
    }

    /// A failure raised by the script itself while running.
    pub fn runtime_error(message: &str, details: Vec<String>) -> Self {
        Self {
            error_message: Some(format!("Runtime error: {}", message)),
            error_details: details,
            ..Self::new(false, ResultKind::RuntimeError)
        }
    }

    pub fn timed_out() -> Self {
        Self {
            error_message: Some(TIMED_OUT.to_string()),
            ..Self::new(false, ResultKind::Timeout)
        }
    }

    pub fn busy() -> Self {
        Self {
            error_message: Some(BUSY.to_string()),
            ..Self::new(false, ResultKind::Busy)
        }
    }

    /// Same result attributed to `script_name`.
    pub fn for_script(self, script_name: impl Into<String>) -> Self {
        Self {
            script_name: Some(script_name.into()),
            ..self
        }
    }

    pub fn success(&self) -> bool {
        self.success
    }

    pub fn kind(&self) -> ResultKind {
        self.kind
    }

    pub fn result_message(&self) -> Option<&str> {
        self.result_message.as_deref()
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    pub fn error_details(&self) -> &[String] {
        &self.error_details
    }

    pub fn script_name(&self) -> Option<&str> {
        self.script_name.as_deref()
    }

    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    pub fn to_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }

    /// Text shown to the user.
    ///
    /// Successes print their output; failures print `[ERROR] message`
    /// followed by one detail per line.
    pub fn render(&self) -> String {
        if self.success {
            return self
                .result_message
                .clone()
                .unwrap_or_else(|| NO_OUTPUT_MESSAGE.to_string());
        }
        let mut text = format!(
            "[ERROR] {}",
            self.error_message.as_deref().unwrap_or("Unknown error")
        );
        for detail in &self.error_details {
            text.push('\n');
            text.push_str(detail);
        }
        text
    }
}
