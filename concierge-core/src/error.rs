use std::fmt;

/// Failure of a subprocess invocation: exit code -1 denotes a synthetic
/// timeout rather than an observed process exit.
#[derive(Debug, Clone)]
pub struct CommandFailure {
    pub command_string: String,
    pub exit_code: i32,
    pub merged_output: String,
}

impl fmt::Display for CommandFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "command failed (exit {}): {}\n{}",
            self.exit_code, self.command_string, self.merged_output
        )
    }
}

impl CommandFailure {
    /// True if `merged_output` contains any of concierge's permanent-error
    /// substrings (used by the snapd client's retry classifier).
    pub fn contains_any_ci(&self, needles: &[&str]) -> bool {
        let haystack = self.merged_output.to_lowercase();
        needles.iter().any(|n| haystack.contains(&n.to_lowercase()))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConciergeError {
    #[error("{0}")]
    Command(CommandFailure),

    #[error("snapd daemon error: {0}")]
    Daemon(String),

    #[error("invalid configuration: {0}")]
    ConfigurationInvalid(String),

    #[error("{0}")]
    FileNotFound(String),

    #[error(
        "concierge requires elevated privileges for this operation.\n\
         Re-run with sudo, or as a user in the appropriate group.\n\
         Underlying error: {0}"
    )]
    PrivilegeRequired(String),

    #[error("{0}")]
    Internal(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml_ng::Error),
}

impl ConciergeError {
    pub fn command(command_string: impl Into<String>, exit_code: i32, merged_output: impl Into<String>) -> Self {
        ConciergeError::Command(CommandFailure {
            command_string: command_string.into(),
            exit_code,
            merged_output: merged_output.into(),
        })
    }

    /// Timeout synthesized by `run_with_retries` when the overall deadline
    /// expires without a prior observed `CommandFailure` (spec §4.2).
    pub fn timeout(command_string: impl Into<String>) -> Self {
        ConciergeError::Command(CommandFailure {
            command_string: command_string.into(),
            exit_code: -1,
            merged_output: "Command timed out".to_string(),
        })
    }

    /// Rewrite a terminal command failure into a privilege-elevation hint
    /// when its output matches the patterns concierge recognizes (spec §6
    /// "Exit behavior").
    pub fn classify_privilege(self) -> Self {
        if let ConciergeError::Command(ref failure) = self {
            let needs_privilege = failure.exit_code == 100
                || failure.contains_any_ci(&["permission denied", "lock/lock-frontend", "could not open lock file"]);
            if needs_privilege {
                return ConciergeError::PrivilegeRequired(failure.to_string());
            }
        }
        self
    }
}

pub type Result<T> = std::result::Result<T, ConciergeError>;
