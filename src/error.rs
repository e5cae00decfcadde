//! Error types for habitat
//!
//! All modules use `HabitatResult<T>` as their return type. Variants are
//! grouped by the taxonomy the build pipeline and session runtime report
//! against: configuration, preflight, phase, engine, and session errors.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for habitat operations
pub type HabitatResult<T> = Result<T, HabitatError>;

/// Why a configuration failed to load or validate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigErrorKind {
    Syntax,
    Schema,
    Expansion,
    Duplicate,
}

impl std::fmt::Display for ConfigErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Syntax => "syntax",
            Self::Schema => "schema",
            Self::Expansion => "expansion",
            Self::Duplicate => "duplicate",
        };
        write!(f, "{s}")
    }
}

/// Which source layer a config fragment came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceLayer {
    System,
    Shared,
    Habitat,
}

impl std::fmt::Display for SourceLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::System => "system",
            Self::Shared => "shared",
            Self::Habitat => "habitat",
        };
        write!(f, "{s}")
    }
}

/// A phase's work failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseErrorKind {
    Exec,
    Fileop,
    Clone,
    Verify,
    Test,
}

impl std::fmt::Display for PhaseErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Exec => "exec",
            Self::Fileop => "fileop",
            Self::Clone => "clone",
            Self::Verify => "verify",
            Self::Test => "test",
        };
        write!(f, "{s}")
    }
}

/// Distinguishes pre-ready from post-ready session failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionErrorKind {
    Startup,
    Runtime,
    Cleanup,
}

impl std::fmt::Display for SessionErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Startup => "startup",
            Self::Runtime => "runtime",
            Self::Cleanup => "cleanup",
        };
        write!(f, "{s}")
    }
}

/// All errors that can occur in habitat
#[derive(Error, Debug)]
pub enum HabitatError {
    // Configuration errors
    #[error("invalid configuration in {layer} layer, field '{field}': {reason}")]
    ConfigInvalid {
        kind: ConfigErrorKind,
        layer: SourceLayer,
        field: String,
        reason: String,
        suggestion: Option<String>,
    },

    #[error("configuration file not found: {0}")]
    ConfigNotFound(PathBuf),

    #[error("duplicate habitat name: {0}")]
    DuplicateHabitat(String),

    #[error("unresolved environment reference ${{{key}}} in {layer} layer")]
    UnresolvedEnvRef { key: String, layer: SourceLayer },

    #[error("config specifies both base_image and a Dockerfile; exactly one is required")]
    AmbiguousBaseImage,

    #[error("config specifies neither base_image nor a Dockerfile; exactly one is required")]
    MissingBaseImage,

    // Preflight errors
    #[error("repository {url} not reachable in {access} mode: {reason}")]
    PreflightFailed {
        url: String,
        access: String,
        reason: String,
        needs_deploy_key: bool,
        needs_api_auth: bool,
    },

    // Phase / build pipeline errors
    #[error("phase {phase_id} ({phase_name}) failed during {kind}: {message}")]
    PhaseFailed {
        phase_id: u8,
        phase_name: String,
        kind: PhaseErrorKind,
        message: String,
        stdout: String,
        stderr: String,
    },

    #[error("verify-fs check failed: {0}")]
    VerifyFailed(String),

    // Container engine errors
    #[error("container engine error running `{command}`: {reason}")]
    EngineFailed {
        command: String,
        reason: String,
        timed_out: bool,
    },

    #[error("image not found: {0}")]
    ImageNotFound(String),

    // Session errors
    #[error("session {kind} error: {message}")]
    Session {
        kind: SessionErrorKind,
        message: String,
    },

    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("session already exists: {0}")]
    SessionExists(String),

    // Cancellation
    #[error("operation cancelled by signal")]
    Cancelled,

    // IO / process errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("command failed: {command}")]
    CommandFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    // General
    #[error("internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    User(String),
}

impl HabitatError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a command failed error
    pub fn command_failed(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::CommandFailed {
            command: command.into(),
            source,
        }
    }

    /// Check if an error class is safe to retry (preflight probe only)
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::EngineFailed { timed_out: true, .. } | Self::PreflightFailed { .. }
        )
    }

    /// Get an actionable next step for display, per spec §7's "single
    /// structured error block" requirement.
    pub fn hint(&self) -> Option<String> {
        match self {
            Self::PhaseFailed { phase_name, .. } => {
                Some(format!("re-run with rebuild-from={phase_name}"))
            }
            Self::PreflightFailed {
                needs_deploy_key: true,
                ..
            } => Some("add a deploy key for this repository".to_string()),
            Self::PreflightFailed {
                needs_api_auth: true,
                ..
            } => Some("authenticate with the repository's API".to_string()),
            Self::ConfigInvalid { suggestion, .. } => suggestion.clone(),
            Self::ImageNotFound(_) => Some("the image will be pulled automatically".to_string()),
            _ => None,
        }
    }

    /// Process exit code per spec §6.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Cancelled => 130,
            Self::ConfigInvalid { .. }
            | Self::ConfigNotFound(_)
            | Self::DuplicateHabitat(_)
            | Self::UnresolvedEnvRef { .. }
            | Self::AmbiguousBaseImage
            | Self::MissingBaseImage => 2,
            Self::PreflightFailed { .. } => 3,
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = HabitatError::ConfigNotFound(PathBuf::from("/etc/habitat/system/config.yaml"));
        assert!(err.to_string().contains("configuration file not found"));
    }

    #[test]
    fn exit_codes() {
        assert_eq!(HabitatError::Cancelled.exit_code(), 130);
        assert_eq!(HabitatError::DuplicateHabitat("x".into()).exit_code(), 2);
        assert_eq!(
            HabitatError::PreflightFailed {
                url: "x".into(),
                access: "read".into(),
                reason: "x".into(),
                needs_deploy_key: false,
                needs_api_auth: false,
            }
            .exit_code(),
            3
        );
    }

    #[test]
    fn phase_hint_suggests_rebuild_from() {
        let err = HabitatError::PhaseFailed {
            phase_id: 8,
            phase_name: "repos".into(),
            kind: PhaseErrorKind::Clone,
            message: "clone failed".into(),
            stdout: String::new(),
            stderr: String::new(),
        };
        assert_eq!(
            err.hint(),
            Some("re-run with rebuild-from=repos".to_string())
        );
    }
}
