use std::time::Duration;

use thiserror::Error;

/// Machine-readable error codes shared by the library and the CLI output.
pub mod codes {
    pub const POLICY_TARGET_MISSING: &str = "policy_target_missing";
    pub const POLICY_CYCLE: &str = "policy_cycle";
    pub const INVALID_MANIFEST: &str = "invalid_manifest";
    pub const IO_ERROR: &str = "io_error";
    pub const SSO_TRANSPORT: &str = "sso_transport_error";
    pub const SSO_TIMEOUT: &str = "sso_timeout";
    pub const SSO_STATUS: &str = "sso_status";
    pub const MALFORMED_PAYLOAD: &str = "malformed_payload";
}

/// What kind of page element a declaration pointed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    Group,
    Input,
    Flag,
}

impl std::fmt::Display for TargetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            TargetKind::Group => "group",
            TargetKind::Input => "input",
            TargetKind::Flag => "flag",
        };
        f.write_str(label)
    }
}

/// Errors raised while registering or loading visibility declarations.
///
/// None of these ever reach the page: callers log them and leave the
/// affected group in its server-rendered state.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{target} '{id}' is not present on the page")]
    PolicyTargetMissing { target: TargetKind, id: String },

    #[error("group '{group}' is nested inside itself")]
    PolicyCycle { group: String },

    #[error("invalid page manifest: {0}")]
    InvalidManifest(#[from] serde_json::Error),

    #[error("failed to read page manifest: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::PolicyTargetMissing { .. } => codes::POLICY_TARGET_MISSING,
            EngineError::PolicyCycle { .. } => codes::POLICY_CYCLE,
            EngineError::InvalidManifest(_) => codes::INVALID_MANIFEST,
            EngineError::Io(_) => codes::IO_ERROR,
        }
    }
}

/// Failure of the SSO token round trip. Every variant fails open.
#[derive(Debug, Error)]
pub enum SsoError {
    #[error("token endpoint unreachable: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("token endpoint did not answer within {0:?}")]
    Timeout(Duration),

    #[error("token endpoint returned HTTP {0}")]
    Status(u16),

    #[error("token endpoint returned an empty payload")]
    MalformedPayload,
}

impl SsoError {
    pub fn code(&self) -> &'static str {
        match self {
            SsoError::Transport(_) => codes::SSO_TRANSPORT,
            SsoError::Timeout(_) => codes::SSO_TIMEOUT,
            SsoError::Status(_) => codes::SSO_STATUS,
            SsoError::MalformedPayload => codes::MALFORMED_PAYLOAD,
        }
    }
}
