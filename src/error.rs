//! Error types for the krill gateway.

use std::time::Duration;

/// Top-level error type for the gateway.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Pairing error: {0}")]
    Pairing(#[from] PairingError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Health error: {0}")]
    Health(#[from] HealthError),

    #[error("Config update error: {0}")]
    Update(#[from] UpdateError),

    #[error("Server error: {0}")]
    Server(#[from] ServerError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Persistent store errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Failed to read document at {path}: {reason}")]
    ReadFailed { path: String, reason: String },

    #[error("Failed to write document at {path}: {reason}")]
    WriteFailed { path: String, reason: String },

    #[error("Document at {path} is not valid JSON: {reason}")]
    Corrupt { path: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Pairing lifecycle errors.
#[derive(Debug, thiserror::Error)]
pub enum PairingError {
    #[error("No agent identity configured; cannot issue pairings")]
    NoAgentConfigured,

    #[error("Pairing not found: {pairing_id}")]
    NotFound { pairing_id: String },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Protocol envelope and dispatch errors.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("Malformed protocol message: {reason}")]
    Malformed { reason: String },

    #[error("Failed to deliver reply: {reason}")]
    ReplyFailed { reason: String },
}

/// Health probe errors.
#[derive(Debug, thiserror::Error)]
pub enum HealthError {
    #[error("LLM probe failed: {reason}")]
    ProbeFailed { reason: String },

    #[error("LLM probe timed out after {timeout:?}")]
    ProbeTimeout { timeout: Duration },
}

/// Config update orchestration errors.
#[derive(Debug, thiserror::Error)]
pub enum UpdateError {
    #[error("Sender {sender} is not authorized for config updates")]
    Unauthorized { sender: String },

    #[error("Another config update is already in flight")]
    UpdateInFlight,

    #[error("Backup failed: {reason}")]
    BackupFailed { reason: String },

    #[error("Failed to apply patch: {reason}")]
    ApplyFailed { reason: String },

    #[error("Restart trigger failed: {reason}")]
    RestartFailed { reason: String },

    #[error("Gateway unhealthy after restart; rolled back: {reason}")]
    RolledBack { reason: String },

    #[error("UNRECOVERABLE: rollback did not restore a healthy gateway ({reason}); manual operator intervention required")]
    Unrecoverable { reason: String },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// HTTP server errors.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to bind to {addr}: {reason}")]
    BindFailed { addr: String, reason: String },
}

/// Result type alias for the gateway.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_missing_required_display() {
        let err = ConfigError::MissingRequired {
            key: "gateway_secret".to_string(),
            hint: "Set KRILL_GATEWAY_SECRET".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("gateway_secret"));
        assert!(msg.contains("KRILL_GATEWAY_SECRET"));
    }

    #[test]
    fn test_store_error_write_failed_display() {
        let err = StoreError::WriteFailed {
            path: "/tmp/pairings.json".to_string(),
            reason: "disk full".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("/tmp/pairings.json"));
        assert!(msg.contains("disk full"));
    }

    #[test]
    fn test_pairing_error_not_found_display() {
        let err = PairingError::NotFound {
            pairing_id: "abc-123".to_string(),
        };
        assert!(err.to_string().contains("abc-123"));
    }

    #[test]
    fn test_update_error_unrecoverable_is_loud() {
        let err = UpdateError::Unrecoverable {
            reason: "health check failed after rollback".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("UNRECOVERABLE"));
        assert!(msg.contains("operator"));
    }

    #[test]
    fn test_update_error_in_flight_display() {
        let err = UpdateError::UpdateInFlight;
        assert!(err.to_string().contains("already in flight"));
    }

    #[test]
    fn test_health_error_probe_timeout_display() {
        let err = HealthError::ProbeTimeout {
            timeout: Duration::from_secs(30),
        };
        assert!(err.to_string().contains("30"));
    }

    #[test]
    fn test_error_from_pairing_error() {
        let inner = PairingError::NoAgentConfigured;
        let err = Error::from(inner);
        assert!(err.to_string().contains("Pairing error"));
    }

    #[test]
    fn test_error_from_update_error() {
        let inner = UpdateError::UpdateInFlight;
        let err = Error::from(inner);
        assert!(err.to_string().contains("Config update error"));
    }
}
