//! Gateway configuration.
//!
//! Environment-first: every value can come from a `KRILL_*` variable, with
//! sensible defaults for paths and timings. The gateway secret is held in a
//! [`SecretString`] so it never shows up in debug output or logs.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Version string advertised in health pongs and auth signatures.
pub const GATEWAY_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default activity grace window: 5 minutes.
pub const DEFAULT_GRACE_WINDOW: Duration = Duration::from_secs(5 * 60);

/// Default bound wait for the post-restart health check.
pub const DEFAULT_HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(30);

/// Identity of the agent this gateway fronts.
#[derive(Debug, Clone)]
pub struct AgentIdentity {
    /// Stable agent id on the chat network (mxid-style).
    pub agent_id: String,
    /// Human-readable display name, used only for decoration.
    pub display_name: String,
}

/// Full gateway configuration.
#[derive(Clone)]
pub struct GatewayConfig {
    /// Agent identity; pairing and verification require this to be set.
    pub agent: Option<AgentIdentity>,
    /// Stable id of this gateway instance.
    pub gateway_id: String,
    /// Shared secret for enrollment hashes and collaborator auth headers.
    pub gateway_secret: SecretString,
    /// Sender ids allowed to drive remote config updates.
    pub update_allowlist: Vec<String>,
    /// How long after non-protocol activity the agent counts as ACTIVE.
    pub grace_window: Duration,
    /// Bound wait for the post-restart health check.
    pub health_check_timeout: Duration,
    /// Path of the pairings document.
    pub pairings_path: PathBuf,
    /// Path of the gateway configuration document.
    pub config_path: PathBuf,
    /// Path of the single rolling config backup.
    pub config_backup_path: PathBuf,
    /// Bind address for the pairing HTTP surface.
    pub http_addr: SocketAddr,
}

impl GatewayConfig {
    /// Load configuration from the environment.
    ///
    /// Required: `KRILL_GATEWAY_ID`, `KRILL_GATEWAY_SECRET`. Everything else
    /// has a default. An agent identity is optional at startup; operations
    /// that need one fail explicitly until `KRILL_AGENT_ID` is set.
    pub fn from_env() -> Result<Self, ConfigError> {
        let gateway_id = require_env("KRILL_GATEWAY_ID", "the stable id of this gateway")?;
        let gateway_secret =
            require_env("KRILL_GATEWAY_SECRET", "the shared enrollment secret")?;

        let agent = std::env::var("KRILL_AGENT_ID").ok().map(|agent_id| {
            let display_name = std::env::var("KRILL_AGENT_NAME")
                .unwrap_or_else(|_| agent_id.clone());
            AgentIdentity {
                agent_id,
                display_name,
            }
        });

        let update_allowlist = std::env::var("KRILL_UPDATE_ALLOWLIST")
            .map(|v| {
                v.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let grace_window = duration_env("KRILL_GRACE_WINDOW_SECS", DEFAULT_GRACE_WINDOW)?;
        let health_check_timeout =
            duration_env("KRILL_HEALTH_TIMEOUT_SECS", DEFAULT_HEALTH_CHECK_TIMEOUT)?;

        let data_dir = std::env::var("KRILL_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_data_dir());

        let http_addr = match std::env::var("KRILL_HTTP_ADDR") {
            Ok(v) => v.parse().map_err(|e| ConfigError::InvalidValue {
                key: "KRILL_HTTP_ADDR".to_string(),
                message: format!("{}", e),
            })?,
            Err(_) => "127.0.0.1:7540".parse().expect("default addr parses"),
        };

        Ok(Self {
            agent,
            gateway_id,
            gateway_secret: SecretString::from(gateway_secret),
            update_allowlist,
            grace_window,
            health_check_timeout,
            pairings_path: data_dir.join("pairings.json"),
            config_path: data_dir.join("config.json"),
            config_backup_path: data_dir.join("config.backup.json"),
            http_addr,
        })
    }
}

fn require_env(key: &str, hint: &str) -> Result<String, ConfigError> {
    match std::env::var(key) {
        Ok(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ConfigError::MissingRequired {
            key: key.to_string(),
            hint: format!("Set {} to {}", key, hint),
        }),
    }
}

fn duration_env(key: &str, default: Duration) -> Result<Duration, ConfigError> {
    match std::env::var(key) {
        Ok(v) => {
            let secs: u64 = v.parse().map_err(|_| ConfigError::InvalidValue {
                key: key.to_string(),
                message: "must be a whole number of seconds".to_string(),
            })?;
            Ok(Duration::from_secs(secs))
        }
        Err(_) => Ok(default),
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("krill-gateway")
}
