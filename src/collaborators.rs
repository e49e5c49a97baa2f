//! Concrete collaborator implementations.
//!
//! The core state machines only know the traits; these are the process-level
//! implementations wired in by `main`: a shell-command restart trigger, an
//! HTTP health check, and an HTTP LLM probe. Outbound requests carry the
//! `X-Krill-Auth` header so downstream collaborators can verify the caller.

use std::time::Duration;

use chrono::Utc;

use crate::config_update::{HealthCheck, RestartTrigger};
use crate::error::{HealthError, UpdateError};
use crate::health::LlmProbe;
use crate::verify::VerificationService;

/// Restart the gateway process by running a configured shell command
/// (typically a service-manager restart).
pub struct CommandRestart {
    command: String,
}

impl CommandRestart {
    pub fn new(command: String) -> Self {
        Self { command }
    }
}

#[async_trait::async_trait]
impl RestartTrigger for CommandRestart {
    async fn restart(&self) -> Result<(), UpdateError> {
        tracing::info!(command = %self.command, "Triggering gateway restart");
        let status = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .status()
            .await
            .map_err(|e| UpdateError::RestartFailed {
                reason: e.to_string(),
            })?;

        if status.success() {
            Ok(())
        } else {
            Err(UpdateError::RestartFailed {
                reason: format!("restart command exited with {}", status),
            })
        }
    }
}

/// Health check against an HTTP liveness endpoint. Healthy on any 2xx.
pub struct HttpHealthCheck {
    url: String,
    client: reqwest::Client,
    verification: VerificationService,
}

impl HttpHealthCheck {
    pub fn new(url: String, verification: VerificationService) -> Self {
        Self {
            url,
            client: reqwest::Client::new(),
            verification,
        }
    }
}

#[async_trait::async_trait]
impl HealthCheck for HttpHealthCheck {
    async fn healthy(&self) -> bool {
        let result = self
            .client
            .get(&self.url)
            .header("X-Krill-Auth", self.verification.auth_header(Utc::now().timestamp()))
            .timeout(Duration::from_secs(5))
            .send()
            .await;
        matches!(result, Ok(resp) if resp.status().is_success())
    }
}

/// Live LLM probe against an HTTP completion endpoint.
pub struct HttpLlmProbe {
    url: String,
    client: reqwest::Client,
    verification: VerificationService,
}

impl HttpLlmProbe {
    pub fn new(url: String, verification: VerificationService) -> Self {
        Self {
            url,
            client: reqwest::Client::new(),
            verification,
        }
    }
}

#[async_trait::async_trait]
impl LlmProbe for HttpLlmProbe {
    async fn probe(&self) -> Result<(), HealthError> {
        let response = self
            .client
            .post(&self.url)
            .header("X-Krill-Auth", self.verification.auth_header(Utc::now().timestamp()))
            .json(&serde_json::json!({"prompt": "ping", "maxTokens": 1}))
            .send()
            .await
            .map_err(|e| HealthError::ProbeFailed {
                reason: e.to_string(),
            })?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(HealthError::ProbeFailed {
                reason: format!("probe endpoint returned {}", response.status()),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_command_restart_success() {
        let restart = CommandRestart::new("true".to_string());
        assert!(restart.restart().await.is_ok());
    }

    #[tokio::test]
    async fn test_command_restart_failure_is_reported() {
        let restart = CommandRestart::new("false".to_string());
        let err = restart.restart().await.unwrap_err();
        assert!(matches!(err, UpdateError::RestartFailed { .. }));
    }

    #[tokio::test]
    async fn test_http_health_check_unreachable_is_unhealthy() {
        let config = test_gateway_config();
        let check = HttpHealthCheck::new(
            // Reserved TEST-NET-1 address; nothing listens there.
            "http://192.0.2.1:1/health".to_string(),
            VerificationService::new(&config),
        );
        assert!(!check.healthy().await);
    }

    fn test_gateway_config() -> crate::config::GatewayConfig {
        crate::config::GatewayConfig {
            agent: None,
            gateway_id: "gw-1".to_string(),
            gateway_secret: secrecy::SecretString::from("s3cret"),
            update_allowlist: Vec::new(),
            grace_window: Duration::from_secs(300),
            health_check_timeout: Duration::from_secs(30),
            pairings_path: "/tmp/p.json".into(),
            config_path: "/tmp/c.json".into(),
            config_backup_path: "/tmp/b.json".into(),
            http_addr: "127.0.0.1:0".parse().unwrap(),
        }
    }
}
