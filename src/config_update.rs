//! Remote configuration update orchestration.
//!
//! One update runs the sequence authorize -> backup -> apply -> restart ->
//! health check, committing on a healthy gateway and rolling back to the
//! snapshot otherwise. Rollback happens at most once per update; if the
//! gateway is still unhealthy after rolling back, the update ends
//! unrecoverable and is surfaced for operator intervention rather than
//! retried.
//!
//! Exactly one rolling backup is retained. Interleaving two updates could
//! overwrite that backup mid-cycle, so a second request arriving while one
//! is in flight is rejected outright, never queued.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::Mutex;

use crate::error::UpdateError;
use crate::protocol::{ConfigUpdateRequest, ConfigUpdateResult};
use crate::store::JsonStore;

/// Interval between health polls after a restart.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Triggers the external process-restart mechanism.
#[async_trait::async_trait]
pub trait RestartTrigger: Send + Sync {
    async fn restart(&self) -> Result<(), UpdateError>;
}

/// Liveness collaborator polled after a restart.
#[async_trait::async_trait]
pub trait HealthCheck: Send + Sync {
    async fn healthy(&self) -> bool;
}

/// Drives config update cycles against one configuration document.
pub struct ConfigUpdateOrchestrator {
    store: JsonStore,
    backup_path: PathBuf,
    allowlist: Vec<String>,
    restart: Arc<dyn RestartTrigger>,
    health: Arc<dyn HealthCheck>,
    health_timeout: Duration,
    poll_interval: Duration,
    /// Held for the whole cycle; `try_lock` rejects a second in-flight update.
    in_flight: Arc<Mutex<()>>,
}

impl ConfigUpdateOrchestrator {
    pub fn new(
        store: JsonStore,
        backup_path: PathBuf,
        allowlist: Vec<String>,
        restart: Arc<dyn RestartTrigger>,
        health: Arc<dyn HealthCheck>,
        health_timeout: Duration,
    ) -> Self {
        Self {
            store,
            backup_path,
            allowlist,
            restart,
            health,
            health_timeout,
            poll_interval: DEFAULT_POLL_INTERVAL,
            in_flight: Arc::new(Mutex::new(())),
        }
    }

    /// Shrink the health poll interval. Test hook.
    #[cfg(test)]
    fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Run one full update cycle. Always returns a result message; every
    /// failure mode is reported in-band, and the unrecoverable state is
    /// flagged distinctly.
    pub async fn apply_config_patch(
        &self,
        request: ConfigUpdateRequest,
        sender_id: &str,
    ) -> ConfigUpdateResult {
        // Concurrency guard: reject, never queue. A queued update would
        // overwrite the rolling backup while the first cycle still needs it.
        let _guard = match self.in_flight.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                tracing::warn!(
                    request_id = %request.request_id,
                    "Rejecting config update: another update is in flight"
                );
                return failure(&request.request_id, UpdateError::UpdateInFlight);
            }
        };

        // Authorizing.
        if !self.allowlist.iter().any(|s| s == sender_id) {
            tracing::warn!(
                sender = %sender_id,
                request_id = %request.request_id,
                "Rejecting config update from unauthorized sender"
            );
            return failure(
                &request.request_id,
                UpdateError::Unauthorized {
                    sender: sender_id.to_string(),
                },
            );
        }

        match self.run_cycle(&request).await {
            Ok(applied) => {
                if !applied {
                    tracing::info!(
                        request_id = %request.request_id,
                        "Config patch saved; values take effect on the next manual restart"
                    );
                }
                ConfigUpdateResult {
                    request_id: request.request_id.clone(),
                    success: true,
                    applied,
                    error: None,
                    unrecoverable: false,
                }
            }
            Err(e) => {
                match &e {
                    UpdateError::Unrecoverable { .. } => {
                        tracing::error!(request_id = %request.request_id, error = %e, "Config update unrecoverable");
                    }
                    _ => {
                        tracing::warn!(request_id = %request.request_id, error = %e, "Config update failed");
                    }
                }
                failure(&request.request_id, e)
            }
        }
    }

    /// Backup, apply, and (optionally) restart + verify. Returns whether the
    /// new values are live.
    async fn run_cycle(&self, request: &ConfigUpdateRequest) -> Result<bool, UpdateError> {
        // BackingUp: verbatim snapshot to the single rolling backup slot.
        let pre_patch =
            self.store
                .snapshot_to(&self.backup_path)
                .await
                .map_err(|e| UpdateError::BackupFailed {
                    reason: e.to_string(),
                })?;

        // Applying.
        let mut merged = if pre_patch.is_null() {
            json!({})
        } else {
            pre_patch.clone()
        };
        deep_merge(&mut merged, &request.patch);
        self.store
            .replace(&merged)
            .await
            .map_err(|e| UpdateError::ApplyFailed {
                reason: e.to_string(),
            })?;

        if !request.restart {
            // Saved but inert until a manual restart. Callers that expect
            // immediate effect will be surprised; the result says applied=false.
            return Ok(false);
        }

        // Restarting, then HealthChecking within the bounded timeout.
        let unhealthy_reason = match self.restart.restart().await {
            Ok(()) => {
                if self.await_healthy().await {
                    None
                } else {
                    Some(format!(
                        "health check did not pass within {:?}",
                        self.health_timeout
                    ))
                }
            }
            Err(e) => Some(format!("restart trigger failed: {}", e)),
        };

        match unhealthy_reason {
            // Committed. The backup file stays on disk per the overwrite
            // policy but is no longer meaningful as a live fallback.
            None => Ok(true),
            Some(reason) => self.roll_back(pre_patch, reason).await,
        }
    }

    /// Restore the snapshot and restart once more. Not cancellable; once
    /// restoration begins it runs to completion so config and backup cannot
    /// diverge. Attempted at most once per update.
    async fn roll_back(&self, pre_patch: Value, reason: String) -> Result<bool, UpdateError> {
        tracing::warn!(reason = %reason, "Rolling back config update");

        self.store
            .replace(&pre_patch)
            .await
            .map_err(|e| UpdateError::Unrecoverable {
                reason: format!("{}; restoring backup failed: {}", reason, e),
            })?;

        if let Err(e) = self.restart.restart().await {
            return Err(UpdateError::Unrecoverable {
                reason: format!("{}; restart after rollback failed: {}", reason, e),
            });
        }

        if !self.await_healthy().await {
            return Err(UpdateError::Unrecoverable {
                reason: format!("{}; gateway still unhealthy after rollback", reason),
            });
        }

        Err(UpdateError::RolledBack { reason })
    }

    /// Poll the health collaborator until it reports healthy or the bounded
    /// timeout elapses. Timeout is a definitive failure, never retried.
    async fn await_healthy(&self) -> bool {
        let deadline = tokio::time::Instant::now() + self.health_timeout;
        loop {
            if self.health.healthy().await {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

fn failure(request_id: &str, error: UpdateError) -> ConfigUpdateResult {
    ConfigUpdateResult {
        request_id: request_id.to_string(),
        success: false,
        applied: false,
        unrecoverable: matches!(error, UpdateError::Unrecoverable { .. }),
        error: Some(error.to_string()),
    }
}

/// Deep-merge `patch` into `dest`. Object values merge recursively key by
/// key; any non-object patch value (arrays included) replaces the existing
/// value wholesale. Idempotent for a fixed patch.
pub fn deep_merge(dest: &mut Value, patch: &Value) {
    match (dest, patch) {
        (Value::Object(dest_map), Value::Object(patch_map)) => {
            for (key, patch_value) in patch_map {
                match dest_map.get_mut(key) {
                    Some(existing) => deep_merge(existing, patch_value),
                    None => {
                        dest_map.insert(key.clone(), patch_value.clone());
                    }
                }
            }
        }
        (dest, patch) => {
            *dest = patch.clone();
        }
    }
}
