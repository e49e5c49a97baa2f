//! Routing of classified envelopes to their handlers.
//!
//! One dispatcher owns the activity clock and the sender authorization
//! context; handlers stay pure with respect to transport. Routing is an
//! explicit match on the exact type string, so the full set of handled
//! types is visible in one place.

use std::sync::Arc;

use crate::config_update::ConfigUpdateOrchestrator;
use crate::error::{PairingError, ProtocolError};
use crate::health::{ActivityClock, HealthMonitor};
use crate::pairing::PairingManager;
use crate::protocol::messages::{
    ConfigUpdateRequest, HealthPing, PairComplete, PairRequest, PairResponse, VerifyRequest,
};
use crate::protocol::{
    classify, Envelope, ReplySink, TYPE_CONFIG_UPDATE, TYPE_CONFIG_UPDATE_RESULT,
    TYPE_HEALTH_PING, TYPE_PAIR_COMPLETE, TYPE_PAIR_REQUEST, TYPE_PAIR_RESPONSE,
    TYPE_VERIFY_REQUEST, TYPE_VERIFY_RESPONSE,
};
use crate::verify::{VerificationService, VerifyResponse};

/// Identity/profile lookup, used only to decorate logs and responses.
/// Never consulted for authorization decisions.
#[async_trait::async_trait]
pub trait ProfileLookup: Send + Sync {
    async fn display_name(&self, user_id: &str) -> Option<String>;
}

/// Top-level entry point for inbound messages.
pub struct Dispatcher {
    pairing: PairingManager,
    verification: VerificationService,
    health: Arc<HealthMonitor>,
    updates: Arc<ConfigUpdateOrchestrator>,
    clock: ActivityClock,
    profiles: Option<Arc<dyn ProfileLookup>>,
}

impl Dispatcher {
    pub fn new(
        pairing: PairingManager,
        verification: VerificationService,
        health: Arc<HealthMonitor>,
        updates: Arc<ConfigUpdateOrchestrator>,
        clock: ActivityClock,
        profiles: Option<Arc<dyn ProfileLookup>>,
    ) -> Self {
        Self {
            pairing,
            verification,
            health,
            updates,
            clock,
            profiles,
        }
    }

    /// Classify and dispatch one raw inbound message.
    ///
    /// Returns whether the message was handled as a protocol message. A
    /// `false` means the caller should hand it to the conversational path;
    /// every such message counts as activity on the clock. Protocol traffic
    /// never touches the clock.
    pub async fn handle_raw(
        &self,
        raw: &str,
        sender: &str,
        reply: &dyn ReplySink,
    ) -> Result<bool, ProtocolError> {
        match classify(raw) {
            Some(envelope) => self.dispatch(envelope, sender, reply).await,
            None => {
                self.clock.touch();
                Ok(false)
            }
        }
    }

    /// Route a classified envelope by its exact type string.
    pub async fn dispatch(
        &self,
        envelope: Envelope,
        sender: &str,
        reply: &dyn ReplySink,
    ) -> Result<bool, ProtocolError> {
        match envelope.message_type.as_str() {
            TYPE_PAIR_REQUEST => {
                self.handle_pair_request(&envelope, reply).await?;
                Ok(true)
            }
            TYPE_PAIR_COMPLETE => {
                match envelope.parse_content::<PairComplete>() {
                    Ok(complete) => {
                        tracing::info!(pairing_id = %complete.pairing_id, "Client confirmed pairing");
                    }
                    Err(e) => tracing::warn!(error = %e, "Malformed pair.complete content"),
                }
                Ok(true)
            }
            TYPE_VERIFY_REQUEST => {
                let response = match envelope.parse_content::<VerifyRequest>() {
                    Ok(request) => self.verification.respond_to_challenge(&request.challenge),
                    // Malformed content still gets an in-band failure; there
                    // is no nonce to echo, so the challenge field is empty.
                    Err(e) => {
                        tracing::warn!(error = %e, "Malformed verify.request content");
                        VerifyResponse {
                            challenge: String::new(),
                            verified: false,
                            agent: None,
                            error: Some(e.to_string()),
                        }
                    }
                };
                reply
                    .reply(Envelope::new(TYPE_VERIFY_RESPONSE, response))
                    .await?;
                Ok(true)
            }
            TYPE_HEALTH_PING => {
                match envelope.parse_content::<HealthPing>() {
                    Ok(ping) => self.health.handle_ping(ping, reply).await?,
                    // Without a request id there is nothing to correlate a
                    // reply with; the caller treats silence as offline.
                    Err(e) => tracing::warn!(error = %e, "Malformed health.ping content"),
                }
                Ok(true)
            }
            TYPE_CONFIG_UPDATE => {
                match envelope.parse_content::<ConfigUpdateRequest>() {
                    Ok(request) => {
                        let result = self.updates.apply_config_patch(request, sender).await;
                        reply
                            .reply(Envelope::new(TYPE_CONFIG_UPDATE_RESULT, result))
                            .await?;
                    }
                    // No request id to address a result to.
                    Err(e) => tracing::warn!(error = %e, "Malformed config.update content"),
                }
                Ok(true)
            }
            other => {
                // Correctly namespaced but unknown (or one of our own
                // outbound types echoed back). Reported as unhandled, not
                // silently dropped.
                tracing::warn!(message_type = %other, "Unhandled protocol message type");
                Ok(false)
            }
        }
    }

    async fn handle_pair_request(
        &self,
        envelope: &Envelope,
        reply: &dyn ReplySink,
    ) -> Result<(), ProtocolError> {
        let response = match envelope.parse_content::<PairRequest>() {
            Ok(request) => {
                match self
                    .pairing
                    .request_pairing(
                        &request.user_id,
                        &request.device_id,
                        &request.device_name,
                        request.device_type.as_deref(),
                    )
                    .await
                {
                    Ok(receipt) => {
                        let who = match &self.profiles {
                            Some(profiles) => profiles
                                .display_name(&request.user_id)
                                .await
                                .unwrap_or_else(|| request.user_id.clone()),
                            None => request.user_id.clone(),
                        };
                        tracing::info!(
                            user = %who,
                            device = %request.device_name,
                            pairing_id = %receipt.pairing_id,
                            "Issued pairing"
                        );
                        PairResponse {
                            success: true,
                            pairing_id: Some(receipt.pairing_id),
                            token: Some(receipt.token),
                            agent: Some(receipt.agent_id),
                            created_at: Some(receipt.created_at.to_rfc3339()),
                            error: None,
                        }
                    }
                    Err(e @ PairingError::NoAgentConfigured) => PairResponse {
                        success: false,
                        pairing_id: None,
                        token: None,
                        agent: None,
                        created_at: None,
                        error: Some(e.to_string()),
                    },
                    Err(e) => {
                        tracing::warn!(error = %e, "Pairing request failed");
                        PairResponse {
                            success: false,
                            pairing_id: None,
                            token: None,
                            agent: None,
                            created_at: None,
                            error: Some(e.to_string()),
                        }
                    }
                }
            }
            // Malformed input yields a structured failure, never an error
            // past the handler boundary.
            Err(e) => PairResponse {
                success: false,
                pairing_id: None,
                token: None,
                agent: None,
                created_at: None,
                error: Some(e.to_string()),
            },
        };

        reply
            .reply(Envelope::new(TYPE_PAIR_RESPONSE, response))
            .await
    }
}
