//! Pairing lifecycle management.
//!
//! All pairings live in one JSON document behind a [`JsonStore`]; every
//! operation runs its full read-modify-write cycle under the store lock, so
//! two pairing requests for the same device can never both observe "no
//! existing pairing" and double-insert.
//!
//! Re-pairing policy: a repeat request for the same
//! `(user_id, device_id, agent_id)` deletes the prior pairing and mints a
//! fresh token. The old token stops validating the moment the new pairing is
//! persisted. This is the protocol contract; clients must store the newest
//! token they receive.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::config::AgentIdentity;
use crate::error::PairingError;
use crate::pairing::token::{digest_token, generate_token};
use crate::store::JsonStore;

/// One authorized (user, device, agent) relationship.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pairing {
    /// Opaque pairing id.
    pub pairing_id: String,
    /// SHA-256 digest of the bearer token. The plaintext is never stored.
    pub token_hash: String,
    pub agent_id: String,
    pub user_id: String,
    pub device_id: String,
    pub device_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_type: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    /// Granted permission flags (e.g. calendar, location).
    #[serde(default)]
    pub senses: HashMap<String, bool>,
}

/// Returned once from a successful pairing request. Carries the only copy
/// of the plaintext token that will ever exist.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairingReceipt {
    pub pairing_id: String,
    pub token: String,
    pub agent_id: String,
    pub created_at: DateTime<Utc>,
}

/// Manages the pairing document: issue, validate, revoke, update senses.
#[derive(Clone)]
pub struct PairingManager {
    store: JsonStore,
    agent: Option<AgentIdentity>,
}

impl PairingManager {
    pub fn new(store: JsonStore, agent: Option<AgentIdentity>) -> Self {
        Self { store, agent }
    }

    /// Issue a new pairing and bearer token.
    ///
    /// Requires a configured agent identity; without one this fails before
    /// touching the store. An existing pairing for the same
    /// `(user_id, device_id, agent_id)` is deleted and a fresh token minted.
    pub async fn request_pairing(
        &self,
        user_id: &str,
        device_id: &str,
        device_name: &str,
        device_type: Option<&str>,
    ) -> Result<PairingReceipt, PairingError> {
        let agent = self.agent.as_ref().ok_or(PairingError::NoAgentConfigured)?;

        let (plaintext, token_hash) = generate_token();
        let now = Utc::now();
        let pairing = Pairing {
            pairing_id: Uuid::new_v4().to_string(),
            token_hash,
            agent_id: agent.agent_id.clone(),
            user_id: user_id.to_string(),
            device_id: device_id.to_string(),
            device_name: device_name.to_string(),
            device_type: device_type.map(str::to_string),
            created_at: now,
            last_seen_at: now,
            senses: HashMap::new(),
        };

        let receipt = PairingReceipt {
            pairing_id: pairing.pairing_id.clone(),
            token: plaintext,
            agent_id: pairing.agent_id.clone(),
            created_at: now,
        };

        self.store
            .update(json!({}), move |doc| {
                let mut pairings = read_pairings(doc);
                // Delete-and-reissue: at most one active pairing per
                // (user, device, agent) tuple.
                pairings.retain(|_, p| {
                    !(p.user_id == pairing.user_id
                        && p.device_id == pairing.device_id
                        && p.agent_id == pairing.agent_id)
                });
                pairings.insert(pairing.pairing_id.clone(), pairing);
                write_pairings(doc, &pairings);
            })
            .await?;

        Ok(receipt)
    }

    /// Validate a presented bearer token by digest lookup.
    ///
    /// On a hit, `last_seen_at` is bumped and persisted. Returns `None` for
    /// unknown tokens; callers treat that as unauthenticated, not an error.
    pub async fn validate_token(&self, plaintext: &str) -> Result<Option<Pairing>, PairingError> {
        let digest = digest_token(plaintext);
        let found = self
            .store
            .update(json!({}), move |doc| {
                let mut pairings = read_pairings(doc);
                let hit = pairings.values_mut().find(|p| {
                    bool::from(p.token_hash.as_bytes().ct_eq(digest.as_bytes()))
                });
                let result = match hit {
                    Some(p) => {
                        p.last_seen_at = Utc::now();
                        Some(p.clone())
                    }
                    None => None,
                };
                if result.is_some() {
                    write_pairings(doc, &pairings);
                }
                result
            })
            .await?;
        Ok(found)
    }

    /// Delete a pairing. Idempotent; returns whether anything was removed.
    pub async fn revoke_pairing(&self, pairing_id: &str) -> Result<bool, PairingError> {
        let pairing_id = pairing_id.to_string();
        let removed = self
            .store
            .update(json!({}), move |doc| {
                let mut pairings = read_pairings(doc);
                let removed = pairings.remove(&pairing_id).is_some();
                if removed {
                    write_pairings(doc, &pairings);
                }
                removed
            })
            .await?;
        Ok(removed)
    }

    /// Shallow-merge a senses patch into an existing pairing. Keys absent
    /// from the patch are untouched.
    pub async fn update_senses(
        &self,
        pairing_id: &str,
        patch: HashMap<String, bool>,
    ) -> Result<HashMap<String, bool>, PairingError> {
        let id = pairing_id.to_string();
        let merged = self
            .store
            .update(json!({}), move |doc| {
                let mut pairings = read_pairings(doc);
                let merged = pairings.get_mut(&id).map(|p| {
                    p.senses.extend(patch);
                    p.senses.clone()
                });
                if merged.is_some() {
                    write_pairings(doc, &pairings);
                }
                merged
            })
            .await?;

        merged.ok_or_else(|| PairingError::NotFound {
            pairing_id: pairing_id.to_string(),
        })
    }

    /// List pairings, optionally filtered by agent id, oldest first.
    pub async fn list_pairings(&self, agent_id: Option<&str>) -> Result<Vec<Pairing>, PairingError> {
        let doc = self.store.load_or(json!({})).await?;
        let mut list: Vec<Pairing> = read_pairings_value(&doc)
            .into_values()
            .filter(|p| agent_id.is_none_or(|a| p.agent_id == a))
            .collect();
        list.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(list)
    }

    /// Look up a single pairing by id.
    pub async fn get_pairing(&self, pairing_id: &str) -> Result<Option<Pairing>, PairingError> {
        let doc = self.store.load_or(json!({})).await?;
        Ok(read_pairings_value(&doc).remove(pairing_id))
    }
}

fn read_pairings(doc: &mut Value) -> HashMap<String, Pairing> {
    read_pairings_value(doc)
}

fn read_pairings_value(doc: &Value) -> HashMap<String, Pairing> {
    doc.get("pairings")
        .cloned()
        .and_then(|v| serde_json::from_value(v).ok())
        .unwrap_or_default()
}

fn write_pairings(doc: &mut Value, pairings: &HashMap<String, Pairing>) {
    doc["pairings"] = serde_json::to_value(pairings).expect("pairings serialize");
}
