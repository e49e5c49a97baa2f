//! Enrollment verification and challenge handling.
//!
//! An enrollment hash binds an agent identity to a specific gateway at a
//! point in time: HMAC-SHA256 over `"{agent_id}|{gateway_id}|{enrolled_at}"`
//! keyed by the shared gateway secret. Verifying a claimed hash checks the
//! gateway id first; a foreign gateway id fails before any HMAC work is done.

use hmac::{Hmac, Mac};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::config::{AgentIdentity, GATEWAY_VERSION, GatewayConfig};

type HmacSha256 = Hmac<Sha256>;

/// Response to a verification challenge.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    /// The caller's nonce, echoed verbatim.
    pub challenge: String,
    /// Whether this gateway has a configured agent identity.
    pub verified: bool,
    /// Agent metadata, present only when verified.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent: Option<VerifiedAgent>,
    /// Error description when not verified.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Agent metadata included in a successful verification response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifiedAgent {
    pub agent_id: String,
    pub display_name: String,
    pub gateway_id: String,
}

/// Stateless verification operations bound to one gateway's identity.
#[derive(Clone)]
pub struct VerificationService {
    gateway_id: String,
    secret: String,
    agent: Option<AgentIdentity>,
}

impl VerificationService {
    pub fn new(config: &GatewayConfig) -> Self {
        Self {
            gateway_id: config.gateway_id.clone(),
            secret: config.gateway_secret.expose_secret().to_string(),
            agent: config.agent.clone(),
        }
    }

    /// Compute the enrollment hash for the given identity tuple.
    pub fn enrollment_hash(&self, agent_id: &str, gateway_id: &str, enrolled_at: i64) -> String {
        let payload = format!("{}|{}|{}", agent_id, gateway_id, enrolled_at);
        hex::encode(hmac_sha256(&self.secret, &payload))
    }

    /// Verify a claimed enrollment hash.
    ///
    /// A gateway id that is not ours fails immediately, without touching the
    /// HMAC. On match the hash is recomputed and compared in constant time.
    pub fn verify_enrollment_hash(
        &self,
        agent_id: &str,
        gateway_id: &str,
        enrolled_at: i64,
        claimed_hash: &str,
    ) -> bool {
        if gateway_id != self.gateway_id {
            return false;
        }
        let expected = self.enrollment_hash(agent_id, gateway_id, enrolled_at);
        expected.as_bytes().ct_eq(claimed_hash.as_bytes()).into()
    }

    /// Answer a verification challenge, echoing the nonce verbatim.
    ///
    /// The response never carries the shared secret. When no agent identity
    /// is configured the challenge still gets a response, with
    /// `verified=false` and an explanation.
    pub fn respond_to_challenge(&self, nonce: &str) -> VerifyResponse {
        match &self.agent {
            Some(agent) => VerifyResponse {
                challenge: nonce.to_string(),
                verified: true,
                agent: Some(VerifiedAgent {
                    agent_id: agent.agent_id.clone(),
                    display_name: agent.display_name.clone(),
                    gateway_id: self.gateway_id.clone(),
                }),
                error: None,
            },
            None => VerifyResponse {
                challenge: nonce.to_string(),
                verified: false,
                agent: None,
                error: Some("no agent identity configured on this gateway".to_string()),
            },
        }
    }

    /// Build the `X-Krill-Auth` header value for outbound collaborator calls.
    ///
    /// Format: `<gatewayId>:<timestamp>:<signature>` where the signature is
    /// HMAC-SHA256 over `"gatewayId:timestamp:plugin:version"` truncated to
    /// 32 hex characters.
    pub fn auth_header(&self, timestamp: i64) -> String {
        let payload = format!(
            "{}:{}:plugin:{}",
            self.gateway_id, timestamp, GATEWAY_VERSION
        );
        let sig = hex::encode(hmac_sha256(&self.secret, &payload));
        format!("{}:{}:{}", self.gateway_id, timestamp, &sig[..32])
    }
}

fn hmac_sha256(secret: &str, payload: &str) -> Vec<u8> {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC key can be any length");
    mac.update(payload.as_bytes());
    mac.finalize().into_bytes().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(agent: bool) -> VerificationService {
        VerificationService {
            gateway_id: "gw-1".to_string(),
            secret: "s3cret".to_string(),
            agent: agent.then(|| AgentIdentity {
                agent_id: "@agent:example.org".to_string(),
                display_name: "Agent".to_string(),
            }),
        }
    }

    #[test]
    fn test_enrollment_hash_round_trips() {
        let svc = service(true);
        let hash = svc.enrollment_hash("@agent:example.org", "gw-1", 1_700_000_000);
        assert!(svc.verify_enrollment_hash("@agent:example.org", "gw-1", 1_700_000_000, &hash));
    }

    #[test]
    fn test_changing_any_input_flips_verification() {
        let svc = service(true);
        let hash = svc.enrollment_hash("@agent:example.org", "gw-1", 1_700_000_000);

        assert!(!svc.verify_enrollment_hash("@other:example.org", "gw-1", 1_700_000_000, &hash));
        assert!(!svc.verify_enrollment_hash("@agent:example.org", "gw-2", 1_700_000_000, &hash));
        assert!(!svc.verify_enrollment_hash("@agent:example.org", "gw-1", 1_700_000_001, &hash));

        let other_secret = VerificationService {
            secret: "different".to_string(),
            ..service(true)
        };
        assert!(!other_secret.verify_enrollment_hash(
            "@agent:example.org",
            "gw-1",
            1_700_000_000,
            &hash
        ));
    }

    #[test]
    fn test_foreign_gateway_id_fails_fast() {
        let svc = service(true);
        // Even a correct hash for another gateway id must fail.
        let hash = svc.enrollment_hash("@agent:example.org", "gw-2", 1_700_000_000);
        assert!(!svc.verify_enrollment_hash("@agent:example.org", "gw-2", 1_700_000_000, &hash));
    }

    #[test]
    fn test_hash_is_hex_sha256_length() {
        let svc = service(true);
        let hash = svc.enrollment_hash("a", "g", 0);
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_challenge_echoed_verbatim_when_configured() {
        let svc = service(true);
        let resp = svc.respond_to_challenge("nonce-123");
        assert_eq!(resp.challenge, "nonce-123");
        assert!(resp.verified);
        let agent = resp.agent.unwrap();
        assert_eq!(agent.agent_id, "@agent:example.org");
        assert_eq!(agent.gateway_id, "gw-1");
        assert!(resp.error.is_none());
    }

    #[test]
    fn test_challenge_unverified_without_agent() {
        let svc = service(false);
        let resp = svc.respond_to_challenge("nonce-456");
        assert_eq!(resp.challenge, "nonce-456");
        assert!(!resp.verified);
        assert!(resp.agent.is_none());
        assert!(resp.error.is_some());
    }

    #[test]
    fn test_response_never_contains_secret() {
        let svc = service(true);
        let resp = svc.respond_to_challenge("n");
        let serialized = serde_json::to_string(&resp).unwrap();
        assert!(!serialized.contains("s3cret"));
    }

    #[test]
    fn test_auth_header_shape() {
        let svc = service(true);
        let header = svc.auth_header(1_700_000_000);
        let parts: Vec<&str> = header.split(':').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "gw-1");
        assert_eq!(parts[1], "1700000000");
        assert_eq!(parts[2].len(), 32);
        assert!(parts[2].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_auth_header_varies_with_timestamp() {
        let svc = service(true);
        assert_ne!(svc.auth_header(1), svc.auth_header(2));
    }
}
