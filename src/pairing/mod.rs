//! Device pairing and bearer-token lifecycle.
//!
//! A pairing is an authorized (user, device, agent) binding represented by a
//! bearer token. The plaintext token is returned exactly once at creation;
//! only its SHA-256 digest is ever persisted.

mod manager;
mod token;

pub use manager::{Pairing, PairingManager, PairingReceipt};
pub use token::{digest_token, generate_token, TOKEN_PREFIX};
