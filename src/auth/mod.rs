//! Authentication primitives
//!
//! Covers the challenge/response pairing flow:
//! - Challenge: time-boxed random nonce a device must sign
//! - Signature: Ed25519 verification against the registered public key
//! - Session: signed bearer token minted after successful verification

pub mod challenge;
pub mod session;
pub mod signature;

pub use challenge::{Challenge, ChallengeManager, ConsumedChallenge, IssuedChallenge};
pub use session::{IssuedSession, SessionContext, SessionIssuer, SESSION_TTL_SECS};
pub use signature::{verify_challenge_signature, verify_signature};
