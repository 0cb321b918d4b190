//! Teleport Claim Client Library
//!
//! This library provides functionality to fetch inclusion proofs for migrated assets
//! from a Teleport relayer and to check them offline before claiming on the destination ledger.

pub mod fetch;
pub mod format;
pub mod verify;

pub use fetch::{fetch_claim_proof, ClaimProof};
pub use verify::verify_claim;
