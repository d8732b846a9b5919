//! Fixtures and reference implementations for testing the vote pipeline

#![deny(missing_docs)]
#![deny(clippy::missing_docs_in_private_items)]

pub mod crypto;
pub mod proof_system;
pub mod round_server;
