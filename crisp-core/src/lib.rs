//! The client side of the vote pipeline: encrypting a choice under the round
//! key, proving it is a valid choice, and handing both to the round server

#![deny(missing_docs)]
#![deny(clippy::missing_docs_in_private_items)]

pub mod artifacts;
pub mod cache;
pub mod client;
pub mod coordinator;
pub mod encryption;
pub mod prover;
