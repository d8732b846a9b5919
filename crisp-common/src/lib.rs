//! Common modules used throughout the voter client, including the
//! vote pipeline, the CLI and testing code

#![deny(missing_docs)]
#![deny(clippy::missing_docs_in_private_items)]

pub mod backends;
pub mod constants;
pub mod custom_serde;
pub mod errors;
pub mod types;
