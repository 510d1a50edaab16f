//! Relayer API access.
//!
//! [`RelayClient`] talks to the dashboard and meta-transaction endpoints;
//! [`RelayDispatcher`] submits relay envelopes and turns the relayer's flags
//! into a [`metatx_types::RelayOutcome`] or a structured error.

use metatx_types::SdkError;
use thiserror::Error;

pub mod client;
pub mod dispatcher;

pub use client::{RelayClient, RelayResponse};
pub use dispatcher::RelayDispatcher;

#[derive(Debug, Error)]
pub enum RelayError {
	#[error("Network error: {0}")]
	Http(String),
	#[error("Invalid relayer response (HTTP {status}): {message}")]
	InvalidResponse { status: u16, message: String },
	#[error("{0}")]
	Api(SdkError),
}

/// Receives relay transaction ids to follow until they are mined.
pub trait TransactionWatcher: Send + Sync {
	fn watch(&self, transaction_id: &str);
}
