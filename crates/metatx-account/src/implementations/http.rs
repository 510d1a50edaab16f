//! JSON-RPC provider backed by an Alloy HTTP transport.

use crate::AccountError;
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::transports::TransportError;
use async_trait::async_trait;
use metatx_types::{ProviderInterface, RpcError};
use serde_json::Value;
use std::borrow::Cow;

/// Forwards every request verbatim to a node over HTTP.
pub struct HttpProvider {
	provider: DynProvider,
	url: String,
}

impl HttpProvider {
	/// Connects to the node at `rpc_url`.
	pub async fn connect(rpc_url: &str) -> Result<Self, AccountError> {
		let provider = ProviderBuilder::new()
			.connect(rpc_url)
			.await
			.map_err(|e| AccountError::Provider(format!("Invalid RPC URL {}: {}", rpc_url, e)))?
			.erased();

		Ok(Self {
			provider,
			url: rpc_url.to_string(),
		})
	}

	pub fn url(&self) -> &str {
		&self.url
	}
}

fn to_rpc_error(err: TransportError) -> RpcError {
	match err.as_error_resp() {
		Some(payload) => RpcError {
			code: payload.code,
			message: payload.message.to_string(),
			data: payload
				.data
				.as_ref()
				.and_then(|raw| serde_json::from_str(raw.get()).ok()),
		},
		None => RpcError::transport(err.to_string()),
	}
}

#[async_trait]
impl ProviderInterface for HttpProvider {
	async fn request(&self, method: &str, params: Value) -> Result<Value, RpcError> {
		tracing::trace!(method, url = %self.url, "Forwarding RPC request");
		self.provider
			.raw_request::<Value, Value>(Cow::Owned(method.to_string()), params)
			.await
			.map_err(to_rpc_error)
	}
}
