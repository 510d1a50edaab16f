//! Trusted forwarder resolution.
//!
//! A target contract may trust one of several deployed forwarders. The
//! resolver asks the contract which one, caches the answer and falls back to
//! the relayer's default forwarder when the contract cannot tell.

use alloy::primitives::{Address, U256};
use alloy::sol;
use alloy::sol_types::SolCall;
use dashmap::DashMap;
use metatx_abi::InterfaceMap;
use metatx_types::{eth_call, ProviderInterface, RpcError};
use std::sync::Arc;
use thiserror::Error;

sol! {
	interface IERC2771Recipient {
		function trustedForwarder() external view returns (address);
		function isTrustedForwarder(address forwarder) external view returns (bool);
	}

	interface IBiconomyForwarder {
		function getNonce(address from, uint256 batchId) external view returns (uint256);
	}
}

#[derive(Debug, Error)]
pub enum ForwarderError {
	#[error("Forwarder call failed: {0}")]
	Call(#[from] RpcError),
	#[error("Failed to decode forwarder response: {0}")]
	Decode(String),
}

/// Resolves the forwarder each target contract trusts.
pub struct ForwarderResolver {
	provider: Arc<dyn ProviderInterface>,
	interfaces: Arc<InterfaceMap>,
	supported: Vec<Address>,
	default_forwarder: Address,
	cache: DashMap<Address, Address>,
}

impl ForwarderResolver {
	pub fn new(
		provider: Arc<dyn ProviderInterface>,
		interfaces: Arc<InterfaceMap>,
		supported: Vec<Address>,
		default_forwarder: Address,
	) -> Self {
		Self {
			provider,
			interfaces,
			supported,
			default_forwarder,
			cache: DashMap::new(),
		}
	}

	pub fn default_forwarder(&self) -> Address {
		self.default_forwarder
	}

	pub fn supported(&self) -> &[Address] {
		&self.supported
	}

	/// Returns the forwarder trusted by `target`.
	///
	/// Failed isTrustedForwarder calls are logged and skipped; only a positively identified
	/// forwarder is cached.
	pub async fn resolve(&self, target: Address) -> Address {
		if let Some(cached) = self.cache.get(&target) {
			return *cached;
		}

		if let Some(forwarder) = self.query_trusted_forwarder(target).await {
			self.cache.insert(target, forwarder);
			return forwarder;
		}

		for candidate in &self.supported {
			match self.is_trusted_forwarder(target, *candidate).await {
				Ok(true) => {
					tracing::debug!(%target, forwarder = %candidate, "Resolved forwarder by isTrustedForwarder()");
					self.cache.insert(target, *candidate);
					return *candidate;
				}
				Ok(false) => {}
				Err(e) => {
					tracing::warn!(%target, forwarder = %candidate, error = %e, "isTrustedForwarder() call failed");
				}
			}
		}

		tracing::debug!(%target, forwarder = %self.default_forwarder, "Using default forwarder");
		self.default_forwarder
	}

	async fn query_trusted_forwarder(&self, target: Address) -> Option<Address> {
		if self.interfaces.has_function(&target, "trustedForwarder") == Some(false) {
			return None;
		}

		let call = IERC2771Recipient::trustedForwarderCall {};
		let result = match eth_call(self.provider.as_ref(), target, call.abi_encode().into()).await {
			Ok(output) => IERC2771Recipient::trustedForwarderCall::abi_decode_returns(&output)
				.map_err(|e| ForwarderError::Decode(e.to_string())),
			Err(e) => Err(ForwarderError::Call(e)),
		};

		match result {
			Ok(forwarder) if self.supported.contains(&forwarder) => {
				tracing::debug!(%target, %forwarder, "Resolved forwarder from trustedForwarder()");
				Some(forwarder)
			}
			Ok(forwarder) => {
				tracing::debug!(%target, %forwarder, "trustedForwarder() returned an unsupported forwarder");
				None
			}
			Err(e) => {
				tracing::warn!(%target, error = %e, "trustedForwarder() call failed");
				None
			}
		}
	}

	async fn is_trusted_forwarder(&self, target: Address, forwarder: Address) -> Result<bool, ForwarderError> {
		let call = IERC2771Recipient::isTrustedForwarderCall { forwarder };
		let output = eth_call(self.provider.as_ref(), target, call.abi_encode().into()).await?;
		IERC2771Recipient::isTrustedForwarderCall::abi_decode_returns(&output)
			.map_err(|e| ForwarderError::Decode(e.to_string()))
	}

	/// Reads the next nonce of `from` in `batch_id` from `forwarder`.
	pub async fn get_nonce(
		&self,
		forwarder: Address,
		from: Address,
		batch_id: U256,
	) -> Result<U256, ForwarderError> {
		let call = IBiconomyForwarder::getNonceCall {
			from,
			batchId: batch_id,
		};
		let output = eth_call(self.provider.as_ref(), forwarder, call.abi_encode().into()).await?;
		IBiconomyForwarder::getNonceCall::abi_decode_returns(&output)
			.map_err(|e| ForwarderError::Decode(e.to_string()))
	}
}
