use metatx_forwarder::ForwarderError;
use metatx_notifier::NotifierError;
use metatx_relay::RelayError;
use metatx_signature::SignatureError;
use metatx_types::{ErrorCode, RpcError, SdkError};
use thiserror::Error;

/// JSON-RPC error code used when an SDK error is returned through the proxy.
pub const SDK_RPC_ERROR_CODE: i64 = -32000;

#[derive(Debug, Error)]
pub enum CoreError {
	#[error("{0}")]
	Sdk(#[from] SdkError),

	#[error("Gas estimation failed: {0}")]
	Estimation(RpcError),

	#[error("Signing failed: {0}")]
	Signing(#[from] SignatureError),

	#[error("Relay failed: {0}")]
	Relay(#[from] RelayError),

	#[error("Forwarder error: {0}")]
	Forwarder(#[from] ForwarderError),

	#[error("Provider error: {0}")]
	Provider(#[from] RpcError),

	#[error("Notifier error: {0}")]
	Notifier(#[from] NotifierError),

	#[error("Internal error: {0}")]
	Internal(String),
}

impl CoreError {
	pub fn sdk(code: ErrorCode, message: impl Into<String>) -> Self {
		CoreError::Sdk(SdkError::new(code, message))
	}

	/// Faults of the SDK itself rather than of the request or a collaborator.
	pub fn is_internal(&self) -> bool {
		matches!(self, CoreError::Internal(_))
	}

	/// The `{code, message}` form reported to dApps.
	pub fn to_sdk_error(&self) -> SdkError {
		match self {
			CoreError::Sdk(err) | CoreError::Relay(RelayError::Api(err)) => err.clone(),
			other => SdkError::new(ErrorCode::ErrorResponse, other.to_string()),
		}
	}

	pub fn to_rpc_error(&self) -> RpcError {
		if let CoreError::Provider(err) = self {
			return err.clone();
		}
		let sdk = self.to_sdk_error();
		RpcError {
			code: SDK_RPC_ERROR_CODE,
			message: sdk.to_string(),
			data: serde_json::to_value(&sdk).ok(),
		}
	}
}
