//! Wallet and node adapters behind the SDK provider seam.
//!
//! [`implementations::http::HttpProvider`] forwards JSON-RPC calls to a node.
//! [`WalletProvider`] layers a signing account on top of any provider so the
//! SDK can run without an injected browser wallet.

use alloy::consensus::TxLegacy;
use alloy::primitives::{Address, Bytes, Signature, TxKind, B256, U256, U64};
use async_trait::async_trait;
use metatx_types::{chain_id, estimate_gas, ProviderInterface, RpcError};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use thiserror::Error;

pub mod implementations {
	pub mod http;
	pub mod local;
}

#[derive(Debug, Error)]
pub enum AccountError {
	#[error("Signing failed: {0}")]
	SigningFailed(String),
	#[error("Invalid key: {0}")]
	InvalidKey(String),
	#[error("Provider error: {0}")]
	Provider(String),
}

impl From<AccountError> for RpcError {
	fn from(err: AccountError) -> Self {
		match err {
			AccountError::Provider(msg) => RpcError::transport(msg),
			other => RpcError::internal(other.to_string()),
		}
	}
}

/// A key that can sign on behalf of one address.
#[async_trait]
pub trait AccountInterface: Send + Sync {
	fn address(&self) -> Address;
	/// Signs a 32-byte digest without any prefix.
	async fn sign_hash(&self, hash: &B256) -> Result<Signature, AccountError>;
	/// Signs `message` with the EIP-191 personal message prefix.
	async fn sign_message(&self, message: &[u8]) -> Result<Signature, AccountError>;
	/// Signs a legacy transaction and returns its EIP-2718 encoding.
	async fn sign_legacy_transaction(&self, tx: TxLegacy) -> Result<Bytes, AccountError>;
}

/// Hex encoding of a signature as `r || s || v` with `v` in {27, 28}.
pub fn signature_hex(signature: &Signature) -> String {
	format!("0x{}", hex::encode(signature.as_bytes()))
}

/// Transaction fields accepted by `eth_sendTransaction`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransactionFields {
	from: Option<Address>,
	to: Option<Address>,
	data: Option<Bytes>,
	input: Option<Bytes>,
	value: Option<U256>,
	gas: Option<U256>,
	gas_limit: Option<U256>,
	gas_price: Option<U256>,
	nonce: Option<U256>,
}

/// Provider that answers account and signing requests with a local account
/// and forwards everything else to `inner`.
pub struct WalletProvider {
	account: Box<dyn AccountInterface>,
	inner: Arc<dyn ProviderInterface>,
}

impl WalletProvider {
	pub fn new(account: Box<dyn AccountInterface>, inner: Arc<dyn ProviderInterface>) -> Self {
		Self { account, inner }
	}

	pub fn address(&self) -> Address {
		self.account.address()
	}

	fn ensure_own(&self, value: Option<&Value>) -> Result<(), RpcError> {
		let Some(value) = value else {
			return Ok(());
		};
		let requested: Address = serde_json::from_value(value.clone())
			.map_err(|e| RpcError::invalid_params(format!("Invalid account: {}", e)))?;
		if requested != self.account.address() {
			return Err(RpcError::invalid_params(format!(
				"Account {} is not managed by this wallet",
				requested
			)));
		}
		Ok(())
	}

	async fn sign_typed_data(&self, params: &Value) -> Result<Value, RpcError> {
		self.ensure_own(params.get(0))?;
		let document = params
			.get(1)
			.ok_or_else(|| RpcError::invalid_params("Missing typed data"))?;
		let typed: alloy::dyn_abi::TypedData = match document {
			Value::String(raw) => serde_json::from_str(raw),
			other => serde_json::from_value(other.clone()),
		}
		.map_err(|e| RpcError::invalid_params(format!("Invalid typed data: {}", e)))?;

		let hash = typed
			.eip712_signing_hash()
			.map_err(|e| RpcError::invalid_params(format!("Cannot hash typed data: {}", e)))?;
		let signature = self.account.sign_hash(&hash).await?;
		Ok(Value::String(signature_hex(&signature)))
	}

	async fn personal_sign(&self, message: Option<&Value>, account: Option<&Value>) -> Result<Value, RpcError> {
		self.ensure_own(account)?;
		let message = message
			.and_then(Value::as_str)
			.ok_or_else(|| RpcError::invalid_params("Missing message"))?;
		let bytes = match message.strip_prefix("0x") {
			Some(hex_body) => hex::decode(hex_body)
				.map_err(|e| RpcError::invalid_params(format!("Invalid message hex: {}", e)))?,
			None => message.as_bytes().to_vec(),
		};
		let signature = self.account.sign_message(&bytes).await?;
		Ok(Value::String(signature_hex(&signature)))
	}

	async fn send_transaction(&self, params: &Value) -> Result<Value, RpcError> {
		let fields: TransactionFields = params
			.get(0)
			.map(|tx| serde_json::from_value(tx.clone()))
			.transpose()
			.map_err(|e| RpcError::invalid_params(format!("Invalid transaction: {}", e)))?
			.unwrap_or_default();

		let from = self.account.address();
		if let Some(requested) = fields.from {
			if requested != from {
				return Err(RpcError::invalid_params(format!(
					"Account {} is not managed by this wallet",
					requested
				)));
			}
		}
		let input = fields.data.or(fields.input).unwrap_or_default();

		let nonce = match fields.nonce {
			Some(nonce) => nonce.saturating_to::<u64>(),
			None => {
				let value = self
					.inner
					.request("eth_getTransactionCount", json!([from, "pending"]))
					.await?;
				let nonce: U64 = serde_json::from_value(value)
					.map_err(|e| RpcError::internal(format!("Invalid nonce: {}", e)))?;
				nonce.to::<u64>()
			}
		};
		let gas_price = match fields.gas_price {
			Some(price) => price.saturating_to::<u128>(),
			None => {
				let value = self.inner.request("eth_gasPrice", json!([])).await?;
				let price: U256 = serde_json::from_value(value)
					.map_err(|e| RpcError::internal(format!("Invalid gas price: {}", e)))?;
				price.saturating_to::<u128>()
			}
		};
		let gas_limit = match fields.gas.or(fields.gas_limit) {
			Some(gas) => gas.saturating_to::<u64>(),
			None => {
				let to = fields.to.unwrap_or_default();
				estimate_gas(self.inner.as_ref(), from, to, &input).await?
			}
		};
		let chain = chain_id(self.inner.as_ref()).await?;

		let tx = TxLegacy {
			chain_id: Some(chain),
			nonce,
			gas_price,
			gas_limit,
			to: fields.to.map(TxKind::Call).unwrap_or(TxKind::Create),
			value: fields.value.unwrap_or_default(),
			input,
		};
		tracing::debug!(%from, nonce, gas_limit, chain_id = chain, "Signing wallet transaction");

		let raw = self.account.sign_legacy_transaction(tx).await?;
		self.inner
			.request("eth_sendRawTransaction", json!([raw]))
			.await
	}
}

#[async_trait]
impl ProviderInterface for WalletProvider {
	async fn request(&self, method: &str, params: Value) -> Result<Value, RpcError> {
		match method {
			"eth_accounts" | "eth_requestAccounts" => Ok(json!([self.account.address()])),
			"eth_signTypedData" | "eth_signTypedData_v3" | "eth_signTypedData_v4" => {
				self.sign_typed_data(&params).await
			}
			"personal_sign" => self.personal_sign(params.get(0), params.get(1)).await,
			"eth_sign" => self.personal_sign(params.get(1), params.get(0)).await,
			"eth_sendTransaction" => self.send_transaction(&params).await,
			_ => self.inner.request(method, params).await,
		}
	}
}
