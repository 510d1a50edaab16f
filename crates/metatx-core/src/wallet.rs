//! Smart contract wallet support.
//!
//! Wallets are deployed by a factory at a counterfactual address derived from
//! the owner and an index. Transactions are executed through the wallet's
//! `execTransaction` with a signature from the owner.

use crate::error::CoreError;
use alloy::primitives::{Address, Bytes, B256, U256};
use alloy::sol;
use alloy::sol_types::SolCall;
use metatx_signature::{
	SignatureBuilder, SignatureError, SignatureParameters, SMART_WALLET_V_OFFSET,
};
use metatx_types::{eth_call, ProviderInterface, RpcError, SignatureType, TypeField};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;

sol! {
	interface IWalletFactory {
		function getAddressForCounterfactualWallet(address owner, uint256 index) external view returns (address);
		function isWalletExist(address wallet) external view returns (bool);
	}

	interface ISmartWallet {
		function owner() external view returns (address);
		function getNonce(uint256 batchId) external view returns (uint256);
		function getTransactionHash(
			address to,
			uint256 value,
			bytes data,
			uint8 operation,
			uint256 targetTxGas,
			uint256 baseGas,
			uint256 gasPrice,
			address gasToken,
			address refundReceiver,
			uint256 nonce
		) external view returns (bytes32);
		function execTransaction(
			address to,
			uint256 value,
			bytes data,
			uint8 operation,
			uint256 targetTxGas,
			uint256 baseGas,
			uint256 gasPrice,
			address gasToken,
			address refundReceiver,
			bytes signatures
		) external payable returns (bool success);
	}
}

/// Primary type of the wallet's EIP-712 transaction struct.
pub const WALLET_TX_TYPE: &str = "WalletTx";

/// Whether the owner's wallet is deployed, and where it lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletStatus {
	pub does_wallet_exist: bool,
	pub wallet_address: Address,
}

/// A call executed by the wallet on behalf of its owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecTransaction {
	pub to: Address,
	pub value: U256,
	pub data: Bytes,
	pub operation: u8,
	pub target_tx_gas: U256,
	pub base_gas: U256,
	pub gas_price: U256,
	pub gas_token: Address,
	pub refund_receiver: Address,
	pub nonce: U256,
}

impl ExecTransaction {
	fn hash_call(&self) -> ISmartWallet::getTransactionHashCall {
		ISmartWallet::getTransactionHashCall {
			to: self.to,
			value: self.value,
			data: self.data.clone(),
			operation: self.operation,
			targetTxGas: self.target_tx_gas,
			baseGas: self.base_gas,
			gasPrice: self.gas_price,
			gasToken: self.gas_token,
			refundReceiver: self.refund_receiver,
			nonce: self.nonce,
		}
	}

	fn exec_call(&self, signatures: Bytes) -> ISmartWallet::execTransactionCall {
		ISmartWallet::execTransactionCall {
			to: self.to,
			value: self.value,
			data: self.data.clone(),
			operation: self.operation,
			targetTxGas: self.target_tx_gas,
			baseGas: self.base_gas,
			gasPrice: self.gas_price,
			gasToken: self.gas_token,
			refundReceiver: self.refund_receiver,
			signatures,
		}
	}

	/// The EIP-712 document the owner signs, bound to `wallet` on `chain_id`.
	pub fn typed_data(&self, chain_id: u64, wallet: Address) -> Value {
		let domain_type = vec![
			TypeField::new("chainId", "uint256"),
			TypeField::new("verifyingContract", "address"),
		];
		let wallet_tx_type = vec![
			TypeField::new("to", "address"),
			TypeField::new("value", "uint256"),
			TypeField::new("data", "bytes"),
			TypeField::new("operation", "uint8"),
			TypeField::new("targetTxGas", "uint256"),
			TypeField::new("baseGas", "uint256"),
			TypeField::new("gasPrice", "uint256"),
			TypeField::new("gasToken", "address"),
			TypeField::new("refundReceiver", "address"),
			TypeField::new("nonce", "uint256"),
		];

		json!({
			"types": {
				"EIP712Domain": domain_type,
				WALLET_TX_TYPE: wallet_tx_type,
			},
			"domain": { "chainId": chain_id, "verifyingContract": wallet },
			"primaryType": WALLET_TX_TYPE,
			"message": {
				"to": self.to,
				"value": self.value.to_string(),
				"data": self.data,
				"operation": self.operation,
				"targetTxGas": self.target_tx_gas.to_string(),
				"baseGas": self.base_gas.to_string(),
				"gasPrice": self.gas_price.to_string(),
				"gasToken": self.gas_token,
				"refundReceiver": self.refund_receiver,
				"nonce": self.nonce.to_string(),
			},
		})
	}
}

/// Reads and drives smart contract wallets.
pub struct SmartWalletClient {
	reader: Arc<dyn ProviderInterface>,
	sender: Arc<dyn ProviderInterface>,
	signatures: SignatureBuilder,
	factory: Address,
	base_wallet: Address,
	chain_id: u64,
}

impl SmartWalletClient {
	/// `sender` receives the final `eth_sendTransaction`; it is normally the
	/// SDK provider so the call can be relayed.
	pub fn new(
		reader: Arc<dyn ProviderInterface>,
		sender: Arc<dyn ProviderInterface>,
		signatures: SignatureBuilder,
		factory: Address,
		base_wallet: Address,
		chain_id: u64,
	) -> Self {
		Self {
			reader,
			sender,
			signatures,
			factory,
			base_wallet,
			chain_id,
		}
	}

	pub fn factory(&self) -> Address {
		self.factory
	}

	pub fn base_wallet(&self) -> Address {
		self.base_wallet
	}

	async fn call<C: SolCall>(&self, to: Address, call: C) -> Result<C::Return, CoreError> {
		let output = eth_call(self.reader.as_ref(), to, call.abi_encode().into()).await?;
		C::abi_decode_returns(&output).map_err(|e| {
			CoreError::Provider(RpcError::internal(format!(
				"Failed to decode {} result: {}",
				C::SIGNATURE,
				e
			)))
		})
	}

	/// Looks up the counterfactual wallet of `owner` at `index`.
	pub async fn check_if_wallet_exists(
		&self,
		owner: Address,
		index: U256,
	) -> Result<WalletStatus, CoreError> {
		let wallet_address = self
			.call(
				self.factory,
				IWalletFactory::getAddressForCounterfactualWalletCall { owner, index },
			)
			.await?;
		let does_wallet_exist = self
			.call(
				self.factory,
				IWalletFactory::isWalletExistCall {
					wallet: wallet_address,
				},
			)
			.await?;

		tracing::debug!(%owner, %wallet_address, does_wallet_exist, "Checked smart wallet");
		Ok(WalletStatus {
			does_wallet_exist,
			wallet_address,
		})
	}

	pub async fn owner(&self, wallet: Address) -> Result<Address, CoreError> {
		self.call(wallet, ISmartWallet::ownerCall {}).await
	}

	/// A plain call from `wallet` to `to` with the wallet's next nonce in `batch_id`.
	pub async fn build_exec_transaction(
		&self,
		to: Address,
		value: U256,
		data: Bytes,
		wallet: Address,
		batch_id: U256,
	) -> Result<ExecTransaction, CoreError> {
		let nonce = self
			.call(wallet, ISmartWallet::getNonceCall { batchId: batch_id })
			.await?;

		Ok(ExecTransaction {
			to,
			value,
			data,
			operation: 0,
			target_tx_gas: U256::ZERO,
			base_gas: U256::ZERO,
			gas_price: U256::ZERO,
			gas_token: Address::ZERO,
			refund_receiver: Address::ZERO,
			nonce,
		})
	}

	/// Signs `tx` as `owner` and sends `execTransaction` to `wallet`.
	///
	/// A supplied signature is used as is. The personal path signs the
	/// wallet's own transaction hash and adds 4 to `v`, which the wallet
	/// contract reads as an `eth_sign` signature.
	pub async fn send_wallet_transaction(
		&self,
		owner: Address,
		tx: &ExecTransaction,
		wallet: Address,
		scheme: SignatureType,
		signature: Option<String>,
	) -> Result<Value, CoreError> {
		let signature = match (signature, scheme) {
			(Some(signature), _) => signature,
			(None, SignatureType::Personal) => {
				let hash: B256 = self.call(wallet, tx.hash_call()).await?;
				let signed = self.signatures.sign_personal(owner, hash).await?;
				SignatureParameters::parse(&signed)?
					.with_v_offset(SMART_WALLET_V_OFFSET)
					.to_hex()
			}
			(None, SignatureType::Eip712) => {
				self.signatures
					.sign_typed_data(owner, &tx.typed_data(self.chain_id, wallet), None)
					.await?
			}
		};

		let signatures: Bytes = signature
			.parse()
			.map_err(|e: alloy::primitives::hex::FromHexError| SignatureError::InvalidHex(e.to_string()))?;
		let data = Bytes::from(tx.exec_call(signatures).abi_encode());
		tracing::info!(%owner, %wallet, to = %tx.to, "Sending smart wallet transaction");

		Ok(self
			.sender
			.request(
				"eth_sendTransaction",
				json!([{ "from": owner, "to": wallet, "data": data }]),
			)
			.await?)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::test_support::*;
	use crate::RegistrationPolicy;
	use alloy::primitives::Signature;
	use alloy::sol_types::{eip712_domain, SolStruct, SolValue};
	use async_trait::async_trait;
	use std::sync::Mutex;

	const FACTORY: Address = Address::with_last_byte(0xfa);
	const BASE_WALLET: Address = Address::with_last_byte(0xba);
	const WALLET: Address = Address::with_last_byte(0xcc);

	sol! {
		struct WalletTx {
			address to;
			uint256 value;
			bytes data;
			uint8 operation;
			uint256 targetTxGas;
			uint256 baseGas;
			uint256 gasPrice;
			address gasToken;
			address refundReceiver;
			uint256 nonce;
		}
	}

	#[derive(Default)]
	struct Sender {
		sent: Mutex<Vec<Value>>,
	}

	#[async_trait]
	impl ProviderInterface for Sender {
		async fn request(&self, method: &str, params: Value) -> Result<Value, RpcError> {
			assert_eq!(method, "eth_sendTransaction");
			self.sent.lock().unwrap().push(params);
			Ok(json!(WALLET_HASH))
		}
	}

	async fn client() -> (Harness, Arc<Sender>, SmartWalletClient) {
		let harness = Harness::start(RegistrationPolicy::Lenient, accepted("tx1")).await;
		let sender = Arc::new(Sender::default());
		let client = SmartWalletClient::new(
			harness.chain.clone(),
			sender.clone(),
			SignatureBuilder::new(harness.wallet.clone()),
			FACTORY,
			BASE_WALLET,
			CHAIN_ID,
		);
		(harness, sender, client)
	}

	fn sent_signature(sender: &Sender) -> [u8; 65] {
		let sent = sender.sent.lock().unwrap();
		assert_eq!(sent.len(), 1);
		assert_eq!(sent[0][0]["to"], json!(WALLET));
		let data: Bytes = serde_json::from_value(sent[0][0]["data"].clone()).unwrap();
		let call = ISmartWallet::execTransactionCall::abi_decode(&data).unwrap();
		call.signatures[..].try_into().unwrap()
	}

	#[tokio::test]
	async fn test_wallet_lookup() {
		let (harness, _, client) = client().await;
		harness.chain.respond(
			IWalletFactory::getAddressForCounterfactualWalletCall::SELECTOR,
			WALLET.abi_encode(),
		);
		harness
			.chain
			.respond(IWalletFactory::isWalletExistCall::SELECTOR, true.abi_encode());

		let status = client.check_if_wallet_exists(user(), U256::ZERO).await.unwrap();
		assert_eq!(
			status,
			WalletStatus {
				does_wallet_exist: true,
				wallet_address: WALLET,
			}
		);
	}

	#[tokio::test]
	async fn test_exec_transaction_uses_wallet_nonce() {
		let (harness, _, client) = client().await;
		harness
			.chain
			.respond(ISmartWallet::getNonceCall::SELECTOR, U256::from(4).abi_encode());

		let tx = client
			.build_exec_transaction(TARGET, U256::ZERO, set_quote_calldata("hi"), WALLET, U256::ZERO)
			.await
			.unwrap();
		assert_eq!(tx.nonce, U256::from(4));
		assert_eq!(tx.operation, 0);
		assert_eq!(tx.gas_token, Address::ZERO);
	}

	#[tokio::test]
	async fn test_personal_path_adds_four_to_v() {
		let (harness, sender, client) = client().await;
		let hash = B256::repeat_byte(0x42);
		harness
			.chain
			.respond(ISmartWallet::getTransactionHashCall::SELECTOR, hash.abi_encode());
		harness
			.chain
			.respond(ISmartWallet::getNonceCall::SELECTOR, U256::from(1).abi_encode());

		let tx = client
			.build_exec_transaction(TARGET, U256::ZERO, set_quote_calldata("hi"), WALLET, U256::ZERO)
			.await
			.unwrap();
		let result = client
			.send_wallet_transaction(user(), &tx, WALLET, SignatureType::Personal, None)
			.await
			.unwrap();
		assert_eq!(result, json!(WALLET_HASH));

		let mut signature = sent_signature(&sender);
		assert!(signature[64] == 31 || signature[64] == 32);
		signature[64] -= SMART_WALLET_V_OFFSET;
		let recovered = Signature::from_raw(&signature)
			.unwrap()
			.recover_address_from_msg(hash.as_slice())
			.unwrap();
		assert_eq!(recovered, user());
	}

	#[tokio::test]
	async fn test_eip712_path_signs_wallet_tx() {
		let (harness, sender, client) = client().await;
		harness
			.chain
			.respond(ISmartWallet::getNonceCall::SELECTOR, U256::from(2).abi_encode());

		let tx = client
			.build_exec_transaction(TARGET, U256::from(5), set_quote_calldata("hi"), WALLET, U256::ZERO)
			.await
			.unwrap();
		client
			.send_wallet_transaction(user(), &tx, WALLET, SignatureType::Eip712, None)
			.await
			.unwrap();

		let typed = WalletTx {
			to: tx.to,
			value: tx.value,
			data: tx.data.clone(),
			operation: tx.operation,
			targetTxGas: tx.target_tx_gas,
			baseGas: tx.base_gas,
			gasPrice: tx.gas_price,
			gasToken: tx.gas_token,
			refundReceiver: tx.refund_receiver,
			nonce: tx.nonce,
		};
		let domain = eip712_domain! {
			chain_id: CHAIN_ID,
			verifying_contract: WALLET,
		};
		let signature = sent_signature(&sender);
		assert!(signature[64] == 27 || signature[64] == 28);
		let recovered = Signature::from_raw(&signature)
			.unwrap()
			.recover_address_from_prehash(&typed.eip712_signing_hash(&domain))
			.unwrap();
		assert_eq!(recovered, user());
		assert_eq!(harness.chain.count("eth_call"), 1);
	}

	#[tokio::test]
	async fn test_supplied_signature_skips_signing() {
		let (harness, sender, client) = client().await;
		let tx = ExecTransaction {
			to: TARGET,
			value: U256::ZERO,
			data: Bytes::new(),
			operation: 0,
			target_tx_gas: U256::ZERO,
			base_gas: U256::ZERO,
			gas_price: U256::ZERO,
			gas_token: Address::ZERO,
			refund_receiver: Address::ZERO,
			nonce: U256::ZERO,
		};
		let supplied = format!("0x{}{}1b", "11".repeat(32), "22".repeat(32));

		client
			.send_wallet_transaction(user(), &tx, WALLET, SignatureType::Personal, Some(supplied))
			.await
			.unwrap();

		assert_eq!(sent_signature(&sender)[64], 27);
		assert_eq!(harness.chain.count("eth_call"), 0);
	}
}
