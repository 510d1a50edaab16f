//! Fixtures shared by the unit tests of this crate.

use crate::{RegistrationContext, RegistrationPolicy, TransactionClassifier};
use alloy::primitives::{address, Address, Bytes, B256, U256};
use alloy::sol;
use alloy::sol_types::{SolCall, SolValue};
use async_trait::async_trait;
use metatx_account::implementations::local::LocalWallet;
use metatx_account::WalletProvider;
use metatx_forwarder::{ForwarderResolver, IBiconomyForwarder, IERC2771Recipient};
use metatx_relay::{RelayClient, RelayDispatcher, TransactionWatcher};
use metatx_signature::{default_domain_type, default_request_type, SignatureBuilder};
use metatx_types::{
	DappRegistration, EventBus, ForwarderDomainData, ProviderInterface, RpcError, SystemInfo,
	NATIVE_META_TX_URL,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
pub const TARGET: Address = Address::with_last_byte(0xaa);
pub const DIRECT_TARGET: Address = Address::with_last_byte(0xbb);
pub const WALLET: Address = Address::with_last_byte(0xcc);
pub const FORWARDER: Address = Address::with_last_byte(0xf0);
pub const ESTIMATE: u64 = 100_000;
pub const NONCE: u64 = 7;
pub const CHAIN_ID: u64 = 5;
pub const WALLET_HASH: &str = "0x1111111111111111111111111111111111111111111111111111111111111111";

const QUOTE_ABI: &str = r#"[
	{"type":"function","name":"setQuote","stateMutability":"nonpayable","inputs":[{"name":"newQuote","type":"string"}],"outputs":[]},
	{"type":"function","name":"unregistered","stateMutability":"nonpayable","inputs":[],"outputs":[]}
]"#;

const WALLET_ABI: &str = r#"[
	{"type":"function","name":"execute","stateMutability":"nonpayable","inputs":[{"name":"payload","type":"bytes"}],"outputs":[]}
]"#;

sol! {
	function setQuote(string newQuote);
	function unregistered();
	function execute(bytes payload);
}

pub fn user() -> Address {
	address!("f39Fd6e51aad88F6F4ce6aB8827279cffFb92266")
}

pub fn set_quote_calldata(quote: &str) -> Bytes {
	setQuoteCall {
		newQuote: quote.to_string(),
	}
	.abi_encode()
	.into()
}

pub fn unregistered_calldata() -> Bytes {
	unregisteredCall {}.abi_encode().into()
}

pub fn execute_calldata(payload: &[u8]) -> Bytes {
	executeCall {
		payload: payload.to_vec().into(),
	}
	.abi_encode()
	.into()
}

/// The default registration plus a smart contract wallet deployed at [`WALLET`].
pub fn wallet_registration() -> DappRegistration {
	let mut registration = registration();
	let extra: DappRegistration = serde_json::from_value(json!({
		"dapp": { "_id": "dapp-1", "networkId": CHAIN_ID },
		"smartContracts": [
			{ "address": WALLET, "abi": WALLET_ABI, "metaTransactionType": "EIP2771", "type": "SCW" }
		],
		"metaApis": [
			{ "id": "api-wallet", "contractAddress": WALLET, "method": "execute", "url": NATIVE_META_TX_URL, "contractType": "SCW" }
		]
	}))
	.unwrap();
	registration.smart_contracts.extend(extra.smart_contracts);
	registration.meta_apis.extend(extra.meta_apis);
	registration
}

pub fn registration() -> DappRegistration {
	serde_json::from_value(json!({
		"dapp": { "_id": "dapp-1", "networkId": CHAIN_ID.to_string() },
		"smartContracts": [
			{ "address": TARGET, "abi": QUOTE_ABI, "metaTransactionType": "EIP2771" },
			{ "address": DIRECT_TARGET, "abi": QUOTE_ABI, "metaTransactionType": "DEFAULT" }
		],
		"metaApis": [
			{ "id": "api-quote", "contractAddress": TARGET, "method": "setQuote", "url": NATIVE_META_TX_URL },
			{ "id": "api-direct", "contractAddress": DIRECT_TARGET, "method": "setQuote", "url": NATIVE_META_TX_URL }
		]
	}))
	.unwrap()
}

pub fn system_info() -> SystemInfo {
	let template = ForwarderDomainData {
		name: "Biconomy Forwarder".into(),
		version: "1".into(),
		chain_id: None,
		verifying_contract: Address::ZERO,
		salt: Some(B256::left_padding_from(&[CHAIN_ID as u8])),
	};
	SystemInfo {
		forwarder_domain_type: Some(default_domain_type()),
		forward_request_type: Some(default_request_type()),
		forwarder_domain_data: Some(template.clone()),
		forwarder_domain_details: Some(HashMap::from([(FORWARDER, template)])),
		forwarder_address: Some(FORWARDER),
		forwarder_addresses: Some(vec![FORWARDER]),
		..SystemInfo::default()
	}
}

pub fn context() -> RegistrationContext {
	RegistrationContext::from_registration(&registration())
		.unwrap()
		.with_system_info(system_info())
}

pub fn accepted(transaction_id: &str) -> ResponseTemplate {
	ResponseTemplate::new(200).set_body_json(json!({
		"transactionId": transaction_id,
		"flag": 200,
		"log": "Meta transaction sent to blockchain"
	}))
}

pub fn rejected(message: &str) -> ResponseTemplate {
	ResponseTemplate::new(400).set_body_json(json!({ "flag": 400, "log": message }))
}

/// Node double: answers the calls the relay pipeline makes and records them.
#[derive(Default)]
pub struct Chain {
	calls: Mutex<Vec<(String, Value)>>,
	call_outputs: Mutex<HashMap<[u8; 4], Vec<u8>>>,
	estimation_fails: AtomicBool,
}

impl Chain {
	pub fn fail_estimation(&self) {
		self.estimation_fails.store(true, Ordering::SeqCst);
	}

	/// Answers `eth_call` with `output` for calls starting with `selector`.
	pub fn respond(&self, selector: [u8; 4], output: Vec<u8>) {
		self.call_outputs.lock().unwrap().insert(selector, output);
	}

	pub fn calls(&self, method: &str) -> Vec<Value> {
		self.calls
			.lock()
			.unwrap()
			.iter()
			.filter(|(m, _)| m == method)
			.map(|(_, params)| params.clone())
			.collect()
	}

	pub fn count(&self, method: &str) -> usize {
		self.calls(method).len()
	}

	fn call(&self, params: &Value) -> Result<Value, RpcError> {
		let data: Bytes = serde_json::from_value(params[0]["data"].clone()).unwrap();
		let selector: [u8; 4] = data[..4].try_into().unwrap();

		let output = if selector == IERC2771Recipient::isTrustedForwarderCall::SELECTOR {
			let call = IERC2771Recipient::isTrustedForwarderCall::abi_decode(&data).unwrap();
			(call.forwarder == FORWARDER).abi_encode()
		} else if selector == IBiconomyForwarder::getNonceCall::SELECTOR {
			U256::from(NONCE).abi_encode()
		} else if let Some(output) = self.call_outputs.lock().unwrap().get(&selector) {
			output.clone()
		} else {
			return Err(RpcError::transport("execution reverted"));
		};
		Ok(json!(Bytes::from(output)))
	}
}

#[async_trait]
impl ProviderInterface for Chain {
	async fn request(&self, method: &str, params: Value) -> Result<Value, RpcError> {
		self.calls
			.lock()
			.unwrap()
			.push((method.to_string(), params.clone()));
		match method {
			"eth_chainId" => Ok(json!(format!("{:#x}", CHAIN_ID))),
			"eth_estimateGas" if self.estimation_fails.load(Ordering::SeqCst) => {
				Err(RpcError::internal("execution reverted"))
			}
			"eth_estimateGas" => Ok(json!(format!("{:#x}", ESTIMATE))),
			"eth_call" => self.call(&params),
			"eth_getTransactionCount" => Ok(json!("0x3")),
			"eth_gasPrice" => Ok(json!("0x3b9aca00")),
			"eth_sendRawTransaction" => Ok(json!(WALLET_HASH)),
			"eth_blockNumber" => Ok(json!("0x10")),
			other => Err(RpcError::internal(format!("unexpected {}", other))),
		}
	}
}

/// Records the relay transaction ids handed to it.
#[derive(Default)]
pub struct RecordingWatcher {
	pub watched: Mutex<Vec<String>>,
}

impl TransactionWatcher for RecordingWatcher {
	fn watch(&self, transaction_id: &str) {
		self.watched.lock().unwrap().push(transaction_id.to_string());
	}
}

/// A classifier wired to a mock relayer, a node double and a local wallet.
pub struct Harness {
	pub server: MockServer,
	pub chain: Arc<Chain>,
	pub wallet: Arc<WalletProvider>,
	pub events: EventBus,
	pub watcher: Arc<RecordingWatcher>,
	pub classifier: Arc<TransactionClassifier>,
}

impl Harness {
	pub async fn start(policy: RegistrationPolicy, relay_response: ResponseTemplate) -> Self {
		Self::start_with(context(), policy, relay_response).await
	}

	pub async fn start_with(
		context: RegistrationContext,
		policy: RegistrationPolicy,
		relay_response: ResponseTemplate,
	) -> Self {
		let server = MockServer::start().await;
		Mock::given(method("POST"))
			.and(path(NATIVE_META_TX_URL))
			.respond_with(relay_response)
			.mount(&server)
			.await;

		let chain = Arc::new(Chain::default());
		let wallet = Arc::new(WalletProvider::new(
			Box::new(LocalWallet::new(KEY).unwrap()),
			chain.clone(),
		));
		let context = Arc::new(context);
		let resolver = ForwarderResolver::new(
			chain.clone(),
			context.interfaces.clone().unwrap(),
			vec![FORWARDER],
			FORWARDER,
		);
		let client = RelayClient::new(server.uri(), "test-key", Duration::from_secs(5)).unwrap();
		let events = EventBus::new(16);
		let watcher = Arc::new(RecordingWatcher::default());
		let classifier = TransactionClassifier::new(
			context,
			policy,
			chain.clone(),
			SignatureBuilder::new(wallet.clone()),
			RelayDispatcher::new(client).with_watcher(watcher.clone()),
			events.clone(),
		)
		.with_forwarder_resolver(Arc::new(resolver));

		Self {
			server,
			chain,
			wallet,
			events,
			watcher,
			classifier: Arc::new(classifier),
		}
	}

	/// Bodies posted to the native meta-transaction endpoint, in order.
	pub async fn relayed_envelopes(&self) -> Vec<Value> {
		self.server
			.received_requests()
			.await
			.unwrap_or_default()
			.iter()
			.filter(|request| request.url.path() == NATIVE_META_TX_URL)
			.map(|request| serde_json::from_slice(&request.body).unwrap())
			.collect()
	}
}
