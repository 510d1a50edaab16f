//! Submits relay envelopes and classifies the relayer's answer.

use crate::client::{RelayClient, RelayResponse};
use crate::{RelayError, TransactionWatcher};
use metatx_types::{
	relay_flags, ErrorCode, FallbackReason, RelayOutcome, RelayReceipt, RelayRequestEnvelope,
	SdkError,
};
use std::sync::Arc;

/// Sends meta-transactions and hands accepted ones to the watcher.
#[derive(Clone)]
pub struct RelayDispatcher {
	client: RelayClient,
	watcher: Option<Arc<dyn TransactionWatcher>>,
}

impl RelayDispatcher {
	pub fn new(client: RelayClient) -> Self {
		Self {
			client,
			watcher: None,
		}
	}

	pub fn with_watcher(mut self, watcher: Arc<dyn TransactionWatcher>) -> Self {
		self.watcher = Some(watcher);
		self
	}

	pub fn client(&self) -> &RelayClient {
		&self.client
	}

	/// Posts `envelope` and maps the response to an outcome.
	///
	/// Transport failures are returned as errors and never retried.
	pub async fn dispatch(&self, envelope: &RelayRequestEnvelope) -> Result<RelayOutcome, RelayError> {
		let response = match self.client.send_meta_transaction(envelope).await {
			Ok(response) => response,
			Err(e) => {
				tracing::error!(error = %e, to = %envelope.to, "Relay request failed");
				return Err(e);
			}
		};
		self.classify(response)
	}

	fn classify(&self, response: RelayResponse) -> Result<RelayOutcome, RelayError> {
		let flag = response.flag;

		if let (Some(transaction_id), Some(relay_flags::SUCCESS)) = (&response.transaction_id, flag) {
			tracing::info!(transaction_id = %transaction_id, "Meta transaction accepted");
			if let Some(watcher) = &self.watcher {
				watcher.watch(transaction_id);
			}
			return Ok(RelayOutcome::Relayed(receipt(&response)));
		}

		if response.tx_hash.is_some() || flag == Some(relay_flags::ACTION_COMPLETE) {
			tracing::info!(tx_hash = ?response.tx_hash, "Meta transaction relayed");
			return Ok(RelayOutcome::Relayed(receipt(&response)));
		}

		if flag == Some(relay_flags::BAD_REQUEST) {
			let message = response
				.log
				.or(response.message)
				.unwrap_or_else(|| "Bad request".to_string());
			tracing::warn!(%message, "Relayer rejected request, falling back");
			return Ok(RelayOutcome::Fallback(FallbackReason::RelayBadRequest(message)));
		}

		let code = match (flag, &response.code) {
			(Some(relay_flags::USER_CONTRACT_NOT_FOUND), _) => ErrorCode::UserContractNotFound,
			(Some(flag), _) => ErrorCode::Relay(flag.to_string()),
			(None, Some(serde_json::Value::String(code))) => ErrorCode::parse(code),
			(None, Some(code)) => ErrorCode::Relay(code.to_string()),
			(None, None) => ErrorCode::ErrorResponse,
		};
		let message = response
			.log
			.or(response.message)
			.unwrap_or_else(|| "Relay request failed".to_string());
		tracing::error!(code = %code, %message, "Relayer returned an error");
		Err(RelayError::Api(SdkError::new(code, message)))
	}
}

fn receipt(response: &RelayResponse) -> RelayReceipt {
	RelayReceipt {
		transaction_id: response.transaction_id.clone(),
		tx_hash: response.tx_hash.clone(),
		flag: response.flag.unwrap_or(relay_flags::SUCCESS),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use alloy::primitives::Address;
	use serde_json::json;
	use std::sync::Mutex;
	use std::time::Duration;
	use wiremock::matchers::{body_partial_json, header, method, path};
	use wiremock::{Mock, MockServer, ResponseTemplate};

	#[derive(Default)]
	struct RecordingWatcher {
		ids: Mutex<Vec<String>>,
	}

	impl TransactionWatcher for RecordingWatcher {
		fn watch(&self, transaction_id: &str) {
			self.ids.lock().unwrap().push(transaction_id.to_string());
		}
	}

	fn envelope() -> RelayRequestEnvelope {
		RelayRequestEnvelope::direct(
			Address::with_last_byte(1),
			"api-1",
			Address::with_last_byte(0xaa),
			Some("0x30d40".into()),
			vec![json!("hello")],
		)
	}

	async fn setup(body: serde_json::Value, status: u16) -> (MockServer, RelayDispatcher, Arc<RecordingWatcher>) {
		let server = MockServer::start().await;
		Mock::given(method("POST"))
			.and(path("/api/v2/meta-tx/native"))
			.and(header("x-api-key", "test-key"))
			.and(header("content-type", "application/json;charset=utf-8"))
			.and(body_partial_json(json!({ "apiId": "api-1", "gasLimit": "0x30d40" })))
			.respond_with(ResponseTemplate::new(status).set_body_json(body))
			.expect(1)
			.mount(&server)
			.await;

		let watcher = Arc::new(RecordingWatcher::default());
		let client = RelayClient::new(server.uri(), "test-key", Duration::from_secs(5)).unwrap();
		let dispatcher = RelayDispatcher::new(client).with_watcher(watcher.clone());
		(server, dispatcher, watcher)
	}

	#[tokio::test]
	async fn test_accepted_transaction_is_watched() {
		let (_server, dispatcher, watcher) =
			setup(json!({ "transactionId": "tx123", "flag": 200 }), 200).await;

		let outcome = dispatcher.dispatch(&envelope()).await.unwrap();
		match outcome {
			RelayOutcome::Relayed(receipt) => {
				assert_eq!(receipt.transaction_id.as_deref(), Some("tx123"));
				assert_eq!(receipt.result_value(), json!("tx123"));
			}
			other => panic!("unexpected outcome {:?}", other),
		}
		assert_eq!(*watcher.ids.lock().unwrap(), vec!["tx123".to_string()]);
	}

	#[tokio::test]
	async fn test_tx_hash_and_action_complete_are_success() {
		let (_server, dispatcher, watcher) =
			setup(json!({ "txHash": "0xabc", "flag": 144 }), 200).await;
		let outcome = dispatcher.dispatch(&envelope()).await.unwrap();
		assert!(matches!(outcome, RelayOutcome::Relayed(ref r) if r.tx_hash.as_deref() == Some("0xabc")));
		assert!(watcher.ids.lock().unwrap().is_empty());

		let (_server, dispatcher, _) = setup(json!({ "flag": 143 }), 200).await;
		assert!(matches!(
			dispatcher.dispatch(&envelope()).await.unwrap(),
			RelayOutcome::Relayed(_)
		));
	}

	#[tokio::test]
	async fn test_bad_request_falls_back() {
		let (_server, dispatcher, _) =
			setup(json!({ "flag": 400, "log": "invalid params" }), 400).await;
		assert_eq!(
			dispatcher.dispatch(&envelope()).await.unwrap(),
			RelayOutcome::Fallback(FallbackReason::RelayBadRequest("invalid params".into()))
		);
	}

	#[tokio::test]
	async fn test_error_flags_map_to_codes() {
		let (_server, dispatcher, _) =
			setup(json!({ "flag": 148, "log": "user contract missing" }), 200).await;
		match dispatcher.dispatch(&envelope()).await {
			Err(RelayError::Api(err)) => {
				assert_eq!(err.code.as_str(), "B502");
				assert_eq!(err.message, "user contract missing");
			}
			other => panic!("unexpected result {:?}", other),
		}

		let (_server, dispatcher, _) =
			setup(json!({ "code": 417, "message": "gas estimation failed" }), 417).await;
		match dispatcher.dispatch(&envelope()).await {
			Err(RelayError::Api(err)) => {
				assert_eq!(err.code, ErrorCode::Relay("417".into()));
				assert_eq!(err.message, "gas estimation failed");
			}
			other => panic!("unexpected result {:?}", other),
		}
	}

	#[tokio::test]
	async fn test_transport_failure_is_an_error() {
		let client =
			RelayClient::new("http://127.0.0.1:1", "test-key", Duration::from_secs(2)).unwrap();
		let dispatcher = RelayDispatcher::new(client);
		assert!(matches!(
			dispatcher.dispatch(&envelope()).await,
			Err(RelayError::Http(_))
		));
	}
}
