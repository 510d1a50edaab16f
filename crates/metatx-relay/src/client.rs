//! HTTP client for the relayer API.

use crate::RelayError;
use alloy::primitives::Address;
use metatx_types::{
	DappRegistration, ErrorCode, RelayRequestEnvelope, SdkError, SystemInfo, NATIVE_META_TX_URL,
};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;

const JSON_UTF8: &str = "application/json;charset=utf-8";
const DAPP_DATA_PATH: &str = "/api/v1/sdk/dapp";
const SYSTEM_INFO_PATH: &str = "/api/v1/systemInfo";

/// Raw body of a meta-transaction submission response.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayResponse {
	#[serde(default)]
	pub transaction_id: Option<String>,
	#[serde(default)]
	pub flag: Option<i64>,
	#[serde(default)]
	pub tx_hash: Option<String>,
	#[serde(default)]
	pub log: Option<String>,
	#[serde(default)]
	pub message: Option<String>,
	#[serde(default)]
	pub code: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct DappDataEnvelope {
	data: Option<DappRegistration>,
	#[serde(default)]
	log: Option<String>,
	#[serde(default)]
	message: Option<String>,
}

#[derive(Deserialize)]
struct SystemInfoEnvelope {
	response: SystemInfoBody,
}

#[derive(Deserialize)]
struct SystemInfoBody {
	code: serde_json::Value,
	#[serde(default)]
	data: Option<SystemInfo>,
}

/// Client for the dashboard, system-info and meta-transaction endpoints.
#[derive(Clone)]
pub struct RelayClient {
	client: reqwest::Client,
	base_url: String,
	dapp_api_url: Option<String>,
	api_key: String,
	sdk_version: String,
}

impl RelayClient {
	pub fn new(
		base_url: impl Into<String>,
		api_key: impl Into<String>,
		timeout: Duration,
	) -> Result<Self, RelayError> {
		let client = reqwest::Client::builder()
			.timeout(timeout)
			.build()
			.map_err(|e| RelayError::Http(format!("Failed to build HTTP client: {}", e)))?;

		Ok(Self {
			client,
			base_url: base_url.into().trim_end_matches('/').to_string(),
			dapp_api_url: None,
			api_key: api_key.into(),
			sdk_version: env!("CARGO_PKG_VERSION").to_string(),
		})
	}

	/// Uses a separately hosted dApp registration endpoint.
	pub fn with_dapp_api_url(mut self, url: Option<String>) -> Self {
		self.dapp_api_url = url;
		self
	}

	pub fn with_sdk_version(mut self, version: impl Into<String>) -> Self {
		self.sdk_version = version.into();
		self
	}

	pub fn base_url(&self) -> &str {
		&self.base_url
	}

	fn headers(&self) -> Result<HeaderMap, RelayError> {
		let mut headers = HeaderMap::new();
		headers.insert(CONTENT_TYPE, HeaderValue::from_static(JSON_UTF8));
		headers.insert(
			"x-api-key",
			HeaderValue::from_str(&self.api_key)
				.map_err(|e| RelayError::Http(format!("Invalid API key header: {}", e)))?,
		);
		headers.insert(
			"version",
			HeaderValue::from_str(&self.sdk_version)
				.map_err(|e| RelayError::Http(format!("Invalid version header: {}", e)))?,
		);
		Ok(headers)
	}

	async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, RelayError> {
		let status = response.status();
		let body = response
			.text()
			.await
			.map_err(|e| RelayError::Http(e.to_string()))?;
		serde_json::from_str(&body).map_err(|e| RelayError::InvalidResponse {
			status: status.as_u16(),
			message: format!("{}: {}", e, body),
		})
	}

	/// Fetches the dApp registration for this API key.
	pub async fn get_dapp_registration(
		&self,
		contract_addresses: &[Address],
	) -> Result<DappRegistration, RelayError> {
		let url = self
			.dapp_api_url
			.clone()
			.unwrap_or_else(|| format!("{}{}", self.base_url, DAPP_DATA_PATH));
		let query: Vec<(&str, String)> = contract_addresses
			.iter()
			.map(|address| ("contractAddresses", address.to_string().to_lowercase()))
			.collect();

		tracing::debug!(%url, contracts = contract_addresses.len(), "Fetching dApp registration");
		let response = self
			.client
			.get(&url)
			.headers(self.headers()?)
			.query(&query)
			.send()
			.await
			.map_err(|e| RelayError::Http(e.to_string()))?;

		let envelope: DappDataEnvelope = Self::read_json(response).await?;
		envelope.data.ok_or_else(|| {
			RelayError::Api(SdkError::new(
				ErrorCode::DappNotFound,
				envelope
					.log
					.or(envelope.message)
					.unwrap_or_else(|| "No dApp data returned for API key".to_string()),
			))
		})
	}

	/// Fetches forwarder and signing metadata for `network_id`.
	pub async fn get_system_info(&self, network_id: u64) -> Result<SystemInfo, RelayError> {
		let url = format!("{}{}", self.base_url, SYSTEM_INFO_PATH);
		tracing::debug!(%url, network_id, "Fetching system info");
		let response = self
			.client
			.get(&url)
			.header(CONTENT_TYPE, JSON_UTF8)
			.query(&[("networkId", network_id)])
			.send()
			.await
			.map_err(|e| RelayError::Http(e.to_string()))?;

		let envelope: SystemInfoEnvelope = Self::read_json(response).await?;
		let ok = match &envelope.response.code {
			serde_json::Value::String(code) => code == "200",
			serde_json::Value::Number(code) => code.as_i64() == Some(200),
			_ => false,
		};
		match envelope.response.data {
			Some(info) if ok => Ok(info),
			_ => Err(RelayError::Api(SdkError::new(
				ErrorCode::ErrorResponse,
				"System info API call failed",
			))),
		}
	}

	/// Posts an envelope to the native meta-transaction endpoint.
	pub async fn send_meta_transaction(
		&self,
		envelope: &RelayRequestEnvelope,
	) -> Result<RelayResponse, RelayError> {
		let url = format!("{}{}", self.base_url, NATIVE_META_TX_URL);
		let body = serde_json::to_vec(envelope)
			.map_err(|e| RelayError::Http(format!("Failed to encode request: {}", e)))?;

		tracing::info!(from = %envelope.from, to = %envelope.to, api_id = %envelope.api_id, "Submitting meta transaction");
		let response = self
			.client
			.post(&url)
			.headers(self.headers()?)
			.body(body)
			.send()
			.await
			.map_err(|e| RelayError::Http(e.to_string()))?;

		let status = response.status();
		let mut relay: RelayResponse = Self::read_json(response).await?;
		if relay.flag.is_none() && relay.code.is_none() && !status.is_success() {
			relay.flag = Some(i64::from(status.as_u16()));
		}
		Ok(relay)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;
	use wiremock::matchers::{header, method, path, query_param};
	use wiremock::{Mock, MockServer, ResponseTemplate};

	fn client(server: &MockServer) -> RelayClient {
		RelayClient::new(server.uri(), "test-key", Duration::from_secs(5))
			.unwrap()
			.with_sdk_version("3.0.0")
	}

	#[tokio::test]
	async fn test_dapp_registration_request() {
		let server = MockServer::start().await;
		Mock::given(method("GET"))
			.and(path("/api/v1/sdk/dapp"))
			.and(header("x-api-key", "test-key"))
			.and(header("version", "3.0.0"))
			.and(query_param(
				"contractAddresses",
				"0x00000000000000000000000000000000000000aa",
			))
			.respond_with(ResponseTemplate::new(200).set_body_json(json!({
				"log": "Dapp data fetched",
				"data": {
					"dapp": { "_id": "dapp-1", "networkId": "5" },
					"smartContracts": [],
					"metaApis": []
				}
			})))
			.expect(1)
			.mount(&server)
			.await;

		let registration = client(&server)
			.get_dapp_registration(&[Address::with_last_byte(0xaa)])
			.await
			.unwrap();
		assert_eq!(registration.dapp.id, "dapp-1");
		assert_eq!(registration.dapp.network_id, 5);
	}

	#[tokio::test]
	async fn test_missing_dapp_data_is_dapp_not_found() {
		let server = MockServer::start().await;
		Mock::given(method("GET"))
			.and(path("/api/v1/sdk/dapp"))
			.respond_with(ResponseTemplate::new(404).set_body_json(json!({
				"log": "Dapp not found"
			})))
			.mount(&server)
			.await;

		let err = client(&server).get_dapp_registration(&[]).await.unwrap_err();
		match err {
			RelayError::Api(sdk) => {
				assert_eq!(sdk.code, ErrorCode::DappNotFound);
				assert_eq!(sdk.message, "Dapp not found");
			}
			other => panic!("unexpected error {:?}", other),
		}
	}

	#[tokio::test]
	async fn test_system_info() {
		let server = MockServer::start().await;
		Mock::given(method("GET"))
			.and(path("/api/v1/systemInfo"))
			.and(query_param("networkId", "5"))
			.respond_with(ResponseTemplate::new(200).set_body_json(json!({
				"response": {
					"code": "200",
					"data": {
						"biconomyForwarderAddress": "0x00000000000000000000000000000000000000f0",
						"biconomyForwarderAddresses": ["0x00000000000000000000000000000000000000f0"],
						"eip712Sign": "EIP712_SIGN",
						"personalSign": "PERSONAL_SIGN"
					}
				}
			})))
			.mount(&server)
			.await;

		let info = client(&server).get_system_info(5).await.unwrap();
		assert_eq!(info.forwarder_address, Some(Address::with_last_byte(0xf0)));
		assert_eq!(info.forwarder_addresses.unwrap().len(), 1);
	}

	#[tokio::test]
	async fn test_system_info_failure_code() {
		let server = MockServer::start().await;
		Mock::given(method("GET"))
			.and(path("/api/v1/systemInfo"))
			.respond_with(ResponseTemplate::new(200).set_body_json(json!({
				"response": { "code": "500" }
			})))
			.mount(&server)
			.await;

		assert!(matches!(
			client(&server).get_system_info(5).await,
			Err(RelayError::Api(_))
		));
	}

	#[tokio::test]
	async fn test_non_json_body_is_invalid_response() {
		let server = MockServer::start().await;
		Mock::given(method("POST"))
			.respond_with(ResponseTemplate::new(502).set_body_string("Bad Gateway"))
			.mount(&server)
			.await;

		let envelope = RelayRequestEnvelope::direct(
			Address::with_last_byte(1),
			"api-1",
			Address::with_last_byte(2),
			None,
			vec![],
		);
		assert!(matches!(
			client(&server).send_meta_transaction(&envelope).await,
			Err(RelayError::InvalidResponse { status: 502, .. })
		));
	}
}
