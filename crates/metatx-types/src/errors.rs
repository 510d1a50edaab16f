//! Structured SDK error codes.
//!
//! Every failure the SDK reports to a dApp carries a stable `{code, message}`
//! pair. Codes prefixed with `B` are defined by the SDK itself; anything the
//! relayer returns that has no SDK equivalent is passed through verbatim.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use thiserror::Error;

/// Stable error codes surfaced to SDK consumers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ErrorCode {
	SuccessResponse,
	ErrorResponse,
	ApiNotFound,
	UserContractNotFound,
	UserNotLoggedIn,
	UserAccountNotFound,
	NetworkIdMismatch,
	BiconomyNotInitialized,
	NetworkIdNotFound,
	SmartContractNotFound,
	DappNotFound,
	InvalidPayload,
	DashboardDataMismatch,
	UserContractCreationFailed,
	EventNotSupported,
	InvalidData,
	InvalidOperation,
	WrongAbi,
	InterfaceMapUndefined,
	DappApiMapUndefined,
	SmartContractMetaTransactionMapUndefined,
	SmartContractMapUndefined,
	ForwarderDomainDataUndefined,
	ForwarderDomainDetailsUndefined,
	BiconomyForwarderUndefined,
	SmartContractTrustedForwarderMapUndefined,
	DappIdUndefined,
	ForwarderAddressesArrayUndefined,
	ForwarderAddressUndefined,
	ContractAbiUndefined,
	ForwarderDomainTypeUndefined,
	ForwarderRequestTypeUndefined,
	/// A relayer flag or code with no SDK-side mapping.
	Relay(String),
}

const CODE_TABLE: &[(ErrorCode, &str)] = &[
	(ErrorCode::SuccessResponse, "B200"),
	(ErrorCode::ErrorResponse, "B500"),
	(ErrorCode::ApiNotFound, "B501"),
	(ErrorCode::UserContractNotFound, "B502"),
	(ErrorCode::UserNotLoggedIn, "B503"),
	(ErrorCode::UserAccountNotFound, "B504"),
	(ErrorCode::NetworkIdMismatch, "B505"),
	(ErrorCode::BiconomyNotInitialized, "B506"),
	(ErrorCode::NetworkIdNotFound, "B507"),
	(ErrorCode::SmartContractNotFound, "B508"),
	(ErrorCode::DappNotFound, "B509"),
	(ErrorCode::InvalidPayload, "B510"),
	(ErrorCode::DashboardDataMismatch, "B511"),
	(ErrorCode::UserContractCreationFailed, "B512"),
	(ErrorCode::EventNotSupported, "B513"),
	(ErrorCode::InvalidData, "B514"),
	(ErrorCode::InvalidOperation, "B515"),
	(ErrorCode::WrongAbi, "B516"),
	(ErrorCode::InterfaceMapUndefined, "B517"),
	(ErrorCode::DappApiMapUndefined, "B518"),
	(ErrorCode::SmartContractMetaTransactionMapUndefined, "B519"),
	(ErrorCode::SmartContractMapUndefined, "B520"),
	(ErrorCode::ForwarderDomainDataUndefined, "B521"),
	(ErrorCode::ForwarderDomainDetailsUndefined, "B522"),
	(ErrorCode::BiconomyForwarderUndefined, "B523"),
	(ErrorCode::SmartContractTrustedForwarderMapUndefined, "B524"),
	(ErrorCode::DappIdUndefined, "B525"),
	(ErrorCode::ForwarderAddressesArrayUndefined, "B526"),
	(ErrorCode::ForwarderAddressUndefined, "B527"),
	(ErrorCode::ContractAbiUndefined, "B528"),
	(ErrorCode::ForwarderDomainTypeUndefined, "B529"),
	(ErrorCode::ForwarderRequestTypeUndefined, "B530"),
];

impl ErrorCode {
	/// Returns the wire representation of this code.
	pub fn as_str(&self) -> &str {
		if let ErrorCode::Relay(raw) = self {
			return raw;
		}
		CODE_TABLE
			.iter()
			.find(|(code, _)| code == self)
			.map(|(_, s)| *s)
			.unwrap_or("B500")
	}

	/// Parses a wire code, keeping unknown values as relayer codes.
	pub fn parse(raw: &str) -> Self {
		CODE_TABLE
			.iter()
			.find(|(_, s)| *s == raw)
			.map(|(code, _)| code.clone())
			.unwrap_or_else(|| ErrorCode::Relay(raw.to_string()))
	}
}

impl fmt::Display for ErrorCode {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl Serialize for ErrorCode {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.serialize_str(self.as_str())
	}
}

impl<'de> Deserialize<'de> for ErrorCode {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		let raw = String::deserialize(deserializer)?;
		Ok(ErrorCode::parse(&raw))
	}
}

/// Structured error returned to SDK consumers and published on the event bus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("[{code}] {message}")]
pub struct SdkError {
	pub code: ErrorCode,
	pub message: String,
}

impl SdkError {
	pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
		Self {
			code,
			message: message.into(),
		}
	}
}

/// Flags returned by the relayer in the `flag` field of its responses.
pub mod relay_flags {
	pub const SUCCESS: i64 = 200;
	pub const ACTION_COMPLETE: i64 = 143;
	pub const ERROR_RESPONSE: i64 = 144;
	pub const USER_CONTRACT_NOT_FOUND: i64 = 148;
	pub const BAD_REQUEST: i64 = 400;
}
