//! What to do when a call targets something the dashboard does not know.

use alloy::primitives::Address;
use metatx_types::{ErrorCode, FallbackReason, SdkError};

/// A call that cannot be relayed because registration data is missing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationGap {
	ContractNotRegistered(Address),
	ApiNotRegistered { contract: Address, method: String },
	UndecodableRawTransaction(Address),
}

/// Strict mode turns registration gaps into errors; lenient mode sends the
/// call to the wrapped provider instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RegistrationPolicy {
	Strict,
	#[default]
	Lenient,
}

impl RegistrationPolicy {
	pub fn from_strict_mode(strict: bool) -> Self {
		if strict {
			RegistrationPolicy::Strict
		} else {
			RegistrationPolicy::Lenient
		}
	}

	pub fn resolve(&self, gap: RegistrationGap) -> Result<FallbackReason, SdkError> {
		match self {
			RegistrationPolicy::Lenient => {
				tracing::info!(?gap, "Registration gap, falling back to wrapped provider");
				Ok(match gap {
					RegistrationGap::ContractNotRegistered(address) => {
						FallbackReason::ContractNotRegistered(address)
					}
					RegistrationGap::ApiNotRegistered { contract, method } => {
						FallbackReason::ApiNotRegistered { contract, method }
					}
					RegistrationGap::UndecodableRawTransaction(address) => {
						FallbackReason::UndecodableRawTransaction(address)
					}
				})
			}
			RegistrationPolicy::Strict => Err(match gap {
				RegistrationGap::ContractNotRegistered(address) => SdkError::new(
					ErrorCode::BiconomyNotInitialized,
					format!(
						"Strict mode is on and contract {} is not registered on the dashboard",
						address
					),
				),
				RegistrationGap::ApiNotRegistered { method, .. } => SdkError::new(
					ErrorCode::ApiNotFound,
					format!(
						"Strict mode is on. No registered API found for method {}. Please register API from developer dashboard.",
						method
					),
				),
				RegistrationGap::UndecodableRawTransaction(address) => SdkError::new(
					ErrorCode::DashboardDataMismatch,
					format!(
						"No smart contract registered on dashboard with address ({})",
						address
					),
				),
			}),
		}
	}
}
