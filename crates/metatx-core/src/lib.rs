//! Meta-transaction SDK core.
//!
//! Wraps a dApp's JSON-RPC provider so that `eth_sendTransaction` and
//! `eth_sendRawTransaction` calls to registered contracts are relayed through
//! the meta-transaction API instead of being paid for by the user.
//!
//! Start with [`MetaTxSdk::builder`], call [`MetaTxSdkBuilder::init`], then
//! use [`MetaTxSdk::provider`] wherever the original provider was used.

pub mod classifier;
pub mod context;
pub mod error;
pub mod policy;
pub mod proxy;
pub mod raw;
pub mod sdk;
pub mod wallet;

#[cfg(test)]
mod test_support;

pub use classifier::{TransactionClassifier, TransactionRequest};
pub use context::{ReadyContext, RegistrationContext};
pub use error::{CoreError, SDK_RPC_ERROR_CODE};
pub use policy::{RegistrationGap, RegistrationPolicy};
pub use proxy::MetaTxProvider;
pub use raw::{DecodedRawTransaction, ForwardRequestToSign, RawTransactionRequest};
pub use sdk::{MetaTxSdk, MetaTxSdkBuilder};
pub use wallet::{ExecTransaction, SmartWalletClient, WalletStatus};
