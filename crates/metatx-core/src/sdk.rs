//! SDK entry point.
//!
//! [`MetaTxSdkBuilder`] collects the wrapped provider and relay settings;
//! [`MetaTxSdkBuilder::init`] loads the dApp registration and wires the relay
//! pipeline behind a [`MetaTxProvider`].

use crate::classifier::TransactionClassifier;
use crate::context::RegistrationContext;
use crate::error::CoreError;
use crate::policy::RegistrationPolicy;
use crate::proxy::MetaTxProvider;
use crate::raw::ForwardRequestToSign;
use crate::wallet::SmartWalletClient;
use alloy::primitives::{Address, U256};
use metatx_config::{MetaTxConfig, DEFAULT_RELAY_TIMEOUT_SECS, DEFAULT_RELAY_URL};
use metatx_forwarder::ForwarderResolver;
use metatx_notifier::{NotifierSettings, TransactionNotifier};
use metatx_relay::{RelayClient, RelayDispatcher};
use metatx_signature::SignatureBuilder;
use metatx_types::{chain_id, ErrorCode, EventBus, ProviderInterface, SdkEvent};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

const EVENT_CAPACITY: usize = 256;

pub struct MetaTxSdkBuilder {
	provider: Arc<dyn ProviderInterface>,
	api_key: String,
	strict_mode: bool,
	contract_addresses: Vec<Address>,
	json_rpc_provider: Option<Arc<dyn ProviderInterface>>,
	wallet_provider: Option<Arc<dyn ProviderInterface>>,
	relay_url: String,
	dapp_api_url: Option<String>,
	relay_timeout: Duration,
	sdk_version: Option<String>,
	notifier: Option<NotifierSettings>,
	domain_name: Option<String>,
	domain_version: Option<String>,
}

impl MetaTxSdkBuilder {
	pub fn new(provider: Arc<dyn ProviderInterface>, api_key: impl Into<String>) -> Self {
		Self {
			provider,
			api_key: api_key.into(),
			strict_mode: false,
			contract_addresses: Vec::new(),
			json_rpc_provider: None,
			wallet_provider: None,
			relay_url: DEFAULT_RELAY_URL.to_string(),
			dapp_api_url: None,
			relay_timeout: Duration::from_secs(DEFAULT_RELAY_TIMEOUT_SECS),
			sdk_version: None,
			notifier: Some(NotifierSettings::new(
				metatx_config::DEFAULT_NOTIFIER_ENDPOINT,
			)),
			domain_name: None,
			domain_version: None,
		}
	}

	pub fn with_strict_mode(mut self, strict: bool) -> Self {
		self.strict_mode = strict;
		self
	}

	/// Restricts the registration data fetched at init to these contracts.
	pub fn with_contract_addresses(mut self, addresses: Vec<Address>) -> Self {
		self.contract_addresses = addresses;
		self
	}

	/// Read-only provider for estimation and contract reads.
	pub fn with_json_rpc_provider(mut self, provider: Arc<dyn ProviderInterface>) -> Self {
		self.json_rpc_provider = Some(provider);
		self
	}

	/// Provider that answers signing requests when the wrapped one cannot.
	pub fn with_wallet_provider(mut self, provider: Arc<dyn ProviderInterface>) -> Self {
		self.wallet_provider = Some(provider);
		self
	}

	pub fn with_relay_url(mut self, url: impl Into<String>) -> Self {
		self.relay_url = url.into();
		self
	}

	pub fn with_dapp_api_url(mut self, url: Option<String>) -> Self {
		self.dapp_api_url = url;
		self
	}

	pub fn with_relay_timeout(mut self, timeout: Duration) -> Self {
		self.relay_timeout = timeout;
		self
	}

	pub fn with_sdk_version(mut self, version: impl Into<String>) -> Self {
		self.sdk_version = Some(version.into());
		self
	}

	pub fn with_notifier(mut self, settings: NotifierSettings) -> Self {
		self.notifier = Some(settings);
		self
	}

	pub fn without_notifier(mut self) -> Self {
		self.notifier = None;
		self
	}

	pub fn with_domain_overrides(mut self, name: Option<String>, version: Option<String>) -> Self {
		self.domain_name = name;
		self.domain_version = version;
		self
	}

	/// Applies every setting of a loaded configuration.
	pub fn with_config(self, config: &MetaTxConfig) -> Self {
		let builder = self
			.with_strict_mode(config.sdk.strict_mode)
			.with_contract_addresses(config.sdk.contract_addresses.clone())
			.with_relay_url(config.relay.base_url.clone())
			.with_dapp_api_url(config.relay.dapp_api_url.clone())
			.with_relay_timeout(config.relay.timeout())
			.with_sdk_version(config.relay.sdk_version.clone())
			.with_domain_overrides(
				config.signing.domain_name.clone(),
				config.signing.domain_version.clone(),
			);

		if config.notifier.enabled {
			builder.with_notifier(NotifierSettings {
				endpoint: config.notifier.endpoint.clone(),
				max_retries: config.notifier.max_retries,
				initial_backoff: Duration::from_millis(config.notifier.initial_backoff_ms),
				max_backoff: Duration::from_millis(config.notifier.max_backoff_ms),
				subscription_ttl: Duration::from_secs(config.notifier.subscription_ttl_secs),
			})
		} else {
			builder.without_notifier()
		}
	}

	/// Loads the dApp registration and builds the relay pipeline.
	pub async fn init(self) -> Result<MetaTxSdk, CoreError> {
		// Relayer client
		let mut client = RelayClient::new(&self.relay_url, &self.api_key, self.relay_timeout)?
			.with_dapp_api_url(self.dapp_api_url.clone());
		if let Some(version) = &self.sdk_version {
			client = client.with_sdk_version(version.clone());
		}

		// Registration data
		let registration = client.get_dapp_registration(&self.contract_addresses).await?;
		let network_id = registration.dapp.network_id;
		let context = RegistrationContext::from_registration(&registration).map_err(|e| {
			CoreError::sdk(
				ErrorCode::WrongAbi,
				format!("Invalid ABI registered on the dashboard: {}", e),
			)
		})?;

		// The wrapped provider must be on the dApp's network
		let reader = self
			.json_rpc_provider
			.clone()
			.unwrap_or_else(|| self.provider.clone());
		let provider_chain = chain_id(self.provider.as_ref()).await?;
		if provider_chain != network_id {
			return Err(CoreError::sdk(
				ErrorCode::NetworkIdMismatch,
				format!(
					"Provider network id {} does not match dApp network id {}",
					provider_chain, network_id
				),
			));
		}

		// Forwarder and signing metadata
		let system = client.get_system_info(network_id).await?;
		let context = Arc::new(context.with_system_info(system.clone()));
		let resolver = match (
			&context.interfaces,
			&system.forwarder_addresses,
			system.forwarder_address,
		) {
			(Some(interfaces), Some(supported), Some(default)) => Some(Arc::new(
				ForwarderResolver::new(reader.clone(), interfaces.clone(), supported.clone(), default),
			)),
			_ => {
				tracing::warn!(network_id, "No forwarder in system info, trusted forwarder calls will fail");
				None
			}
		};

		// Notifier
		let events = EventBus::new(EVENT_CAPACITY);
		let notifier = self.notifier.map(|settings| {
			tracing::debug!(endpoint = %settings.endpoint, "Starting transaction notifier");
			Arc::new(TransactionNotifier::start(settings, events.clone()))
		});

		// Relay pipeline
		let mut dispatcher = RelayDispatcher::new(client.clone());
		if let Some(notifier) = &notifier {
			dispatcher = dispatcher.with_watcher(notifier.clone());
		}
		let signer = self
			.wallet_provider
			.clone()
			.unwrap_or_else(|| self.provider.clone());
		let signatures = SignatureBuilder::new(signer);
		let mut classifier = TransactionClassifier::new(
			context.clone(),
			RegistrationPolicy::from_strict_mode(self.strict_mode),
			reader.clone(),
			signatures.clone(),
			dispatcher,
			events.clone(),
		)
		.with_domain_overrides(self.domain_name, self.domain_version);
		if let Some(resolver) = resolver {
			classifier = classifier.with_forwarder_resolver(resolver);
		}
		let provider = Arc::new(MetaTxProvider::new(
			self.provider.clone(),
			Arc::new(classifier),
		));

		// Smart contract wallets
		let wallet = match (system.wallet_factory_address, system.base_wallet_address) {
			(Some(factory), Some(base_wallet)) => Some(SmartWalletClient::new(
				reader,
				provider.clone(),
				signatures,
				factory,
				base_wallet,
				provider_chain,
			)),
			_ => None,
		};

		tracing::info!(
			dapp_id = ?context.dapp_id,
			network_id,
			contracts = registration.smart_contracts.len(),
			apis = registration.meta_apis.len(),
			"Meta transaction SDK initialized"
		);

		Ok(MetaTxSdk {
			provider,
			events,
			context,
			notifier,
			wallet,
			client,
		})
	}
}

/// An initialized SDK instance.
pub struct MetaTxSdk {
	provider: Arc<MetaTxProvider>,
	events: EventBus,
	context: Arc<RegistrationContext>,
	notifier: Option<Arc<TransactionNotifier>>,
	wallet: Option<SmartWalletClient>,
	client: RelayClient,
}

impl MetaTxSdk {
	pub fn builder(provider: Arc<dyn ProviderInterface>, api_key: impl Into<String>) -> MetaTxSdkBuilder {
		MetaTxSdkBuilder::new(provider, api_key)
	}

	/// A builder preloaded from a configuration file.
	pub fn from_config(config: &MetaTxConfig, provider: Arc<dyn ProviderInterface>) -> MetaTxSdkBuilder {
		MetaTxSdkBuilder::new(provider, config.sdk.api_key.clone()).with_config(config)
	}

	/// The provider to hand to the dApp in place of the original one.
	pub fn provider(&self) -> Arc<MetaTxProvider> {
		self.provider.clone()
	}

	pub fn events(&self) -> &EventBus {
		&self.events
	}

	pub fn subscribe(&self) -> broadcast::Receiver<SdkEvent> {
		self.events.subscribe()
	}

	pub fn context(&self) -> &RegistrationContext {
		&self.context
	}

	/// Present when the network has smart contract wallets deployed.
	pub fn wallet(&self) -> Option<&SmartWalletClient> {
		self.wallet.as_ref()
	}

	pub fn relay_client(&self) -> &RelayClient {
		&self.client
	}

	pub async fn get_forward_request_and_message_to_sign(
		&self,
		raw: &[u8],
		batch_id: Option<U256>,
		domain_name: Option<&str>,
		domain_version: Option<&str>,
	) -> Result<ForwardRequestToSign, CoreError> {
		self.provider
			.classifier()
			.get_forward_request_and_message_to_sign(raw, batch_id, domain_name, domain_version)
			.await
	}

	/// Stops the notifier task.
	pub async fn shutdown(&self) -> Result<(), CoreError> {
		if let Some(notifier) = &self.notifier {
			notifier.shutdown().await?;
		}
		tracing::info!("Meta transaction SDK stopped");
		Ok(())
	}
}
