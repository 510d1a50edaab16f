//! Relay transaction notifications over WebSocket.
//!
//! A single background task owns the socket connection. Transaction ids are
//! handed to it through a command channel; status pushes from the relay are
//! republished on the SDK [`EventBus`]. When the connection drops the task
//! reconnects with exponential backoff and re-subscribes every transaction
//! that has not reached a terminal status. Once `max_retries` reconnects have
//! failed the task idles until the next subscription, then starts over with a
//! fresh backoff. Subscriptions older than `subscription_ttl` are dropped.

use backoff::{backoff::Backoff, ExponentialBackoff};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use metatx_relay::TransactionWatcher;
use metatx_types::{EventBus, SdkEvent, TransactionNotification};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

pub mod protocol;

use protocol::{parse_server_message, ClientMessage, ServerMessage};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Error)]
pub enum NotifierError {
	#[error("Notifier is not running")]
	Stopped,
	#[error("Socket error: {0}")]
	Socket(String),
	#[error("Failed to encode message: {0}")]
	Encode(#[from] serde_json::Error),
	#[error("Notifier task failed: {0}")]
	Task(String),
}

/// Connection parameters of the notification socket.
#[derive(Debug, Clone)]
pub struct NotifierSettings {
	pub endpoint: String,
	/// Reconnect attempts per outage before the task idles.
	pub max_retries: u32,
	pub initial_backoff: Duration,
	pub max_backoff: Duration,
	/// How long a transaction is followed without reaching a terminal status.
	pub subscription_ttl: Duration,
}

impl NotifierSettings {
	pub fn new(endpoint: impl Into<String>) -> Self {
		Self {
			endpoint: endpoint.into(),
			max_retries: 10,
			initial_backoff: Duration::from_millis(500),
			max_backoff: Duration::from_secs(30),
			subscription_ttl: Duration::from_secs(3600),
		}
	}

	fn backoff(&self) -> ExponentialBackoff {
		ExponentialBackoff {
			initial_interval: self.initial_backoff,
			current_interval: self.initial_backoff,
			max_interval: self.max_backoff,
			max_elapsed_time: None,
			..Default::default()
		}
	}
}

enum Command {
	Subscribe(String),
	Shutdown,
}

enum SessionEnd {
	Disconnected,
	Shutdown,
}

/// Handle to the background notification task.
pub struct TransactionNotifier {
	commands: mpsc::UnboundedSender<Command>,
	task: Mutex<Option<JoinHandle<()>>>,
}

impl TransactionNotifier {
	/// Spawns the notification task. Connection failures are retried in the
	/// background and never reported to the caller.
	pub fn start(settings: NotifierSettings, events: EventBus) -> Self {
		let (commands, receiver) = mpsc::unbounded_channel();
		let task = tokio::spawn(run(settings, events, receiver));
		Self {
			commands,
			task: Mutex::new(Some(task)),
		}
	}

	/// Follows `transaction_id` until it is mined or fails.
	pub fn subscribe(&self, transaction_id: impl Into<String>) -> Result<(), NotifierError> {
		self.commands
			.send(Command::Subscribe(transaction_id.into()))
			.map_err(|_| NotifierError::Stopped)
	}

	pub fn is_running(&self) -> bool {
		!self.commands.is_closed()
	}

	/// Closes the socket and waits for the task to exit.
	pub async fn shutdown(&self) -> Result<(), NotifierError> {
		let _ = self.commands.send(Command::Shutdown);
		let task = match self.task.lock() {
			Ok(mut guard) => guard.take(),
			Err(_) => None,
		};
		if let Some(task) = task {
			task.await.map_err(|e| NotifierError::Task(e.to_string()))?;
		}
		Ok(())
	}
}

impl TransactionWatcher for TransactionNotifier {
	fn watch(&self, transaction_id: &str) {
		if let Err(e) = self.subscribe(transaction_id) {
			tracing::warn!(%transaction_id, error = %e, "Cannot watch transaction");
		}
	}
}

struct Pending {
	hash_fired: bool,
	since: Instant,
}

/// Transactions awaiting a terminal status.
struct Tracker {
	pending: HashMap<String, Pending>,
	ttl: Duration,
}

impl Tracker {
	fn new(ttl: Duration) -> Self {
		Self {
			pending: HashMap::new(),
			ttl,
		}
	}

	fn track(&mut self, transaction_id: String) {
		self.prune();
		self.pending.entry(transaction_id).or_insert_with(|| Pending {
			hash_fired: false,
			since: Instant::now(),
		});
	}

	fn pending_ids(&mut self) -> Vec<String> {
		self.prune();
		self.pending.keys().cloned().collect()
	}

	/// Drops subscriptions that outlived the TTL.
	fn prune(&mut self) {
		let ttl = self.ttl;
		self.pending.retain(|transaction_id, pending| {
			let live = pending.since.elapsed() < ttl;
			if !live {
				tracing::warn!(%transaction_id, "No terminal status within the subscription TTL, dropping");
			}
			live
		});
	}

	/// Publishes the event for `message` unless it already fired. Returns the
	/// transaction id when the subscription has ended.
	fn apply(&mut self, message: ServerMessage, events: &EventBus) -> Option<String> {
		let Some(pending) = self.pending.get_mut(&message.transaction_id) else {
			tracing::debug!(transaction_id = %message.transaction_id, "Ignoring notification for untracked transaction");
			return None;
		};

		if !message.event.is_terminal() {
			if !pending.hash_fired {
				pending.hash_fired = true;
				events.publish(SdkEvent::from_notification(message.into()));
			}
			return None;
		}

		self.pending.remove(&message.transaction_id);
		let notification: TransactionNotification = message.into();
		let transaction_id = notification.transaction_id.clone();
		tracing::info!(%transaction_id, status = ?notification.status, "Transaction finished");
		events.publish(SdkEvent::from_notification(notification));
		Some(transaction_id)
	}
}

async fn run(
	settings: NotifierSettings,
	events: EventBus,
	mut commands: mpsc::UnboundedReceiver<Command>,
) {
	let mut tracker = Tracker::new(settings.subscription_ttl);
	let mut backoff = settings.backoff();
	let mut retries = 0u32;

	loop {
		match connect_async(settings.endpoint.as_str()).await {
			Ok((socket, _)) => {
				tracing::info!(endpoint = %settings.endpoint, "Connected to notification socket");
				retries = 0;
				backoff.reset();
				match session(socket, &mut tracker, &events, &mut commands).await {
					SessionEnd::Shutdown => break,
					SessionEnd::Disconnected => {
						tracing::warn!(endpoint = %settings.endpoint, "Notification socket disconnected");
					}
				}
			}
			Err(e) => {
				tracing::warn!(endpoint = %settings.endpoint, error = %e, "Failed to connect to notification socket");
			}
		}

		retries += 1;
		if retries > settings.max_retries {
			tracing::error!(
				endpoint = %settings.endpoint,
				pending = tracker.pending.len(),
				"Notification socket unavailable after {} retries, waiting for the next subscription",
				settings.max_retries
			);
			if let SessionEnd::Shutdown = idle(&mut tracker, &mut commands).await {
				break;
			}
			retries = 0;
			backoff.reset();
			continue;
		}
		let Some(delay) = backoff.next_backoff() else {
			break;
		};
		tracing::debug!(attempt = retries, ?delay, "Reconnecting to notification socket");
		if let SessionEnd::Shutdown = wait(delay, &mut tracker, &mut commands).await {
			break;
		}
	}

	tracing::debug!("Notification task stopped");
}

async fn session(
	socket: Socket,
	tracker: &mut Tracker,
	events: &EventBus,
	commands: &mut mpsc::UnboundedReceiver<Command>,
) -> SessionEnd {
	let (mut sink, mut stream) = socket.split();

	for transaction_id in tracker.pending_ids() {
		if let Err(e) = send(&mut sink, &ClientMessage::Subscribe { transaction_id }).await {
			tracing::warn!(error = %e, "Failed to re-subscribe");
			return SessionEnd::Disconnected;
		}
	}

	loop {
		tokio::select! {
			command = commands.recv() => match command {
				Some(Command::Subscribe(transaction_id)) => {
					tracker.track(transaction_id.clone());
					tracing::debug!(%transaction_id, "Subscribing to transaction");
					if let Err(e) = send(&mut sink, &ClientMessage::Subscribe { transaction_id }).await {
						tracing::warn!(error = %e, "Failed to subscribe");
						return SessionEnd::Disconnected;
					}
				}
				Some(Command::Shutdown) | None => {
					let _ = sink.close().await;
					return SessionEnd::Shutdown;
				}
			},
			frame = stream.next() => match frame {
				Some(Ok(Message::Text(text))) => {
					let Some(message) = parse_server_message(text.as_str()) else {
						continue;
					};
					if let Some(transaction_id) = tracker.apply(message, events) {
						if let Err(e) = send(&mut sink, &ClientMessage::Unsubscribe { transaction_id }).await {
							tracing::debug!(error = %e, "Failed to unsubscribe");
						}
					}
				}
				Some(Ok(Message::Close(_))) | None => return SessionEnd::Disconnected,
				Some(Ok(_)) => {}
				Some(Err(e)) => {
					tracing::warn!(error = %e, "Notification socket error");
					return SessionEnd::Disconnected;
				}
			},
		}
	}
}

/// Sleeps for `delay` while still accepting commands.
async fn wait(
	delay: Duration,
	tracker: &mut Tracker,
	commands: &mut mpsc::UnboundedReceiver<Command>,
) -> SessionEnd {
	let sleep = tokio::time::sleep(delay);
	tokio::pin!(sleep);
	loop {
		tokio::select! {
			_ = &mut sleep => return SessionEnd::Disconnected,
			command = commands.recv() => match command {
				Some(Command::Subscribe(transaction_id)) => tracker.track(transaction_id),
				Some(Command::Shutdown) | None => return SessionEnd::Shutdown,
			},
		}
	}
}

/// Blocks until a new subscription arrives.
async fn idle(tracker: &mut Tracker, commands: &mut mpsc::UnboundedReceiver<Command>) -> SessionEnd {
	match commands.recv().await {
		Some(Command::Subscribe(transaction_id)) => {
			tracing::info!(%transaction_id, "New subscription, reconnecting to notification socket");
			tracker.track(transaction_id);
			SessionEnd::Disconnected
		}
		Some(Command::Shutdown) | None => SessionEnd::Shutdown,
	}
}

async fn send(
	sink: &mut SplitSink<Socket, Message>,
	message: &ClientMessage,
) -> Result<(), NotifierError> {
	let text = serde_json::to_string(message)?;
	sink.send(Message::Text(text.into()))
		.await
		.map_err(|e| NotifierError::Socket(e.to_string()))
}
