//! SDK events and the broadcast bus that carries them.
//!
//! Relay status notifications and SDK errors are published on an
//! [`EventBus`]; dApps subscribe to receive them asynchronously.

use crate::SdkError;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Status carried by a relay notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NotificationStatus {
	HashGenerated,
	Mined,
	Error,
}

impl NotificationStatus {
	/// Whether no further notifications follow this one.
	pub fn is_terminal(&self) -> bool {
		matches!(self, NotificationStatus::Mined | NotificationStatus::Error)
	}
}

/// A status update pushed by the relay's notification channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionNotification {
	pub transaction_id: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub transaction_hash: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error: Option<String>,
	pub status: NotificationStatus,
}

/// Events surfaced to SDK consumers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum SdkEvent {
	/// The relayer has broadcast the transaction.
	#[serde(rename = "txHashGenerated")]
	TxHashGenerated {
		transaction_id: String,
		transaction_hash: String,
	},
	/// The transaction was included in a block.
	#[serde(rename = "txMined")]
	TxMined {
		transaction_id: String,
		transaction_hash: String,
	},
	/// The relayer reported a failure for the transaction.
	#[serde(rename = "onError")]
	TxError { transaction_id: String, error: String },
	/// An SDK-level error was returned to the caller.
	#[serde(rename = "biconomy_error")]
	SdkError(SdkError),
}

impl SdkEvent {
	/// Name under which the event is emitted.
	pub fn name(&self) -> &'static str {
		match self {
			SdkEvent::TxHashGenerated { .. } => "txHashGenerated",
			SdkEvent::TxMined { .. } => "txMined",
			SdkEvent::TxError { .. } => "onError",
			SdkEvent::SdkError(_) => "biconomy_error",
		}
	}

	/// Converts a relay notification into the matching SDK event.
	pub fn from_notification(notification: TransactionNotification) -> Self {
		let TransactionNotification {
			transaction_id,
			transaction_hash,
			error,
			status,
		} = notification;
		match status {
			NotificationStatus::HashGenerated => SdkEvent::TxHashGenerated {
				transaction_id,
				transaction_hash: transaction_hash.unwrap_or_default(),
			},
			NotificationStatus::Mined => SdkEvent::TxMined {
				transaction_id,
				transaction_hash: transaction_hash.unwrap_or_default(),
			},
			NotificationStatus::Error => SdkEvent::TxError {
				transaction_id,
				error: error.unwrap_or_else(|| "unknown relay error".to_string()),
			},
		}
	}
}

/// Event bus for broadcasting SDK events to multiple subscribers.
///
/// Cloning an `EventBus` creates a new handle to the same channel.
#[derive(Clone)]
pub struct EventBus {
	sender: broadcast::Sender<SdkEvent>,
}

impl EventBus {
	/// Creates a new EventBus with the specified channel capacity.
	pub fn new(capacity: usize) -> Self {
		let (sender, _) = broadcast::channel(capacity);
		Self { sender }
	}

	/// Creates a new subscriber receiving events published from now on.
	pub fn subscribe(&self) -> broadcast::Receiver<SdkEvent> {
		self.sender.subscribe()
	}

	/// Publishes an event to all current subscribers.
	///
	/// Publishing with no subscribers is not an error for the SDK; the event
	/// is simply dropped.
	pub fn publish(&self, event: SdkEvent) {
		if self.sender.send(event).is_err() {
			tracing::trace!("No event subscribers");
		}
	}
}

impl Default for EventBus {
	fn default() -> Self {
		Self::new(256)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::ErrorCode;

	#[tokio::test]
	async fn test_bus_delivers_to_all_subscribers() {
		let bus = EventBus::new(8);
		let mut first = bus.subscribe();
		let mut second = bus.subscribe();

		bus.publish(SdkEvent::SdkError(SdkError::new(
			ErrorCode::ApiNotFound,
			"no api",
		)));

		assert_eq!(first.recv().await.unwrap().name(), "biconomy_error");
		assert_eq!(second.recv().await.unwrap().name(), "biconomy_error");
	}

	#[test]
	fn test_notification_maps_to_event() {
		let event = SdkEvent::from_notification(TransactionNotification {
			transaction_id: "tx123".into(),
			transaction_hash: Some("0xabc".into()),
			error: None,
			status: NotificationStatus::Mined,
		});
		assert_eq!(
			event,
			SdkEvent::TxMined {
				transaction_id: "tx123".into(),
				transaction_hash: "0xabc".into(),
			}
		);
		assert!(NotificationStatus::Mined.is_terminal());
		assert!(!NotificationStatus::HashGenerated.is_terminal());
	}

	#[test]
	fn test_event_serializes_with_name_tag() {
		let event = SdkEvent::TxError {
			transaction_id: "tx1".into(),
			error: "reverted".into(),
		};
		let json = serde_json::to_value(&event).unwrap();
		assert_eq!(json["event"], "onError");
		assert_eq!(json["data"]["error"], "reverted");
	}
}
