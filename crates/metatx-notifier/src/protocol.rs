//! Wire messages of the relay notification socket.

use metatx_types::{NotificationStatus, TransactionNotification};
use serde::{Deserialize, Serialize};

/// Message sent by the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientMessage {
	Subscribe {
		#[serde(rename = "transactionId")]
		transaction_id: String,
	},
	Unsubscribe {
		#[serde(rename = "transactionId")]
		transaction_id: String,
	},
}

/// Message pushed by the server.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerMessage {
	pub event: NotificationStatus,
	pub transaction_id: String,
	#[serde(default)]
	pub transaction_hash: Option<String>,
	#[serde(default)]
	pub error: Option<String>,
}

impl From<ServerMessage> for TransactionNotification {
	fn from(message: ServerMessage) -> Self {
		TransactionNotification {
			transaction_id: message.transaction_id,
			transaction_hash: message.transaction_hash,
			error: message.error,
			status: message.event,
		}
	}
}

/// Parses a text frame, returning `None` for anything that is not a status push.
pub fn parse_server_message(text: &str) -> Option<ServerMessage> {
	serde_json::from_str(text).ok()
}
