use serde::{Deserialize, Serialize};

use crate::message::Message;

/// Append-only record of one conversation.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationHistory {
	messages: Vec<Message>,
}
impl ConversationHistory {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn push(&mut self, message: Message) {
		self.messages.push(message);
	}

	pub fn messages(&self) -> &[Message] {
		&self.messages
	}

	pub fn last(&self) -> Option<&Message> {
		self.messages.last()
	}

	pub fn len(&self) -> usize {
		self.messages.len()
	}

	pub fn is_empty(&self) -> bool {
		self.messages.is_empty()
	}
}
