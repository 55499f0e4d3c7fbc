use std::collections::BTreeMap;

use fleetlive_domain::{Chat, Message};
use tokio::sync::watch;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatState {
	pub chats: Vec<Chat>,
	pub active_chat_id: Option<String>,
	pub messages: BTreeMap<String, Vec<Message>>,
	pub loading: bool,
	pub error: Option<String>,
}

impl ChatState {
	pub fn active_messages(&self) -> &[Message] {
		self.active_chat_id
			.as_ref()
			.and_then(|id| self.messages.get(id))
			.map(Vec::as_slice)
			.unwrap_or_default()
	}
}

fn push_unique(list: &mut Vec<Message>, message: Message) -> bool {
	if list.iter().any(|m| m.id == message.id) {
		return false;
	}
	list.push(message);
	true
}

#[derive(Debug)]
pub struct ChatStore {
	tx: watch::Sender<ChatState>,
}

impl Default for ChatStore {
	fn default() -> Self {
		let (tx, _rx) = watch::channel(ChatState::default());
		Self { tx }
	}
}

impl ChatStore {
	pub fn subscribe(&self) -> watch::Receiver<ChatState> {
		self.tx.subscribe()
	}

	pub fn state(&self) -> ChatState {
		self.tx.borrow().clone()
	}

	pub fn begin_fetch_list(&self) {
		self.tx.send_modify(|s| s.loading = true);
	}

	pub fn apply_chat_list(&self, chats: Vec<Chat>) {
		self.tx.send_modify(|s| {
			s.chats = chats;
			s.loading = false;
		});
	}

	pub fn join(&self, chat_id: &str) {
		self.tx.send_modify(|s| {
			s.active_chat_id = Some(chat_id.to_string());
			s.loading = true;
			s.error = None;
		});
	}

	pub fn leave(&self) {
		self.tx.send_if_modified(|s| s.active_chat_id.take().is_some());
	}

	/// History replaces whatever we had for the room, minus duplicate ids.
	pub fn apply_history(&self, chat_id: &str, messages: Vec<Message>) {
		self.tx.send_modify(|s| {
			let mut list = Vec::with_capacity(messages.len());
			for m in messages {
				push_unique(&mut list, m);
			}
			s.messages.insert(chat_id.to_string(), list);
			if s.active_chat_id.as_deref() == Some(chat_id) {
				s.loading = false;
			}
		});
	}

	/// Appends to the room and refreshes the room's last message. Duplicates are ignored.
	pub fn apply_new_message(&self, message: Message) -> bool {
		self.tx.send_if_modified(|s| {
			let list = s.messages.entry(message.chat_id.clone()).or_default();
			if !push_unique(list, message.clone()) {
				return false;
			}
			if let Some(chat) = s.chats.iter_mut().find(|c| c.id == message.chat_id) {
				chat.last_message = Some(message);
			}
			true
		})
	}

	pub fn set_error(&self, message: impl Into<String>) {
		let message = message.into();
		self.tx.send_modify(|s| {
			s.loading = false;
			s.error = Some(message);
		});
	}

	pub fn clear_error(&self) {
		self.tx.send_if_modified(|s| s.error.take().is_some());
	}

	pub fn reset(&self) {
		self.tx.send_replace(ChatState::default());
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn msg(id: &str, chat: &str, text: &str) -> Message {
		Message {
			id: id.into(),
			chat_id: chat.into(),
			text: text.into(),
			created_at: "2024-01-01T00:00:00Z".into(),
		}
	}

	#[test]
	fn history_dedupes_and_replaces() {
		let store = ChatStore::default();
		store.join("c1");
		store.apply_history("c1", vec![msg("1", "c1", "a"), msg("1", "c1", "a"), msg("2", "c1", "b")]);
		let s = store.state();
		assert_eq!(s.active_messages().len(), 2);
		assert!(!s.loading);

		store.apply_history("c1", vec![msg("3", "c1", "c")]);
		assert_eq!(store.state().active_messages(), &[msg("3", "c1", "c")]);
	}

	#[test]
	fn new_message_updates_room_and_summary_once() {
		let store = ChatStore::default();
		store.apply_chat_list(vec![Chat {
			id: "c1".into(),
			last_message: None,
		}]);

		assert!(store.apply_new_message(msg("9", "c1", "hello")));
		assert!(!store.apply_new_message(msg("9", "c1", "hello")));

		let s = store.state();
		assert_eq!(s.messages["c1"].len(), 1);
		assert_eq!(s.chats[0].last_message.as_ref().map(|m| m.text.as_str()), Some("hello"));
	}

	#[test]
	fn leave_keeps_cached_messages() {
		let store = ChatStore::default();
		store.join("c1");
		store.apply_history("c1", vec![msg("1", "c1", "a")]);
		store.leave();
		let s = store.state();
		assert_eq!(s.active_chat_id, None);
		assert!(s.active_messages().is_empty());
		assert_eq!(s.messages["c1"].len(), 1);
	}
}
