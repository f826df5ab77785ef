// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Observed message history (C1).
//!
//! [`MessageList`] is the single source of truth for a conversation's
//! history. Most mutations notify registered observers (used to drive
//! session persistence and UI streaming); a few are deliberately silent —
//! compaction rewrites history without re-triggering the normal "a message
//! was appended" side effects.

use crate::types::Message;

type Observer = Box<dyn Fn(&Message) + Send + Sync>;

pub struct MessageList {
    messages: Vec<Message>,
    observers: Vec<Observer>,
    silent_depth: u32,
}

impl std::fmt::Debug for MessageList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageList")
            .field("messages", &self.messages)
            .field("observer_count", &self.observers.len())
            .field("silent_depth", &self.silent_depth)
            .finish()
    }
}

impl Default for MessageList {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageList {
    pub fn new() -> Self {
        Self { messages: Vec::new(), observers: Vec::new(), silent_depth: 0 }
    }

    pub fn subscribe(&mut self, observer: Observer) {
        self.observers.push(observer);
    }

    pub fn as_slice(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    fn notify(&self, message: &Message) {
        if self.silent_depth > 0 {
            return;
        }
        for observer in &self.observers {
            observer(message);
        }
    }

    /// Append one message, notifying observers.
    pub fn append(&mut self, message: Message) {
        self.messages.push(message.clone());
        self.notify(&message);
    }

    /// Insert one message without notifying observers. Used for repairing
    /// history (e.g. synthesizing a missing tool response) where the
    /// correction shouldn't be re-persisted as if the model produced it.
    pub fn insert(&mut self, index: usize, message: Message) {
        self.messages.insert(index, message);
    }

    /// Append every message in `messages`, notifying observers once per
    /// item (not once for the whole batch).
    pub fn extend(&mut self, messages: impl IntoIterator<Item = Message>) {
        for message in messages {
            self.append(message);
        }
    }

    /// Replace the entire history, never notifying observers. Used by
    /// compaction to swap in `[system, summary]` without re-persisting every
    /// replaced message.
    pub fn reset(&mut self, messages: Vec<Message>) {
        self.messages = messages;
    }

    /// Run `f` with notifications suppressed for its duration, even across
    /// nested calls to `append`/`extend` elsewhere on the same list.
    pub fn silent<R>(&mut self, f: impl FnOnce(&mut MessageList) -> R) -> R {
        self.silent_depth += 1;
        let result = f(self);
        self.silent_depth -= 1;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Role;
    use std::sync::{Arc, Mutex};

    #[test]
    fn append_notifies_insert_does_not() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        let mut list = MessageList::new();
        list.subscribe(Box::new(move |m| seen_clone.lock().unwrap().push(m.message_id.clone())));

        list.append(Message::new(Role::User, "hi"));
        list.insert(0, Message::new(Role::System, "sys"));

        assert_eq!(list.len(), 2);
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn silent_scope_suppresses_append_notifications() {
        let seen = Arc::new(Mutex::new(0));
        let seen_clone = seen.clone();
        let mut list = MessageList::new();
        list.subscribe(Box::new(move |_| *seen_clone.lock().unwrap() += 1));

        list.silent(|l| {
            l.append(Message::new(Role::User, "a"));
            l.append(Message::new(Role::Assistant, "b"));
        });
        assert_eq!(*seen.lock().unwrap(), 0);
        assert_eq!(list.len(), 2);

        list.append(Message::new(Role::User, "c"));
        assert_eq!(*seen.lock().unwrap(), 1);
    }

    #[test]
    fn reset_replaces_history_silently() {
        let seen = Arc::new(Mutex::new(0));
        let seen_clone = seen.clone();
        let mut list = MessageList::new();
        list.subscribe(Box::new(move |_| *seen_clone.lock().unwrap() += 1));
        list.append(Message::new(Role::User, "a"));
        list.reset(vec![Message::new(Role::System, "fresh")]);
        assert_eq!(list.len(), 1);
        assert_eq!(*seen.lock().unwrap(), 1);
    }
}
