//! Conversation messages and the bounded turn history.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

/// Default number of messages kept by [`ChatMemory`].
pub const DEFAULT_MEMORY_SIZE: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One `{role, content}` message as sent to a chat backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// Ring buffer of the most recent messages; the oldest is evicted first.
#[derive(Debug, Clone)]
pub struct ChatMemory {
    max_messages: usize,
    messages: VecDeque<ChatMessage>,
}

impl ChatMemory {
    /// A memory holding at most `max_messages` (at least one).
    pub fn new(max_messages: usize) -> Self {
        let max_messages = max_messages.max(1);
        Self {
            max_messages,
            messages: VecDeque::with_capacity(max_messages),
        }
    }

    pub fn add(&mut self, role: Role, content: impl Into<String>) {
        self.messages.push_back(ChatMessage::new(role, content));
        while self.messages.len() > self.max_messages {
            self.messages.pop_front();
        }
    }

    /// Snapshot of the stored messages, oldest first.
    pub fn messages(&self) -> Vec<ChatMessage> {
        self.messages.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }
}

impl Default for ChatMemory {
    fn default() -> Self {
        Self::new(DEFAULT_MEMORY_SIZE)
    }
}
