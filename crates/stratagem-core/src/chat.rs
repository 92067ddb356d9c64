use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Role of a conversation message sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "system" => Ok(Role::System),
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            other => Err(format!("unknown role: {}", other)),
        }
    }
}

/// A single message in a conversation. Never mutated once appended to a
/// history; metadata rides along for bookkeeping but is stripped by
/// [`ChatHistory::as_native`] before anything reaches a model back-end.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            metadata: HashMap::new(),
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

    pub fn with_metadata(mut self, key: &str, value: serde_json::Value) -> Self {
        self.metadata.insert(key.to_string(), value);
        self
    }

    /// The wire-format view: role + content only.
    pub fn as_native(&self) -> NativeMessage {
        NativeMessage {
            role: self.role.as_str().to_string(),
            content: self.content.clone(),
        }
    }
}

/// Plain `{role, content}` pair, the shape chat-completion APIs accept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeMessage {
    pub role: String,
    pub content: String,
}

/// An ordered, append-only sequence of messages.
///
/// `append` and `concat` both return a fresh history and leave the receiver
/// untouched, so a stage can build its context delta independently and the
/// caller decides what gets folded back into the cycle history. When two
/// histories each carry a system message, concatenation keeps both — the
/// renderer owns system-uniqueness at the call site.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatHistory {
    messages: Vec<Message>,
}

impl ChatHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_message(message: Message) -> Self {
        Self {
            messages: vec![message],
        }
    }

    pub fn from_messages(messages: Vec<Message>) -> Self {
        Self { messages }
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Return a new history with `message` appended.
    pub fn append(&self, message: Message) -> Self {
        let mut messages = self.messages.clone();
        messages.push(message);
        Self { messages }
    }

    /// Return a new history holding `self`'s messages followed by `other`'s.
    pub fn concat(&self, other: &ChatHistory) -> Self {
        let mut messages = self.messages.clone();
        messages.extend(other.messages.iter().cloned());
        Self { messages }
    }

    /// The `{role, content}` sequence sent to model back-ends. Metadata is
    /// never exposed through this view.
    pub fn as_native(&self) -> Vec<NativeMessage> {
        self.messages.iter().map(Message::as_native).collect()
    }

    /// Content of the most recent assistant message, or `""` if none.
    pub fn latest_response(&self) -> String {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant)
            .map(|m| m.content.clone())
            .unwrap_or_default()
    }

    /// Content of the most recent user message, or `""` if none.
    pub fn latest_instruction(&self) -> String {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_does_not_mutate_receiver() {
        let base = ChatHistory::from_message(Message::system("you are a trader"));
        let grown = base.append(Message::user("what now?"));

        assert_eq!(base.len(), 1);
        assert_eq!(grown.len(), 2);
        assert_eq!(grown.messages()[1].content, "what now?");
    }

    #[test]
    fn concat_preserves_order() {
        let a = ChatHistory::from_messages(vec![
            Message::system("s"),
            Message::user("u1"),
        ]);
        let b = ChatHistory::from_messages(vec![
            Message::user("u2"),
            Message::assistant("a1"),
        ]);

        let joined = a.concat(&b);
        let roles: Vec<&str> = joined
            .messages()
            .iter()
            .map(|m| m.role.as_str())
            .collect();
        assert_eq!(roles, vec!["system", "user", "user", "assistant"]);
    }

    #[test]
    fn concat_keeps_both_system_messages() {
        let a = ChatHistory::from_message(Message::system("first"));
        let b = ChatHistory::from_message(Message::system("second"));
        assert_eq!(a.concat(&b).len(), 2);
    }

    #[test]
    fn as_native_strips_metadata() {
        let history = ChatHistory::from_message(
            Message::user("hello").with_metadata("attempt", serde_json::json!(2)),
        );
        let native = history.as_native();
        assert_eq!(native.len(), 1);
        assert_eq!(native[0].role, "user");
        assert_eq!(native[0].content, "hello");
        assert!(serde_json::to_string(&native[0]).unwrap().find("attempt").is_none());
    }

    #[test]
    fn latest_accessors_on_empty_history() {
        let empty = ChatHistory::new();
        assert_eq!(empty.latest_response(), "");
        assert_eq!(empty.latest_instruction(), "");
    }

    #[test]
    fn latest_accessors_pick_last_of_role() {
        let history = ChatHistory::from_messages(vec![
            Message::user("first instruction"),
            Message::assistant("first answer"),
            Message::user("second instruction"),
            Message::assistant("second answer"),
        ]);
        assert_eq!(history.latest_response(), "second answer");
        assert_eq!(history.latest_instruction(), "second instruction");
    }

    #[test]
    fn serde_round_trip() {
        let history = ChatHistory::from_messages(vec![
            Message::system("s"),
            Message::assistant("a"),
        ]);
        let json = serde_json::to_string(&history).unwrap();
        let back: ChatHistory = serde_json::from_str(&json).unwrap();
        assert_eq!(back.len(), 2);
        assert_eq!(back.latest_response(), "a");
    }
}
