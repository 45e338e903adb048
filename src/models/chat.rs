use serde::{ Serialize, Deserialize };
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self { role, content: content.into() }
    }
}

/// Ordered message log of one chat session.
///
/// Holds at most one system message, always at index 0. Appends only ever add user
/// and assistant turns, so the invariant cannot be broken from outside.
#[derive(Clone, Debug)]
pub struct Conversation {
    id: String,
    messages: Vec<ChatMessage>,
}

impl Conversation {
    pub fn new(id: impl Into<String>, system_prompt: Option<&str>) -> Self {
        let messages = match system_prompt {
            Some(prompt) => vec![ChatMessage::new(Role::System, prompt)],
            None => Vec::new(),
        };
        Self { id: id.into(), messages }
    }

    /// Rebuilds a conversation from stored messages. Any system message found after
    /// index 0 is dropped; the first one seen is moved to the front.
    pub fn restore(id: impl Into<String>, stored: Vec<ChatMessage>) -> Self {
        let mut system: Option<ChatMessage> = None;
        let mut rest = Vec::with_capacity(stored.len());
        for msg in stored {
            if msg.role == Role::System {
                if system.is_none() {
                    system = Some(msg);
                }
            } else {
                rest.push(msg);
            }
        }

        let mut messages = Vec::with_capacity(rest.len() + 1);
        messages.extend(system);
        messages.extend(rest);
        Self { id: id.into(), messages }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }

    pub fn system_prompt(&self) -> Option<&str> {
        self.messages
            .first()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.messages.push(ChatMessage::new(Role::User, content));
    }

    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.messages.push(ChatMessage::new(Role::Assistant, content));
    }

    /// Replaces the system prompt in place. Inserts one at index 0 if the
    /// conversation was created without a system prompt.
    pub fn set_system_prompt(&mut self, prompt: impl Into<String>) {
        let prompt = prompt.into();
        match self.messages.first_mut() {
            Some(first) if first.role == Role::System => {
                first.content = prompt;
            }
            _ => self.messages.insert(0, ChatMessage::new(Role::System, prompt)),
        }
    }

    /// Drops every turn but keeps the system prompt.
    pub fn reset(&mut self) {
        self.messages.retain(|m| m.role == Role::System);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_conversation_seeds_system_prompt() {
        let conv = Conversation::new("c1", Some("be brief"));
        assert_eq!(conv.len(), 1);
        assert_eq!(conv.system_prompt(), Some("be brief"));

        let bare = Conversation::new("c2", None);
        assert!(bare.is_empty());
        assert_eq!(bare.system_prompt(), None);
    }

    #[test]
    fn set_system_prompt_only_touches_index_zero() {
        let mut conv = Conversation::new("c1", Some("old"));
        conv.push_user("hello");
        conv.push_assistant("hi");
        let before: Vec<_> = conv.messages()[1..].to_vec();

        conv.set_system_prompt("new");

        assert_eq!(conv.len(), 3);
        assert_eq!(conv.messages()[0], ChatMessage::new(Role::System, "new"));
        assert_eq!(&conv.messages()[1..], before.as_slice());
    }

    #[test]
    fn set_system_prompt_inserts_when_missing() {
        let mut conv = Conversation::new("c1", None);
        conv.push_user("hello");
        conv.set_system_prompt("rules");
        assert_eq!(conv.messages()[0].role, Role::System);
        assert_eq!(conv.messages()[1].content, "hello");
    }

    #[test]
    fn reset_keeps_system_prompt() {
        let mut conv = Conversation::new("c1", Some("sys"));
        conv.push_user("a");
        conv.push_assistant("b");
        conv.reset();
        assert_eq!(conv.len(), 1);
        assert_eq!(conv.system_prompt(), Some("sys"));
    }

    #[test]
    fn restore_moves_single_system_message_to_front() {
        let stored = vec![
            ChatMessage::new(Role::User, "q"),
            ChatMessage::new(Role::System, "first"),
            ChatMessage::new(Role::Assistant, "a"),
            ChatMessage::new(Role::System, "second"),
        ];
        let conv = Conversation::restore("c1", stored);
        let roles: Vec<Role> = conv.messages().iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::System, Role::User, Role::Assistant]);
        assert_eq!(conv.system_prompt(), Some("first"));
    }

    #[test]
    fn roles_serialize_lowercase() {
        let json = serde_json::to_string(&ChatMessage::new(Role::Assistant, "x")).unwrap();
        assert_eq!(json, r#"{"role":"assistant","content":"x"}"#);
    }
}
