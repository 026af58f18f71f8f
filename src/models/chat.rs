use serde::{ Serialize, Deserialize };
use std::fmt;
use std::str::FromStr;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// One turn of a chat exchange, held in memory in insertion order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
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
}

/// A translated exchange in the text-chat view: the typed text plus the
/// backend translation and the language pair it was produced for.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslatedMessage {
    pub original: String,
    pub translated: String,
    pub source_lang: String,
    pub target_lang: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationKind {
    ChatTranslation,
    PirateChat,
    LiveCall,
}

impl ConversationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversationKind::ChatTranslation => "chat_translation",
            ConversationKind::PirateChat => "pirate_chat",
            ConversationKind::LiveCall => "live_call",
        }
    }
}

impl fmt::Display for ConversationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct ParseConversationKindError {
    message: String,
}

impl fmt::Display for ParseConversationKindError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ParseConversationKindError {}

impl FromStr for ConversationKind {
    type Err = ParseConversationKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "chat_translation" | "chat" => Ok(ConversationKind::ChatTranslation),
            "pirate_chat" | "pirate" => Ok(ConversationKind::PirateChat),
            "live_call" | "call" => Ok(ConversationKind::LiveCall),
            _ =>
                Err(ParseConversationKindError {
                    message: format!("Invalid conversation kind: '{}'", s),
                }),
        }
    }
}

/// Conversation row owned by the backend; this layer only creates and
/// appends to it over HTTP.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub kind: ConversationKind,
    pub title: String,
    pub created_at: i64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub id: String,
    pub conversation_id: String,
    pub role: Role,
    pub content: String,
    pub translated_content: Option<String>,
    pub source_lang: Option<String>,
    pub target_lang: Option<String>,
    pub created_at: i64,
}

/// Payload for appending a message to a conversation. The backend assigns
/// the row id and timestamp on the REST path.
#[derive(Clone, Debug)]
pub struct NewMessage {
    pub role: Role,
    pub content: String,
    pub translated_content: Option<String>,
    pub source_lang: Option<String>,
    pub target_lang: Option<String>,
}

impl NewMessage {
    pub fn text(role: Role, content: &str) -> Self {
        Self {
            role,
            content: content.to_string(),
            translated_content: None,
            source_lang: None,
            target_lang: None,
        }
    }

    pub fn translation(
        original: &str,
        translated: &str,
        source_lang: &str,
        target_lang: &str
    ) -> Self {
        Self {
            role: Role::User,
            content: original.to_string(),
            translated_content: Some(translated.to_string()),
            source_lang: Some(source_lang.to_string()),
            target_lang: Some(target_lang.to_string()),
        }
    }
}
