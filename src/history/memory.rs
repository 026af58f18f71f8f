use async_trait::async_trait;
use chrono::Utc;
use std::error::Error;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::ConversationStore;
use crate::models::chat::{ Conversation, ConversationKind, ConversationMessage, NewMessage };

struct StoredConversation {
    conversation: Conversation,
    messages: Vec<ConversationMessage>,
}

/// In-process conversation store for tests and offline runs. Insertion order
/// is preserved; nothing survives the process.
pub struct MemoryConversationStore {
    inner: Mutex<Vec<StoredConversation>>,
}

impl MemoryConversationStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Vec::new()),
        }
    }
}

impl Default for MemoryConversationStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConversationStore for MemoryConversationStore {
    async fn create_conversation(
        &self,
        kind: ConversationKind,
        title: &str
    ) -> Result<Conversation, Box<dyn Error + Send + Sync>> {
        let conversation = Conversation {
            id: Uuid::new_v4().to_string(),
            kind,
            title: title.to_string(),
            created_at: Utc::now().timestamp(),
        };
        let mut inner = self.inner.lock().await;
        inner.push(StoredConversation {
            conversation: conversation.clone(),
            messages: Vec::new(),
        });
        Ok(conversation)
    }

    async fn add_message(
        &self,
        conversation_id: &str,
        message: &NewMessage
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        let mut inner = self.inner.lock().await;
        let entry = inner
            .iter_mut()
            .find(|c| c.conversation.id == conversation_id)
            .ok_or_else(|| format!("unknown conversation: {}", conversation_id))?;

        entry.messages.push(ConversationMessage {
            id: Uuid::new_v4().to_string(),
            conversation_id: conversation_id.to_string(),
            role: message.role,
            content: message.content.clone(),
            translated_content: message.translated_content.clone(),
            source_lang: message.source_lang.clone(),
            target_lang: message.target_lang.clone(),
            created_at: Utc::now().timestamp(),
        });
        Ok(())
    }

    async fn list_conversations(
        &self,
        kind: Option<ConversationKind>
    ) -> Result<Vec<Conversation>, Box<dyn Error + Send + Sync>> {
        let inner = self.inner.lock().await;
        Ok(
            inner
                .iter()
                .filter(|c| kind.map_or(true, |k| c.conversation.kind == k))
                .map(|c| c.conversation.clone())
                .collect()
        )
    }

    async fn get_messages(
        &self,
        conversation_id: &str,
        limit: usize
    ) -> Result<Vec<ConversationMessage>, Box<dyn Error + Send + Sync>> {
        let inner = self.inner.lock().await;
        let entry = inner
            .iter()
            .find(|c| c.conversation.id == conversation_id)
            .ok_or_else(|| format!("unknown conversation: {}", conversation_id))?;

        let skip = entry.messages.len().saturating_sub(limit);
        Ok(entry.messages[skip..].to_vec())
    }

    async fn delete_conversation(
        &self,
        conversation_id: &str
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        let mut inner = self.inner.lock().await;
        inner.retain(|c| c.conversation.id != conversation_id);
        Ok(())
    }
}
