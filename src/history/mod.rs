mod memory;
mod rest;

use async_trait::async_trait;
use log::info;
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use crate::cli::Args;
use crate::models::chat::{ Conversation, ConversationKind, ConversationMessage, NewMessage };

pub use memory::MemoryConversationStore;
pub use rest::RestConversationStore;

/// Persistence seam for conversations and their messages. Rows are owned by
/// the backend database; this layer only inserts, selects, and deletes, and
/// never enforces schema invariants of its own.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn create_conversation(
        &self,
        kind: ConversationKind,
        title: &str
    ) -> Result<Conversation, Box<dyn Error + Send + Sync>>;

    async fn add_message(
        &self,
        conversation_id: &str,
        message: &NewMessage
    ) -> Result<(), Box<dyn Error + Send + Sync>>;

    async fn list_conversations(
        &self,
        kind: Option<ConversationKind>
    ) -> Result<Vec<Conversation>, Box<dyn Error + Send + Sync>>;

    /// Returns the most recent `limit` messages in chronological order.
    async fn get_messages(
        &self,
        conversation_id: &str,
        limit: usize
    ) -> Result<Vec<ConversationMessage>, Box<dyn Error + Send + Sync>>;

    async fn delete_conversation(
        &self,
        conversation_id: &str
    ) -> Result<(), Box<dyn Error + Send + Sync>>;
}

pub fn create_conversation_store(
    args: &Args,
    access_token: Option<&str>
) -> Result<Arc<dyn ConversationStore>, Box<dyn Error + Send + Sync>> {
    match args.history_type.to_lowercase().as_str() {
        "rest" => {
            let store = RestConversationStore::new(
                &args.backend_url,
                &args.anon_key,
                access_token,
                Duration::from_secs(args.connect_timeout_secs)
            )?;
            Ok(Arc::new(store))
        }
        "memory" => Ok(Arc::new(MemoryConversationStore::new())),
        _ =>
            Err(
                Box::new(
                    std::io::Error::new(
                        std::io::ErrorKind::InvalidInput,
                        format!("Unsupported history store type: {}", args.history_type)
                    )
                )
            ),
    }
}

pub fn initialize_conversation_store(
    args: &Args,
    access_token: Option<&str>
) -> Result<Arc<dyn ConversationStore>, Box<dyn Error + Send + Sync>> {
    info!("Conversation history will be stored in: {}", args.history_type);
    create_conversation_store(args, access_token)
}
