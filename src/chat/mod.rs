pub mod pirate;

use log::warn;
use std::mem;
use std::sync::Arc;

use crate::backend::{ ApiError, TranslateClient };
use crate::history::ConversationStore;
use crate::models::chat::{ ConversationKind, NewMessage, TranslatedMessage };

const TITLE_PREVIEW_LEN: usize = 48;

fn title_preview(text: &str) -> String {
    if text.chars().count() <= TITLE_PREVIEW_LEN {
        text.to_string()
    } else {
        let preview: String = text.chars().take(TITLE_PREVIEW_LEN).collect();
        format!("{}…", preview)
    }
}

/// Chat-style translation session: each sent message is translated by the
/// backend and appended as an original/translated pair. History writes are
/// best-effort and never block the exchange.
pub struct ChatTranslator {
    translator: Arc<dyn TranslateClient>,
    store: Option<Arc<dyn ConversationStore>>,
    conversation_id: Option<String>,
    source_lang: String,
    target_lang: String,
    messages: Vec<TranslatedMessage>,
}

impl ChatTranslator {
    pub fn new(
        translator: Arc<dyn TranslateClient>,
        source_lang: impl Into<String>,
        target_lang: impl Into<String>
    ) -> Self {
        Self {
            translator,
            store: None,
            conversation_id: None,
            source_lang: source_lang.into(),
            target_lang: target_lang.into(),
            messages: Vec::new(),
        }
    }

    pub fn with_store(mut self, store: Arc<dyn ConversationStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn messages(&self) -> &[TranslatedMessage] {
        &self.messages
    }

    pub fn source_lang(&self) -> &str {
        &self.source_lang
    }

    pub fn target_lang(&self) -> &str {
        &self.target_lang
    }

    pub fn swap_languages(&mut self) {
        mem::swap(&mut self.source_lang, &mut self.target_lang);
    }

    /// Translate `text` and append the resulting pair. Blank input is a no-op.
    pub async fn send(&mut self, text: &str) -> Result<Option<&TranslatedMessage>, ApiError> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(None);
        }

        let translated = self.translator.translate(
            text,
            &self.source_lang,
            &self.target_lang
        ).await?;

        let message = TranslatedMessage {
            original: text.to_string(),
            translated,
            source_lang: self.source_lang.clone(),
            target_lang: self.target_lang.clone(),
        };

        self.persist(&message).await;
        self.messages.push(message);
        Ok(self.messages.last())
    }

    async fn persist(&mut self, message: &TranslatedMessage) {
        let Some(store) = self.store.clone() else {
            return;
        };

        let conversation_id = match &self.conversation_id {
            Some(id) => id.clone(),
            None => {
                let title = title_preview(&message.original);
                match store.create_conversation(ConversationKind::ChatTranslation, &title).await {
                    Ok(conversation) => {
                        self.conversation_id = Some(conversation.id.clone());
                        conversation.id
                    }
                    Err(e) => {
                        warn!("History write (conversation) failed: {}", e);
                        return;
                    }
                }
            }
        };

        let row = NewMessage::translation(
            &message.original,
            &message.translated,
            &message.source_lang,
            &message.target_lang
        );
        if let Err(e) = store.add_message(&conversation_id, &row).await {
            warn!("History write (message) failed: {}", e);
        }
    }
}
