use futures::StreamExt;
use log::warn;
use std::sync::Arc;

use crate::backend::{ ApiError, StreamingChat };
use crate::history::ConversationStore;
use crate::models::chat::{ ChatMessage, ConversationKind, NewMessage, Role };

pub const PIRATE_GREETING: &str =
    "Arr! Welcome aboard, ye landlubber! Captain Blackbeard at yer service. What brings ye to me ship today?";

/// Streaming chat session with the pirate persona. The assistant reply is
/// accumulated token by token: the first token appends one assistant message
/// and every later token rewrites that same message, so the transcript never
/// holds a duplicate. A stream error leaves whatever already arrived in place
/// as the best-effort final reply.
pub struct PirateChatSession {
    chat: Arc<dyn StreamingChat>,
    store: Option<Arc<dyn ConversationStore>>,
    conversation_id: Option<String>,
    messages: Vec<ChatMessage>,
}

impl PirateChatSession {
    pub fn new(chat: Arc<dyn StreamingChat>) -> Self {
        Self {
            chat,
            store: None,
            conversation_id: None,
            messages: vec![ChatMessage::new(Role::Assistant, PIRATE_GREETING)],
        }
    }

    pub fn with_store(mut self, store: Arc<dyn ConversationStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Send one user message and stream the reply. `on_token` sees each raw
    /// fragment as it arrives; the accumulated reply is returned at the end.
    pub async fn send<F>(&mut self, content: &str, mut on_token: F) -> Result<String, ApiError>
        where F: FnMut(&str)
    {
        let content = content.trim();
        if content.is_empty() {
            return Ok(String::new());
        }

        self.messages.push(ChatMessage::new(Role::User, content));
        let request = self.messages.clone();
        let mut stream = self.chat.stream_chat(&request).await?;

        let mut accumulated = String::new();
        let mut appended = false;
        while let Some(item) = stream.next().await {
            match item {
                Ok(token) => {
                    accumulated.push_str(&token);
                    if appended {
                        if let Some(last) = self.messages.last_mut() {
                            last.content = accumulated.clone();
                        }
                    } else {
                        self.messages.push(ChatMessage::new(Role::Assistant, accumulated.clone()));
                        appended = true;
                    }
                    on_token(&token);
                }
                Err(e) => {
                    // The partial reply stays in the transcript.
                    self.persist_exchange(content, &accumulated).await;
                    return Err(e);
                }
            }
        }

        self.persist_exchange(content, &accumulated).await;
        Ok(accumulated)
    }

    async fn persist_exchange(&mut self, user_content: &str, assistant_content: &str) {
        let Some(store) = self.store.clone() else {
            return;
        };

        let conversation_id = match &self.conversation_id {
            Some(id) => id.clone(),
            None => {
                match
                    store.create_conversation(
                        ConversationKind::PirateChat,
                        "Captain Blackbeard's Quarters"
                    ).await
                {
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

        if
            let Err(e) = store.add_message(
                &conversation_id,
                &NewMessage::text(Role::User, user_content)
            ).await
        {
            warn!("History write (user) failed: {}", e);
        }
        if assistant_content.is_empty() {
            return;
        }
        if
            let Err(e) = store.add_message(
                &conversation_id,
                &NewMessage::text(Role::Assistant, assistant_content)
            ).await
        {
            warn!("History write (assistant) failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use crate::backend::TokenStream;
    use crate::history::MemoryConversationStore;
    use tokio::sync::Mutex;

    struct ScriptedChat {
        scripts: Mutex<Vec<Vec<Result<String, ApiError>>>>,
    }

    impl ScriptedChat {
        fn new(scripts: Vec<Vec<Result<String, ApiError>>>) -> Self {
            Self {
                scripts: Mutex::new(scripts),
            }
        }
    }

    #[async_trait]
    impl StreamingChat for ScriptedChat {
        async fn stream_chat(&self, _messages: &[ChatMessage]) -> Result<TokenStream, ApiError> {
            let mut scripts = self.scripts.lock().await;
            if scripts.is_empty() {
                return Err(ApiError::Stream("no script left".to_string()));
            }
            let items = scripts.remove(0);
            Ok(Box::pin(futures::stream::iter(items)))
        }
    }

    fn ok(token: &str) -> Result<String, ApiError> {
        Ok(token.to_string())
    }

    #[tokio::test]
    async fn the_session_opens_with_the_captains_greeting() {
        let session = PirateChatSession::new(Arc::new(ScriptedChat::new(vec![])));
        assert_eq!(session.messages().len(), 1);
        assert_eq!(session.messages()[0].role, Role::Assistant);
        assert_eq!(session.messages()[0].content, PIRATE_GREETING);
    }

    #[tokio::test]
    async fn tokens_accumulate_into_exactly_one_assistant_message() {
        let chat = Arc::new(
            ScriptedChat::new(vec![vec![ok("Arr"), ok(", ye"), ok(" scallywag!")]])
        );
        let mut session = PirateChatSession::new(chat);

        let mut seen = Vec::new();
        let reply = session
            .send("Who are you?", |token| seen.push(token.to_string()))
            .await
            .unwrap();

        assert_eq!(reply, "Arr, ye scallywag!");
        assert_eq!(seen, vec!["Arr", ", ye", " scallywag!"]);
        // greeting + user + a single assistant message
        assert_eq!(session.messages().len(), 3);
        assert_eq!(session.messages()[2].role, Role::Assistant);
        assert_eq!(session.messages()[2].content, "Arr, ye scallywag!");
    }

    #[tokio::test]
    async fn a_stream_error_keeps_the_partial_reply() {
        let chat = Arc::new(
            ScriptedChat::new(
                vec![vec![ok("Shiver me"), Err(ApiError::Stream("reset".to_string()))]]
            )
        );
        let mut session = PirateChatSession::new(chat);

        let result = session.send("Go on", |_| {}).await;
        assert!(result.is_err());
        assert_eq!(session.messages().len(), 3);
        assert_eq!(session.messages()[2].content, "Shiver me");
    }

    #[tokio::test]
    async fn blank_input_is_a_no_op() {
        let mut session = PirateChatSession::new(Arc::new(ScriptedChat::new(vec![])));
        let reply = session.send("  ", |_| {}).await.unwrap();
        assert!(reply.is_empty());
        assert_eq!(session.messages().len(), 1);
    }

    #[tokio::test]
    async fn completed_exchanges_are_persisted_as_user_and_assistant_rows() {
        let store = Arc::new(MemoryConversationStore::new());
        let chat = Arc::new(ScriptedChat::new(vec![vec![ok("Aye")], vec![ok("Nay")]]));
        let mut session = PirateChatSession::new(chat).with_store(store.clone());

        session.send("First question", |_| {}).await.unwrap();
        session.send("Second question", |_| {}).await.unwrap();

        let conversations = store
            .list_conversations(Some(ConversationKind::PirateChat)).await
            .unwrap();
        assert_eq!(conversations.len(), 1);

        let rows = store.get_messages(&conversations[0].id, 10).await.unwrap();
        let pairs: Vec<(Role, &str)> = rows
            .iter()
            .map(|r| (r.role, r.content.as_str()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                (Role::User, "First question"),
                (Role::Assistant, "Aye"),
                (Role::User, "Second question"),
                (Role::Assistant, "Nay")
            ]
        );
    }
}
