use async_trait::async_trait;
use chrono::{ DateTime, Utc };
use log::error;
use reqwest::{
    Client as HttpClient,
    header::{ HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE },
};
use serde::{ Deserialize, Serialize };
use std::error::Error;
use std::time::Duration;
use url::Url;
use uuid::Uuid;

use super::ConversationStore;
use crate::models::chat::{ Conversation, ConversationKind, ConversationMessage, NewMessage, Role };

#[derive(Serialize)]
struct InsertConversation<'a> {
    id: &'a str,
    kind: ConversationKind,
    title: &'a str,
    created_at: String,
}

#[derive(Deserialize)]
struct ConversationRow {
    id: String,
    kind: ConversationKind,
    #[serde(default)]
    title: Option<String>,
    created_at: String,
}

#[derive(Serialize)]
struct InsertMessage<'a> {
    id: String,
    conversation_id: &'a str,
    role: Role,
    content: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    translated_content: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    source_lang: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    target_lang: Option<&'a str>,
    created_at: String,
}

#[derive(Deserialize)]
struct MessageRow {
    id: String,
    conversation_id: String,
    role: Role,
    content: String,
    #[serde(default)]
    translated_content: Option<String>,
    #[serde(default)]
    source_lang: Option<String>,
    #[serde(default)]
    target_lang: Option<String>,
    created_at: String,
}

fn parse_timestamp(raw: &str) -> i64 {
    match DateTime::parse_from_rfc3339(raw) {
        Ok(parsed) => parsed.timestamp(),
        Err(e) => {
            error!("Error parsing row timestamp '{}': {}", raw, e);
            0
        }
    }
}

impl ConversationRow {
    fn into_model(self) -> Conversation {
        Conversation {
            created_at: parse_timestamp(&self.created_at),
            id: self.id,
            kind: self.kind,
            title: self.title.unwrap_or_default(),
        }
    }
}

impl MessageRow {
    fn into_model(self) -> ConversationMessage {
        ConversationMessage {
            created_at: parse_timestamp(&self.created_at),
            id: self.id,
            conversation_id: self.conversation_id,
            role: self.role,
            content: self.content,
            translated_content: self.translated_content,
            source_lang: self.source_lang,
            target_lang: self.target_lang,
        }
    }
}

/// Conversation store backed by the backend's REST data API
/// (`/rest/v1/conversations`, `/rest/v1/conversation_messages`).
pub struct RestConversationStore {
    http: HttpClient,
    base_url: String,
}

impl RestConversationStore {
    pub fn new(
        base_url: &str,
        anon_key: &str,
        access_token: Option<&str>,
        connect_timeout: Duration
    ) -> Result<Self, Box<dyn Error + Send + Sync>> {
        let parsed = Url::parse(base_url).map_err(|e|
            format!("invalid backend URL '{}': {}", base_url, e)
        )?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if !anon_key.is_empty() {
            headers.insert(
                HeaderName::from_static("apikey"),
                HeaderValue::from_str(anon_key).map_err(|e| format!("invalid anon key: {}", e))?
            );
        }
        let bearer = access_token.unwrap_or(anon_key);
        if !bearer.is_empty() {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {}", bearer)).map_err(|e|
                    format!("invalid bearer token: {}", e)
                )?
            );
        }

        let http = HttpClient::builder()
            .default_headers(headers)
            .connect_timeout(connect_timeout)
            .build()?;

        Ok(Self {
            http,
            base_url: parsed.as_str().trim_end_matches('/').to_string(),
        })
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }
}

#[async_trait]
impl ConversationStore for RestConversationStore {
    async fn create_conversation(
        &self,
        kind: ConversationKind,
        title: &str
    ) -> Result<Conversation, Box<dyn Error + Send + Sync>> {
        let id = Uuid::new_v4().to_string();
        let row = InsertConversation {
            id: &id,
            kind,
            title,
            created_at: Utc::now().to_rfc3339(),
        };

        let inserted: Vec<ConversationRow> = self.http
            .post(self.table_url("conversations"))
            .header("Prefer", "return=representation")
            .json(&row)
            .send().await?
            .error_for_status()?
            .json().await?;

        inserted
            .into_iter()
            .next()
            .map(ConversationRow::into_model)
            .ok_or_else(|| "conversation insert returned no row".to_string().into())
    }

    async fn add_message(
        &self,
        conversation_id: &str,
        message: &NewMessage
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        let row = InsertMessage {
            id: Uuid::new_v4().to_string(),
            conversation_id,
            role: message.role,
            content: &message.content,
            translated_content: message.translated_content.as_deref(),
            source_lang: message.source_lang.as_deref(),
            target_lang: message.target_lang.as_deref(),
            created_at: Utc::now().to_rfc3339(),
        };

        self.http
            .post(self.table_url("conversation_messages"))
            .header("Prefer", "return=minimal")
            .json(&row)
            .send().await?
            .error_for_status()?;
        Ok(())
    }

    async fn list_conversations(
        &self,
        kind: Option<ConversationKind>
    ) -> Result<Vec<Conversation>, Box<dyn Error + Send + Sync>> {
        let mut query = vec![
            ("select".to_string(), "*".to_string()),
            ("order".to_string(), "created_at.desc".to_string())
        ];
        if let Some(kind) = kind {
            query.push(("kind".to_string(), format!("eq.{}", kind.as_str())));
        }

        let rows: Vec<ConversationRow> = self.http
            .get(self.table_url("conversations"))
            .query(&query)
            .send().await?
            .error_for_status()?
            .json().await?;

        Ok(rows.into_iter().map(ConversationRow::into_model).collect())
    }

    async fn get_messages(
        &self,
        conversation_id: &str,
        limit: usize
    ) -> Result<Vec<ConversationMessage>, Box<dyn Error + Send + Sync>> {
        // Fetch the newest rows first, then flip back to chronological order.
        let rows: Vec<MessageRow> = self.http
            .get(self.table_url("conversation_messages"))
            .query(
                &[
                    ("select", "*".to_string()),
                    ("conversation_id", format!("eq.{}", conversation_id)),
                    ("order", "created_at.desc".to_string()),
                    ("limit", limit.to_string()),
                ]
            )
            .send().await?
            .error_for_status()?
            .json().await?;

        let mut messages: Vec<ConversationMessage> = rows
            .into_iter()
            .map(MessageRow::into_model)
            .collect();
        messages.reverse();
        Ok(messages)
    }

    async fn delete_conversation(
        &self,
        conversation_id: &str
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        self.http
            .delete(self.table_url("conversation_messages"))
            .query(&[("conversation_id", format!("eq.{}", conversation_id))])
            .send().await?
            .error_for_status()?;

        self.http
            .delete(self.table_url("conversations"))
            .query(&[("id", format!("eq.{}", conversation_id))])
            .send().await?
            .error_for_status()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_convert_to_models_with_epoch_timestamps() {
        let row = ConversationRow {
            id: "c1".to_string(),
            kind: ConversationKind::LiveCall,
            title: None,
            created_at: "2025-10-05T10:30:00+00:00".to_string(),
        };
        let conversation = row.into_model();
        assert_eq!(conversation.created_at, 1759660200);
        assert_eq!(conversation.title, "");
    }

    #[test]
    fn unparseable_timestamps_degrade_to_zero() {
        assert_eq!(parse_timestamp("yesterday-ish"), 0);
    }

    #[test]
    fn optional_translation_fields_are_omitted_from_inserts() {
        let row = InsertMessage {
            id: "m1".to_string(),
            conversation_id: "c1",
            role: Role::Assistant,
            content: "Arr",
            translated_content: None,
            source_lang: None,
            target_lang: None,
            created_at: "2025-10-05T10:30:00+00:00".to_string(),
        };
        let value = serde_json::to_value(&row).unwrap();
        assert!(value.get("translated_content").is_none());
        assert_eq!(value["role"], "assistant");
    }
}
