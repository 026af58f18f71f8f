use serde::{ Serialize, Deserialize };

/// One completed listen/translate cycle of a live call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptItem {
    pub original: String,
    pub translated: String,
    pub timestamp: i64,
}
