use clap::Parser;
use std::fmt;
use std::str::FromStr;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Client mode (chat, pirate, call, transcribe, history)
    #[arg(long, env = "VOXLATE_MODE", default_value = "chat")]
    pub mode: String,

    // --- Backend Args ---
    /// Base URL of the managed backend project (e.g., https://xyz.supabase.co)
    #[arg(long, env = "BACKEND_URL", default_value = "http://127.0.0.1:54321")]
    pub backend_url: String,

    /// Publishable (anon) key for the backend project.
    #[arg(long, env = "BACKEND_ANON_KEY", default_value = "")]
    pub anon_key: String,

    /// Pre-issued access token. Skips the password sign-in when set.
    #[arg(long, env = "BACKEND_ACCESS_TOKEN")]
    pub access_token: Option<String>,

    /// Connect timeout for backend requests, in seconds.
    #[arg(long, env = "BACKEND_CONNECT_TIMEOUT", default_value = "10")]
    pub connect_timeout_secs: u64,

    // --- Auth Args ---
    /// Account email for password sign-in.
    #[arg(long, env = "AUTH_EMAIL")]
    pub email: Option<String>,

    /// Account password for password sign-in.
    #[arg(long, env = "AUTH_PASSWORD")]
    pub password: Option<String>,

    // --- Translation Args ---
    /// Source language code (e.g., en)
    #[arg(long, env = "SOURCE_LANG", default_value = "en")]
    pub source_lang: String,

    /// Target language code (e.g., es)
    #[arg(long, env = "TARGET_LANG", default_value = "es")]
    pub target_lang: String,

    /// Optional JSON file overriding the built-in language table.
    #[arg(long, env = "LANGUAGES_PATH")]
    pub languages_path: Option<String>,

    // --- History Store Args ---
    /// Conversation store type (rest, memory)
    #[arg(long, env = "HISTORY_TYPE", default_value = "rest")]
    pub history_type: String,

    /// Maximum number of messages fetched per conversation.
    #[arg(long, env = "HISTORY_LIMIT", default_value = "50")]
    pub history_limit: usize,

    /// Conversation id to delete in history mode.
    #[arg(long, env = "DELETE_CONVERSATION")]
    pub delete_conversation: Option<String>,

    // --- Audio Args ---
    /// Directory where synthesized speech is written.
    #[arg(long, env = "AUDIO_OUT_DIR", default_value = "audio-out")]
    pub audio_out_dir: String,

    /// Recorded audio file to feed through transcribe mode.
    #[arg(long, env = "AUDIO_FILE")]
    pub audio_file: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Chat,
    Pirate,
    Call,
    Transcribe,
    History,
}

#[derive(Debug, PartialEq, Eq)]
pub struct ParseModeError {
    message: String,
}

impl fmt::Display for ParseModeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ParseModeError {}

impl FromStr for Mode {
    type Err = ParseModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "chat" => Ok(Mode::Chat),
            "pirate" => Ok(Mode::Pirate),
            "call" => Ok(Mode::Call),
            "transcribe" => Ok(Mode::Transcribe),
            "history" => Ok(Mode::History),
            _ =>
                Err(ParseModeError {
                    message: format!("Invalid mode: '{}'", s),
                }),
        }
    }
}
