pub mod audio;

use async_trait::async_trait;
use chrono::Utc;
use log::{ debug, warn };
use std::error::Error;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error as ThisError;
use tokio::sync::watch;

use crate::backend::{ ApiError, SpeechClient, TranslateClient };
use crate::history::ConversationStore;
use crate::models::call::TranscriptItem;
use crate::models::chat::{ ConversationKind, NewMessage };

pub use audio::{ FileAudioOutput, StdinSpeechSource };

/// Lifecycle of a live call. One enum instead of a set of booleans, so no
/// unintended flag combination is reachable.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallState {
    Idle,
    Listening,
    Processing,
    Speaking,
}

#[derive(Debug, ThisError)]
pub enum CallError {
    #[error("speech source failed: {0}")]
    Source(String),
    #[error("audio output failed: {0}")]
    Output(String),
    #[error(transparent)]
    Api(#[from] ApiError),
}

/// Supplies final recognized utterances. The in-flight future is dropped and
/// re-created between loop turns, so implementations must tolerate
/// cancellation without losing buffered input.
#[async_trait]
pub trait SpeechSource: Send {
    /// Next final utterance, or `None` once the source is exhausted.
    async fn next_utterance(&mut self) -> Result<Option<String>, CallError>;
}

#[async_trait]
pub trait AudioOutput: Send + Sync {
    async fn speak(&self, audio: &[u8]) -> Result<(), CallError>;

    /// Cancel pending playback. Called when the call stops.
    fn cancel(&self);
}

/// Externally owned handle that ends a running call. Stopping cancels
/// pending playback immediately; an in-flight translation is abandoned, its
/// result never spoken.
pub struct CallHandle {
    stop: watch::Sender<bool>,
    output: Arc<dyn AudioOutput>,
}

impl CallHandle {
    pub fn stop(&self) {
        self.output.cancel();
        let _ = self.stop.send(true);
    }
}

type TranslationInFlight = Pin<
    Box<dyn Future<Output = (String, Result<String, ApiError>)> + Send>
>;

/// Drives the repeating listen -> translate -> speak cycle of a live call.
///
/// Each completed cycle appends exactly one transcript item and dispatches
/// exactly one synthesis call. A final utterance arriving while a previous
/// translation is still in flight is dropped, not queued; a failed
/// translation or synthesis ends that cycle only.
pub struct CallSession {
    translator: Arc<dyn TranslateClient>,
    speech: Arc<dyn SpeechClient>,
    output: Arc<dyn AudioOutput>,
    store: Option<Arc<dyn ConversationStore>>,
    conversation_id: Option<String>,
    source_lang: String,
    target_lang: String,
    state: CallState,
    transcript: Vec<TranscriptItem>,
    stop_rx: watch::Receiver<bool>,
    // Keeps the stop channel open even after the handle is dropped.
    _stop_keepalive: watch::Sender<bool>,
}

impl CallSession {
    pub fn new(
        translator: Arc<dyn TranslateClient>,
        speech: Arc<dyn SpeechClient>,
        output: Arc<dyn AudioOutput>,
        source_lang: impl Into<String>,
        target_lang: impl Into<String>
    ) -> (Self, CallHandle) {
        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = CallHandle {
            stop: stop_tx.clone(),
            output: Arc::clone(&output),
        };
        let session = Self {
            translator,
            speech,
            output,
            store: None,
            conversation_id: None,
            source_lang: source_lang.into(),
            target_lang: target_lang.into(),
            state: CallState::Idle,
            transcript: Vec::new(),
            stop_rx,
            _stop_keepalive: stop_tx,
        };
        (session, handle)
    }

    pub fn with_store(mut self, store: Arc<dyn ConversationStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn state(&self) -> CallState {
        self.state
    }

    pub fn transcript(&self) -> &[TranscriptItem] {
        &self.transcript
    }

    fn stopped(&self) -> bool {
        *self.stop_rx.borrow()
    }

    /// Run the capture loop until the source is exhausted or the handle
    /// stops the call.
    pub async fn run<S: SpeechSource>(&mut self, source: &mut S) -> Result<(), CallError> {
        self.state = CallState::Listening;
        let mut pending: Option<TranslationInFlight> = None;
        let mut stop_rx = self.stop_rx.clone();

        loop {
            tokio::select! {
                biased;
                _ = stop_rx.changed() => {
                    if *stop_rx.borrow() {
                        self.output.cancel();
                        break;
                    }
                }
                (original, result) = async { pending.as_mut().unwrap().await }, if pending.is_some() => {
                    pending = None;
                    self.finish_cycle(original, result).await;
                }
                utterance = source.next_utterance() => {
                    match utterance? {
                        Some(text) => {
                            if pending.is_some() {
                                debug!("Utterance dropped, translation still in flight: {}", text);
                                continue;
                            }
                            self.state = CallState::Processing;
                            let translator = Arc::clone(&self.translator);
                            let source_lang = self.source_lang.clone();
                            let target_lang = self.target_lang.clone();
                            pending = Some(Box::pin(async move {
                                let result = translator.translate(
                                    &text,
                                    &source_lang,
                                    &target_lang
                                ).await;
                                (text, result)
                            }));
                        }
                        None => {
                            if let Some(in_flight) = pending.take() {
                                let (original, result) = in_flight.await;
                                self.finish_cycle(original, result).await;
                            }
                            break;
                        }
                    }
                }
            }
        }

        self.state = CallState::Idle;
        Ok(())
    }

    async fn finish_cycle(&mut self, original: String, result: Result<String, ApiError>) {
        match result {
            Ok(translated) => {
                self.record(original, translated.clone()).await;
                if self.stopped() {
                    return;
                }
                self.state = CallState::Speaking;
                if let Err(e) = self.speak_translation(&translated).await {
                    warn!("Speech synthesis failed: {}", e);
                }
            }
            Err(e) => warn!("Translation failed, ending this cycle: {}", e),
        }
        self.state = CallState::Listening;
    }

    async fn record(&mut self, original: String, translated: String) {
        let item = TranscriptItem {
            original,
            translated,
            timestamp: Utc::now().timestamp(),
        };
        if let Err(e) = self.persist(&item).await {
            warn!("Transcript write failed: {}", e);
        }
        self.transcript.push(item);
    }

    async fn persist(&mut self, item: &TranscriptItem) -> Result<(), Box<dyn Error + Send + Sync>> {
        let Some(store) = self.store.clone() else {
            return Ok(());
        };

        let conversation_id = match &self.conversation_id {
            Some(id) => id.clone(),
            None => {
                let title = format!("Live call {}", Utc::now().format("%Y-%m-%d %H:%M"));
                let conversation = store.create_conversation(
                    ConversationKind::LiveCall,
                    &title
                ).await?;
                self.conversation_id = Some(conversation.id.clone());
                conversation.id
            }
        };

        store.add_message(
            &conversation_id,
            &NewMessage::translation(
                &item.original,
                &item.translated,
                &self.source_lang,
                &self.target_lang
            )
        ).await
    }

    async fn speak_translation(&self, translated: &str) -> Result<(), CallError> {
        let audio = self.speech.synthesize(translated).await?;
        if self.stopped() {
            return Ok(());
        }
        self.output.speak(&audio).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::MemoryConversationStore;
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::{ AtomicBool, Ordering };
    use tokio::sync::{ Notify, mpsc, Mutex };

    struct FixedTranslator;

    #[async_trait]
    impl TranslateClient for FixedTranslator {
        async fn translate(
            &self,
            text: &str,
            _source_lang: &str,
            _target_lang: &str
        ) -> Result<String, ApiError> {
            match text {
                "Hello" => Ok("Hola".to_string()),
                other => Ok(format!("[{}]", other)),
            }
        }
    }

    struct FailingTranslator;

    #[async_trait]
    impl TranslateClient for FailingTranslator {
        async fn translate(
            &self,
            _text: &str,
            _source_lang: &str,
            _target_lang: &str
        ) -> Result<String, ApiError> {
            Err(ApiError::Upstream {
                status: 500,
                message: "translator down".to_string(),
            })
        }
    }

    struct GatedTranslator {
        started: Arc<Notify>,
        gate: Arc<Notify>,
        calls: Arc<StdMutex<Vec<String>>>,
    }

    #[async_trait]
    impl TranslateClient for GatedTranslator {
        async fn translate(
            &self,
            text: &str,
            _source_lang: &str,
            _target_lang: &str
        ) -> Result<String, ApiError> {
            self.calls.lock().unwrap().push(text.to_string());
            self.started.notify_one();
            self.gate.notified().await;
            Ok("Hola".to_string())
        }
    }

    #[derive(Default)]
    struct RecordingSpeech {
        synthesized: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl SpeechClient for RecordingSpeech {
        async fn transcribe(&self, _audio: &[u8]) -> Result<String, ApiError> {
            Ok(String::new())
        }

        async fn synthesize(&self, text: &str) -> Result<Vec<u8>, ApiError> {
            self.synthesized.lock().await.push(text.to_string());
            Ok(b"mp3".to_vec())
        }
    }

    #[derive(Default)]
    struct RecordingOutput {
        spoken: Mutex<Vec<usize>>,
        cancelled: AtomicBool,
    }

    #[async_trait]
    impl AudioOutput for RecordingOutput {
        async fn speak(&self, audio: &[u8]) -> Result<(), CallError> {
            self.spoken.lock().await.push(audio.len());
            Ok(())
        }

        fn cancel(&self) {
            self.cancelled.store(true, Ordering::SeqCst);
        }
    }

    struct ChannelSource {
        rx: mpsc::Receiver<String>,
    }

    #[async_trait]
    impl SpeechSource for ChannelSource {
        async fn next_utterance(&mut self) -> Result<Option<String>, CallError> {
            Ok(self.rx.recv().await)
        }
    }

    #[tokio::test]
    async fn one_utterance_yields_one_transcript_item_and_one_synthesis() {
        let speech = Arc::new(RecordingSpeech::default());
        let output = Arc::new(RecordingOutput::default());
        let (mut session, _handle) = CallSession::new(
            Arc::new(FixedTranslator),
            speech.clone(),
            output.clone(),
            "en",
            "es"
        );

        let (tx, rx) = mpsc::channel(4);
        tx.send("Hello".to_string()).await.unwrap();
        drop(tx);
        let mut source = ChannelSource { rx };

        session.run(&mut source).await.unwrap();

        assert_eq!(session.transcript().len(), 1);
        assert_eq!(session.transcript()[0].original, "Hello");
        assert_eq!(session.transcript()[0].translated, "Hola");
        assert_eq!(speech.synthesized.lock().await.as_slice(), ["Hola"]);
        assert_eq!(output.spoken.lock().await.len(), 1);
        assert_eq!(session.state(), CallState::Idle);
    }

    #[tokio::test]
    async fn stopping_with_a_translation_pending_speaks_nothing() {
        let started = Arc::new(Notify::new());
        let gate = Arc::new(Notify::new());
        let calls = Arc::new(StdMutex::new(Vec::new()));
        let translator = Arc::new(GatedTranslator {
            started: started.clone(),
            gate: gate.clone(),
            calls: calls.clone(),
        });
        let speech = Arc::new(RecordingSpeech::default());
        let output = Arc::new(RecordingOutput::default());
        let (session, handle) = CallSession::new(
            translator,
            speech.clone(),
            output.clone(),
            "en",
            "es"
        );

        let (tx, rx) = mpsc::channel(4);
        let task = tokio::spawn(async move {
            let mut session = session;
            let mut source = ChannelSource { rx };
            let result = session.run(&mut source).await;
            (session, result)
        });

        tx.send("Hello".to_string()).await.unwrap();
        started.notified().await;
        handle.stop();
        gate.notify_one();

        let (session, result) = task.await.unwrap();
        result.unwrap();

        assert!(speech.synthesized.lock().await.is_empty());
        assert!(output.spoken.lock().await.is_empty());
        assert!(output.cancelled.load(Ordering::SeqCst));
        assert_eq!(session.state(), CallState::Idle);
        drop(tx);
    }

    #[tokio::test]
    async fn an_utterance_arriving_mid_translation_is_dropped_not_duplicated() {
        let started = Arc::new(Notify::new());
        let gate = Arc::new(Notify::new());
        let calls = Arc::new(StdMutex::new(Vec::new()));
        let translator = Arc::new(GatedTranslator {
            started: started.clone(),
            gate: gate.clone(),
            calls: calls.clone(),
        });
        let speech = Arc::new(RecordingSpeech::default());
        let output = Arc::new(RecordingOutput::default());
        let (session, _handle) = CallSession::new(
            translator,
            speech.clone(),
            output.clone(),
            "en",
            "es"
        );

        let (tx, rx) = mpsc::channel(2);
        let task = tokio::spawn(async move {
            let mut session = session;
            let mut source = ChannelSource { rx };
            let result = session.run(&mut source).await;
            (session, result)
        });

        tx.send("Hello".to_string()).await.unwrap();
        started.notified().await;
        tx.send("Hello again".to_string()).await.unwrap();
        // Wait until the loop has consumed (and dropped) the second utterance.
        while tx.capacity() < tx.max_capacity() {
            tokio::task::yield_now().await;
        }
        gate.notify_one();
        drop(tx);

        let (session, result) = task.await.unwrap();
        result.unwrap();

        assert_eq!(calls.lock().unwrap().as_slice(), ["Hello"]);
        assert_eq!(session.transcript().len(), 1);
        assert_eq!(speech.synthesized.lock().await.as_slice(), ["Hola"]);
    }

    #[tokio::test]
    async fn a_failed_translation_skips_the_cycle_without_ending_the_call() {
        let speech = Arc::new(RecordingSpeech::default());
        let output = Arc::new(RecordingOutput::default());
        let (mut session, _handle) = CallSession::new(
            Arc::new(FailingTranslator),
            speech.clone(),
            output.clone(),
            "en",
            "es"
        );

        let (tx, rx) = mpsc::channel(4);
        tx.send("Hello".to_string()).await.unwrap();
        tx.send("Hello".to_string()).await.unwrap();
        drop(tx);
        let mut source = ChannelSource { rx };

        session.run(&mut source).await.unwrap();

        assert!(session.transcript().is_empty());
        assert!(speech.synthesized.lock().await.is_empty());
        assert_eq!(session.state(), CallState::Idle);
    }

    #[tokio::test]
    async fn transcript_items_are_persisted_to_a_live_call_conversation() {
        let store = Arc::new(MemoryConversationStore::new());
        let speech = Arc::new(RecordingSpeech::default());
        let output = Arc::new(RecordingOutput::default());
        let (session, _handle) = CallSession::new(
            Arc::new(FixedTranslator),
            speech,
            output,
            "en",
            "es"
        );
        let mut session = session.with_store(store.clone());

        let (tx, rx) = mpsc::channel(4);
        tx.send("Hello".to_string()).await.unwrap();
        drop(tx);
        let mut source = ChannelSource { rx };
        session.run(&mut source).await.unwrap();

        let conversations = store
            .list_conversations(Some(ConversationKind::LiveCall)).await
            .unwrap();
        assert_eq!(conversations.len(), 1);
        let rows = store.get_messages(&conversations[0].id, 10).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].content, "Hello");
        assert_eq!(rows[0].translated_content.as_deref(), Some("Hola"));
        assert_eq!(rows[0].target_lang.as_deref(), Some("es"));
    }
}
