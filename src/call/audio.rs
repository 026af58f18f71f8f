use async_trait::async_trait;
use log::info;
use std::path::PathBuf;
use std::sync::atomic::{ AtomicBool, AtomicUsize, Ordering };
use tokio::io::{ AsyncBufReadExt, BufReader, Lines, Stdin };

use super::{ AudioOutput, CallError, SpeechSource };

/// Terminal stand-in for a speech recognizer: every non-empty line typed on
/// stdin is treated as one final utterance.
pub struct StdinSpeechSource {
    lines: Lines<BufReader<Stdin>>,
}

impl StdinSpeechSource {
    pub fn new() -> Self {
        Self {
            lines: BufReader::new(tokio::io::stdin()).lines(),
        }
    }
}

impl Default for StdinSpeechSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SpeechSource for StdinSpeechSource {
    async fn next_utterance(&mut self) -> Result<Option<String>, CallError> {
        loop {
            match self.lines.next_line().await {
                Ok(Some(line)) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    return Ok(Some(line.to_string()));
                }
                Ok(None) => {
                    return Ok(None);
                }
                Err(e) => {
                    return Err(CallError::Source(e.to_string()));
                }
            }
        }
    }
}

/// Audio sink that saves each synthesized reply as a numbered mp3 file.
/// Cancelling suppresses any playback still pending when the call stops.
pub struct FileAudioOutput {
    dir: PathBuf,
    counter: AtomicUsize,
    cancelled: AtomicBool,
}

impl FileAudioOutput {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            counter: AtomicUsize::new(0),
            cancelled: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl AudioOutput for FileAudioOutput {
    async fn speak(&self, audio: &[u8]) -> Result<(), CallError> {
        if self.cancelled.load(Ordering::SeqCst) {
            return Ok(());
        }
        tokio::fs
            ::create_dir_all(&self.dir).await
            .map_err(|e| CallError::Output(e.to_string()))?;

        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        let path = self.dir.join(format!("utterance-{:03}.mp3", n));
        tokio::fs::write(&path, audio).await.map_err(|e| CallError::Output(e.to_string()))?;
        info!("Saved synthesized audio to {}", path.display());
        Ok(())
    }

    fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn speak_writes_numbered_files() {
        let dir = tempfile::tempdir().unwrap();
        let output = FileAudioOutput::new(dir.path());

        output.speak(b"first").await.unwrap();
        output.speak(b"second").await.unwrap();

        let first = std::fs::read(dir.path().join("utterance-000.mp3")).unwrap();
        let second = std::fs::read(dir.path().join("utterance-001.mp3")).unwrap();
        assert_eq!(first, b"first");
        assert_eq!(second, b"second");
    }

    #[tokio::test]
    async fn cancel_suppresses_later_playback() {
        let dir = tempfile::tempdir().unwrap();
        let output = FileAudioOutput::new(dir.path());

        output.cancel();
        output.speak(b"late arrival").await.unwrap();

        assert!(std::fs::read_dir(dir.path()).unwrap().next().is_none());
    }
}
