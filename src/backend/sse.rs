use serde::Deserialize;

#[derive(Deserialize)]
struct StreamFrame {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
}

#[derive(Deserialize, Default)]
struct StreamDelta {
    content: Option<String>,
}

/// Incremental decoder for the streaming chat wire format: newline-delimited
/// SSE frames whose `data: ` payloads carry `{choices:[{delta:{content}}]}`
/// fragments, terminated by a literal `data: [DONE]`.
///
/// The decoder is a pure function of the bytes fed to it: any chunking of the
/// same byte sequence yields the same token sequence. A `data:` line whose
/// JSON does not parse is pushed back onto the buffer and retried once more
/// bytes arrive, so a frame split across reads is deferred, never dropped.
pub struct SseDecoder {
    buffer: Vec<u8>,
    done: bool,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self {
            buffer: Vec::new(),
            done: false,
        }
    }

    /// True once the `[DONE]` sentinel has been seen; later bytes are ignored.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Feed a chunk of the response body, returning every content token that
    /// became available.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut tokens = Vec::new();
        if self.done {
            return tokens;
        }
        self.buffer.extend_from_slice(chunk);

        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line_bytes: Vec<u8> = self.buffer.drain(..=pos).collect();
            let mut line = String::from_utf8_lossy(&line_bytes[..line_bytes.len() - 1]).into_owned();
            if line.ends_with('\r') {
                line.pop();
            }

            if line.trim().is_empty() || line.starts_with(':') {
                continue;
            }
            let payload = match line.strip_prefix("data: ") {
                Some(p) => p.trim().to_string(),
                None => continue,
            };

            if payload == "[DONE]" {
                self.done = true;
                self.buffer.clear();
                return tokens;
            }

            match serde_json::from_str::<StreamFrame>(&payload) {
                Ok(frame) => {
                    for choice in frame.choices {
                        if let Some(content) = choice.delta.content {
                            if !content.is_empty() {
                                tokens.push(content);
                            }
                        }
                    }
                }
                Err(_) => {
                    // Incomplete frame: restore the line and wait for more bytes.
                    let mut restored = line.into_bytes();
                    restored.push(b'\n');
                    restored.extend_from_slice(&self.buffer);
                    self.buffer = restored;
                    break;
                }
            }
        }

        tokens
    }
}

impl Default for SseDecoder {
    fn default() -> Self {
        Self::new()
    }
}
