//! Speech synthesizers.

use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use reqwest::header;

use super::{RenderError, RenderOptions};

/// Longest text the translate endpoint accepts per request, in characters.
pub const MAX_CHUNK_CHARS: usize = 200;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
    (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
const REFERER: &str = "https://translate.google.com/";

/// Renders text in a language to encoded audio.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(
        &self,
        text: &str,
        language: &str,
        options: RenderOptions,
    ) -> Result<Bytes, RenderError>;
}

/// Synthesizer backed by Google Translate's public `translate_tts` endpoint.
///
/// The endpoint renders at a fixed rate and level, so `speed` and `volume`
/// are left to the player.
pub struct GoogleTranslateSynthesizer {
    client: reqwest::Client,
    endpoint: String,
}

impl GoogleTranslateSynthesizer {
    pub fn new(endpoint: impl Into<String>) -> Result<Self, RenderError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(BROWSER_USER_AGENT)
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    async fn fetch_chunk(&self, chunk: &str, language: &str) -> Result<Bytes, RenderError> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("ie", "UTF-8"),
                ("q", chunk),
                ("tl", language),
                ("client", "tw-ob"),
            ])
            .header(header::REFERER, REFERER)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.bytes().await?)
    }
}

#[async_trait]
impl SpeechSynthesizer for GoogleTranslateSynthesizer {
    async fn synthesize(
        &self,
        text: &str,
        language: &str,
        _options: RenderOptions,
    ) -> Result<Bytes, RenderError> {
        let mut audio = BytesMut::new();
        for chunk in split_into_chunks(text, MAX_CHUNK_CHARS) {
            let bytes = self.fetch_chunk(&chunk, language).await.inspect_err(|err| {
                tracing::warn!(%language, ?err, "speech chunk request failed");
            })?;
            audio.extend_from_slice(&bytes);
        }

        if audio.is_empty() {
            return Err(RenderError::EmptyAudio);
        }
        Ok(audio.freeze())
    }
}

/// Split `text` on spaces into chunks of at most `max_chars` characters.
/// A single word longer than `max_chars` is cut at character boundaries.
pub fn split_into_chunks(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let text = text.trim();
    if text.chars().count() <= max_chars {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for word in text.split_whitespace() {
        let word_len = word.chars().count();

        if word_len > max_chars {
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
                current_len = 0;
            }
            let chars: Vec<char> = word.chars().collect();
            for piece in chars.chunks(max_chars) {
                chunks.push(piece.iter().collect());
            }
            continue;
        }

        let joined_len = if current.is_empty() {
            word_len
        } else {
            current_len + 1 + word_len
        };

        if joined_len <= max_chars {
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(word);
            current_len = joined_len;
        } else {
            chunks.push(std::mem::replace(&mut current, word.to_string()));
            current_len = word_len;
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_one_chunk() {
        assert_eq!(split_into_chunks("hola mundo", 200), vec!["hola mundo"]);
    }

    #[test]
    fn chunks_never_exceed_limit() {
        let text = "palabra ".repeat(120);
        let chunks = split_into_chunks(&text, MAX_CHUNK_CHARS);
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.chars().count() <= MAX_CHUNK_CHARS));
        assert_eq!(chunks.join(" "), text.trim());
    }

    #[test]
    fn oversized_word_is_cut() {
        let word = "ñ".repeat(450);
        let chunks = split_into_chunks(&format!("hi {word} bye"), MAX_CHUNK_CHARS);
        assert_eq!(chunks.first().map(String::as_str), Some("hi"));
        assert_eq!(chunks.last().map(String::as_str), Some("bye"));
        assert!(chunks.iter().all(|c| c.chars().count() <= MAX_CHUNK_CHARS));
        assert_eq!(chunks.len(), 5);
    }
}
