use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use moka::future::Cache;
use sha2::{Digest, Sha256};

use super::synth::SpeechSynthesizer;
use super::voices;
use super::{AudioReference, RenderError, RenderOptions};

/// Spoken form of a chat comment.
pub fn readout_text(user: &str, text: &str) -> String {
    format!("{user} dice: {text}")
}

/// Content-addressed key for a render: SHA-256 over the text, resolved
/// language, and playback options.
pub fn cache_key(text: &str, language: &str, options: RenderOptions) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hasher.update(b"|");
    hasher.update(language.as_bytes());
    hasher.update(format!("|{:.2}|{:.2}", options.speed, options.volume).as_bytes());

    hasher
        .finalize()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

/// How long [`TtsGateway::audio`] waits for a reserved clip unless configured.
pub const DEFAULT_AUDIO_WAIT: Duration = Duration::from_secs(3);

/// Validated inputs of one render.
#[derive(Debug, Clone)]
struct RenderRequest {
    text: String,
    language: &'static str,
    options: RenderOptions,
}

impl RenderRequest {
    fn new(text: &str, voice: &str, options: RenderOptions) -> Result<Self, RenderError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(RenderError::EmptyText);
        }
        Ok(Self {
            text: text.to_string(),
            language: voices::language_for(voice),
            options,
        })
    }

    fn key(&self) -> String {
        cache_key(&self.text, self.language, self.options)
    }
}

/// Cache-fronted access to a [`SpeechSynthesizer`].
pub struct TtsGateway {
    synthesizer: Arc<dyn SpeechSynthesizer>,
    cache: Cache<String, Bytes>,
    /// Inputs of clips handed out by [`reserve`](TtsGateway::reserve), so a
    /// request for one can join or redo its render.
    reserved: Cache<String, RenderRequest>,
    audio_wait: Duration,
}

impl TtsGateway {
    pub fn new(synthesizer: Arc<dyn SpeechSynthesizer>, capacity: u64, ttl: Duration) -> Self {
        Self {
            synthesizer,
            cache: Cache::builder()
                .max_capacity(capacity)
                .time_to_live(ttl)
                .build(),
            reserved: Cache::builder()
                .max_capacity(capacity)
                .time_to_live(ttl)
                .build(),
            audio_wait: DEFAULT_AUDIO_WAIT,
        }
    }

    /// Bound how long [`audio`](TtsGateway::audio) waits for a reserved clip.
    pub fn with_audio_wait(mut self, wait: Duration) -> Self {
        self.audio_wait = wait;
        self
    }

    /// Render `text` and return a reference to the cached clip.
    pub async fn render(
        &self,
        text: &str,
        voice: &str,
        options: RenderOptions,
    ) -> Result<AudioReference, RenderError> {
        let request = RenderRequest::new(text, voice, options)?;
        let key = request.key();
        self.fill(key.clone(), &request).await?;
        Ok(AudioReference::for_key(key))
    }

    /// Render `text` and return the encoded audio itself.
    pub async fn render_bytes(
        &self,
        text: &str,
        voice: &str,
        options: RenderOptions,
    ) -> Result<Bytes, RenderError> {
        let request = RenderRequest::new(text, voice, options)?;
        self.fill(request.key(), &request).await
    }

    /// Return a reference for `text` right away and render it in the background.
    ///
    /// Only input validation can fail here. A background failure is logged and
    /// the clip is rendered again when it is requested.
    pub async fn reserve(
        self: &Arc<Self>,
        text: &str,
        voice: &str,
        options: RenderOptions,
    ) -> Result<AudioReference, RenderError> {
        let request = RenderRequest::new(text, voice, options)?;
        let key = request.key();

        if !self.cache.contains_key(&key) {
            self.reserved.insert(key.clone(), request.clone()).await;

            let gateway = Arc::clone(self);
            let background_key = key.clone();
            tokio::spawn(async move {
                if let Err(err) = gateway.fill(background_key, &request).await {
                    tracing::warn!(language = request.language, %err, "background render failed");
                }
            });
        }

        Ok(AudioReference::for_key(key))
    }

    /// The clip for `key`. A reserved clip still rendering is awaited for at
    /// most the configured wait.
    pub async fn audio(&self, key: &str) -> Option<Bytes> {
        if let Some(audio) = self.cache.get(key).await {
            return Some(audio);
        }
        let request = self.reserved.get(key).await?;

        match tokio::time::timeout(self.audio_wait, self.fill(key.to_string(), &request)).await {
            Ok(Ok(audio)) => Some(audio),
            Ok(Err(err)) => {
                tracing::debug!(%key, %err, "reserved clip could not be rendered");
                None
            }
            Err(_) => {
                tracing::debug!(%key, "reserved clip not ready in time");
                None
            }
        }
    }

    async fn fill(&self, key: String, request: &RenderRequest) -> Result<Bytes, RenderError> {
        // Concurrent callers with the same key share one synthesizer call.
        self.cache
            .try_get_with(key, async {
                tracing::debug!(
                    language = request.language,
                    chars = request.text.chars().count(),
                    "rendering speech"
                );
                self.synthesizer
                    .synthesize(&request.text, request.language, request.options)
                    .await
            })
            .await
            .map_err(|err| (*err).clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingSynth {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl SpeechSynthesizer for CountingSynth {
        async fn synthesize(
            &self,
            text: &str,
            language: &str,
            _options: RenderOptions,
        ) -> Result<Bytes, RenderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok(Bytes::from(format!("{language}:{text}")))
        }
    }

    #[derive(Default)]
    struct SlowSynth {
        calls: AtomicUsize,
    }

    impl SlowSynth {
        const DELAY: Duration = Duration::from_millis(200);
    }

    #[async_trait]
    impl SpeechSynthesizer for SlowSynth {
        async fn synthesize(
            &self,
            text: &str,
            language: &str,
            _options: RenderOptions,
        ) -> Result<Bytes, RenderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Self::DELAY).await;
            Ok(Bytes::from(format!("{language}:{text}")))
        }
    }

    struct FailingSynth;

    #[async_trait]
    impl SpeechSynthesizer for FailingSynth {
        async fn synthesize(&self, _: &str, _: &str, _: RenderOptions) -> Result<Bytes, RenderError> {
            Err(RenderError::Status(503))
        }
    }

    fn gateway(synth: Arc<dyn SpeechSynthesizer>) -> TtsGateway {
        TtsGateway::new(synth, 64, Duration::from_secs(60))
    }

    #[tokio::test]
    async fn identical_renders_call_synthesizer_once() {
        let synth = Arc::new(CountingSynth::default());
        let gw = gateway(synth.clone());

        let (a, b) = tokio::join!(
            gw.render("hola", "es", RenderOptions::default()),
            gw.render("hola", "Lucia", RenderOptions::default()),
        );
        assert_eq!(a.unwrap(), b.unwrap());
        gw.render("hola", "es", RenderOptions::default()).await.unwrap();

        assert_eq!(synth.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn speed_changes_the_key() {
        let synth = Arc::new(CountingSynth::default());
        let gw = gateway(synth.clone());

        let normal = gw.render("hola", "es", RenderOptions::default()).await.unwrap();
        let fast = gw
            .render("hola", "es", RenderOptions { speed: 1.5, volume: 1.0 })
            .await
            .unwrap();

        assert_ne!(normal.key, fast.key);
        assert_eq!(synth.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn rendered_audio_is_served_by_key() {
        let gw = gateway(Arc::new(CountingSynth::default()));
        let reference = gw.render("hi", "en", RenderOptions::default()).await.unwrap();

        assert_eq!(reference.url, format!("/tts/audio/{}", reference.key));
        assert_eq!(reference.format, "mp3");
        assert_eq!(gw.audio(&reference.key).await.unwrap(), Bytes::from("en:hi"));
        assert!(gw.audio("missing").await.is_none());
    }

    #[tokio::test]
    async fn failures_are_not_cached() {
        let gw = gateway(Arc::new(FailingSynth));
        let err = gw.render("hola", "es", RenderOptions::default()).await.unwrap_err();
        assert_eq!(err, RenderError::Status(503));
        let key = cache_key("hola", "es", RenderOptions::default());
        assert!(gw.audio(&key).await.is_none());
    }

    #[tokio::test]
    async fn blank_text_is_rejected() {
        let gw = gateway(Arc::new(FailingSynth));
        assert_eq!(
            gw.render("  ", "es", RenderOptions::default()).await.unwrap_err(),
            RenderError::EmptyText
        );
    }

    #[tokio::test]
    async fn reserved_clip_is_served_once_rendered() {
        let synth = Arc::new(SlowSynth::default());
        let gw = Arc::new(gateway(synth.clone()));

        let began = tokio::time::Instant::now();
        let reference = gw
            .reserve("fan dice: hola", "Lucia", RenderOptions::default())
            .await
            .unwrap();
        assert!(began.elapsed() < SlowSynth::DELAY);
        assert_eq!(reference.key, cache_key("fan dice: hola", "es", RenderOptions::default()));

        // Joins the background render rather than starting another.
        let audio = gw.audio(&reference.key).await.unwrap();
        assert_eq!(audio, Bytes::from("es:fan dice: hola"));
        assert_eq!(synth.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn audio_gives_up_after_the_wait() {
        let gw = Arc::new(
            gateway(Arc::new(SlowSynth::default())).with_audio_wait(Duration::from_millis(10)),
        );
        let reference = gw.reserve("hola", "es", RenderOptions::default()).await.unwrap();
        assert!(gw.audio(&reference.key).await.is_none());
    }

    #[tokio::test]
    async fn reserve_rejects_blank_text() {
        let gw = Arc::new(gateway(Arc::new(FailingSynth)));
        assert_eq!(
            gw.reserve(" ", "es", RenderOptions::default()).await.unwrap_err(),
            RenderError::EmptyText
        );
    }

    #[test]
    fn readout_names_the_author() {
        assert_eq!(readout_text("ana", "hola"), "ana dice: hola");
    }
}
