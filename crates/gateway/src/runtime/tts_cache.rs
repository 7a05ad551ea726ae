//! TTS cache with request coalescing.
//!
//! Keyed by `sha256(text || voice || language)`. Concurrent misses for
//! the same key serialize on a per-key async mutex, so exactly one
//! upstream synthesis call happens; the rest read the filled entry.
//! Entries expire after the configured TTL (default 24 h).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};

use candor_domain::config::TtsConfig;
use candor_domain::error::Result;
use candor_providers::TtsProvider;

use crate::storage::Storage;

#[derive(Clone)]
struct Ready {
    audio_ref: String,
    at: Instant,
}

type KeySlot = Arc<tokio::sync::Mutex<Option<Ready>>>;

pub struct TtsCache {
    provider: Arc<dyn TtsProvider>,
    storage: Arc<Storage>,
    ttl: Duration,
    deadline: Duration,
    entries: parking_lot::Mutex<HashMap<String, KeySlot>>,
}

impl TtsCache {
    pub fn new(provider: Arc<dyn TtsProvider>, storage: Arc<Storage>, cfg: &TtsConfig) -> Self {
        Self {
            provider,
            storage,
            ttl: Duration::from_secs(cfg.cache_ttl_hours * 3600),
            deadline: Duration::from_secs(cfg.call_deadline_s),
            entries: parking_lot::Mutex::new(HashMap::new()),
        }
    }

    pub fn cache_key(text: &str, voice: &str, language: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(text.as_bytes());
        hasher.update(voice.as_bytes());
        hasher.update(language.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Synthesize (or fetch cached) audio for a question. Returns the
    /// storage reference of the audio file.
    pub async fn synthesize(&self, text: &str, voice: &str, language: &str) -> Result<String> {
        let key = Self::cache_key(text, voice, language);

        let slot: KeySlot = {
            let mut entries = self.entries.lock();
            entries.entry(key.clone()).or_default().clone()
        };

        // Coalescing point: one filler, everyone else waits here.
        let mut guard = slot.lock().await;
        if let Some(ready) = guard.as_ref() {
            if ready.at.elapsed() < self.ttl {
                return Ok(ready.audio_ref.clone());
            }
        }

        let audio = tokio::time::timeout(
            self.deadline,
            self.provider.synthesize(text, voice, language),
        )
        .await
        .map_err(|_| candor_domain::Error::Timeout("tts call deadline".into()))??;

        let audio_ref = self.storage.write_tts(&key, audio).await?;
        *guard = Some(Ready {
            audio_ref: audio_ref.clone(),
            at: Instant::now(),
        });
        Ok(audio_ref)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingTts {
        calls: AtomicU32,
        delay_ms: u64,
    }

    #[async_trait::async_trait]
    impl TtsProvider for CountingTts {
        async fn synthesize(&self, text: &str, _voice: &str, _lang: &str) -> Result<Vec<u8>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
            }
            Ok(text.as_bytes().to_vec())
        }

        fn provider_id(&self) -> &str {
            "counting"
        }
    }

    fn cache(delay_ms: u64) -> (Arc<TtsCache>, Arc<CountingTts>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(Storage::new(dir.path()));
        storage.ensure_layout().unwrap();
        let provider = Arc::new(CountingTts {
            calls: AtomicU32::new(0),
            delay_ms,
        });
        let cfg = TtsConfig::default();
        let cache = Arc::new(TtsCache::new(provider.clone(), storage, &cfg));
        (cache, provider, dir)
    }

    #[tokio::test]
    async fn hit_after_miss_skips_provider() {
        let (cache, provider, _dir) = cache(0);
        let a = cache.synthesize("hello", "alloy", "en").await.unwrap();
        let b = cache.synthesize("hello", "alloy", "en").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn different_voice_is_a_different_key() {
        let (cache, provider, _dir) = cache(0);
        cache.synthesize("hello", "alloy", "en").await.unwrap();
        cache.synthesize("hello", "verse", "en").await.unwrap();
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn concurrent_misses_coalesce_to_one_call() {
        let (cache, provider, _dir) = cache(50);
        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move {
                cache.synthesize("same text", "alloy", "en").await
            }));
        }
        let mut refs = Vec::new();
        for h in handles {
            refs.push(h.await.unwrap().unwrap());
        }
        assert!(refs.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn cache_key_is_stable_and_distinct() {
        let a = TtsCache::cache_key("q", "alloy", "en");
        let b = TtsCache::cache_key("q", "alloy", "en");
        let c = TtsCache::cache_key("q", "alloy", "hi");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
