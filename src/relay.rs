//! Deduplicated fan-out of final utterances to the room data channel.
//!
//! Realtime transcription can surface the same finalized text more than once
//! in quick succession, once per completed response item and again when the
//! vendor re-finalizes a segment. Listeners render every data message they
//! receive, so the relay suppresses repeats inside a short window instead of
//! forwarding them.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use static_assertions::assert_impl_all;
use tracing::{debug, warn};

use quotevoice_core::{Speaker, TranscriptPublisher, TranscriptionMessage};

/// Repeats of the same normalized text inside this window are dropped.
pub const SUPPRESS_WINDOW: Duration = Duration::from_secs(2);
/// Entries older than this are pruned whenever a new text is recorded.
pub const PRUNE_HORIZON: Duration = Duration::from_secs(5);

/// Normalization applied before texts are compared for recency.
pub fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}

/// Remembers recently seen texts. Time is passed in by the caller, the cache
/// itself never consults the clock.
#[derive(Debug, Default)]
pub struct RecencyCache {
    entries: HashMap<String, Instant>,
}

impl RecencyCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `key` at `now`. Returns `false` if the same key was already
    /// seen inside [`SUPPRESS_WINDOW`], in which case the caller should drop
    /// the message.
    pub fn observe(&mut self, key: String, now: Instant) -> bool {
        if let Some(last) = self.entries.get(&key)
            && now.saturating_duration_since(*last) < SUPPRESS_WINDOW
        {
            return false;
        }
        self.entries
            .retain(|_, seen| now.saturating_duration_since(*seen) < PRUNE_HORIZON);
        self.entries.insert(key, now);
        true
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Publishes finalized utterances through a [`TranscriptPublisher`], dropping
/// near-duplicates. Scoped to one session, the cache dies with it.
#[derive(Debug)]
pub struct TranscriptRelay {
    cache: RecencyCache,
    publisher: Arc<dyn TranscriptPublisher>,
}

assert_impl_all!(TranscriptRelay: Send);

impl TranscriptRelay {
    pub fn new(publisher: Arc<dyn TranscriptPublisher>) -> Self {
        Self {
            cache: RecencyCache::new(),
            publisher,
        }
    }

    /// Relays one finalized utterance. Publish failures are logged and
    /// swallowed, a dropped transcript must not tear down the audio session.
    pub async fn relay(&mut self, sender: Speaker, text: &str) {
        self.relay_at(sender, text, Instant::now()).await
    }

    pub(crate) async fn relay_at(&mut self, sender: Speaker, text: &str, now: Instant) {
        let key = normalize(text);
        if key.is_empty() {
            return;
        }
        if !self.cache.observe(key, now) {
            debug!("Suppressing duplicate {sender:?} transcription");
            return;
        }
        let message = TranscriptionMessage {
            sender,
            text: text.trim().to_owned(),
        };
        if let Err(e) = self.publisher.publish(&message).await {
            warn!("Failed to publish transcription: {e:#}");
        }
    }
}
