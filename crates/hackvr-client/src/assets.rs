//! Content-addressed asset cache.
//!
//! Assets are identified by `(uri, sha256)`. The cache deduplicates
//! in-flight fetches for the same key, verifies the hash of whatever the
//! fetcher returns, and downgrades failures to placeholders (magenta
//! checker for images, an ASCII-covering fallback for fonts) instead of
//! surfacing errors. A small retry budget per key keeps a flapping asset
//! server from turning the viewer into a request cannon.

use std::collections::HashMap;

use hackvr_proto::AssetRef;
use sha2::{Digest, Sha256};

/// Retries allowed per asset key before the placeholder becomes permanent.
pub const DEFAULT_RETRY_BUDGET: u32 = 3;

/// What an asset is used for; picks the placeholder on failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssetKind {
    /// Sprite image (PNG or JPEG at minimum).
    Image,
    /// Text sprite font (TTF at minimum).
    Font,
}

/// Cache entry state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetState {
    /// A fetch is in flight; further requests coalesce.
    Pending,
    /// Bytes arrived and matched their hash.
    Ready(Vec<u8>),
    /// Fetch failed or hash mismatched; render the placeholder.
    Placeholder,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Key {
    uri: String,
    sha256: [u8; 32],
}

impl Key {
    fn of(asset: &AssetRef) -> Self {
        Self { uri: asset.uri.to_string(), sha256: asset.sha256 }
    }
}

#[derive(Debug)]
struct Entry {
    kind: AssetKind,
    state: AssetState,
    attempts: u32,
}

/// The viewer-side asset cache.
#[derive(Debug, Default)]
pub struct AssetCache {
    entries: HashMap<Key, Entry>,
    retry_budget: u32,
}

impl AssetCache {
    /// Cache with the default retry budget.
    #[must_use]
    pub fn new() -> Self {
        Self { entries: HashMap::new(), retry_budget: DEFAULT_RETRY_BUDGET }
    }

    /// Note that the scene references `asset`. Returns `true` when the
    /// caller should start a fetch: the first request for a key, or a
    /// retry of a failed one with budget remaining. Concurrent requests for
    /// the same key coalesce into the pending entry.
    pub fn request(&mut self, asset: &AssetRef, kind: AssetKind) -> bool {
        let budget = self.retry_budget;
        let entry = self.entries.entry(Key::of(asset)).or_insert(Entry {
            kind,
            state: AssetState::Placeholder,
            attempts: 0,
        });
        match &entry.state {
            AssetState::Pending | AssetState::Ready(_) => false,
            AssetState::Placeholder => {
                if entry.attempts >= budget {
                    return false;
                }
                entry.attempts += 1;
                entry.state = AssetState::Pending;
                true
            }
        }
    }

    /// Deliver fetch results. `bytes` is `None` on transport failure. The
    /// hash of delivered bytes is verified here; a mismatch is the same as
    /// a failure.
    pub fn on_fetched(&mut self, asset: &AssetRef, bytes: Option<Vec<u8>>) {
        let Some(entry) = self.entries.get_mut(&Key::of(asset)) else {
            return;
        };
        entry.state = match bytes {
            Some(bytes) if sha256(&bytes) == asset.sha256 => AssetState::Ready(bytes),
            _ => AssetState::Placeholder,
        };
    }

    /// Current state of an asset, if it was ever requested.
    #[must_use]
    pub fn state(&self, asset: &AssetRef) -> Option<&AssetState> {
        self.entries.get(&Key::of(asset)).map(|e| &e.state)
    }

    /// The asset's kind, for placeholder selection.
    #[must_use]
    pub fn kind(&self, asset: &AssetRef) -> Option<AssetKind> {
        self.entries.get(&Key::of(asset)).map(|e| e.kind)
    }
}

fn sha256(bytes: &[u8]) -> [u8; 32] {
    Sha256::digest(bytes).into()
}
