//! The server's authentication identity store.
//!
//! Maps `userid → Ed25519 public key`. No passwords exist in the system at
//! all. The store is read-mostly and shared across every connection, so it
//! sits behind a `RwLock`; lookups tolerate slightly stale data while an
//! operator reloads the file.
//!
//! On-disk format: one `userid<TAB>hex-public-key` pair per line, `#`
//! comments and blank lines ignored.

use std::{collections::HashMap, path::Path, sync::RwLock};

use ed25519_dalek::VerifyingKey;
use hackvr_core::IdentityLookup;
use hackvr_proto::UserId;
use thiserror::Error;

/// Errors loading the identity file.
#[derive(Error, Debug)]
pub enum IdentityError {
    /// The file could not be read.
    #[error("cannot read identity file: {0}")]
    Io(#[from] std::io::Error),

    /// A line did not parse.
    #[error("bad identity entry on line {line}: {reason}")]
    BadEntry {
        /// 1-based line number.
        line: usize,
        /// What was wrong.
        reason: &'static str,
    },
}

/// Shared `userid → VerifyingKey` table.
#[derive(Debug, Default)]
pub struct IdentityStore {
    keys: RwLock<HashMap<String, VerifyingKey>>,
}

impl IdentityStore {
    /// Empty store: every non-anonymous authentication gets rejected.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from the tab-separated file format.
    pub fn load(path: &Path) -> Result<Self, IdentityError> {
        let text = std::fs::read_to_string(path)?;
        let mut keys = HashMap::new();
        for (index, raw) in text.lines().enumerate() {
            let line = index + 1;
            let trimmed = raw.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let Some((user, key_hex)) = trimmed.split_once('\t') else {
                return Err(IdentityError::BadEntry { line, reason: "missing tab separator" });
            };
            let user = UserId::parse(user)
                .map_err(|_| IdentityError::BadEntry { line, reason: "invalid userid" })?;
            if user.is_anonymous() {
                return Err(IdentityError::BadEntry { line, reason: "$anonymous has no key" });
            }
            let mut bytes = [0u8; 32];
            hex::decode_to_slice(key_hex.trim(), &mut bytes)
                .map_err(|_| IdentityError::BadEntry { line, reason: "key is not 64 hex chars" })?;
            let key = VerifyingKey::from_bytes(&bytes)
                .map_err(|_| IdentityError::BadEntry { line, reason: "not a valid Ed25519 point" })?;
            keys.insert(user.as_str().to_owned(), key);
        }
        Ok(Self { keys: RwLock::new(keys) })
    }

    /// Register or replace a key at runtime.
    pub fn register(&self, user: &UserId, key: VerifyingKey) {
        let mut keys = self.keys.write().unwrap_or_else(std::sync::PoisonError::into_inner);
        keys.insert(user.as_str().to_owned(), key);
    }

    /// Number of registered identities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.read().unwrap_or_else(std::sync::PoisonError::into_inner).len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl IdentityLookup for IdentityStore {
    fn verifying_key(&self, user: &UserId) -> Option<VerifyingKey> {
        let keys = self.keys.read().unwrap_or_else(std::sync::PoisonError::into_inner);
        keys.get(user.as_str()).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registers_and_looks_up() {
        let store = IdentityStore::new();
        let signing = ed25519_dalek::SigningKey::from_bytes(&[1u8; 32]);
        let alice = UserId::parse("alice").unwrap();

        assert!(store.verifying_key(&alice).is_none());
        store.register(&alice, signing.verifying_key());
        assert_eq!(store.verifying_key(&alice), Some(signing.verifying_key()));
    }

    #[test]
    fn loads_the_file_format() {
        let signing = ed25519_dalek::SigningKey::from_bytes(&[2u8; 32]);
        let key_hex = hex::encode(signing.verifying_key().as_bytes());
        let dir = std::env::temp_dir().join("hackvr-identity-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("identities.tsv");
        std::fs::write(&path, format!("# demo users\nalice\t{key_hex}\n\nbob\t{key_hex}\n")).unwrap();

        let store = IdentityStore::load(&path).unwrap();
        assert_eq!(store.len(), 2);
        assert!(store.verifying_key(&UserId::parse("bob").unwrap()).is_some());
    }

    #[test]
    fn rejects_bad_entries() {
        let dir = std::env::temp_dir().join("hackvr-identity-test-bad");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("identities.tsv");
        std::fs::write(&path, "alice no-tab-here\n").unwrap();
        assert!(matches!(
            IdentityStore::load(&path),
            Err(IdentityError::BadEntry { line: 1, .. })
        ));
    }
}
