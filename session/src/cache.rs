//! Advisory access-token cache.
//!
//! A cached token only tells hydration that a refresh is worth attempting.
//! The refresh endpoint is the authority: a stale or missing cache entry
//! never fails anything, it just means "no credential material".

use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedToken {
    pub access_token: String,
    #[serde(default)]
    pub user_id: Option<String>,
}

/// Client-local persistence for the access token. Implementations swallow
/// their own I/O failures.
pub trait TokenCache: Send + Sync {
    fn load(&self) -> Option<CachedToken>;
    fn store(&self, token: &CachedToken);
    fn clear(&self);
}

// =============================================================================
// MEMORY
// =============================================================================

/// Process-lifetime cache. Used when no state directory is configured.
#[derive(Default)]
pub struct MemoryTokenCache {
    slot: Mutex<Option<CachedToken>>,
}

impl MemoryTokenCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_token(token: CachedToken) -> Self {
        Self { slot: Mutex::new(Some(token)) }
    }
}

impl TokenCache for MemoryTokenCache {
    fn load(&self) -> Option<CachedToken> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn store(&self, token: &CachedToken) {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(token.clone());
    }

    fn clear(&self) {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

// =============================================================================
// FILE
// =============================================================================

/// JSON file cache, e.g. `~/.folio/session.json`.
pub struct FileTokenCache {
    path: PathBuf,
}

impl FileTokenCache {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TokenCache for FileTokenCache {
    fn load(&self) -> Option<CachedToken> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "token cache: read failed");
                return None;
            }
        };
        match serde_json::from_str::<CachedToken>(&raw) {
            Ok(token) if !token.access_token.is_empty() => Some(token),
            Ok(_) => None,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "token cache: ignoring malformed entry");
                None
            }
        }
    }

    fn store(&self, token: &CachedToken) {
        if let Some(parent) = self.path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                warn!(path = %parent.display(), error = %e, "token cache: mkdir failed");
                return;
            }
        }
        let json = match serde_json::to_string(token) {
            Ok(json) => json,
            Err(e) => {
                warn!(error = %e, "token cache: encode failed");
                return;
            }
        };
        if let Err(e) = std::fs::write(&self.path, json) {
            warn!(path = %self.path.display(), error = %e, "token cache: write failed");
        } else {
            debug!(path = %self.path.display(), "token cache: stored");
        }
    }

    fn clear(&self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "token cache: cleared"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "token cache: remove failed"),
        }
    }
}

#[cfg(test)]
#[path = "cache_test.rs"]
mod tests;
