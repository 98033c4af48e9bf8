//! Cached service-account access tokens.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use gcp_auth::TokenProvider;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::{FirestoreError, FirestoreResult};

/// Tokens are refreshed this long before they expire.
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// OAuth scope for Firestore REST access.
pub const FIRESTORE_SCOPE: &str = "https://www.googleapis.com/auth/datastore";

struct CachedToken {
    value: String,
    expires_at: Instant,
}

impl CachedToken {
    fn is_fresh(&self, now: Instant) -> bool {
        now + TOKEN_REFRESH_MARGIN < self.expires_at
    }

    fn is_usable(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// Access token cache.
///
/// The mutex is held across a refresh so concurrent callers wait for one
/// provider round-trip instead of each issuing their own.
pub struct TokenCache {
    provider: Arc<dyn TokenProvider>,
    slot: Mutex<Option<CachedToken>>,
}

impl TokenCache {
    pub fn new(provider: Arc<dyn TokenProvider>) -> Self {
        Self {
            provider,
            slot: Mutex::new(None),
        }
    }

    /// Drop the cached token so the next call fetches a new one.
    pub async fn invalidate(&self) {
        *self.slot.lock().await = None;
    }

    pub async fn get_token(&self) -> FirestoreResult<String> {
        let mut slot = self.slot.lock().await;
        let now = Instant::now();

        if let Some(cached) = slot.as_ref().filter(|c| c.is_fresh(now)) {
            return Ok(cached.value.clone());
        }

        match self.provider.token(&[FIRESTORE_SCOPE]).await {
            Ok(token) => {
                // Already-expired tokens get a zero TTL and are refetched next call
                let ttl = (token.expires_at() - Utc::now())
                    .to_std()
                    .unwrap_or(Duration::ZERO);
                let value = token.as_str().to_string();
                *slot = Some(CachedToken {
                    value: value.clone(),
                    expires_at: now + ttl,
                });
                debug!("Refreshed record store token, valid for {}s", ttl.as_secs());
                Ok(value)
            }
            Err(e) => match slot.as_ref().filter(|c| c.is_usable(now)) {
                Some(cached) => {
                    warn!("Token refresh failed, using existing token: {}", e);
                    Ok(cached.value.clone())
                }
                None => Err(FirestoreError::auth_error(format!(
                    "Failed to obtain auth token: {}",
                    e
                ))),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_freshness_respects_margin() {
        let now = Instant::now();
        let token = CachedToken {
            value: "t".to_string(),
            expires_at: now + Duration::from_secs(30),
        };
        assert!(!token.is_fresh(now));
        assert!(token.is_usable(now));
    }

    #[test]
    fn test_firestore_scope() {
        assert!(FIRESTORE_SCOPE.contains("datastore"));
    }
}
