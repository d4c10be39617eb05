use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Deserialize;

/// Tokens are treated as expired this long before Daraja says they are.
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// Daraja returns `expires_in` as a string ("3599"); accept numbers too.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ExpiresIn {
    Text(String),
    Number(u64),
}

impl ExpiresIn {
    fn seconds(&self) -> Option<u64> {
        match self {
            ExpiresIn::Text(s) => s.trim().parse().ok(),
            ExpiresIn::Number(n) => Some(*n),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    pub access_token: String,
    expires_in: Option<ExpiresIn>,
}

impl TokenResponse {
    pub(crate) fn lifetime(&self) -> Duration {
        let seconds = self
            .expires_in
            .as_ref()
            .and_then(ExpiresIn::seconds)
            .unwrap_or(3599);
        Duration::from_secs(seconds)
    }
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    refresh_at: Instant,
}

/// In-process cache for the OAuth bearer token.
#[derive(Debug, Default)]
pub struct TokenCache {
    inner: Mutex<Option<CachedToken>>,
}

impl TokenCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<String> {
        self.get_at(Instant::now())
    }

    pub fn store(&self, value: String, lifetime: Duration) {
        self.store_at(value, lifetime, Instant::now());
    }

    pub fn clear(&self) {
        *self.inner.lock() = None;
    }

    fn get_at(&self, now: Instant) -> Option<String> {
        let guard = self.inner.lock();
        guard
            .as_ref()
            .filter(|token| now < token.refresh_at)
            .map(|token| token.value.clone())
    }

    fn store_at(&self, value: String, lifetime: Duration, now: Instant) {
        let usable = lifetime.saturating_sub(EXPIRY_MARGIN);
        *self.inner.lock() = Some(CachedToken {
            value,
            refresh_at: now + usable,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_is_served_until_margin_before_expiry() {
        let cache = TokenCache::new();
        let start = Instant::now();
        cache.store_at("tok".into(), Duration::from_secs(3599), start);

        assert_eq!(
            cache.get_at(start + Duration::from_secs(3000)).as_deref(),
            Some("tok")
        );
        assert_eq!(cache.get_at(start + Duration::from_secs(3540)), None);
    }

    #[test]
    fn short_lived_token_is_never_served() {
        let cache = TokenCache::new();
        let start = Instant::now();
        cache.store_at("tok".into(), Duration::from_secs(30), start);
        assert_eq!(cache.get_at(start), None);
    }

    #[test]
    fn expires_in_accepts_string_or_number() {
        let text: TokenResponse =
            serde_json::from_str(r#"{"access_token":"a","expires_in":"3599"}"#).unwrap();
        assert_eq!(text.lifetime(), Duration::from_secs(3599));

        let number: TokenResponse =
            serde_json::from_str(r#"{"access_token":"a","expires_in":120}"#).unwrap();
        assert_eq!(number.lifetime(), Duration::from_secs(120));
    }
}
