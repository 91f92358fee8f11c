use crate::config::SaveTokens;
use oauth2::{AccessToken, RefreshToken};
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Default)]
struct TokenPair {
    access: Option<AccessToken>,
    refresh: Option<RefreshToken>,
}

/// The current access/refresh token pair and where to persist it.
///
/// Every change is written through the save callback immediately; a failed save is logged
/// and the in-memory pair is kept.
#[derive(Clone)]
pub struct TokenStore {
    tokens: Arc<Mutex<TokenPair>>,
    save: SaveTokens,
}

impl fmt::Debug for TokenStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenStore").finish_non_exhaustive()
    }
}

fn non_empty(s: &str) -> Option<String> {
    let s = s.trim().trim_matches(|c| c == '"' || c == '\'');
    (!s.is_empty()).then(|| s.to_string())
}

impl TokenStore {
    pub fn new(access_token: &str, refresh_token: &str, save: SaveTokens) -> Self {
        Self {
            tokens: Arc::new(Mutex::new(TokenPair {
                access: non_empty(access_token).map(AccessToken::new),
                refresh: non_empty(refresh_token).map(RefreshToken::new),
            })),
            save,
        }
    }

    /// A store that forgets tokens on restart.
    pub fn in_memory(access_token: &str, refresh_token: &str) -> Self {
        Self::new(access_token, refresh_token, Arc::new(|_, _| Ok(())))
    }

    pub async fn access_token(&self) -> Option<String> {
        let tokens = self.tokens.lock().await;
        tokens.access.as_ref().map(|t| t.secret().clone())
    }

    pub async fn refresh_token(&self) -> Option<String> {
        let tokens = self.tokens.lock().await;
        tokens.refresh.as_ref().map(|t| t.secret().clone())
    }

    /// Whether both halves of the pair are present.
    pub async fn is_complete(&self) -> bool {
        let tokens = self.tokens.lock().await;
        tokens.access.is_some() && tokens.refresh.is_some()
    }

    pub async fn replace(&self, access_token: &str, refresh_token: &str) {
        {
            let mut tokens = self.tokens.lock().await;
            tokens.access = non_empty(access_token).map(AccessToken::new);
            tokens.refresh = non_empty(refresh_token).map(RefreshToken::new);
        }
        self.persist(access_token, refresh_token);
    }

    pub async fn clear(&self) {
        *self.tokens.lock().await = TokenPair::default();
        self.persist("", "");
    }

    fn persist(&self, access_token: &str, refresh_token: &str) {
        if let Err(e) = (self.save)(access_token, refresh_token) {
            tracing::error!(error = %e, "failed to persist tokens");
        }
    }
}
