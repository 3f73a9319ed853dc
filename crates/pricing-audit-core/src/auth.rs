//! Bearer credentials for the device manager.
//!
//! Freshness is checked lazily: every external call asks [`TokenKeeper`] for
//! the credential, and one older than the refresh interval is re-acquired
//! before it is handed out.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::child::helper_command;
use crate::error::AuthError;

pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(600);
const CREDENTIAL_TIMEOUT: Duration = Duration::from_secs(120);

#[async_trait]
pub trait CredentialSource: Send + Sync {
    async fn acquire(&self) -> Result<String, AuthError>;
}

/// Runs the operator's credential helper (`powerflex_get_jwt_pass.sh prd`)
/// and reads the token from its stdout.
#[derive(Debug, Clone)]
pub struct ScriptCredentialSource {
    command: String,
    environment: String,
}

impl ScriptCredentialSource {
    pub fn new(command: impl Into<String>, environment: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            environment: environment.into(),
        }
    }
}

#[async_trait]
impl CredentialSource for ScriptCredentialSource {
    async fn acquire(&self) -> Result<String, AuthError> {
        info!("obtaining JWT token");
        let run = helper_command(&self.command)
            .arg(&self.environment)
            .output();

        let output = match tokio::time::timeout(CREDENTIAL_TIMEOUT, run).await {
            Ok(Ok(output)) => output,
            Ok(Err(err)) => {
                return Err(AuthError::Missing {
                    reason: format!("could not run '{}': {err}", self.command),
                })
            }
            Err(_) => {
                return Err(AuthError::TimedOut {
                    command: self.command.clone(),
                })
            }
        };

        if !output.status.success() {
            return Err(AuthError::Missing {
                reason: format!(
                    "'{}' exited with {}: {}",
                    self.command,
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }

        let token = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if token.is_empty() || token == "null" {
            return Err(AuthError::Missing {
                reason: "JWT token is empty or null".to_string(),
            });
        }
        Ok(token)
    }
}

#[derive(Debug)]
struct CachedToken {
    value: String,
    acquired_at: Instant,
}

pub struct TokenKeeper {
    source: Box<dyn CredentialSource>,
    refresh_interval: Duration,
    cached: Mutex<Option<CachedToken>>,
}

impl TokenKeeper {
    pub fn new(source: Box<dyn CredentialSource>, refresh_interval: Duration) -> Self {
        Self {
            source,
            refresh_interval,
            cached: Mutex::new(None),
        }
    }

    /// Returns a credential no older than the refresh interval.
    pub async fn bearer(&self) -> Result<String, AuthError> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.acquired_at.elapsed() < self.refresh_interval {
                return Ok(token.value.clone());
            }
            info!(
                interval_secs = self.refresh_interval.as_secs(),
                "refreshing JWT token"
            );
        }

        let value = self.source.acquire().await.inspect_err(|err| {
            warn!(error = %err, "JWT acquisition failed");
        })?;
        *cached = Some(CachedToken {
            value: value.clone(),
            acquired_at: Instant::now(),
        });
        Ok(value)
    }

    /// Drops the cached credential so the next call re-acquires it.
    pub async fn invalidate(&self) {
        *self.cached.lock().await = None;
    }
}

impl std::fmt::Debug for TokenKeeper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenKeeper")
            .field("refresh_interval", &self.refresh_interval)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;

    struct Counting(Arc<AtomicUsize>);

    #[async_trait]
    impl CredentialSource for Counting {
        async fn acquire(&self) -> Result<String, AuthError> {
            let n = self.0.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(format!("token-{n}"))
        }
    }

    struct Unavailable;

    #[async_trait]
    impl CredentialSource for Unavailable {
        async fn acquire(&self) -> Result<String, AuthError> {
            Err(AuthError::Missing {
                reason: "nothing cached".into(),
            })
        }
    }

    #[tokio::test]
    async fn reuses_fresh_token() {
        let calls = Arc::new(AtomicUsize::new(0));
        let keeper = TokenKeeper::new(Box::new(Counting(calls.clone())), Duration::from_secs(600));

        assert_eq!(keeper.bearer().await.unwrap(), "token-1");
        assert_eq!(keeper.bearer().await.unwrap(), "token-1");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn refreshes_expired_or_invalidated_token() {
        let calls = Arc::new(AtomicUsize::new(0));
        let keeper = TokenKeeper::new(Box::new(Counting(calls.clone())), Duration::ZERO);
        assert_eq!(keeper.bearer().await.unwrap(), "token-1");
        assert_eq!(keeper.bearer().await.unwrap(), "token-2");

        let calls = Arc::new(AtomicUsize::new(0));
        let keeper = TokenKeeper::new(Box::new(Counting(calls.clone())), Duration::from_secs(600));
        keeper.bearer().await.unwrap();
        keeper.invalidate().await;
        assert_eq!(keeper.bearer().await.unwrap(), "token-2");
    }

    #[tokio::test]
    async fn missing_credential_is_an_auth_error() {
        let keeper = TokenKeeper::new(Box::new(Unavailable), DEFAULT_REFRESH_INTERVAL);
        assert!(matches!(
            keeper.bearer().await,
            Err(AuthError::Missing { .. })
        ));
    }
}
