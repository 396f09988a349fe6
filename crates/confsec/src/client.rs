//! Client wrapper

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::ClientConfig;
use crate::engine::{ClientHandle, Engine};
use crate::error::{Error, Resource, Result};
use crate::guard::CloseGuard;
use crate::response::Response;

/// Credit balances reported by the engine
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletStatus {
    /// Credits already consumed
    #[serde(alias = "creditsSpent")]
    pub credits_spent: i64,
    /// Credits reserved by in-flight requests
    #[serde(alias = "creditsHeld")]
    pub credits_held: i64,
    /// Credits that can still be spent
    #[serde(alias = "creditsAvailable")]
    pub credits_available: i64,
}

/// Owner of an engine client handle
///
/// The handle is destroyed by [`ConfsecClient::close`] or on drop, whichever
/// comes first. Every operation after that fails with `client not found`.
pub struct ConfsecClient<E: Engine> {
    engine: Arc<E>,
    handle: ClientHandle,
    guard: CloseGuard,
}

impl<E: Engine> fmt::Debug for ConfsecClient<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfsecClient")
            .field("handle", &self.handle)
            .field("closed", &self.guard.is_closed())
            .finish_non_exhaustive()
    }
}

impl<E: Engine> ConfsecClient<E> {
    /// Create a client on `engine`
    ///
    /// Fails with [`Error::Config`] when the configuration is incomplete or
    /// the engine rejects it.
    pub fn new(engine: Arc<E>, config: ClientConfig) -> Result<Self> {
        config.validate()?;

        let handle = engine
            .client_create(&config)
            .map_err(|err| Error::Config(err.message().to_string()))?;

        tracing::debug!(
            "Created confsec client {} (env: {}, max candidate nodes: {})",
            handle,
            config.env,
            config.max_candidate_nodes
        );

        let teardown_engine = engine.clone();
        let guard = CloseGuard::new(move || {
            tracing::debug!("Destroying confsec client {}", handle);
            teardown_engine.client_destroy(handle)?;
            Ok(())
        });

        Ok(Self {
            engine,
            handle,
            guard,
        })
    }

    /// Engine handle of this client
    pub fn handle(&self) -> ClientHandle {
        self.handle
    }

    /// Whether the client has been closed
    pub fn is_closed(&self) -> bool {
        self.guard.is_closed()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.guard.is_closed() {
            return Err(Error::NotFound(Resource::Client));
        }
        Ok(())
    }

    /// Maximum number of candidate nodes considered per request
    pub fn max_candidate_nodes(&self) -> Result<u32> {
        self.ensure_open()?;
        Ok(self.engine.client_max_candidate_nodes(self.handle)?)
    }

    /// Credits charged per request by default
    pub fn default_credit_amount_per_request(&self) -> Result<i64> {
        self.ensure_open()?;
        Ok(self
            .engine
            .client_default_credit_amount_per_request(self.handle)?)
    }

    /// Node tags applied to every request
    pub fn default_node_tags(&self) -> Result<Vec<String>> {
        self.ensure_open()?;
        Ok(self.engine.client_default_node_tags(self.handle)?)
    }

    /// Replace the node tags applied to every request
    pub fn set_default_node_tags<S: AsRef<str>>(&self, tags: &[S]) -> Result<()> {
        self.ensure_open()?;
        let tags: Vec<String> = tags.iter().map(|tag| tag.as_ref().to_string()).collect();
        Ok(self
            .engine
            .client_set_default_node_tags(self.handle, &tags)?)
    }

    /// Current wallet balances
    pub fn wallet_status(&self) -> Result<WalletStatus> {
        self.ensure_open()?;
        let raw = self.engine.client_wallet_status(self.handle)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Issue a raw HTTP/1.1 request and take ownership of the response
    pub fn do_request(&self, request: impl AsRef<[u8]>) -> Result<Response<E>> {
        self.ensure_open()?;
        let request = request.as_ref();

        tracing::trace!(
            "Issuing request of {} bytes on client {}",
            request.len(),
            self.handle
        );

        let response = self.engine.client_do_request(self.handle, request)?;
        Ok(Response::new(self.engine.clone(), response))
    }

    /// Destroy the client handle
    ///
    /// Only the first call reaches the engine.
    pub fn close(&self) -> Result<()> {
        self.guard.close()
    }
}

impl<E: Engine> Drop for ConfsecClient<E> {
    fn drop(&mut self) {
        if let Err(err) = self.guard.close() {
            tracing::warn!("Failed to destroy confsec client {}: {}", self.handle, err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wallet_status_snake_case() {
        let status: WalletStatus = serde_json::from_str(
            r#"{"credits_spent":5,"credits_held":2,"credits_available":93}"#,
        )
        .expect("valid wallet status");

        assert_eq!(
            status,
            WalletStatus {
                credits_spent: 5,
                credits_held: 2,
                credits_available: 93,
            }
        );
    }

    #[test]
    fn test_wallet_status_camel_case() {
        let status: WalletStatus = serde_json::from_str(
            r#"{"creditsSpent":1,"creditsHeld":0,"creditsAvailable":10}"#,
        )
        .expect("valid wallet status");

        assert_eq!(status.credits_spent, 1);
        assert_eq!(status.credits_available, 10);
    }
}
