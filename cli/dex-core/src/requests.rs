//! Keyed cancellation of outstanding requests.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Hands out one live [CancellationToken] per key.
///
/// Issuing a token for a key cancels the one issued before it.
/// All tokens are children of a root token, so [RequestManager::shutdown]
/// cancels everything, including tokens issued later.
#[derive(Debug, Default)]
pub struct RequestManager {
    root: CancellationToken,
    tokens: Mutex<HashMap<String, CancellationToken>>,
}

impl RequestManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn issue(&self, key: &str) -> CancellationToken {
        let token = self.root.child_token();
        let previous = self
            .tokens
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), token.clone());
        if let Some(previous) = previous {
            debug!(key, "superseding outstanding request");
            previous.cancel();
        }
        token
    }

    /// Returns whether a token was outstanding for `key`.
    pub fn cancel(&self, key: &str) -> bool {
        let token = self
            .tokens
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        match token {
            Some(token) => {
                token.cancel();
                true
            },
            None => false,
        }
    }

    pub fn cancel_all(&self) {
        let tokens: Vec<_> = self
            .tokens
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .collect();
        debug!(count = tokens.len(), "cancelling all outstanding requests");
        for (_, token) in tokens {
            token.cancel();
        }
    }

    /// Cancel everything for good.
    pub fn shutdown(&self) {
        self.cancel_all();
        self.root.cancel();
    }

    pub fn is_shut_down(&self) -> bool {
        self.root.is_cancelled()
    }
}
