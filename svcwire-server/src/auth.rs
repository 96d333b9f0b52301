//! Token-based login.
//!
//! svcwire's login handshake is an ordinary routed operation: the login
//! frame's header names [`LOGIN_OP`] and its body carries a bearer token.
//! Tokens are validated against SHA-256 hashes so configuration never
//! stores plaintext credentials. A rejected token produces an
//! error-marked reply, which the client's login predicate reads as a
//! handshake failure.

use crate::router::{op_fn, Operation, OperationError};
use bytes::Bytes;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::sync::Arc;

/// Operation name the builtin login operation registers under, and the
/// routing header login-enabled clients send first.
pub const LOGIN_OP: &str = "svcwire.login";

/// Validates bearer tokens against pre-configured hashes.
#[derive(Debug, Clone)]
pub struct TokenValidator {
    valid_hashes: HashSet<String>,
}

impl TokenValidator {
    /// Creates a new validator with the given token hashes.
    pub fn new(hashes: impl IntoIterator<Item = String>) -> Self {
        Self {
            valid_hashes: hashes.into_iter().collect(),
        }
    }

    /// Returns whether any tokens are configured.
    pub fn has_tokens(&self) -> bool {
        !self.valid_hashes.is_empty()
    }

    /// Validates a plaintext token by hashing and comparing.
    pub fn validate(&self, token: &str) -> bool {
        if self.valid_hashes.is_empty() {
            return false;
        }
        self.valid_hashes.contains(&Self::hash_token(token))
    }

    /// Hashes a token using SHA-256, returning a lowercase hex string.
    pub fn hash_token(token: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(token.as_bytes());
        hex::encode(hasher.finalize())
    }
}

/// Builds the login operation for a validator. Register it under
/// [`LOGIN_OP`] on the router serving login-enabled endpoints.
pub fn login_operation(validator: TokenValidator) -> Arc<dyn Operation> {
    let validator = Arc::new(validator);
    op_fn(move |body: Bytes| {
        let validator = validator.clone();
        async move {
            let token = std::str::from_utf8(&body)
                .map_err(|_| OperationError::new("login token is not valid UTF-8"))?;
            if validator.validate(token) {
                Ok(Bytes::from_static(b"OK"))
            } else {
                Err(OperationError::new("invalid credentials"))
            }
        }
    })
}
