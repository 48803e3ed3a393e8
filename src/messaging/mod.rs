//! # Outbound messaging
//!
//! A [`MessagingClient`] sends one [`OutboundRequest`] and returns what the
//! provider reports about the execution it started. Every request is
//! attempted once; retries are left to whoever re-runs the batch.

use serde::{Deserialize, Serialize};

use crate::{error::BatchError, item::payload::OutboundRequest};

#[cfg(feature = "http")]
#[cfg_attr(docsrs, doc(cfg(feature = "http")))]
/// HTTP client for the Studio executions API.
pub mod studio;

/// Provider response for a started execution.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ExecutionResponse {
    pub status: String,
    pub sid: String,
    pub contact_channel_address: String,
    pub url: String,
}

/// Sends one outbound message request.
pub trait MessagingClient {
    fn dispatch(&self, request: &OutboundRequest) -> Result<ExecutionResponse, BatchError>;
}

/// Account identifier and secret used to authenticate against the provider.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub account_sid: String,
    pub auth_token: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("account_sid", &self.account_sid)
            .field("auth_token", &"***")
            .finish()
    }
}

impl Credentials {
    /// Environment variable holding the account identifier.
    pub const ACCOUNT_SID: &'static str = "ACCOUNT_SID";
    /// Environment variable holding the account secret.
    pub const ACCOUNT_TOKEN: &'static str = "ACCOUNT_TOKEN";

    /// Reads the credentials from any key/value source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, BatchError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .filter(|value| !value.trim().is_empty())
                .ok_or_else(|| BatchError::Configuration(format!("Missing credential {}", key)))
        };

        Ok(Self {
            account_sid: get(Self::ACCOUNT_SID)?,
            auth_token: get(Self::ACCOUNT_TOKEN)?,
        })
    }

    /// Reads the credentials from the process environment.
    pub fn from_env() -> Result<Self, BatchError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }
}
