// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Transaction transport boundary
//!
//! The Unit-of-Work compiles one payload and performs exactly one round trip
//! through a [`TransactionExecutor`]. The default implementation posts to the
//! BaseLite REST endpoint; tests substitute an in-memory executor.

use async_trait::async_trait;
use log::debug;
use serde_json::Value;
use thiserror::Error;
use url::Url;

/// Errors raised by the transport layer itself, distinct from a transactional
/// failure reported by the server
#[derive(Error, Debug)]
pub enum TransportError {
    /// Connection or protocol-level HTTP failure
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Server answered with a non-success status and a body that is not a
    /// transaction failure report
    #[error("server returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// Response body was not valid JSON
    #[error("invalid response body: {0}")]
    Decode(#[from] serde_json::Error),

    /// Malformed endpoint configuration
    #[error("invalid endpoint url: {0}")]
    Endpoint(#[from] url::ParseError),
}

/// Sends one compiled transaction payload and returns one raw response.
///
/// Implementations must not retry: the Unit-of-Work core treats the round
/// trip as a single all-or-nothing exchange.
#[async_trait]
pub trait TransactionExecutor: Send + Sync {
    async fn send(&self, payload: Value) -> Result<Value, TransportError>;
}

/// HTTP executor targeting the hosted BaseLite transaction endpoint
/// (`{base}/{app-id}/{api-key}/transaction`)
pub struct HttpTransactionExecutor {
    endpoint: Url,
    client: reqwest::Client,
}

impl HttpTransactionExecutor {
    /// Build an executor for the given deployment and application credentials
    pub fn new(base: &str, app_id: &str, api_key: &str) -> Result<Self, TransportError> {
        let base: Url = base.parse()?;
        let endpoint = base.join(&format!("{}/{}/transaction", app_id, api_key))?;
        Ok(Self {
            endpoint,
            client: reqwest::Client::new(),
        })
    }

    /// Endpoint this executor posts transactions to
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl TransactionExecutor for HttpTransactionExecutor {
    async fn send(&self, payload: Value) -> Result<Value, TransportError> {
        debug!("posting transaction to {}", self.endpoint);

        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if status.is_success() {
            return Ok(serde_json::from_str(&body)?);
        }

        // A rejected transaction also comes back with an error status; the
        // failure report in the body is a valid response for the distributor,
        // not a transport fault.
        if let Ok(value) = serde_json::from_str::<Value>(&body) {
            if value.get("message").is_some() && value.get("operation").is_some() {
                return Ok(value);
            }
        }

        Err(TransportError::Http {
            status: status.as_u16(),
            body,
        })
    }
}
