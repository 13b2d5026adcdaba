//! Batch delivery sink.

use async_trait::async_trait;

use crate::retry::CallError;

/// Accepts newline-joined record batches.
#[async_trait]
pub trait BatchSink: Send + Sync {
    /// Deliver one batch payload.
    async fn send_batch(&self, payload: &str) -> Result<(), CallError>;
}

/// HTTP sink: POSTs each batch to a fixed endpoint.
///
/// 2xx is success; a 4xx response is a permanent rejection, anything
/// else is transient and left to the caller's retry policy.
pub struct HttpBatchSink {
    client: reqwest::Client,
    endpoint: String,
    user_agent: String,
}

impl HttpBatchSink {
    /// Create a sink posting to `endpoint`.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            user_agent: format!("baton / {}", env!("CARGO_PKG_VERSION")),
        }
    }

    /// Override the User-Agent header.
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }
}

#[async_trait]
impl BatchSink for HttpBatchSink {
    async fn send_batch(&self, payload: &str) -> Result<(), CallError> {
        let response = self
            .client
            .post(&self.endpoint)
            .header(reqwest::header::USER_AGENT, &self.user_agent)
            .body(payload.to_owned())
            .send()
            .await
            .map_err(CallError::transient)?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else if status.is_client_error() {
            Err(CallError::permanent(anyhow::anyhow!(
                "sink rejected batch: {status}"
            )))
        } else {
            Err(CallError::transient(anyhow::anyhow!(
                "sink returned {status}"
            )))
        }
    }
}
