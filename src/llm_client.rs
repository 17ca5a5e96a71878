//! Model client adapter.
//!
//! Wraps a [`ModelGateway`] with a bounded timeout. Each call reaches the
//! gateway exactly once; there is no retry at this layer.

use crate::error::ModelError;
use crate::gateway::ModelGateway;
use crate::prompt::ModelQuery;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Successful completion for one query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelResponse {
    pub model: String,
    pub text: String,
}

pub struct ModelClient {
    gateway: Box<dyn ModelGateway>,
    timeout: Duration,
}

impl ModelClient {
    pub fn new(gateway: Box<dyn ModelGateway>, timeout: Duration) -> Self {
        Self { gateway, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Send `query` and wait at most the configured timeout.
    ///
    /// # Errors
    ///
    /// Returns the gateway's [`ModelError`] unchanged, or a timeout
    /// `NetworkFailure` when the deadline passes first.
    pub async fn request(&self, query: &ModelQuery) -> Result<ModelResponse, ModelError> {
        info!("Requesting program from model '{}'", query.model);
        let started = Instant::now();

        let result = tokio::time::timeout(self.timeout, self.gateway.send(query)).await;

        let text = match result {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => {
                warn!("Model request failed after {:?}: {}", started.elapsed(), e);
                return Err(e);
            }
            Err(_) => {
                warn!("Model request timed out after {:?}", self.timeout);
                return Err(ModelError::timeout(self.timeout.as_secs()));
            }
        };

        debug!(
            "Model '{}' answered with {} bytes in {:?}",
            query.model,
            text.len(),
            started.elapsed()
        );

        Ok(ModelResponse {
            model: query.model.clone(),
            text,
        })
    }
}
