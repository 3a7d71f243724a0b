use std::time::Duration;

use async_trait::async_trait;
use rlm_domain::message::LmInput;

/// Token usage reported by the underlying LM, when available.
#[derive(Debug, Clone, Copy, Default)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

/// Result of one LM call (spec.md §4.1).
#[derive(Debug, Clone)]
pub struct LmCallResult {
    pub text: String,
    pub usage: Option<Usage>,
    pub finish_reason: Option<String>,
    pub latency_ms: u64,
}

/// Failure taxonomy for a single LM call. No retries happen at this layer.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LmCallError {
    #[error("LM call timed out after {0:?}")]
    Timeout(Duration),
    #[error("LM transport error: {0}")]
    Transport(String),
    #[error("LM remote error: {0}")]
    Remote(String),
}

/// One text-in/text-out call to an external LM (spec.md §4.1). Every
/// implementation must honor `deadline` by aborting the underlying
/// transport rather than merely logging past it.
#[async_trait]
pub trait LmClient: Send + Sync {
    async fn call(
        &self,
        model: &str,
        input: LmInput,
        deadline: Duration,
    ) -> Result<LmCallResult, LmCallError>;
}

/// Wrap a call future with the deadline and translate an elapsed timer into
/// `LmCallError::Timeout`, dropping the in-flight future on the floor.
pub async fn with_deadline<F, T>(deadline: Duration, fut: F) -> Result<T, LmCallError>
where
    F: std::future::Future<Output = Result<T, LmCallError>>,
{
    match tokio::time::timeout(deadline, fut).await {
        Ok(inner) => inner,
        Err(_) => Err(LmCallError::Timeout(deadline)),
    }
}
