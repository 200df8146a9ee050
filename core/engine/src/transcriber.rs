use async_trait::async_trait;

use crate::error::ServiceResult;
use crate::types::Transcript;

/// Recognition capability consumed by the streaming session.
///
/// Implementations may be slow (hundreds of ms to seconds) and may fail;
/// callers treat failures as per-flush errors, not session-fatal ones.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(
        &self,
        audio: Vec<u8>,
        sample_rate: u32,
        language: Option<String>,
    ) -> ServiceResult<Transcript>;
}
