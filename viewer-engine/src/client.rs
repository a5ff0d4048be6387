use std::sync::Arc;

use async_trait::async_trait;

use crate::errors::ClientError;
use crate::tuning::StreamTuningProfile;

/// Contract of the underlying segmented-streaming client. The engine never
/// drives playback itself; it only issues the recovery operations the
/// client exposes and reacts to the failure events the client raises.
#[async_trait]
pub trait StreamingClient: Send + Sync {
    /// Restart fragment/playlist loading from the live edge.
    async fn start_load(&self) -> Result<(), ClientError>;

    /// In-place decoder repair after a media failure.
    async fn recover_media_error(&self) -> Result<(), ClientError>;

    /// Switch to the alternate audio codec; paired with a follow-up
    /// `recover_media_error` call when the first repair did not take.
    async fn swap_audio_codec(&self) -> Result<(), ClientError>;

    /// Release the client. Idempotent; no further operations may follow.
    async fn destroy(&self);
}

/// Builds a streaming client from a tuning profile. The profile is applied
/// at construction only; a changed tier or mobility means a new client.
pub trait StreamingClientFactory: Send + Sync {
    fn create(&self, profile: &StreamTuningProfile) -> Arc<dyn StreamingClient>;
}
