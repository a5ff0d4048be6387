use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::client::StreamingClient;
use crate::types::{FailureEvent, FailureKind, RecoveryOutcome, RecoveryState, RecoveryStatus};

/// Retry policy for automatic playback recovery. All fields are
/// overridable at construction; the defaults bound total automatic-retry
/// wall time to 1s + 2s + 4s + 8s = 15s before a terminal failure surfaces.
#[derive(Debug, Clone)]
pub struct RecoveryConfig {
    pub backoff_base: Duration,
    pub backoff_cap: Duration,
    pub max_retries: u32,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            backoff_base: Duration::from_millis(1_000),
            backoff_cap: Duration::from_millis(8_000),
            max_retries: 4,
        }
    }
}

/// Delay before retry attempt `attempt`.
/// 延迟序列：1s, 2s, 4s, 8s, 8s, ...
pub fn backoff_delay(config: &RecoveryConfig, attempt: u32) -> Duration {
    let base_ms = config.backoff_base.as_millis() as u64;
    let cap_ms = config.backoff_cap.as_millis() as u64;
    let delay_ms = std::cmp::min(base_ms.saturating_mul(2u64.saturating_pow(attempt)), cap_ms);
    Duration::from_millis(delay_ms)
}

/// Invoked after the coordinator has destroyed the streaming client on an
/// unrecoverable failure. The caller constructs a fresh instance to resume.
pub type TeardownHook = Box<dyn Fn(FailureKind) + Send + Sync>;

/// Per-playback-instance failure recovery state machine.
///
/// Receives typed failure notifications from the streaming client and
/// either ignores them (non-fatal), retries with exponential backoff
/// (network), repairs in place (media), or tears the instance down
/// (anything else). Every invocation resolves into a `RecoveryOutcome`;
/// nothing is ever raised out of `handle_error` itself.
pub struct RecoveryCoordinator {
    client: Arc<dyn StreamingClient>,
    config: RecoveryConfig,
    /// Non-reentrant lock: acquired at `handle_error` entry, released on
    /// every exit path. Overlapping error callbacks see `Recovering`.
    recovering: AtomicBool,
    retry_count: AtomicU32,
    last_failure: Mutex<FailureKind>,
    on_teardown: Option<TeardownHook>,
}

impl RecoveryCoordinator {
    pub fn new(client: Arc<dyn StreamingClient>, config: RecoveryConfig) -> Self {
        Self {
            client,
            config,
            recovering: AtomicBool::new(false),
            retry_count: AtomicU32::new(0),
            last_failure: Mutex::new(FailureKind::None),
            on_teardown: None,
        }
    }

    pub fn with_teardown_hook(mut self, hook: TeardownHook) -> Self {
        self.on_teardown = Some(hook);
        self
    }

    pub fn config(&self) -> &RecoveryConfig {
        &self.config
    }

    /// Handle one failure notification from the streaming client.
    pub async fn handle_error(&self, event: FailureEvent) -> RecoveryOutcome {
        if !event.fatal {
            // 非致命错误由流媒体客户端自行恢复
            debug!(
                "Non-fatal {:?} failure, leaving it to the streaming client",
                event.kind
            );
            return self.outcome(RecoveryStatus::Ignored, event.kind);
        }

        if self.recovering.swap(true, Ordering::SeqCst) {
            debug!("Recovery already in flight, suppressing {:?} failure", event.kind);
            return self.outcome(RecoveryStatus::Recovering, event.kind);
        }

        *self.last_failure.lock().await = event.kind;

        let outcome = match event.kind {
            FailureKind::Network => self.recover_network().await,
            FailureKind::Media => self.recover_media().await,
            _ => self.teardown(event.kind).await,
        };

        self.recovering.store(false, Ordering::SeqCst);
        outcome
    }

    /// Clear the retry budget and force the machine back to idle. Used when
    /// playback has been healthy long enough, or the source URL changed.
    pub fn reset(&self) {
        self.retry_count.store(0, Ordering::SeqCst);
        self.recovering.store(false, Ordering::SeqCst);
    }

    pub async fn state(&self) -> RecoveryState {
        RecoveryState {
            retry_count: self.retry_count.load(Ordering::SeqCst),
            is_recovering: self.recovering.load(Ordering::SeqCst),
            last_failure: *self.last_failure.lock().await,
        }
    }

    async fn recover_network(&self) -> RecoveryOutcome {
        let attempt = self.retry_count.load(Ordering::SeqCst);
        if attempt >= self.config.max_retries {
            warn!(
                "✗ Network recovery exhausted after {} attempts, surfacing failure",
                attempt
            );
            return self.outcome(RecoveryStatus::Failed, FailureKind::Network);
        }

        let delay = backoff_delay(&self.config, attempt);
        info!(
            "Fatal network failure, reloading stream in {:?} (attempt {})",
            delay,
            attempt + 1
        );
        sleep(delay).await;

        // The reload command itself is fire-and-forget from the client's
        // perspective; a failed issue still counts as a consumed attempt.
        if let Err(e) = self.client.start_load().await {
            warn!("Stream reload command failed: {}", e);
        }
        self.retry_count.fetch_add(1, Ordering::SeqCst);
        self.outcome(RecoveryStatus::Retry, FailureKind::Network)
    }

    async fn recover_media(&self) -> RecoveryOutcome {
        info!("Fatal media failure, attempting in-place decoder repair");
        match self.client.recover_media_error().await {
            Ok(()) => {
                self.retry_count.store(0, Ordering::SeqCst);
                info!("✓ Media error recovered");
                return self.outcome(RecoveryStatus::Success, FailureKind::Media);
            }
            Err(e) => warn!("Media repair failed ({}), trying codec swap", e),
        }

        if let Err(e) = self.client.swap_audio_codec().await {
            error!("✗ Codec swap failed: {}", e);
            return self.outcome(RecoveryStatus::Failed, FailureKind::Media);
        }

        match self.client.recover_media_error().await {
            Ok(()) => {
                self.retry_count.store(0, Ordering::SeqCst);
                info!("✓ Media error recovered after codec swap");
                self.outcome(RecoveryStatus::Success, FailureKind::Media)
            }
            Err(e) => {
                error!("✗ Media recovery failed after codec swap: {}", e);
                self.outcome(RecoveryStatus::Failed, FailureKind::Media)
            }
        }
    }

    async fn teardown(&self, kind: FailureKind) -> RecoveryOutcome {
        error!("Unrecoverable {:?} failure, destroying playback instance", kind);
        self.client.destroy().await;
        if let Some(hook) = &self.on_teardown {
            hook(kind);
        }
        self.outcome(RecoveryStatus::Failed, kind)
    }

    fn outcome(&self, status: RecoveryStatus, kind: FailureKind) -> RecoveryOutcome {
        RecoveryOutcome {
            status,
            attempts: self.retry_count.load(Ordering::SeqCst),
            kind,
        }
    }
}
