use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use common::Result;

use crate::client::{StreamingClient, StreamingClientFactory};
use crate::recovery::{RecoveryConfig, RecoveryCoordinator, TeardownHook};
use crate::session::SessionManager;
use crate::tuning::{compute_profile, CapabilityProbe, ProfileOverrides, StreamTuningProfile, TuningOptions};
use crate::types::{FailureEvent, RecoveryStatus};

/// One live playback binding: a tier-tuned streaming client, its recovery
/// state machine and the registered viewing session.
///
/// Failure events flow through an mpsc mailbox into a single consumer task,
/// so the streaming client's error callback never runs recovery re-entrantly.
pub struct PlaybackInstance {
    camera_id: String,
    session_id: String,
    profile: StreamTuningProfile,
    client: Arc<dyn StreamingClient>,
    coordinator: Arc<RecoveryCoordinator>,
    session_manager: Arc<SessionManager>,
    failure_tx: mpsc::UnboundedSender<FailureEvent>,
    event_task: JoinHandle<()>,
}

impl PlaybackInstance {
    /// Probe the device, compute the tuning profile, build the streaming
    /// client and register the viewing session. A failed session start
    /// propagates and leaves nothing behind.
    pub async fn create(
        camera_id: &str,
        probe: &dyn CapabilityProbe,
        factory: &dyn StreamingClientFactory,
        session_manager: Arc<SessionManager>,
        recovery_config: RecoveryConfig,
        overrides: ProfileOverrides,
        on_teardown: Option<TeardownHook>,
    ) -> Result<Self> {
        let caps = probe.capabilities();
        let profile = compute_profile(
            caps.tier,
            &TuningOptions {
                is_mobile: caps.is_mobile,
                overrides,
            },
        );
        let client = factory.create(&profile);

        let session_id = session_manager.start_session(camera_id).await?;

        let mut coordinator = RecoveryCoordinator::new(client.clone(), recovery_config);
        if let Some(hook) = on_teardown {
            coordinator = coordinator.with_teardown_hook(hook);
        }
        let coordinator = Arc::new(coordinator);

        let (failure_tx, failure_rx) = mpsc::unbounded_channel();
        let event_task =
            Self::spawn_failure_handler(coordinator.clone(), failure_rx, camera_id.to_string());

        info!(
            "Playback instance created for camera {} (tier {:?}, session {})",
            camera_id, caps.tier, session_id
        );

        Ok(Self {
            camera_id: camera_id.to_string(),
            session_id,
            profile,
            client,
            coordinator,
            session_manager,
            failure_tx,
            event_task,
        })
    }

    fn spawn_failure_handler(
        coordinator: Arc<RecoveryCoordinator>,
        mut failure_rx: mpsc::UnboundedReceiver<FailureEvent>,
        camera_id: String,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(event) = failure_rx.recv().await {
                let outcome = coordinator.handle_error(event).await;
                match outcome.status {
                    RecoveryStatus::Failed => warn!(
                        "Recovery for camera {} resolved failed ({:?}, {} attempts)",
                        camera_id, outcome.kind, outcome.attempts
                    ),
                    status => debug!("Recovery for camera {} resolved {:?}", camera_id, status),
                }
            }
            debug!("Failure mailbox for camera {} drained", camera_id);
        })
    }

    /// Sender the video surface wires into the streaming client's error
    /// callback.
    pub fn failure_sender(&self) -> mpsc::UnboundedSender<FailureEvent> {
        self.failure_tx.clone()
    }

    pub fn camera_id(&self) -> &str {
        &self.camera_id
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn profile(&self) -> &StreamTuningProfile {
        &self.profile
    }

    pub fn coordinator(&self) -> &Arc<RecoveryCoordinator> {
        &self.coordinator
    }

    /// Clear the recovery retry budget; called when playback has been
    /// healthy long enough or the source URL changed.
    pub fn reset_recovery(&self) {
        self.coordinator.reset();
    }

    /// Stop the viewing session, destroy the streaming client and drain the
    /// failure mailbox.
    pub async fn shutdown(self) {
        self.session_manager.stop_session(&self.session_id).await;
        self.client.destroy().await;
        self.event_task.abort();
        info!("Playback instance for camera {} shut down", self.camera_id);
    }
}
