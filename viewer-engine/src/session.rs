use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use futures::future::join_all;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use common::{Result, ViewerError};

use crate::types::ViewerSession;

/// Session keep-alive settings, overridable at construction.
#[derive(Debug, Clone)]
pub struct HeartbeatConfig {
    /// Interval between heartbeat rounds of the shared task.
    pub interval: Duration,
    /// Upper bound on concurrently open sessions per process (multi-view grid).
    pub max_sessions: usize,
    /// Server-side session-eviction budget. A collaborator contract value,
    /// configured here rather than inferred; the default interval leaves two
    /// full missed heartbeats of slack against it.
    pub server_eviction_timeout: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            max_sessions: 4,
            server_eviction_timeout: Duration::from_secs(15),
        }
    }
}

/// Backend contract for viewing-session bookkeeping.
#[async_trait]
pub trait SessionEndpoint: Send + Sync {
    /// Register a viewing session; returns the server-issued session id.
    async fn start_session(&self, camera_id: &str) -> Result<String>;

    /// Keep-alive ping for one session. Failures are not retried here; the
    /// next scheduled round naturally retries.
    async fn send_heartbeat(&self, session_id: &str) -> Result<()>;

    /// Close one session.
    async fn stop_session(&self, session_id: &str) -> Result<()>;

    /// Page-teardown delivery of the stop signal. At-most-once and
    /// unconfirmed: the transport gives no delivery guarantee and no
    /// response is awaited. Not a reliable primitive.
    async fn send_exit_beacon(&self, session_id: &str) {
        let _ = self.stop_session(session_id).await;
    }
}

/// Registry of active viewing sessions, kept alive by one shared heartbeat
/// task.
///
/// Constructed once at application start and shared via `Arc`; all registry
/// mutation goes through the methods here. Invariant: the heartbeat task is
/// running if and only if the registry is non-empty — every mutating method
/// re-checks the registry size after mutating.
pub struct SessionManager {
    endpoint: Arc<dyn SessionEndpoint>,
    sessions: Arc<DashMap<String, ViewerSession>>,
    config: HeartbeatConfig,
    heartbeat_task: Mutex<Option<JoinHandle<()>>>,
}

impl SessionManager {
    pub fn new(endpoint: Arc<dyn SessionEndpoint>) -> Self {
        Self::with_config(endpoint, HeartbeatConfig::default())
    }

    pub fn with_config(endpoint: Arc<dyn SessionEndpoint>, config: HeartbeatConfig) -> Self {
        Self {
            endpoint,
            sessions: Arc::new(DashMap::new()),
            config,
            heartbeat_task: Mutex::new(None),
        }
    }

    /// Register a viewing session for `camera_id`. On backend failure the
    /// error propagates and nothing is registered.
    pub async fn start_session(&self, camera_id: &str) -> Result<String> {
        if self.sessions.len() >= self.config.max_sessions {
            return Err(ViewerError::SessionLimitReached {
                limit: self.config.max_sessions,
            });
        }

        let session_id = self.endpoint.start_session(camera_id).await?;

        // 另一个并发 start 可能在上面的 await 期间占走了名额，入表前复查
        if self.sessions.len() >= self.config.max_sessions {
            warn!(
                "Session slot taken while registering {}, releasing it",
                session_id
            );
            if let Err(e) = self.endpoint.stop_session(&session_id).await {
                warn!("✗ Stop call for session {} failed: {}", session_id, e);
            }
            return Err(ViewerError::SessionLimitReached {
                limit: self.config.max_sessions,
            });
        }

        info!(
            "Viewing session {} started for camera {}",
            session_id, camera_id
        );
        self.sessions.insert(
            session_id.clone(),
            ViewerSession {
                session_id: session_id.clone(),
                camera_id: camera_id.to_string(),
                started_at: Utc::now(),
            },
        );
        self.ensure_heartbeat_task().await;
        Ok(session_id)
    }

    /// Close one session. The stop call is best-effort: local removal
    /// proceeds even when it fails, the client has no further use for the
    /// entry either way.
    pub async fn stop_session(&self, session_id: &str) {
        if let Err(e) = self.endpoint.stop_session(session_id).await {
            warn!("✗ Stop call for session {} failed: {}", session_id, e);
        }
        self.sessions.remove(session_id);
        info!("Viewing session {} removed", session_id);
        self.sync_heartbeat_task().await;
    }

    /// Close every registered session concurrently; individual failures are
    /// logged and never abort the others.
    pub async fn stop_all_sessions(&self) {
        let ids = self.session_ids();
        join_all(ids.iter().map(|id| {
            let endpoint = self.endpoint.clone();
            async move {
                if let Err(e) = endpoint.stop_session(id).await {
                    warn!("✗ Stop call for session {} failed: {}", id, e);
                }
            }
        }))
        .await;
        self.sessions.clear();
        self.sync_heartbeat_task().await;
    }

    /// Tab-hidden hook: send a heartbeat round immediately instead of
    /// waiting for the next tick, so a briefly backgrounded viewer does not
    /// expire on the server.
    pub async fn notify_hidden(&self) {
        debug!("Tab hidden, sending immediate heartbeat round");
        Self::heartbeat_round(&self.endpoint, &self.sessions).await;
    }

    /// Page-unload hook: dispatch one fire-and-forget exit beacon per
    /// session, then drop the local registry — the page is tearing down and
    /// the entries have no further local use.
    pub async fn flush_exit_beacons(&self) {
        for entry in self.sessions.iter() {
            let endpoint = self.endpoint.clone();
            let id = entry.key().clone();
            tokio::spawn(async move {
                endpoint.send_exit_beacon(&id).await;
            });
        }
        let flushed = self.sessions.len();
        self.sessions.clear();
        debug!("Dispatched {} exit beacon(s) on unload", flushed);
        self.sync_heartbeat_task().await;
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn session_ids(&self) -> Vec<String> {
        self.sessions.iter().map(|e| e.key().clone()).collect()
    }

    pub fn active_sessions(&self) -> Vec<ViewerSession> {
        self.sessions.iter().map(|e| e.value().clone()).collect()
    }

    pub fn config(&self) -> &HeartbeatConfig {
        &self.config
    }

    pub async fn heartbeat_task_running(&self) -> bool {
        self.heartbeat_task
            .lock()
            .await
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    async fn ensure_heartbeat_task(&self) {
        let mut guard = self.heartbeat_task.lock().await;
        let running = guard.as_ref().map(|h| !h.is_finished()).unwrap_or(false);
        if running || self.sessions.is_empty() {
            return;
        }

        let endpoint = self.endpoint.clone();
        let sessions = self.sessions.clone();
        let interval = self.config.interval;
        *guard = Some(tokio::spawn(async move {
            // First round fires one full interval in, not immediately; the
            // session-start call itself just told the server we are alive.
            let start = tokio::time::Instant::now() + interval;
            let mut ticker = tokio::time::interval_at(start, interval);
            loop {
                ticker.tick().await;
                if sessions.is_empty() {
                    continue;
                }
                Self::heartbeat_round(&endpoint, &sessions).await;
            }
        }));
        debug!("Heartbeat task started ({:?} interval)", interval);
    }

    /// Stop the shared task once the registry has drained.
    async fn sync_heartbeat_task(&self) {
        if !self.sessions.is_empty() {
            return;
        }
        let mut guard = self.heartbeat_task.lock().await;
        if let Some(handle) = guard.take() {
            handle.abort();
            debug!("Heartbeat task stopped, no active sessions");
        }
    }

    async fn heartbeat_round(
        endpoint: &Arc<dyn SessionEndpoint>,
        sessions: &DashMap<String, ViewerSession>,
    ) {
        let ids: Vec<String> = sessions.iter().map(|e| e.key().clone()).collect();
        // 各会话独立发送：单个失败不影响其他会话，也不做本地摘除，
        // 会话超时淘汰由服务端负责
        join_all(ids.into_iter().map(|id| {
            let endpoint = endpoint.clone();
            async move {
                match endpoint.send_heartbeat(&id).await {
                    Ok(()) => debug!("💓 Heartbeat sent for session {}", id),
                    Err(e) => warn!("✗ Heartbeat for session {} failed: {}", id, e),
                }
            }
        }))
        .await;
    }
}
