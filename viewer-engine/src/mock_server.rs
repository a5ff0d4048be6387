//! 模拟会话后端与流媒体客户端，供测试和演示使用

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use common::{
    ApiResponse, HeartbeatRequest, Result, SessionStartData, SessionStartRequest,
    SessionStopRequest, StatusCode, ViewerError,
};

use crate::client::{StreamingClient, StreamingClientFactory};
use crate::errors::ClientError;
use crate::session::SessionEndpoint;
use crate::tuning::StreamTuningProfile;

/// 服务端视角的会话记录
#[derive(Debug, Clone)]
pub struct MockServerSession {
    pub session_id: String,
    pub camera_id: String,
    pub started_at: DateTime<Utc>,
    pub stopped: bool,
}

/// In-memory session backend: issues ids, counts every call and supports
/// failure injection per operation.
pub struct MockSessionServer {
    sessions: Mutex<HashMap<String, MockServerSession>>,
    heartbeat_counts: Mutex<HashMap<String, u32>>,
    beacon_calls: AtomicU32,
    stop_calls: AtomicU32,
    fail_start: AtomicBool,
    fail_heartbeat: AtomicBool,
    fail_stop: AtomicBool,
    start_delay_ms: AtomicU64,
}

impl MockSessionServer {
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            heartbeat_counts: Mutex::new(HashMap::new()),
            beacon_calls: AtomicU32::new(0),
            stop_calls: AtomicU32::new(0),
            fail_start: AtomicBool::new(false),
            fail_heartbeat: AtomicBool::new(false),
            fail_stop: AtomicBool::new(false),
            start_delay_ms: AtomicU64::new(0),
        }
    }

    /// Hold every session-start response for `delay`, to exercise callers
    /// racing through the registration await point.
    pub fn set_start_delay(&self, delay: Duration) {
        self.start_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn set_fail_start(&self, fail: bool) {
        self.fail_start.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_heartbeat(&self, fail: bool) {
        self.fail_heartbeat.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_stop(&self, fail: bool) {
        self.fail_stop.store(fail, Ordering::SeqCst);
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn active_session_count(&self) -> usize {
        self.sessions
            .lock()
            .await
            .values()
            .filter(|s| !s.stopped)
            .count()
    }

    pub async fn heartbeats_for(&self, session_id: &str) -> u32 {
        self.heartbeat_counts
            .lock()
            .await
            .get(session_id)
            .copied()
            .unwrap_or(0)
    }

    pub async fn total_heartbeats(&self) -> u32 {
        self.heartbeat_counts.lock().await.values().sum()
    }

    pub fn stop_calls(&self) -> u32 {
        self.stop_calls.load(Ordering::SeqCst)
    }

    pub fn beacon_calls(&self) -> u32 {
        self.beacon_calls.load(Ordering::SeqCst)
    }

    // 以下为模拟的服务端处理逻辑，出入参对应平台 REST 接口的载荷

    async fn handle_start(&self, request: SessionStartRequest) -> ApiResponse<SessionStartData> {
        let delay_ms = self.start_delay_ms.load(Ordering::SeqCst);
        if delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        }
        if self.fail_start.load(Ordering::SeqCst) {
            return ApiResponse::error("injected session-start failure");
        }

        let session_id = Uuid::new_v4().to_string();
        self.sessions.lock().await.insert(
            session_id.clone(),
            MockServerSession {
                session_id: session_id.clone(),
                camera_id: request.camera_id.clone(),
                started_at: Utc::now(),
                stopped: false,
            },
        );
        debug!(
            "Mock server issued session {} for camera {}",
            session_id, request.camera_id
        );
        ApiResponse::ok(SessionStartData { session_id })
    }

    async fn handle_heartbeat(&self, request: HeartbeatRequest) -> ApiResponse<()> {
        if self.fail_heartbeat.load(Ordering::SeqCst) {
            return ApiResponse::error("injected heartbeat failure");
        }
        if !self.sessions.lock().await.contains_key(&request.session_id) {
            return ApiResponse::error(format!("unknown session {}", request.session_id));
        }
        *self
            .heartbeat_counts
            .lock()
            .await
            .entry(request.session_id)
            .or_insert(0) += 1;
        ApiResponse::ok(())
    }

    async fn handle_stop(&self, request: SessionStopRequest) -> ApiResponse<()> {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_stop.load(Ordering::SeqCst) {
            return ApiResponse::error("injected stop failure");
        }
        match self.sessions.lock().await.get_mut(&request.session_id) {
            Some(session) => {
                session.stopped = true;
                ApiResponse::ok(())
            }
            None => ApiResponse::error(format!("unknown session {}", request.session_id)),
        }
    }
}

impl Default for MockSessionServer {
    fn default() -> Self {
        Self::new()
    }
}

/// 把响应包装的失败分支映射为端点错误
fn unwrap_envelope<T>(response: ApiResponse<T>) -> Result<T> {
    if !response.success {
        return Err(ViewerError::Endpoint {
            code: StatusCode::InternalError as u16,
            message: response
                .message
                .unwrap_or_else(|| "unspecified server error".to_string()),
        });
    }
    response.data.ok_or_else(|| ViewerError::Endpoint {
        code: StatusCode::InternalError as u16,
        message: "response envelope carried no data".to_string(),
    })
}

#[async_trait]
impl SessionEndpoint for MockSessionServer {
    async fn start_session(&self, camera_id: &str) -> Result<String> {
        let response = self
            .handle_start(SessionStartRequest {
                camera_id: camera_id.to_string(),
            })
            .await;
        Ok(unwrap_envelope(response)?.session_id)
    }

    async fn send_heartbeat(&self, session_id: &str) -> Result<()> {
        let response = self
            .handle_heartbeat(HeartbeatRequest {
                session_id: session_id.to_string(),
            })
            .await;
        unwrap_envelope(response)
    }

    async fn stop_session(&self, session_id: &str) -> Result<()> {
        let response = self
            .handle_stop(SessionStopRequest {
                session_id: session_id.to_string(),
            })
            .await;
        unwrap_envelope(response)
    }

    async fn send_exit_beacon(&self, session_id: &str) {
        // 退出信标不返回结果，也不受 fail_stop 注入影响
        self.beacon_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(session) = self.sessions.lock().await.get_mut(session_id) {
            session.stopped = true;
        }
    }
}

/// Scriptable streaming client recording every recovery operation.
pub struct MockStreamingClient {
    reload_calls: AtomicU32,
    repair_calls: AtomicU32,
    codec_swaps: AtomicU32,
    destroyed: AtomicBool,
    swapped: AtomicBool,
    fail_media_repair: AtomicBool,
    fail_repair_after_swap: AtomicBool,
    fail_codec_swap: AtomicBool,
}

impl MockStreamingClient {
    pub fn new() -> Self {
        Self {
            reload_calls: AtomicU32::new(0),
            repair_calls: AtomicU32::new(0),
            codec_swaps: AtomicU32::new(0),
            destroyed: AtomicBool::new(false),
            swapped: AtomicBool::new(false),
            fail_media_repair: AtomicBool::new(false),
            fail_repair_after_swap: AtomicBool::new(false),
            fail_codec_swap: AtomicBool::new(false),
        }
    }

    /// Make the in-place repair fail until a codec swap has happened.
    pub fn set_fail_media_repair(&self, fail: bool) {
        self.fail_media_repair.store(fail, Ordering::SeqCst);
    }

    /// Make the repair fail even after the codec swap.
    pub fn set_fail_repair_after_swap(&self, fail: bool) {
        self.fail_repair_after_swap.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_codec_swap(&self, fail: bool) {
        self.fail_codec_swap.store(fail, Ordering::SeqCst);
    }

    pub fn reload_calls(&self) -> u32 {
        self.reload_calls.load(Ordering::SeqCst)
    }

    pub fn repair_calls(&self) -> u32 {
        self.repair_calls.load(Ordering::SeqCst)
    }

    pub fn codec_swaps(&self) -> u32 {
        self.codec_swaps.load(Ordering::SeqCst)
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }
}

impl Default for MockStreamingClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StreamingClient for MockStreamingClient {
    async fn start_load(&self) -> std::result::Result<(), ClientError> {
        if self.destroyed.load(Ordering::SeqCst) {
            return Err(ClientError::Destroyed);
        }
        self.reload_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn recover_media_error(&self) -> std::result::Result<(), ClientError> {
        self.repair_calls.fetch_add(1, Ordering::SeqCst);
        let swapped = self.swapped.load(Ordering::SeqCst);
        let failing = if swapped {
            self.fail_repair_after_swap.load(Ordering::SeqCst)
        } else {
            self.fail_media_repair.load(Ordering::SeqCst)
        };
        if failing {
            return Err(ClientError::MediaRepairFailed {
                reason: "injected repair failure".to_string(),
            });
        }
        Ok(())
    }

    async fn swap_audio_codec(&self) -> std::result::Result<(), ClientError> {
        if self.fail_codec_swap.load(Ordering::SeqCst) {
            return Err(ClientError::CodecSwapFailed {
                reason: "injected swap failure".to_string(),
            });
        }
        self.codec_swaps.fetch_add(1, Ordering::SeqCst);
        self.swapped.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn destroy(&self) {
        self.destroyed.store(true, Ordering::SeqCst);
    }
}

/// Factory handing out one shared mock client and remembering the last
/// profile it was asked to build with.
pub struct MockStreamingClientFactory {
    client: Arc<MockStreamingClient>,
    last_profile: std::sync::Mutex<Option<StreamTuningProfile>>,
}

impl MockStreamingClientFactory {
    pub fn new() -> Self {
        Self {
            client: Arc::new(MockStreamingClient::new()),
            last_profile: std::sync::Mutex::new(None),
        }
    }

    pub fn client(&self) -> Arc<MockStreamingClient> {
        self.client.clone()
    }

    pub fn last_profile(&self) -> Option<StreamTuningProfile> {
        self.last_profile
            .lock()
            .expect("profile lock poisoned")
            .clone()
    }
}

impl Default for MockStreamingClientFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamingClientFactory for MockStreamingClientFactory {
    fn create(&self, profile: &StreamTuningProfile) -> Arc<dyn StreamingClient> {
        *self.last_profile.lock().expect("profile lock poisoned") = Some(profile.clone());
        self.client.clone()
    }
}
