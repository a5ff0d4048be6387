use std::sync::Arc;

use tracing::{info, warn};

use crate::client::StreamingClientFactory;
use crate::config::AppConfig;
use crate::errors::EngineError;
use crate::playback::PlaybackInstance;
use crate::recovery::{RecoveryConfig, TeardownHook};
use crate::session::{HeartbeatConfig, SessionEndpoint, SessionManager};
use crate::tuning::{CapabilityProbe, StaticCapabilityProbe};

/// 引擎构建器：装配配置、会话后端、设备探测与流媒体客户端工厂
///
/// The endpoint and the client factory have no useful defaults and must be
/// supplied; the capability probe falls back to a static medium-tier probe.
pub struct EngineBuilder {
    config_path: Option<String>,
    custom_config: Option<AppConfig>,
    endpoint: Option<Arc<dyn SessionEndpoint>>,
    probe: Option<Arc<dyn CapabilityProbe>>,
    factory: Option<Arc<dyn StreamingClientFactory>>,
    init_logging: bool,
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self {
            config_path: None,
            custom_config: None,
            endpoint: None,
            probe: None,
            factory: None,
            init_logging: true,
        }
    }

    /// Load configuration from a TOML file instead of the defaults.
    pub fn with_config_path(mut self, path: impl Into<String>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    /// Use an already-built configuration; wins over `with_config_path`.
    pub fn with_config(mut self, config: AppConfig) -> Self {
        self.custom_config = Some(config);
        self
    }

    pub fn with_endpoint(mut self, endpoint: Arc<dyn SessionEndpoint>) -> Self {
        self.endpoint = Some(endpoint);
        self
    }

    pub fn with_probe(mut self, probe: Arc<dyn CapabilityProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn with_factory(mut self, factory: Arc<dyn StreamingClientFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    /// Leave the global tracing subscriber alone; tests install their own.
    pub fn without_logging(mut self) -> Self {
        self.init_logging = false;
        self
    }

    pub fn build(self) -> Result<ViewerEngine, EngineError> {
        // 配置优先级：显式配置 > 配置文件 > 默认值
        let config = match (self.custom_config, self.config_path) {
            (Some(config), _) => {
                config.validate()?;
                config
            }
            (None, Some(path)) => AppConfig::load_from_file(path)?,
            (None, None) => AppConfig::default(),
        };

        if self.init_logging {
            Self::init_logging(&config);
        }

        let endpoint = self
            .endpoint
            .ok_or_else(|| EngineError::ComponentInitializationFailed {
                component: "session endpoint".to_string(),
            })?;
        let factory = self
            .factory
            .ok_or_else(|| EngineError::ComponentInitializationFailed {
                component: "streaming client factory".to_string(),
            })?;
        let probe = self
            .probe
            .unwrap_or_else(|| Arc::new(StaticCapabilityProbe::default()));

        let session_manager = Arc::new(SessionManager::with_config(
            endpoint,
            HeartbeatConfig::from(&config.heartbeat),
        ));

        info!(
            "✓ Viewer engine assembled (heartbeat {:?}, max {} sessions)",
            config.heartbeat.interval, config.heartbeat.max_sessions
        );

        Ok(ViewerEngine {
            config,
            session_manager,
            probe,
            factory,
        })
    }

    /// 初始化日志 - 使用环境变量 RUST_LOG 控制级别
    fn init_logging(config: &AppConfig) {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(config.logging.level.clone()));
        // 全局 subscriber 只能安装一次，重复构建引擎时忽略错误
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(config.logging.show_target)
            .try_init();
    }
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Assembled live-viewing engine: one session registry plus the pieces
/// needed to stamp out playback instances on demand.
pub struct ViewerEngine {
    config: AppConfig,
    session_manager: Arc<SessionManager>,
    probe: Arc<dyn CapabilityProbe>,
    factory: Arc<dyn StreamingClientFactory>,
}

impl ViewerEngine {
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn session_manager(&self) -> Arc<SessionManager> {
        self.session_manager.clone()
    }

    /// Open a playback instance for one camera, applying the configured
    /// tier/mobility pins and profile overrides.
    pub async fn create_playback(
        &self,
        camera_id: &str,
    ) -> Result<PlaybackInstance, EngineError> {
        self.create_playback_with_teardown(camera_id, None).await
    }

    pub async fn create_playback_with_teardown(
        &self,
        camera_id: &str,
        on_teardown: Option<TeardownHook>,
    ) -> Result<PlaybackInstance, EngineError> {
        let tuning = &self.config.tuning;
        let pinned;
        let probe: &dyn CapabilityProbe =
            if tuning.force_tier.is_none() && tuning.force_mobile.is_none() {
                self.probe.as_ref()
            } else {
                let base = self.probe.capabilities();
                pinned = StaticCapabilityProbe::new(
                    tuning.force_tier.unwrap_or(base.tier),
                    tuning.force_mobile.unwrap_or(base.is_mobile),
                );
                &pinned
            };

        let playback = PlaybackInstance::create(
            camera_id,
            probe,
            self.factory.as_ref(),
            self.session_manager.clone(),
            RecoveryConfig::from(&self.config.recovery),
            self.config.tuning.overrides.clone(),
            on_teardown,
        )
        .await?;
        Ok(playback)
    }

    /// Tab-hidden hook passthrough.
    pub async fn on_visibility_hidden(&self) {
        self.session_manager.notify_hidden().await;
    }

    /// Page-unload hook passthrough.
    pub async fn on_page_unload(&self) {
        self.session_manager.flush_exit_beacons().await;
    }

    /// Stop every session and release the heartbeat task.
    pub async fn shutdown(&self) {
        let open = self.session_manager.session_count();
        if open > 0 {
            warn!("Shutting down with {} session(s) still open", open);
        }
        self.session_manager.stop_all_sessions().await;
        info!("✓ Viewer engine shut down");
    }
}
