#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use common::DeviceTier;

    use crate::app::ViewerEngine;
    use crate::config::AppConfig;
    use crate::errors::EngineError;
    use crate::mock_server::{MockSessionServer, MockStreamingClientFactory};
    use crate::tuning::{StartLevel, StaticCapabilityProbe};
    use crate::types::{FailureEvent, FailureKind};

    fn fast_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.heartbeat.interval = Duration::from_millis(20);
        config.heartbeat.server_eviction_timeout = Duration::from_millis(600);
        config.recovery.backoff_base = Duration::from_millis(10);
        config.recovery.backoff_cap = Duration::from_millis(80);
        config
    }

    fn engine_with(
        config: AppConfig,
        tier: DeviceTier,
        is_mobile: bool,
    ) -> (Arc<MockSessionServer>, Arc<MockStreamingClientFactory>, ViewerEngine) {
        let server = Arc::new(MockSessionServer::new());
        let factory = Arc::new(MockStreamingClientFactory::new());
        let engine = ViewerEngine::builder()
            .with_config(config)
            .with_endpoint(server.clone())
            .with_probe(Arc::new(StaticCapabilityProbe::new(tier, is_mobile)))
            .with_factory(factory.clone())
            .without_logging()
            .build()
            .expect("engine build");
        (server, factory, engine)
    }

    #[tokio::test]
    async fn test_builder_requires_endpoint_and_factory() {
        let result = ViewerEngine::builder().without_logging().build();
        assert!(matches!(
            result,
            Err(EngineError::ComponentInitializationFailed { .. })
        ));
    }

    #[tokio::test]
    async fn test_playback_wires_tier_profile_into_client() {
        let (server, factory, engine) = engine_with(fast_config(), DeviceTier::Low, true);

        let playback = engine.create_playback("camera-lobby").await.expect("create");

        // Low-tier mobile: conservative base table, buffers already under
        // the mobile caps.
        let profile = factory.last_profile().expect("profile recorded");
        assert!(!profile.worker_offload);
        assert_eq!(profile.start_level, StartLevel::FixedLowest);
        assert_eq!(profile.max_buffer_secs, 15);
        assert_eq!(profile.up_factor, 0.5);
        assert_eq!(profile.bandwidth_estimate_bps, 300_000);
        assert_eq!(playback.profile(), &profile);

        assert_eq!(server.active_session_count().await, 1);
        assert_eq!(engine.session_manager().session_count(), 1);

        playback.shutdown().await;
        assert_eq!(engine.session_manager().session_count(), 0);
        assert_eq!(server.active_session_count().await, 0);
    }

    #[tokio::test]
    async fn test_forced_tier_overrides_probe() {
        let mut config = fast_config();
        config.tuning.force_tier = Some(DeviceTier::High);
        config.tuning.force_mobile = Some(false);
        let (_server, factory, engine) = engine_with(config, DeviceTier::Low, true);

        let playback = engine.create_playback("camera-yard").await.expect("create");

        let profile = factory.last_profile().expect("profile recorded");
        assert!(profile.worker_offload);
        assert_eq!(profile.max_buffer_secs, 30);
        assert_eq!(profile.bandwidth_estimate_bps, 1_000_000);

        playback.shutdown().await;
    }

    #[tokio::test]
    async fn test_network_failure_flows_through_mailbox_to_reload() {
        let (_server, factory, engine) = engine_with(fast_config(), DeviceTier::Medium, false);
        let playback = engine.create_playback("camera-gate").await.expect("create");

        playback
            .failure_sender()
            .send(FailureEvent::fatal(FailureKind::Network))
            .expect("mailbox open");

        // Backoff is 10ms; well inside this window.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(factory.client().reload_calls(), 1);
        assert_eq!(playback.coordinator().state().await.retry_count, 1);

        playback.reset_recovery();
        assert_eq!(playback.coordinator().state().await.retry_count, 0);

        playback.shutdown().await;
    }

    #[tokio::test]
    async fn test_media_failure_flows_through_mailbox_to_repair() {
        let (_server, factory, engine) = engine_with(fast_config(), DeviceTier::Medium, false);
        let playback = engine.create_playback("camera-dock").await.expect("create");
        factory.client().set_fail_media_repair(true);

        playback
            .failure_sender()
            .send(FailureEvent::fatal(FailureKind::Media))
            .expect("mailbox open");

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(factory.client().codec_swaps(), 1);
        assert_eq!(factory.client().repair_calls(), 2);
        assert!(!factory.client().is_destroyed());

        playback.shutdown().await;
    }

    #[tokio::test]
    async fn test_failed_session_start_leaves_no_playback() {
        let (server, factory, engine) = engine_with(fast_config(), DeviceTier::Medium, false);
        server.set_fail_start(true);

        let result = engine.create_playback("camera-roof").await;

        assert!(matches!(result, Err(EngineError::Session(_))));
        assert_eq!(engine.session_manager().session_count(), 0);
        // The client had been built before registration failed but no
        // recovery machinery was attached to it.
        assert_eq!(factory.client().reload_calls(), 0);
    }

    #[tokio::test]
    async fn test_engine_shutdown_closes_every_session() {
        let (server, _factory, engine) = engine_with(fast_config(), DeviceTier::Medium, false);
        let _first = engine.create_playback("camera-01").await.expect("create");
        let _second = engine.create_playback("camera-02").await.expect("create");
        assert_eq!(engine.session_manager().session_count(), 2);

        engine.shutdown().await;

        assert_eq!(engine.session_manager().session_count(), 0);
        assert_eq!(server.active_session_count().await, 0);
        assert!(!engine.session_manager().heartbeat_task_running().await);
    }

    #[tokio::test]
    async fn test_unload_hook_beacons_every_session() {
        let (server, _factory, engine) = engine_with(fast_config(), DeviceTier::Medium, false);
        let _first = engine.create_playback("camera-01").await.expect("create");
        let _second = engine.create_playback("camera-02").await.expect("create");

        engine.on_page_unload().await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(server.beacon_calls(), 2);
        assert_eq!(engine.session_manager().session_count(), 0);
    }
}
