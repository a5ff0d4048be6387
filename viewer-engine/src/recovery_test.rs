#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use proptest::prelude::*;

    use crate::mock_server::MockStreamingClient;
    use crate::recovery::{backoff_delay, RecoveryConfig, RecoveryCoordinator};
    use crate::types::{FailureEvent, FailureKind, RecoveryStatus};

    /// Millisecond-scale delays so retry-exhaustion tests finish quickly.
    fn fast_config() -> RecoveryConfig {
        RecoveryConfig {
            backoff_base: Duration::from_millis(10),
            backoff_cap: Duration::from_millis(80),
            max_retries: 4,
        }
    }

    fn coordinator(config: RecoveryConfig) -> (Arc<MockStreamingClient>, RecoveryCoordinator) {
        let client = Arc::new(MockStreamingClient::new());
        let coordinator = RecoveryCoordinator::new(client.clone(), config);
        (client, coordinator)
    }

    #[test]
    fn test_backoff_sequence_with_defaults() {
        let config = RecoveryConfig::default();
        assert_eq!(backoff_delay(&config, 0), Duration::from_millis(1_000));
        assert_eq!(backoff_delay(&config, 1), Duration::from_millis(2_000));
        assert_eq!(backoff_delay(&config, 2), Duration::from_millis(4_000));
        assert_eq!(backoff_delay(&config, 3), Duration::from_millis(8_000));
        // Capped from here on.
        assert_eq!(backoff_delay(&config, 4), Duration::from_millis(8_000));
        assert_eq!(backoff_delay(&config, 10), Duration::from_millis(8_000));
    }

    proptest! {
        #[test]
        fn test_backoff_law(base_ms in 1u64..5_000, cap_ms in 1u64..60_000, attempt in 0u32..40) {
            let config = RecoveryConfig {
                backoff_base: Duration::from_millis(base_ms),
                backoff_cap: Duration::from_millis(cap_ms),
                max_retries: 4,
            };
            let delay = backoff_delay(&config, attempt);
            let expected = base_ms
                .saturating_mul(2u64.saturating_pow(attempt))
                .min(cap_ms);
            prop_assert_eq!(delay, Duration::from_millis(expected));
            prop_assert!(delay <= config.backoff_cap);
        }
    }

    #[tokio::test]
    async fn test_non_fatal_failure_ignored() {
        let (client, coordinator) = coordinator(fast_config());

        let outcome = coordinator
            .handle_error(FailureEvent::transient(FailureKind::Network))
            .await;

        assert_eq!(outcome.status, RecoveryStatus::Ignored);
        assert_eq!(client.reload_calls(), 0);
        assert_eq!(client.repair_calls(), 0);
        assert!(!client.is_destroyed());
        let state = coordinator.state().await;
        assert!(!state.is_recovering);
        assert_eq!(state.retry_count, 0);
    }

    #[tokio::test]
    async fn test_network_retries_then_terminal_failure() {
        let (client, coordinator) = coordinator(fast_config());

        for attempt in 1..=4u32 {
            let outcome = coordinator
                .handle_error(FailureEvent::fatal(FailureKind::Network))
                .await;
            assert_eq!(outcome.status, RecoveryStatus::Retry);
            assert_eq!(outcome.attempts, attempt);
            assert_eq!(client.reload_calls(), attempt);
        }

        // Budget exhausted: fails fast, without waiting or reloading.
        let start = tokio::time::Instant::now();
        let outcome = coordinator
            .handle_error(FailureEvent::fatal(FailureKind::Network))
            .await;
        assert_eq!(outcome.status, RecoveryStatus::Failed);
        assert_eq!(client.reload_calls(), 4);
        assert!(start.elapsed() < fast_config().backoff_base);
    }

    #[tokio::test]
    async fn test_media_repair_success_resets_retry_budget() {
        let (client, coordinator) = coordinator(fast_config());

        // Consume part of the retry budget first.
        coordinator
            .handle_error(FailureEvent::fatal(FailureKind::Network))
            .await;
        coordinator
            .handle_error(FailureEvent::fatal(FailureKind::Network))
            .await;
        assert_eq!(coordinator.state().await.retry_count, 2);

        let outcome = coordinator
            .handle_error(FailureEvent::fatal(FailureKind::Media))
            .await;

        assert_eq!(outcome.status, RecoveryStatus::Success);
        assert_eq!(client.repair_calls(), 1);
        assert_eq!(client.codec_swaps(), 0);
        assert_eq!(coordinator.state().await.retry_count, 0);
    }

    #[tokio::test]
    async fn test_media_repair_falls_back_to_codec_swap() {
        let (client, coordinator) = coordinator(fast_config());
        client.set_fail_media_repair(true);

        let outcome = coordinator
            .handle_error(FailureEvent::fatal(FailureKind::Media))
            .await;

        assert_eq!(outcome.status, RecoveryStatus::Success);
        assert_eq!(client.codec_swaps(), 1);
        // One failed repair, one successful post-swap repair.
        assert_eq!(client.repair_calls(), 2);
    }

    #[tokio::test]
    async fn test_media_recovery_fails_when_swap_fails() {
        let (client, coordinator) = coordinator(fast_config());
        client.set_fail_media_repair(true);
        client.set_fail_codec_swap(true);

        let outcome = coordinator
            .handle_error(FailureEvent::fatal(FailureKind::Media))
            .await;

        assert_eq!(outcome.status, RecoveryStatus::Failed);
        assert_eq!(client.repair_calls(), 1);
        assert_eq!(client.codec_swaps(), 0);
    }

    #[tokio::test]
    async fn test_media_recovery_fails_when_repair_fails_after_swap() {
        let (client, coordinator) = coordinator(fast_config());
        client.set_fail_media_repair(true);
        client.set_fail_repair_after_swap(true);

        let outcome = coordinator
            .handle_error(FailureEvent::fatal(FailureKind::Media))
            .await;

        assert_eq!(outcome.status, RecoveryStatus::Failed);
        assert_eq!(client.codec_swaps(), 1);
        assert_eq!(client.repair_calls(), 2);
        assert!(!client.is_destroyed());
    }

    #[tokio::test]
    async fn test_unrecoverable_failure_destroys_and_notifies() {
        let (client, coordinator) = coordinator(fast_config());
        let torn_down = Arc::new(AtomicBool::new(false));
        let flag = torn_down.clone();
        let coordinator = coordinator.with_teardown_hook(Box::new(move |kind| {
            assert_eq!(kind, FailureKind::Fatal);
            flag.store(true, Ordering::SeqCst);
        }));

        let outcome = coordinator
            .handle_error(FailureEvent::fatal(FailureKind::Fatal))
            .await;

        assert_eq!(outcome.status, RecoveryStatus::Failed);
        assert!(client.is_destroyed());
        assert!(torn_down.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_overlapping_failures_suppressed() {
        let (client, coordinator) = coordinator(fast_config());
        let coordinator = Arc::new(coordinator);

        // First failure enters the backoff sleep inside handle_error.
        let first = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move {
                coordinator
                    .handle_error(FailureEvent::fatal(FailureKind::Network))
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(2)).await;

        // Second failure arrives while the first is still in flight.
        let overlapping = coordinator
            .handle_error(FailureEvent::fatal(FailureKind::Network))
            .await;
        assert_eq!(overlapping.status, RecoveryStatus::Recovering);

        let first = first.await.expect("first recovery task");
        assert_eq!(first.status, RecoveryStatus::Retry);
        // Only the first failure consumed an attempt.
        assert_eq!(client.reload_calls(), 1);
        assert_eq!(coordinator.state().await.retry_count, 1);
    }

    #[tokio::test]
    async fn test_reset_clears_retry_budget() {
        let (client, coordinator) = coordinator(fast_config());

        for _ in 0..3 {
            coordinator
                .handle_error(FailureEvent::fatal(FailureKind::Network))
                .await;
        }
        assert_eq!(coordinator.state().await.retry_count, 3);

        coordinator.reset();
        let state = coordinator.state().await;
        assert_eq!(state.retry_count, 0);
        assert!(!state.is_recovering);

        // The full budget is available again.
        let outcome = coordinator
            .handle_error(FailureEvent::fatal(FailureKind::Network))
            .await;
        assert_eq!(outcome.status, RecoveryStatus::Retry);
        assert_eq!(client.reload_calls(), 4);
    }
}
