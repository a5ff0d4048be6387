use std::time::Duration;

use serde::{Deserialize, Serialize};

use common::{DeviceCapabilities, DeviceTier};

/// Buffer length cap applied to mobile devices regardless of tier.
const MOBILE_MAX_BUFFER_SECS: u32 = 20;
/// Bandwidth aggressiveness caps for mobile devices.
const MOBILE_MAX_DOWN_FACTOR: f64 = 0.7;
const MOBILE_MAX_UP_FACTOR: f64 = 0.5;

/// Initial quality-level selection handed to the streaming client.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StartLevel {
    /// Pin the first fragments to the lowest rendition; lets weak devices
    /// reach first-frame without a bandwidth probe.
    FixedLowest,
    /// Let the client's own bandwidth estimator pick the level.
    Auto,
}

/// Buffering and bandwidth-estimation parameters for one streaming client.
///
/// Derived deterministically from (tier, mobility, overrides) and applied
/// at client construction. Immutable once produced; when the tier or the
/// mobility of the device changes, a new profile is computed, never patched.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StreamTuningProfile {
    /// Offload demuxing/transmuxing to a worker where the client supports it.
    pub worker_offload: bool,
    /// Seconds of already-played media kept behind the playhead.
    pub back_buffer_secs: u32,
    /// Forward buffer target in seconds.
    pub max_buffer_secs: u32,
    /// Forward buffer target in bytes.
    pub max_buffer_bytes: u64,
    pub start_level: StartLevel,
    /// Seed for the client's bandwidth estimator, bits per second.
    pub bandwidth_estimate_bps: u64,
    /// Aggressiveness of downward quality switches, 0..=1.
    pub down_factor: f64,
    /// Aggressiveness of upward quality switches, 0..=1.
    pub up_factor: f64,
    /// Fragment/playlist load timeout before the client raises an error.
    #[serde(with = "crate::serde_helpers::duration_millis")]
    pub fragment_timeout: Duration,
    /// Fragment/playlist load retries inside the client itself.
    pub fragment_retries: u32,
    /// Delay between the client's own load retries.
    #[serde(with = "crate::serde_helpers::duration_millis")]
    pub retry_delay: Duration,
}

/// Caller-supplied field overrides, applied last over the computed profile.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProfileOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worker_offload: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub back_buffer_secs: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_buffer_secs: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_buffer_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_level: Option<StartLevel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bandwidth_estimate_bps: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub down_factor: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub up_factor: Option<f64>,
    #[serde(
        with = "crate::serde_helpers::option_duration_millis",
        skip_serializing_if = "Option::is_none"
    )]
    pub fragment_timeout: Option<Duration>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fragment_retries: Option<u32>,
    #[serde(
        with = "crate::serde_helpers::option_duration_millis",
        skip_serializing_if = "Option::is_none"
    )]
    pub retry_delay: Option<Duration>,
}

impl ProfileOverrides {
    pub fn is_empty(&self) -> bool {
        *self == ProfileOverrides::default()
    }

    fn apply(&self, profile: &mut StreamTuningProfile) {
        if let Some(v) = self.worker_offload {
            profile.worker_offload = v;
        }
        if let Some(v) = self.back_buffer_secs {
            profile.back_buffer_secs = v;
        }
        if let Some(v) = self.max_buffer_secs {
            profile.max_buffer_secs = v;
        }
        if let Some(v) = self.max_buffer_bytes {
            profile.max_buffer_bytes = v;
        }
        if let Some(v) = self.start_level {
            profile.start_level = v;
        }
        if let Some(v) = self.bandwidth_estimate_bps {
            profile.bandwidth_estimate_bps = v;
        }
        if let Some(v) = self.down_factor {
            profile.down_factor = v;
        }
        if let Some(v) = self.up_factor {
            profile.up_factor = v;
        }
        if let Some(v) = self.fragment_timeout {
            profile.fragment_timeout = v;
        }
        if let Some(v) = self.fragment_retries {
            profile.fragment_retries = v;
        }
        if let Some(v) = self.retry_delay {
            profile.retry_delay = v;
        }
    }
}

/// Inputs beyond the tier itself.
#[derive(Debug, Clone, Default)]
pub struct TuningOptions {
    pub is_mobile: bool,
    pub overrides: ProfileOverrides,
}

/// Base parameter table per tier.
fn tier_base(tier: DeviceTier) -> StreamTuningProfile {
    match tier {
        DeviceTier::Low => StreamTuningProfile {
            worker_offload: false,
            back_buffer_secs: 10,
            max_buffer_secs: 15,
            max_buffer_bytes: 30_000_000,
            start_level: StartLevel::FixedLowest,
            bandwidth_estimate_bps: 300_000,
            down_factor: 0.7,
            up_factor: 0.5,
            fragment_timeout: Duration::from_millis(30_000),
            fragment_retries: 4,
            retry_delay: Duration::from_millis(2_000),
        },
        DeviceTier::Medium => StreamTuningProfile {
            worker_offload: true,
            back_buffer_secs: 20,
            max_buffer_secs: 25,
            max_buffer_bytes: 45_000_000,
            start_level: StartLevel::Auto,
            bandwidth_estimate_bps: 500_000,
            down_factor: 0.8,
            up_factor: 0.6,
            fragment_timeout: Duration::from_millis(25_000),
            fragment_retries: 5,
            retry_delay: Duration::from_millis(1_000),
        },
        DeviceTier::High => StreamTuningProfile {
            worker_offload: true,
            back_buffer_secs: 30,
            max_buffer_secs: 30,
            max_buffer_bytes: 60_000_000,
            start_level: StartLevel::Auto,
            bandwidth_estimate_bps: 1_000_000,
            down_factor: 0.9,
            up_factor: 0.7,
            fragment_timeout: Duration::from_millis(20_000),
            fragment_retries: 6,
            retry_delay: Duration::from_millis(500),
        },
    }
}

/// Compute the tuning profile for one playback instance.
///
/// Pure and idempotent: same inputs always yield a value-equal profile.
/// Order of application is tier table, then mobile caps, then caller
/// overrides (which win over every computed field).
pub fn compute_profile(tier: DeviceTier, options: &TuningOptions) -> StreamTuningProfile {
    let mut profile = tier_base(tier);

    if options.is_mobile {
        // 移动端统一收紧缓冲和带宽策略
        profile.max_buffer_secs = profile.max_buffer_secs.min(MOBILE_MAX_BUFFER_SECS);
        profile.down_factor = profile.down_factor.min(MOBILE_MAX_DOWN_FACTOR);
        profile.up_factor = profile.up_factor.min(MOBILE_MAX_UP_FACTOR);
    }

    options.overrides.apply(&mut profile);
    profile
}

/// Supplies the device classification the selector runs on. Called once
/// per playback-instance creation; the result is never re-probed for a
/// live instance.
pub trait CapabilityProbe: Send + Sync {
    fn capabilities(&self) -> DeviceCapabilities;
}

/// Probe with fixed, pre-determined capabilities. Used when the host has
/// already classified the device, and throughout the tests.
#[derive(Debug, Clone, Copy)]
pub struct StaticCapabilityProbe {
    capabilities: DeviceCapabilities,
}

impl StaticCapabilityProbe {
    pub fn new(tier: DeviceTier, is_mobile: bool) -> Self {
        Self {
            capabilities: DeviceCapabilities::new(tier, is_mobile),
        }
    }
}

impl Default for StaticCapabilityProbe {
    fn default() -> Self {
        Self {
            capabilities: DeviceCapabilities::default(),
        }
    }
}

impl CapabilityProbe for StaticCapabilityProbe {
    fn capabilities(&self) -> DeviceCapabilities {
        self.capabilities
    }
}
