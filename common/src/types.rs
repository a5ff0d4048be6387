use serde::{Deserialize, Serialize};

/// 设备性能分级，由外部能力探测器给出
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DeviceTier {
    Low,
    Medium,
    High,
}

impl Default for DeviceTier {
    fn default() -> Self {
        DeviceTier::Medium
    }
}

impl DeviceTier {
    /// 从探测结果字符串解析分级，未知取值回退到 Medium
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "low" => DeviceTier::Low,
            "medium" => DeviceTier::Medium,
            "high" => DeviceTier::High,
            _ => DeviceTier::Medium,
        }
    }

    pub fn as_label(&self) -> &'static str {
        match self {
            DeviceTier::Low => "low",
            DeviceTier::Medium => "medium",
            DeviceTier::High => "high",
        }
    }
}

/// 播放端设备能力描述，每个播放实例创建时探测一次
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeviceCapabilities {
    pub tier: DeviceTier,
    pub is_mobile: bool,
}

impl DeviceCapabilities {
    pub fn new(tier: DeviceTier, is_mobile: bool) -> Self {
        Self { tier, is_mobile }
    }
}

impl Default for DeviceCapabilities {
    fn default() -> Self {
        Self {
            tier: DeviceTier::Medium,
            is_mobile: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_label_round_trip() {
        for tier in [DeviceTier::Low, DeviceTier::Medium, DeviceTier::High] {
            assert_eq!(DeviceTier::from_label(tier.as_label()), tier);
        }
    }

    #[test]
    fn test_unknown_label_falls_back_to_medium() {
        assert_eq!(DeviceTier::from_label("bogus-tier"), DeviceTier::Medium);
        assert_eq!(DeviceTier::from_label(""), DeviceTier::Medium);
        assert_eq!(DeviceTier::from_label("  HIGH "), DeviceTier::High);
    }
}
