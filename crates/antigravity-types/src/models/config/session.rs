//! Session, experimental, and quota-protection configuration types.

use serde::{Deserialize, Serialize};
use validator::Validate;

use super::enums::{SchedulingMode, StrategyKind};

/// Experimental features configuration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, Validate)]
#[allow(
    clippy::struct_excessive_bools,
    reason = "Configuration struct - bools are intentional feature flags"
)]
pub struct ExperimentalConfig {
    /// Enable signature caching for prompt reuse
    #[serde(default = "default_true")]
    pub enable_signature_cache: bool,
    /// Enable tool loop recovery (synthetic thinking block injection)
    #[serde(default = "default_true")]
    pub enable_tool_loop_recovery: bool,
    /// Enable cross-model-family signature consistency checks
    #[serde(default = "default_true")]
    pub enable_cross_model_checks: bool,
}

/// Sticky session configuration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq, Validate)]
pub struct StickySessionConfig {
    /// Enable sticky sessions
    #[serde(default)]
    pub enabled: bool,
    /// Scheduling mode
    #[serde(default)]
    pub mode: SchedulingMode,
    /// Which selection strategy to run
    #[serde(default)]
    pub strategy: StrategyKind,
    /// Session TTL in seconds
    #[validate(range(min = 1_u32))]
    #[serde(default = "default_sticky_ttl", alias = "max_wait_seconds")]
    pub ttl: u32,
}

/// Quota protection configuration.
/// Prevents account exhaustion by monitoring quota thresholds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default, Validate)]
pub struct QuotaProtectionConfig {
    /// Enable quota protection
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Threshold percentage (1-99) - accounts below this are considered low
    #[validate(range(min = 1_u8, max = 99_u8))]
    #[serde(default = "default_quota_threshold")]
    pub threshold_percentage: u8,
    /// Models to monitor for quota protection
    #[serde(default)]
    pub monitored_models: Vec<String>,
    /// Auto-restore accounts when quota resets
    #[serde(default = "default_true")]
    pub auto_restore: bool,
}

// Default value functions
pub const fn default_true() -> bool {
    true
}

pub const fn default_sticky_ttl() -> u32 {
    300 // 5 minutes default TTL for sticky sessions
}

pub const fn default_quota_threshold() -> u8 {
    20
}
