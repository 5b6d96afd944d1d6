//! Configuration enums for proxy and scheduling modes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Proxy authentication mode.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProxyAuthMode {
    /// No authentication required
    #[default]
    Off,
    /// Always require API key
    Strict,
    /// Require API key for all except health checks
    AllExceptHealth,
    /// Automatic mode (detect from request)
    Auto,
}

impl fmt::Display for ProxyAuthMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::Off => write!(f, "off"),
            Self::Strict => write!(f, "strict"),
            Self::AllExceptHealth => write!(f, "all_except_health"),
            Self::Auto => write!(f, "auto"),
        }
    }
}

impl ProxyAuthMode {
    /// Parse from string.
    pub fn from_string(s: &str) -> Self {
        match s {
            "strict" => Self::Strict,
            "all_except_health" => Self::AllExceptHealth,
            "auto" => Self::Auto,
            _ => Self::Off,
        }
    }
}

/// Account scheduling mode for sticky sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SchedulingMode {
    /// Prioritize cache hits (sticky binding wins unless unavailable)
    CacheFirst,
    /// Weigh sticky affinity and health/quota evenly
    #[default]
    Balance,
    /// Prioritize the highest scoring account regardless of prior binding
    PerformanceFirst,
}

impl fmt::Display for SchedulingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::CacheFirst => write!(f, "CacheFirst"),
            Self::Balance => write!(f, "Balance"),
            Self::PerformanceFirst => write!(f, "PerformanceFirst"),
        }
    }
}

/// Selection strategy kind, chosen per pool (spec 4.D).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// Bind a session to one account until it becomes unavailable.
    Sticky,
    /// Cycle through available accounts in order.
    RoundRobin,
    /// Weighted scoring across health, tokens, quota and recency.
    #[default]
    Hybrid,
}
