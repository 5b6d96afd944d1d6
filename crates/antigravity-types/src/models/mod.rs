//! Core domain models for the proxy dispatcher.
//!
//! This module contains all shared data structures used across the workspace.

mod account;
mod config;
mod quota;
mod stats;
mod token;

// Re-export all models
pub use account::{
    Account, AccountIndex, AccountSummary, CredentialKind, RateLimitEntry, SubscriptionTier,
};
pub use config::{
    AppConfig, ExperimentalConfig, ProxyAuthMode, ProxyConfig, QuotaProtectionConfig,
    SchedulingMode, StickySessionConfig, StrategyKind, ThinkingBudgetConfig, ThinkingBudgetMode,
};
pub use quota::ModelQuota;
pub use stats::{DashboardStats, ProxyStats, ProxyStatus, RefreshStats};
pub use token::TokenData;
