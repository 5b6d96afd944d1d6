//! Application and proxy configuration models.

mod app;
mod enums;
mod proxy;
mod session;
mod thinking;

pub use app::AppConfig;
pub use enums::{ProxyAuthMode, SchedulingMode, StrategyKind};
pub use proxy::ProxyConfig;
pub use session::{ExperimentalConfig, QuotaProtectionConfig, StickySessionConfig};
pub use thinking::{ThinkingBudgetConfig, ThinkingBudgetMode};
