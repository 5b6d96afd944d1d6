//! Command-line flags, each overridable by the environment variable spec.md
//! §6 lists. Account-enrollment subcommands are out of scope here; accounts
//! are managed by hand-editing `accounts.json`.

use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "antigravity-server",
    about = "Headless proxy exposing the Anthropic Messages API surface",
    version = env!("CARGO_PKG_VERSION")
)]
pub struct Cli {
    /// Port to bind.
    #[arg(long, env = "PORT", default_value = "8045")]
    pub port: u16,

    /// Address to bind (overrides `proxy.allow_lan_access` from config.json).
    #[arg(long, env = "HOST")]
    pub host: Option<String>,

    /// API key required on `Authorization: Bearer`/`x-api-key` for `/v1/*`.
    /// Overrides whatever is stored in `config.json`.
    #[arg(long, env = "API_KEY")]
    pub api_key: Option<String>,

    /// Directory holding `accounts.json`, `config.json`, `usage-history.json`.
    #[arg(long, env = "ANTIGRAVITY_DATA_DIR")]
    pub data_dir: Option<std::path::PathBuf>,

    /// Permit cross-model fallback on exhaustion (spec §6 `FALLBACK`).
    #[arg(long, env = "FALLBACK", default_value = "true")]
    pub fallback: bool,

    /// Verbose logging (spec §6 `DEBUG`/`DEV_MODE`).
    #[arg(long, env = "DEBUG", default_value = "false")]
    pub debug: bool,
}
