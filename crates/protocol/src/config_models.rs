//! Engine settings for `.promptline/config.toml`.

use serde::Deserialize;
use serde::Serialize;
use ts_rs::TS;

pub const DEFAULT_SERVICE_URL: &str = "http://127.0.0.1:8000";
pub const DEFAULT_MODEL: &str = "claude-sonnet-4";
pub const DEFAULT_MAX_TOKENS: u32 = 4096;
pub const DEFAULT_STALL_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_API_KEY_ENV: &str = "PROMPTLINE_API_KEY";
pub const DEFAULT_RUNS_DIR: &str = "runs";

/// Settings shared by every pipeline run.
///
/// # Example
///
/// ```toml
/// # .promptline/config.toml
/// service-url = "http://127.0.0.1:8000"
/// default-model = "claude-sonnet-4"
/// max-tokens = 4096
/// stall-timeout-secs = 300
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, TS)]
#[serde(rename_all = "kebab-case", default)]
pub struct EngineSettings {
    /// Base URL of the generation-stream service.
    pub service_url: String,

    /// Model used by steps that do not name one.
    pub default_model: String,

    pub max_tokens: u32,

    /// Fail a step when no stream event arrives for this many seconds.
    ///
    /// `0` waits indefinitely.
    pub stall_timeout_secs: u64,

    /// Environment variable holding the API key forwarded to the service.
    pub api_key_env: String,

    /// Directory (relative to `.promptline/`) where run records are written.
    pub runs_dir: String,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            service_url: DEFAULT_SERVICE_URL.to_string(),
            default_model: DEFAULT_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            stall_timeout_secs: DEFAULT_STALL_TIMEOUT_SECS,
            api_key_env: DEFAULT_API_KEY_ENV.to_string(),
            runs_dir: DEFAULT_RUNS_DIR.to_string(),
        }
    }
}
