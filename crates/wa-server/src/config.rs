//! Startup configuration, read from CLI flags with environment fallbacks
//! matching `LLM_PROVIDER`/`LLM_MODEL`/`LLM_TEMPERATURE`/
//! `LLM_MAX_OUTPUT_TOKENS`/`WBA_DB_PATH`.

use clap::Parser;
use std::sync::Arc;
use wa_provider::ProviderAdapter;

/// A language-model provider selection. Only [`LlmProvider::Mock`] is wired
/// to a real [`ProviderAdapter`] today; the others are accepted so
/// deployments can declare intent, but [`LlmProvider::build`] refuses them
/// until a real adapter exists for that wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
#[clap(rename_all = "lowercase")]
pub enum LlmProvider {
    /// Deterministic, scriptable mock. The only provider this binary can
    /// actually construct.
    Mock,
    /// OpenAI. Not yet implemented.
    Openai,
    /// Anthropic. Not yet implemented.
    Anthropic,
    /// Gemini. Not yet implemented.
    Gemini,
}

impl LlmProvider {
    /// Construct the adapter this provider selection names.
    ///
    /// # Errors
    ///
    /// Returns an error for every variant but [`LlmProvider::Mock`]; no
    /// other adapter is implemented.
    pub fn build(self) -> anyhow::Result<Arc<dyn ProviderAdapter>> {
        match self {
            LlmProvider::Mock => Ok(Arc::new(wa_provider::mock::MockProvider::new())),
            other => anyhow::bail!(
                "LLM_PROVIDER={other:?} has no adapter implementation in this build; use mock"
            ),
        }
    }
}

/// Server startup configuration.
#[derive(Parser, Debug)]
#[command(name = "wa-server", version, about = "Worldbuild Arena match server")]
pub struct Args {
    /// Bind address.
    #[arg(long, default_value = "127.0.0.1:8089")]
    pub bind: String,

    /// SQLite connection string for match/event/judging persistence.
    #[arg(long, env = "WBA_DB_PATH", default_value = "sqlite::memory:")]
    pub db_path: String,

    /// Which provider adapter backs every match's two teams.
    #[arg(long, env = "LLM_PROVIDER", value_enum, default_value_t = LlmProvider::Mock)]
    pub llm_provider: LlmProvider,

    /// Model name passed to the provider adapter, if it takes one.
    #[arg(long, env = "LLM_MODEL")]
    pub llm_model: Option<String>,

    /// Sampling temperature passed to the provider adapter, if it takes one.
    #[arg(long, env = "LLM_TEMPERATURE")]
    pub llm_temperature: Option<f32>,

    /// Output token cap passed to the provider adapter, if it takes one.
    #[arg(long, env = "LLM_MAX_OUTPUT_TOKENS")]
    pub llm_max_output_tokens: Option<u32>,

    /// Credential for a real OpenAI adapter, once one exists.
    #[arg(long, env = "OPENAI_API_KEY")]
    pub openai_api_key: Option<String>,

    /// Credential for a real Anthropic adapter, once one exists.
    #[arg(long, env = "ANTHROPIC_API_KEY")]
    pub anthropic_api_key: Option<String>,

    /// Credential for a real Gemini adapter, once one exists.
    #[arg(long, env = "GEMINI_API_KEY")]
    pub gemini_api_key: Option<String>,

    /// Per-match event channel buffer before a lagging SSE subscriber is
    /// disconnected.
    #[arg(long, default_value_t = 1024)]
    pub hub_capacity: usize,

    /// Enable debug-level logging.
    #[arg(long)]
    pub debug: bool,
}

impl std::fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LlmProvider::Mock => "mock",
            LlmProvider::Openai => "openai",
            LlmProvider::Anthropic => "anthropic",
            LlmProvider::Gemini => "gemini",
        };
        write!(f, "{s}")
    }
}
