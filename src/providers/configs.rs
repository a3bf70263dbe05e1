use crate::errors::{AgentError, AgentResult};

const DEFAULT_OPENAI_HOST: &str = "https://api.openai.com";

/// Configuration for an OpenAI-compatible chat completions endpoint
#[derive(Debug, Clone)]
pub struct OpenAiProviderConfig {
    pub host: String,
    pub api_key: String,
    pub model: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<i32>,
}

impl OpenAiProviderConfig {
    pub fn new<H, K, M>(host: H, api_key: K, model: M) -> Self
    where
        H: Into<String>,
        K: Into<String>,
        M: Into<String>,
    {
        Self {
            host: host.into(),
            api_key: api_key.into(),
            model: model.into(),
            temperature: None,
            max_tokens: None,
        }
    }

    /// Read the configuration from environment variables. `OPENAI_API_KEY`
    /// and `OPENAI_MODEL` are required; the host defaults to the public
    /// endpoint.
    pub fn from_env() -> AgentResult<Self> {
        let require = |key: &str| {
            std::env::var(key)
                .map_err(|_| AgentError::Internal(format!("{key} is not set")))
        };
        Ok(Self {
            host: std::env::var("OPENAI_HOST").unwrap_or_else(|_| DEFAULT_OPENAI_HOST.to_string()),
            api_key: require("OPENAI_API_KEY")?,
            model: require("OPENAI_MODEL")?,
            temperature: None,
            max_tokens: None,
        })
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: i32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}
