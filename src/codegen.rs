//! HTTP code-generation client (feature `http`).

use std::time::Duration;

use serde_json::{json, Value};

use crate::error::{Error, Result};
use crate::patch::CodeGenerator;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_MODEL: &str = "gemini-pro";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// [`CodeGenerator`] backed by a Gemini-style `generateContent` endpoint.
///
/// One synchronous request/response round trip per call, no streaming and
/// no retries. An explicit timeout bounds a hung call instead of leaving
/// the patch worker waiting forever.
pub struct GeminiClient {
    http: reqwest::blocking::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiClient {
    /// Create a client with an explicit API key.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| Error::codegen(e.to_string()))?;

        Ok(Self {
            http,
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    /// Create a client from the `GEMINI_API_KEY` environment variable.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("GEMINI_API_KEY")
            .map_err(|_| Error::codegen("GEMINI_API_KEY not set"))?;
        Self::new(api_key)
    }

    /// Override the model name.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Override the endpoint base URL. Intended for proxies and stubs.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn prompt(source: &str, goal: &str) -> String {
        format!(
            "Act as a senior game developer. The following rhai script is a \
             plugin for a 2D physics game host. It must keep defining the three \
             hooks setup(world), update(state, world, dt), and draw(state, surface).\n\
             \n\
             The code:\n\
             ```rhai\n\
             {source}\n\
             ```\n\
             \n\
             The request:\n\
             {goal}\n\
             \n\
             Provide the full corrected script. Return ONLY the rhai code inside \
             a fenced code block."
        )
    }
}

impl CodeGenerator for GeminiClient {
    fn generate(&self, source: &str, goal: &str) -> Result<String> {
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        );

        let body = json!({
            "contents": [{
                "parts": [{ "text": Self::prompt(source, goal) }]
            }]
        });

        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .map_err(|e| Error::codegen(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Error::codegen(format!(
                "generateContent returned {}",
                response.status()
            )));
        }

        let payload: Value = response.json().map_err(|e| Error::codegen(e.to_string()))?;
        payload["candidates"][0]["content"]["parts"][0]["text"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| Error::codegen("response contained no text candidate"))
    }
}

impl std::fmt::Debug for GeminiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiClient")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_embeds_source_and_goal() {
        let prompt = GeminiClient::prompt("fn setup(world) { #{} }", "add a second pendulum");
        assert!(prompt.contains("fn setup(world) { #{} }"));
        assert!(prompt.contains("add a second pendulum"));
        assert!(prompt.contains("fenced code block"));
    }

    #[test]
    fn test_from_env_requires_key() {
        // Only meaningful when the variable is absent; skip otherwise.
        if std::env::var("GEMINI_API_KEY").is_err() {
            assert!(matches!(GeminiClient::from_env(), Err(Error::CodeGen(_))));
        }
    }
}
