//! Translator trait and implementations.
//!
//! - `LlmTranslator` talks to an OpenAI-compatible chat-completions API.
//!   This is the production backend.
//! - `MockTranslator` replays scripted responses for testing.

use std::sync::Mutex;
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, warn};

use tabletalk_core::config::LlmConfig;
use tabletalk_core::error::TabletalkError;
use tabletalk_core::types::Schema;

use crate::prompt::{build_system_prompt, clean_response, looks_like_statement};

/// Service that turns a natural-language request plus the current schema
/// into a single SQL statement.
///
/// Implementations must return text that already passed the statement-shape
/// check; callers execute the result without further validation.
pub trait Translator: Send + Sync {
    /// Translate `prompt_text` against `schema` into a statement.
    fn translate(
        &self,
        prompt_text: &str,
        schema: &Schema,
    ) -> impl std::future::Future<Output = Result<String, TabletalkError>> + Send;
}

/// Object-safe version of [`Translator`] for dynamic dispatch.
///
/// Because `Translator::translate` returns `impl Future` it is not
/// object-safe. This trait uses a boxed future instead, allowing
/// `Box<dyn DynTranslator>` to be stored in structs without generics.
///
/// A blanket implementation is provided so that every `Translator`
/// automatically implements `DynTranslator`.
pub trait DynTranslator: Send + Sync {
    /// Translate `prompt_text` against `schema` (boxed future).
    fn translate_boxed<'a>(
        &'a self,
        prompt_text: &'a str,
        schema: &'a Schema,
    ) -> std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<String, TabletalkError>> + Send + 'a>,
    >;
}

/// Blanket impl: any `Translator` automatically implements `DynTranslator`.
impl<T: Translator> DynTranslator for T {
    fn translate_boxed<'a>(
        &'a self,
        prompt_text: &'a str,
        schema: &'a Schema,
    ) -> std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<String, TabletalkError>> + Send + 'a>,
    > {
        Box::pin(self.translate(prompt_text, schema))
    }
}

/// A boxed dynamic translator still satisfies the static trait, so generic
/// consumers accept either form.
impl<'t> Translator for Box<dyn DynTranslator + 't> {
    fn translate(
        &self,
        prompt_text: &str,
        schema: &Schema,
    ) -> impl std::future::Future<Output = Result<String, TabletalkError>> + Send {
        async move { self.as_ref().translate_boxed(prompt_text, schema).await }
    }
}

// ---------------------------------------------------------------------------
// LlmTranslator - OpenAI-compatible chat completions over reqwest
// ---------------------------------------------------------------------------

/// Production translator backed by an OpenAI-compatible API.
pub struct LlmTranslator {
    http: reqwest::Client,
    config: LlmConfig,
    api_key: Option<String>,
}

impl LlmTranslator {
    /// Build a translator from config. The API key is read once from the
    /// environment variable named in `config.api_key_env`; a missing key is
    /// not fatal here; each translation then fails with a Translation
    /// error the chat layer surfaces to the user.
    pub fn new(config: LlmConfig) -> Result<Self, TabletalkError> {
        let api_key = match std::env::var(&config.api_key_env) {
            Ok(key) if !key.trim().is_empty() => Some(key),
            _ => {
                warn!(
                    env = %config.api_key_env,
                    "LLM API key not set; translation requests will fail"
                );
                None
            }
        };

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| TabletalkError::Translation(format!("HTTP client error: {}", e)))?;

        Ok(Self {
            http,
            config,
            api_key,
        })
    }

    /// Whether an API key was found at startup.
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    async fn call_service(&self, system: &str, user: &str) -> Result<String, TabletalkError> {
        let api_key = self.api_key.as_ref().ok_or_else(|| {
            TabletalkError::Translation(format!(
                "API key not configured (set {})",
                self.config.api_key_env
            ))
        })?;

        let body = serde_json::json!({
            "model": self.config.model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user}
            ],
            "temperature": self.config.temperature,
            "max_tokens": self.config.max_tokens,
        });

        let response = self
            .http
            .post(format!("{}/chat/completions", self.config.base_url))
            .header("Authorization", format!("Bearer {}", api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| TabletalkError::Translation(format!("Service unreachable: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(TabletalkError::Translation(format!(
                "Service returned {}: {}",
                status,
                detail.chars().take(300).collect::<String>()
            )));
        }

        let completion: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| TabletalkError::Translation(format!("Unreadable response: {}", e)))?;

        completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| {
                TabletalkError::Translation("Response contained no content".to_string())
            })
    }
}

impl Translator for LlmTranslator {
    async fn translate(
        &self,
        prompt_text: &str,
        schema: &Schema,
    ) -> Result<String, TabletalkError> {
        let system = build_system_prompt(schema);
        let raw = self.call_service(&system, prompt_text).await?;
        let cleaned = clean_response(&raw);

        if !looks_like_statement(&cleaned) {
            return Err(TabletalkError::Translation(format!(
                "Response does not look like a statement: {:?}",
                cleaned.chars().take(120).collect::<String>()
            )));
        }

        debug!(sql = %cleaned, "Prompt translated");
        Ok(cleaned)
    }
}

impl std::fmt::Debug for LlmTranslator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmTranslator")
            .field("model", &self.config.model)
            .field("has_api_key", &self.api_key.is_some())
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

// ---------------------------------------------------------------------------
// MockTranslator - scripted responses for tests
// ---------------------------------------------------------------------------

/// Test translator that replays a script of canned results.
///
/// When the script runs out, the last item repeats. Mirrors how the real
/// translator behaves: `Ok` values are returned as-is, `Err` values become
/// Translation errors.
pub struct MockTranslator {
    script: Mutex<Vec<Result<String, String>>>,
}

impl MockTranslator {
    /// Always return the same statement.
    pub fn fixed(sql: &str) -> Self {
        Self {
            script: Mutex::new(vec![Ok(sql.to_string())]),
        }
    }

    /// Always fail with the given message.
    pub fn failing(message: &str) -> Self {
        Self {
            script: Mutex::new(vec![Err(message.to_string())]),
        }
    }

    /// Replay the given results in order, repeating the last one.
    pub fn sequence(items: Vec<Result<String, String>>) -> Self {
        assert!(!items.is_empty(), "script cannot be empty");
        let mut reversed = items;
        reversed.reverse();
        Self {
            script: Mutex::new(reversed),
        }
    }
}

impl Translator for MockTranslator {
    async fn translate(
        &self,
        _prompt_text: &str,
        _schema: &Schema,
    ) -> Result<String, TabletalkError> {
        let mut script = self.script.lock().unwrap_or_else(|e| e.into_inner());
        let item = if script.len() > 1 {
            script.pop().unwrap_or_else(|| Ok(String::new()))
        } else {
            script.last().cloned().unwrap_or_else(|| Ok(String::new()))
        };
        item.map_err(TabletalkError::Translation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_schema() -> Schema {
        Schema::default()
    }

    #[tokio::test]
    async fn test_mock_fixed_repeats() {
        let t = MockTranslator::fixed("SELECT 1");
        assert_eq!(t.translate("a", &empty_schema()).await.unwrap(), "SELECT 1");
        assert_eq!(t.translate("b", &empty_schema()).await.unwrap(), "SELECT 1");
    }

    #[tokio::test]
    async fn test_mock_failing() {
        let t = MockTranslator::failing("no service");
        let err = t.translate("a", &empty_schema()).await.unwrap_err();
        assert!(matches!(err, TabletalkError::Translation(_)));
        assert!(err.to_string().contains("no service"));
    }

    #[tokio::test]
    async fn test_mock_sequence_then_repeats_last() {
        let t = MockTranslator::sequence(vec![
            Ok("SELECT 1".to_string()),
            Err("down".to_string()),
        ]);
        assert_eq!(t.translate("a", &empty_schema()).await.unwrap(), "SELECT 1");
        assert!(t.translate("b", &empty_schema()).await.is_err());
        assert!(t.translate("c", &empty_schema()).await.is_err());
    }

    #[test]
    fn test_llm_translator_without_key() {
        let mut config = LlmConfig::default();
        config.api_key_env = "TABLETALK_TEST_KEY_THAT_IS_NOT_SET".to_string();
        let translator = LlmTranslator::new(config).unwrap();
        assert!(!translator.has_api_key());
    }

    #[tokio::test]
    async fn test_llm_translator_without_key_fails_translation() {
        let mut config = LlmConfig::default();
        config.api_key_env = "TABLETALK_TEST_KEY_THAT_IS_NOT_SET".to_string();
        let translator = LlmTranslator::new(config).unwrap();
        let err = translator
            .translate("show users", &empty_schema())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("API key not configured"));
    }
}
