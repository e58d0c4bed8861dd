//! Prompt translation for TableTalk.
//!
//! Turns a natural-language request plus the current schema into a single
//! SQL statement via an OpenAI-compatible chat-completions service. The
//! service's free-text output is treated as untrusted: it is cleaned and
//! must pass a statement-shape check before anything downstream may
//! execute it.

pub mod prompt;
pub mod translator;

pub use prompt::{build_system_prompt, clean_response, looks_like_statement};
pub use translator::{DynTranslator, LlmTranslator, MockTranslator, Translator};
