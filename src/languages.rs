//! Language configuration for compilation and execution

use std::collections::HashMap;
use std::sync::OnceLock;

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Target language tag of a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Language {
    /// Compiled ahead of time with an external compiler (C via gcc).
    #[serde(alias = "c", alias = "gcc")]
    Compiled,
    /// Run directly by an interpreter (Python via python3).
    #[serde(alias = "python", alias = "python3", alias = "py")]
    Scripted,
}

impl Language {
    /// Key of this language in the bundled configuration table.
    pub fn key(&self) -> &'static str {
        match self {
            Language::Compiled => "compiled",
            Language::Scripted => "scripted",
        }
    }
}

/// Configuration for a supported language
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanguageConfig {
    /// Name of the source file inside the workspace (e.g., "main.c")
    pub source_file: String,
    /// Compile command (None for interpreted languages)
    pub compile_command: Option<Vec<String>>,
    /// Run command
    pub run_command: Vec<String>,
}

/// Raw TOML configuration for a language
#[derive(Debug, Deserialize)]
struct RawLanguageConfig {
    source_file: String,
    compile_command: Option<String>,
    run_command: String,
}

/// Global language configurations
static LANGUAGES: OnceLock<HashMap<String, LanguageConfig>> = OnceLock::new();

/// Initialize language configurations from the bundled TOML table
pub fn init_languages() -> anyhow::Result<()> {
    let content = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/files/languages.toml"));
    init_languages_from(content)
}

/// Initializing again with an identical table is a no-op; a differing
/// table is an error, never silently ignored.
fn init_languages_from(content: &str) -> anyhow::Result<()> {
    let languages = parse_languages(content)?;

    if let Err(rejected) = LANGUAGES.set(languages) {
        let unchanged = LANGUAGES.get().map(|t| *t == rejected).unwrap_or(false);
        if !unchanged {
            anyhow::bail!("Language table is already initialized with a different configuration");
        }
    }

    Ok(())
}

fn parse_languages(content: &str) -> anyhow::Result<HashMap<String, LanguageConfig>> {
    let raw_configs: HashMap<String, RawLanguageConfig> =
        toml::from_str(content).context("Failed to parse language table")?;

    let mut languages = HashMap::new();
    for (name, raw) in raw_configs {
        let config = LanguageConfig {
            source_file: raw.source_file,
            compile_command: raw.compile_command.map(|cmd| into_command(&cmd)),
            run_command: into_command(&raw.run_command),
        };
        languages.insert(name.to_lowercase(), config);
    }

    Ok(languages)
}

/// Get the configuration for a language tag
pub fn get_language_config(language: Language) -> Option<LanguageConfig> {
    LANGUAGES.get()?.get(language.key()).cloned()
}

fn into_command(command: &str) -> Vec<String> {
    command.split_whitespace().map(|s| s.to_string()).collect()
}
