use anyhow::{Context, Result};
use serde::Deserialize;
use std::io::{self, Write};
use std::path::Path;

const ENV_FILE: &str = ".env";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub odds_feed: OddsFeedConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub sports: SportsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct OddsFeedConfig {
    pub base_url: String,
    #[serde(default = "default_regions")]
    pub regions: String,
    /// Comma-separated bookmaker keys; empty means every book in `regions`.
    #[serde(default)]
    pub bookmakers: String,
    #[serde(default = "default_markets")]
    pub markets: Vec<String>,
}

fn default_regions() -> String {
    "us".to_string()
}

fn default_markets() -> Vec<String> {
    vec!["h2h".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_s: u64,
}

fn default_sweep_interval() -> u64 { 60 }

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            sweep_interval_s: default_sweep_interval(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SportsConfig {
    /// Internal sport keys (e.g. "basketball") or raw provider keys.
    #[serde(default = "default_sports")]
    pub enabled: Vec<String>,
}

fn default_sports() -> Vec<String> {
    vec!["basketball".to_string(), "american-football".to_string()]
}

impl Default for SportsConfig {
    fn default() -> Self {
        Self {
            enabled: default_sports(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)
            .with_context(|| "Failed to parse config TOML")?;
        Ok(config)
    }

    /// Load .env file into process environment. Real env vars take precedence.
    pub fn load_env_file() {
        let path = Path::new(ENV_FILE);
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(_) => return,
        };
        // Strip BOM if present (common on Windows-created files)
        let content = content.strip_prefix('\u{feff}').unwrap_or(&content);
        for (key, value) in parse_env_lines(content) {
            if std::env::var(&key).is_err() {
                std::env::set_var(key, value);
            }
        }
    }

    /// API key comes from the environment, or is prompted at startup.
    /// Prompted values are saved to .env for future runs.
    pub fn odds_api_key() -> Result<String> {
        match std::env::var("ODDS_API_KEY") {
            Ok(key) if !key.is_empty() => Ok(sanitize_key(&key)),
            _ => {
                let key = prompt("Odds API Key (the-odds-api.com)")?;
                save_env_var("ODDS_API_KEY", &key);
                Ok(key)
            }
        }
    }
}

/// KEY=VALUE pairs from .env content, skipping blanks and comments.
fn parse_env_lines(content: &str) -> Vec<(String, String)> {
    content
        .lines()
        .map(|line| line.trim().trim_matches('\r'))
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| {
            (
                key.trim().to_string(),
                value.trim().trim_matches('"').trim_matches('\'').to_string(),
            )
        })
        .collect()
}

fn prompt(label: &str) -> Result<String> {
    print!("  {} > ", label);
    io::stdout().flush()?;
    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    let value = input.trim().to_string();
    if value.is_empty() {
        anyhow::bail!("{} cannot be empty", label);
    }
    Ok(value)
}

/// Strip carriage returns, BOM, and other invisible chars from a key value.
fn sanitize_key(raw: &str) -> String {
    raw.replace(['\r', '\u{feff}', '\u{200b}'], "")
        .trim()
        .to_string()
}

/// Append a KEY=VALUE line to .env and set it in the current process.
fn save_env_var(key: &str, value: &str) {
    std::env::set_var(key, value);
    let path = Path::new(ENV_FILE);
    let mut contents = std::fs::read_to_string(path).unwrap_or_default();
    if !contents.is_empty() && !contents.ends_with('\n') {
        contents.push('\n');
    }
    contents.push_str(&format!("{}={}\n", key, value));
    if let Err(e) = std::fs::write(path, contents) {
        tracing::warn!("could not save {} to {}: {}", key, ENV_FILE, e);
    }
}
