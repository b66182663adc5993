use anyhow::{Result, bail};
use clap::Parser;
use serde::Deserialize;
use std::env;
use std::fs;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::time::Duration;

use crate::chunk::MAX_BLOCKS_PER_APPEND;
use crate::notion::DEFAULT_API_BASE;
use crate::throttle::DEFAULT_DELAY_MS;

const DEFAULT_DATABASE_PATH: &str = "highlights.sqlite";

#[derive(Parser, Debug)]
#[command(name = "marginalia")]
#[command(about = "Exports e-reader highlights into a Notion database", long_about = None)]
pub struct Cli {
    #[arg(short = 'c', long = "config")]
    pub config_path: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Source {
    #[serde(default = "default_database")]
    pub database: String,
}

fn default_database() -> String {
    DEFAULT_DATABASE_PATH.to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct Notion {
    pub token: String,
    pub database_id: String,
    #[serde(default = "default_api_base")]
    pub api_base: String,
}

fn default_api_base() -> String {
    DEFAULT_API_BASE.to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct SyncSettings {
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default)]
    pub strict_completion: bool,
}

fn default_delay_ms() -> u64 {
    DEFAULT_DELAY_MS
}

fn default_chunk_size() -> usize {
    MAX_BLOCKS_PER_APPEND.get()
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            delay_ms: default_delay_ms(),
            chunk_size: default_chunk_size(),
            strict_completion: false,
        }
    }
}

impl SyncSettings {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    pub fn chunk_size(&self) -> Result<NonZeroUsize> {
        match NonZeroUsize::new(self.chunk_size) {
            Some(size) if size <= MAX_BLOCKS_PER_APPEND => Ok(size),
            _ => bail!(
                "sync.chunk_size must be between 1 and {}, got {}",
                MAX_BLOCKS_PER_APPEND,
                self.chunk_size
            ),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_source")]
    pub source: Source,
    pub notion: Notion,
    #[serde(default)]
    pub sync: SyncSettings,
}

fn default_source() -> Source {
    Source {
        database: default_database(),
    }
}

impl Config {
    /// Reads the YAML file at `path` when given, the environment otherwise.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let cfg = match path {
            Some(path) => Config::load_config(path)?,
            None => Config::from_env()?,
        };
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn database_path(&self) -> PathBuf {
        PathBuf::from(&self.source.database)
    }

    fn from_env() -> Result<Self> {
        let token = env::var("NOTION_TOKEN").unwrap_or_default();
        let database_id = env::var("NOTION_DATABASE_ID").unwrap_or_default();
        let database = env::var("HIGHLIGHTS_DB").unwrap_or_else(|_| default_database());

        Ok(Config {
            source: Source { database },
            notion: Notion {
                token,
                database_id,
                api_base: default_api_base(),
            },
            sync: SyncSettings::default(),
        })
    }

    fn load_config(path: &str) -> Result<Config> {
        let yaml_str = fs::read_to_string(path)?;
        Config::parse(&yaml_str)
    }

    fn parse(yaml_str: &str) -> Result<Config> {
        let yaml_with_env = expand_env_vars(yaml_str)?;
        let config: Config = serde_yaml::from_str(&yaml_with_env)?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.notion.token.trim().is_empty() {
            bail!("notion token is missing (set NOTION_TOKEN)");
        }
        if self.notion.database_id.trim().is_empty() {
            bail!("notion database id is missing (set NOTION_DATABASE_ID)");
        }
        self.sync.chunk_size()?;
        Ok(())
    }
}

/// Expands `${VAR}` and `${VAR:-default}`. Braces inside a default must balance.
fn expand_env_vars(input: &str) -> Result<String> {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let body = &rest[start + 2..];
        let Some(len) = closing_brace(body) else {
            bail!("unterminated ${{ at byte {}", input.len() - rest.len() + start);
        };
        out.push_str(&resolve_var(&body[..len]));
        rest = &body[len + 1..];
    }

    out.push_str(rest);
    Ok(out)
}

fn closing_brace(body: &str) -> Option<usize> {
    let mut depth = 0usize;
    for (i, b) in body.bytes().enumerate() {
        match b {
            b'{' => depth += 1,
            b'}' if depth == 0 => return Some(i),
            b'}' => depth -= 1,
            _ => {}
        }
    }
    None
}

fn resolve_var(expr: &str) -> String {
    let (name, default) = match expr.split_once(":-") {
        Some((name, default)) => (name, Some(default)),
        None => (expr, None),
    };

    match (env::var(name), default) {
        (Ok(value), _) => value,
        (Err(_), Some(default)) => default.to_string(),
        (Err(_), None) => {
            tracing::warn!(var = name, "environment variable not set");
            String::new()
        }
    }
}
