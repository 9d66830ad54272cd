use anyhow::{Context, Result};
use dread_core::SchedulerConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use crate::state::ensure_dread_home;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub scheduler: SchedulerConfig,
    pub llm: LlmSection,
    pub runtime: RuntimeSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// Off by default; the static pools need no network.
    pub enabled: bool,
    pub model: String,
    /// OpenAI-compatible endpoint root.
    pub base_url: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout_ms: u64,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            enabled: false,
            model: "gpt-4o-mini".to_string(),
            base_url: "https://api.openai.com".to_string(),
            max_tokens: 60,
            temperature: 0.9,
            timeout_ms: 8000,
            api_key_env: "OPENAI_API_KEY".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeSection {
    pub tick_seconds: u64,
    pub user_id: String,
}

impl Default for RuntimeSection {
    fn default() -> Self {
        Self {
            tick_seconds: 15,
            user_id: "local".to_string(),
        }
    }
}

pub fn config_path() -> Result<PathBuf> {
    Ok(ensure_dread_home()?.join("config.toml"))
}

pub fn load_config() -> Result<Config> {
    let p = config_path()?;
    if !p.exists() {
        return Ok(Config::default());
    }
    let s = fs::read_to_string(&p).with_context(|| format!("read {}", p.display()))?;
    let cfg: Config = toml::from_str(&s).context("parse config.toml")?;
    cfg.scheduler
        .validate()
        .with_context(|| format!("invalid [scheduler] in {}", p.display()))?;
    Ok(cfg)
}

pub fn save_config(cfg: &Config) -> Result<()> {
    let p = config_path()?;
    let s = toml::to_string_pretty(cfg).context("serialize config")?;
    fs::write(&p, s).with_context(|| format!("write {}", p.display()))?;
    Ok(())
}

pub fn init_config() -> Result<()> {
    let p = config_path()?;
    if p.exists() {
        println!("Config already exists: {}", p.display());
        return Ok(());
    }
    let cfg = Config::default();
    save_config(&cfg)?;
    println!("Wrote {}", p.display());
    Ok(())
}

pub fn show_config() -> Result<()> {
    let cfg = load_config()?;
    println!("# {}", config_path()?.display());
    print!("{}", toml::to_string_pretty(&cfg).context("serialize config")?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_survive_a_toml_round_trip() {
        let s = toml::to_string_pretty(&Config::default()).unwrap();
        let back: Config = toml::from_str(&s).unwrap();
        assert_eq!(back.scheduler, SchedulerConfig::default());
        assert_eq!(back.runtime.tick_seconds, 15);
        assert!(!back.llm.enabled);
    }

    #[test]
    fn sections_may_be_partial() {
        let cfg: Config = toml::from_str(
            r#"
            [scheduler]
            time_scale = 240

            [llm]
            enabled = true
            "#,
        )
        .unwrap();
        assert_eq!(cfg.scheduler.time_scale, 240);
        assert_eq!(cfg.scheduler.quiet_start, "23:00");
        assert!(cfg.llm.enabled);
        assert_eq!(cfg.llm.api_key_env, "OPENAI_API_KEY");
        assert_eq!(cfg.runtime.user_id, "local");
    }
}
