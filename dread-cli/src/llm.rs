use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use dread_core::catalog::{CompletionProfile, Escalation, NagClause, SpeedBand, UrgencyClause};
use dread_core::{FireKind, GenerationRequest, GeneratorPolicy, MessageGenerator, Purpose};
use reqwest::header::AUTHORIZATION;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::LlmSection;

/// Message generator backed by an OpenAI-compatible chat completions API.
pub struct OpenAiGenerator {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
    temperature: f32,
}

impl OpenAiGenerator {
    /// `Ok(None)` when the backend is disabled in config.
    pub fn from_config(cfg: &LlmSection) -> Result<Option<(Self, GeneratorPolicy)>> {
        if !cfg.enabled {
            return Ok(None);
        }
        let api_key = std::env::var(&cfg.api_key_env)
            .with_context(|| format!("[llm] is enabled but {} is not set", cfg.api_key_env))?;

        let timeout = Duration::from_millis(cfg.timeout_ms);
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("build http client")?;

        let generator = Self {
            client,
            endpoint: format!("{}/v1/chat/completions", cfg.base_url.trim_end_matches('/')),
            model: cfg.model.clone(),
            api_key,
            temperature: cfg.temperature,
        };
        let policy = GeneratorPolicy {
            timeout,
            max_tokens: cfg.max_tokens,
            ..GeneratorPolicy::default()
        };
        Ok(Some((generator, policy)))
    }
}

#[async_trait]
impl MessageGenerator for OpenAiGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        #[derive(Serialize)]
        struct Msg {
            role: &'static str,
            content: String,
        }

        #[derive(Serialize)]
        struct Req<'a> {
            model: &'a str,
            messages: Vec<Msg>,
            temperature: f32,
            max_tokens: u32,
        }

        #[derive(Deserialize)]
        struct Resp {
            choices: Vec<Choice>,
        }

        #[derive(Deserialize)]
        struct Choice {
            message: MsgOut,
        }

        #[derive(Deserialize)]
        struct MsgOut {
            content: Option<String>,
        }

        let body = Req {
            model: &self.model,
            messages: vec![
                Msg {
                    role: "system",
                    content: SYSTEM_PROMPT.to_string(),
                },
                Msg {
                    role: "user",
                    content: user_prompt(request),
                },
            ],
            temperature: self.temperature,
            max_tokens: request.max_tokens,
        };

        let resp = self
            .client
            .post(&self.endpoint)
            .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .context("chat completions request")?;

        let status = resp.status();
        if !status.is_success() {
            let txt = resp.text().await.unwrap_or_default();
            bail!("chat completions error: {status} {txt}");
        }

        let out: Resp = resp.json().await.context("parse chat completions response")?;
        let content = out
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .unwrap_or_default();

        Ok(content.trim().to_string())
    }
}

const SYSTEM_PROMPT: &str = "You write one or two short sentences for a blunt task-nagging assistant. \
No emojis, no hashtags, no quotes, no preamble. Never mention being an AI.";

fn tone(dread: u8) -> &'static str {
    if dread >= 4 { "savage and cutting" } else { "firm and dry" }
}

fn escalation(e: Escalation) -> &'static str {
    match e {
        Escalation::Opening => "a first nudge",
        Escalation::Pressing => "noticeably impatient",
        Escalation::Relentless => "relentless, the user has ignored many reminders",
    }
}

fn speed(s: SpeedBand) -> &'static str {
    match s {
        SpeedBand::Blazing => "suspiciously fast",
        SpeedBand::Fast => "quick",
        SpeedBand::Normal => "average",
        SpeedBand::Slow => "slow",
        SpeedBand::Glacial => "glacially slow",
    }
}

fn completion_notes(p: &CompletionProfile) -> Vec<&'static str> {
    let mut notes = Vec::new();
    if p.dread_ack {
        notes.push("acknowledge they dreaded it and did it anyway");
    }
    match p.urgency {
        Some(UrgencyClause::Mismatch) => notes.push("call out that an urgent task was handled slowly"),
        Some(UrgencyClause::Competence) => notes.push("grudgingly credit handling an urgent task quickly"),
        None => {}
    }
    match p.nagging {
        Some(NagClause::Extensive) => notes.push("mention the extensive nagging it took"),
        Some(NagClause::Moderate) => notes.push("mention the moderate nagging it took"),
        None => {}
    }
    notes
}

/// Prompt for one message. Kept free of I/O so it can be tested.
pub fn user_prompt(req: &GenerationRequest) -> String {
    match &req.purpose {
        Purpose::Reminder { kind, escalation: e } => {
            let moment = match kind {
                FireKind::CheckIn => " This is the midpoint check-in.",
                FireKind::Final => " This is the last reminder before the task expires.",
                _ => "",
            };
            format!(
                "Write reminder #{n} for the task \"{task}\". Time pending: {elapsed}. \
                 Tone: {tone}, {esc}.{moment} Do not repeat the task name.",
                n = req.nag_count,
                task = req.task_name,
                elapsed = req.elapsed,
                tone = tone(req.dread),
                esc = escalation(*e),
            )
        }
        Purpose::Completion { profile } => {
            let notes = completion_notes(profile);
            let extra = if notes.is_empty() {
                String::new()
            } else {
                format!(" Also {}.", notes.join("; "))
            };
            format!(
                "The user finished \"{task}\" after {elapsed} and {n} reminders. \
                 That was {speed}. React in a sarcastic, backhanded way.{extra}",
                task = req.task_name,
                elapsed = req.elapsed,
                n = req.nag_count,
                speed = speed(profile.speed),
            )
        }
    }
}
