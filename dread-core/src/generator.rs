//! Optional generative backend for message text.
//!
//! The catalog calls a generator at most once per emitted message. Anything
//! other than a clean, short answer in time (error, timeout, empty, too long,
//! refusal) is discarded and the static pools are used instead.

use std::time::Duration as StdDuration;

use async_trait::async_trait;
use serde::Serialize;

use crate::catalog::{CompletionProfile, Escalation};
use crate::planner::FireKind;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "purpose", rename_all = "snake_case")]
pub enum Purpose {
    Reminder {
        kind: FireKind,
        escalation: Escalation,
    },
    Completion {
        profile: CompletionProfile,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationRequest {
    pub purpose: Purpose,
    pub task_name: String,
    pub dread: u8,
    pub urgency: u8,
    pub nag_count: u32,
    /// Human phrase for elapsed time, e.g. "3 hours in".
    pub elapsed: String,
    /// Hard cap passed to the backend. Output is never truncated afterwards.
    pub max_tokens: u32,
}

#[async_trait]
pub trait MessageGenerator: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> anyhow::Result<String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeneratorPolicy {
    pub timeout: StdDuration,
    pub max_tokens: u32,
    /// Outputs longer than this are rejected, not cut.
    pub max_chars: usize,
}

impl Default for GeneratorPolicy {
    fn default() -> Self {
        Self {
            timeout: StdDuration::from_secs(8),
            max_tokens: 60,
            max_chars: 280,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    Empty,
    TooLong,
    Refusal,
}

const REFUSAL_MARKERS: &[&str] = &[
    "i can't help",
    "i cannot help",
    "i'm sorry, but",
    "i am sorry, but",
    "as an ai",
    "i can't assist",
    "i cannot assist",
];

/// Decide whether a backend answer may be shown to the user.
pub fn accept(output: &str, max_chars: usize) -> Result<String, Rejection> {
    let text = output.trim().trim_matches('"').trim();
    if text.is_empty() {
        return Err(Rejection::Empty);
    }
    if text.chars().count() > max_chars {
        return Err(Rejection::TooLong);
    }
    let lower = text.to_lowercase();
    if REFUSAL_MARKERS.iter().any(|m| lower.contains(m)) {
        return Err(Rejection::Refusal);
    }
    Ok(text.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_clean_output_and_strips_quotes() {
        assert_eq!(accept("  \"Open the file. Now.\" ", 100).unwrap(), "Open the file. Now.");
    }

    #[test]
    fn rejects_empty_long_and_refusals() {
        assert_eq!(accept("   ", 100), Err(Rejection::Empty));
        assert_eq!(accept(&"x".repeat(101), 100), Err(Rejection::TooLong));
        assert_eq!(
            accept("I'm sorry, but I can't write that.", 100),
            Err(Rejection::Refusal)
        );
    }
}
