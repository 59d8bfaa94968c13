//! Two-step text generation: draft, then an optional editor review.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::prompts::{self, DEFAULT_SYSTEM_PROMPT, EDITOR_SYSTEM_PROMPT};
use super::types::{Action, ActionsConfig, TradeEvent, TriggerType, WalletProfile};
use crate::error::{ActionError, Result};
use crate::llm::{Completion, LlmClient};

/// Reported confidence; chat-completion endpoints do not return one.
pub const CONFIDENCE: f64 = 0.85;
pub const ELLIPSIS: &str = "...";

/// Everything the prompts are built from, captured from the action at trigger time.
#[derive(Debug, Clone)]
pub struct GenerationContext {
    pub trigger_type: TriggerType,
    pub wallet: WalletProfile,
    pub trade: Option<TradeEvent>,
    pub market_url: String,
    pub profile_url: String,
    pub market_context: Option<String>,
    pub profile_context: Option<String>,
    pub custom_prompt: String,
    pub example_posts: Vec<String>,
    pub historical_posts: Vec<String>,
    pub review_enabled: bool,
    pub max_length: usize,
}

impl GenerationContext {
    /// `historical_posts` is ignored unless the account opted into historical examples.
    pub fn new(action: &Action, config: &ActionsConfig, historical_posts: Vec<String>) -> Self {
        Self {
            trigger_type: action.trigger_type,
            wallet: action.wallet_profile.clone(),
            trade: action.trade_event.clone(),
            market_url: action.market_url.clone(),
            profile_url: action.profile_url.clone(),
            market_context: None,
            profile_context: None,
            custom_prompt: config.custom_prompt.clone(),
            example_posts: config.example_tweets.clone(),
            historical_posts: if config.use_historical {
                historical_posts
            } else {
                Vec::new()
            },
            review_enabled: config.review_enabled,
            max_length: config.max_length,
        }
    }

    pub fn with_fetched(mut self, market: Option<String>, profile: Option<String>) -> Self {
        self.market_context = market;
        self.profile_context = profile;
        self
    }

    fn system_prompt(&self) -> &str {
        if self.custom_prompt.trim().is_empty() {
            DEFAULT_SYSTEM_PROMPT
        } else {
            &self.custom_prompt
        }
    }
}

/// Outcome of the full pipeline.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationResponse {
    pub draft_text: String,
    pub reviewed_text: Option<String>,
    pub final_text: String,
    pub tokens_used: u32,
    pub confidence: f64,
    /// Set when the review call failed and the draft was used instead.
    pub review_error: Option<String>,
}

pub struct ContentGenerator {
    llm: Arc<dyn LlmClient>,
    call_timeout: Duration,
}

impl ContentGenerator {
    pub fn new(llm: Arc<dyn LlmClient>, call_timeout: Duration) -> Self {
        Self { llm, call_timeout }
    }

    async fn call(&self, stage: &str, system: &str, user: &str) -> Result<Completion> {
        match tokio::time::timeout(self.call_timeout, self.llm.complete(system, user)).await {
            Ok(Ok(c)) if !c.text.trim().is_empty() => Ok(c),
            Ok(Ok(_)) => Err(ActionError::Generation(format!("{stage}: empty response"))),
            Ok(Err(e)) => Err(ActionError::Generation(format!("{stage}: {e}"))),
            Err(_) => Err(ActionError::Generation(format!(
                "{stage}: timed out after {}s",
                self.call_timeout.as_secs()
            ))),
        }
    }

    /// First pass. Returns trimmed text and tokens used.
    pub async fn generate_draft(&self, ctx: &GenerationContext) -> Result<(String, u32)> {
        let user = prompts::draft_prompt(ctx);
        let c = self.call("draft", ctx.system_prompt(), &user).await?;
        debug!(tokens = c.tokens_used, chars = c.text.chars().count(), "draft generated");
        Ok((c.text.trim().to_string(), c.tokens_used))
    }

    /// The editor pass only runs when there is a style to match or the account asked for it.
    pub fn should_review(ctx: &GenerationContext) -> bool {
        ctx.review_enabled || !ctx.example_posts.is_empty() || !ctx.historical_posts.is_empty()
    }

    pub async fn review_and_refine(&self, draft: &str, ctx: &GenerationContext) -> Result<(String, u32)> {
        let user = prompts::review_prompt(draft, ctx);
        let c = self.call("review", EDITOR_SYSTEM_PROMPT, &user).await?;
        Ok((c.text.trim().to_string(), c.tokens_used))
    }

    /// Draft, conditionally review, clamp. A review failure falls back to the draft.
    pub async fn generate(&self, ctx: &GenerationContext) -> Result<GenerationResponse> {
        let (draft, mut tokens) = self.generate_draft(ctx).await?;

        let mut reviewed = None;
        let mut review_error = None;
        if Self::should_review(ctx) {
            match self.review_and_refine(&draft, ctx).await {
                Ok((text, t)) => {
                    tokens += t;
                    reviewed = Some(text);
                }
                Err(e) => {
                    warn!(error = %e, "review failed, using draft");
                    review_error = Some(e.to_string());
                }
            }
        }

        let final_text = finalize(&draft, reviewed.as_deref(), ctx.max_length);
        Ok(GenerationResponse {
            draft_text: draft,
            reviewed_text: reviewed,
            final_text,
            tokens_used: tokens,
            confidence: CONFIDENCE,
            review_error,
        })
    }
}

/// Reviewed text wins when present, otherwise the draft. Always clamped.
pub fn finalize(draft: &str, reviewed: Option<&str>, max_chars: usize) -> String {
    let chosen = reviewed.filter(|r| !r.trim().is_empty()).unwrap_or(draft);
    clamp_text(chosen, max_chars)
}

/// Clamp to `max_chars` characters (ellipsis included), cutting at the last
/// word boundary that keeps at least half the limit.
pub fn clamp_text(text: &str, max_chars: usize) -> String {
    let text = text.trim();
    if text.chars().count() <= max_chars {
        return text.to_string();
    }

    let budget = max_chars.saturating_sub(ELLIPSIS.chars().count());
    let head: String = text.chars().take(budget).collect();
    let ends_on_boundary = text.chars().nth(budget).is_some_and(char::is_whitespace);

    let cut = if ends_on_boundary {
        head.trim_end().to_string()
    } else {
        head.char_indices()
            .rev()
            .find(|(_, c)| c.is_whitespace())
            .map(|(i, _)| head[..i].trim_end())
            .filter(|kept| kept.chars().count() >= max_chars / 2)
            .map(str::to_string)
            .unwrap_or(head)
    };

    format!("{cut}{ELLIPSIS}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::types::MarketSignal;
    use crate::llm::mock::MockLlm;
    use crate::llm::LlmError;

    fn action() -> Action {
        let signal = MarketSignal {
            event_id: "e".into(),
            wallet: WalletProfile {
                address: "0x1".into(),
                bet_count: 1,
                freshness: "insider".into(),
                join_date: None,
            },
            trade: None,
        };
        Action::from_signal("acct", &ActionsConfig::new(TriggerType::FreshInsider), &signal, "https://polymarket.com")
    }

    fn generator(llm: MockLlm) -> (ContentGenerator, Arc<MockLlm>) {
        let llm = Arc::new(llm);
        (ContentGenerator::new(llm.clone(), Duration::from_secs(5)), llm)
    }

    #[test]
    fn short_text_is_untouched() {
        assert_eq!(clamp_text("  hello world  ", 280), "hello world");
    }

    #[test]
    fn long_text_is_cut_at_a_word_boundary() {
        let text = "lorem ipsum ".repeat(40);
        let out = clamp_text(&text, 280);
        assert!(out.chars().count() <= 280);
        assert!(out.ends_with(ELLIPSIS));
        let body = out.trim_end_matches(ELLIPSIS);
        assert!(body.chars().count() >= 140);
        assert!(text.starts_with(body));
        assert!(body.ends_with("lorem") || body.ends_with("ipsum"));
    }

    #[test]
    fn unbroken_text_is_hard_cut() {
        let text = "x".repeat(400);
        let out = clamp_text(&text, 280);
        assert_eq!(out.chars().count(), 280);
        assert!(out.ends_with(ELLIPSIS));
    }

    #[test]
    fn boundary_before_half_is_ignored() {
        // Only space sits at position 10; cutting there would keep far less than half.
        let text = format!("short word{}", "y".repeat(300));
        let out = clamp_text(&text, 100);
        assert_eq!(out.chars().count(), 100);
        assert!(out.starts_with("short wordyyy"));
    }

    #[test]
    fn clamp_counts_characters_not_bytes() {
        let text = "é".repeat(300);
        assert_eq!(clamp_text(&text, 280).chars().count(), 280);
    }

    #[tokio::test]
    async fn no_examples_and_review_disabled_skips_review() {
        let (gen, llm) = generator(MockLlm::new("unused").reply("  Fresh wallet alert  ", 20));
        let ctx = GenerationContext::new(&action(), &ActionsConfig::new(TriggerType::FreshInsider), vec![]);

        let resp = gen.generate(&ctx).await.unwrap();
        assert_eq!(resp.draft_text, "Fresh wallet alert");
        assert_eq!(resp.final_text, "Fresh wallet alert");
        assert!(resp.reviewed_text.is_none());
        assert_eq!(resp.tokens_used, 20);
        assert_eq!(resp.confidence, CONFIDENCE);
        assert_eq!(llm.call_count(), 1);
        assert!(llm.calls()[0].0.starts_with("You are a sharp prediction-market analyst"));
    }

    #[tokio::test]
    async fn examples_trigger_review_and_tokens_are_summed() {
        let (gen, llm) = generator(
            MockLlm::new("unused")
                .reply("draft", 30)
                .reply("polished", 12),
        );
        let mut cfg = ActionsConfig::new(TriggerType::FreshInsider);
        cfg.example_tweets = vec!["style sample".into()];
        cfg.custom_prompt = "You are WhaleBot.".into();
        let ctx = GenerationContext::new(&action(), &cfg, vec![]);

        let resp = gen.generate(&ctx).await.unwrap();
        assert_eq!(resp.final_text, "polished");
        assert_eq!(resp.reviewed_text.as_deref(), Some("polished"));
        assert_eq!(resp.tokens_used, 42);
        let calls = llm.calls();
        assert_eq!(calls[0].0, "You are WhaleBot.");
        assert_eq!(calls[1].0, EDITOR_SYSTEM_PROMPT);
        assert!(calls[1].1.contains("style sample"));
    }

    #[tokio::test]
    async fn review_failure_falls_back_to_draft() {
        let (gen, _) = generator(
            MockLlm::new("unused")
                .reply("the draft", 30)
                .fail(LlmError::Network("reset".into())),
        );
        let mut cfg = ActionsConfig::new(TriggerType::FreshInsider);
        cfg.review_enabled = true;
        let ctx = GenerationContext::new(&action(), &cfg, vec![]);

        let resp = gen.generate(&ctx).await.unwrap();
        assert_eq!(resp.final_text, resp.draft_text);
        assert_eq!(resp.tokens_used, 30);
        assert!(resp.review_error.unwrap().contains("reset"));
    }

    #[tokio::test]
    async fn draft_failure_is_a_generation_error() {
        let (gen, _) = generator(MockLlm::new("unused").fail(LlmError::RateLimited));
        let ctx = GenerationContext::new(&action(), &ActionsConfig::new(TriggerType::FreshInsider), vec![]);
        let err = gen.generate(&ctx).await.unwrap_err();
        assert!(matches!(err, ActionError::Generation(_)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn blank_draft_is_treated_as_failure() {
        let (gen, _) = generator(MockLlm::new("unused").reply("   ", 5));
        let ctx = GenerationContext::new(&action(), &ActionsConfig::new(TriggerType::FreshInsider), vec![]);
        assert!(matches!(gen.generate_draft(&ctx).await, Err(ActionError::Generation(_))));
    }

    #[test]
    fn historical_posts_require_opt_in() {
        let mut cfg = ActionsConfig::new(TriggerType::FreshInsider);
        let ctx = GenerationContext::new(&action(), &cfg, vec!["old post".into()]);
        assert!(ctx.historical_posts.is_empty());
        assert!(!ContentGenerator::should_review(&ctx));

        cfg.use_historical = true;
        let ctx = GenerationContext::new(&action(), &cfg, vec!["old post".into()]);
        assert_eq!(ctx.historical_posts, vec!["old post".to_string()]);
        assert!(ContentGenerator::should_review(&ctx));
    }
}
