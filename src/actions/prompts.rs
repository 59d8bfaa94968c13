//! Prompt construction for the draft and review calls.

use std::fmt::Write as _;

use super::generator::GenerationContext;

/// Historical posts included in the draft prompt.
pub const DRAFT_HISTORICAL_EXAMPLES: usize = 3;
/// Examples per source included in the review prompt.
pub const REVIEW_EXAMPLES_PER_SOURCE: usize = 2;

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a sharp prediction-market analyst who writes short, \
factual social posts about notable Polymarket activity. You highlight what makes a trade or wallet \
unusual (size, timing, how new the wallet is) without giving financial advice, without hashtags \
spam and without inventing facts.";

pub const EDITOR_SYSTEM_PROMPT: &str = "You are an editor for a prediction-market news account. \
You polish drafts so they read like the account's previous posts while keeping every fact intact.";

/// User instruction for the first draft.
pub fn draft_prompt(ctx: &GenerationContext) -> String {
    let mut p = String::new();
    let _ = writeln!(p, "Write one social media post about this Polymarket activity.");
    let _ = writeln!(p, "\nTrigger: {}", ctx.trigger_type);

    if let Some(trade) = &ctx.trade {
        let _ = writeln!(p, "\nTrade:");
        let _ = writeln!(p, "- Market: {}", trade.market_name);
        if !trade.event_title.is_empty() {
            let _ = writeln!(p, "- Event: {}", trade.event_title);
        }
        let _ = writeln!(p, "- Side: {} {}", trade.side, trade.outcome);
        let _ = writeln!(p, "- Price: {:.0}c", trade.price * 100.0);
        let _ = writeln!(p, "- Size: {:.0} shares (${:.0} notional)", trade.size, trade.notional());
    }

    let w = &ctx.wallet;
    let _ = writeln!(p, "\nWallet:");
    let _ = writeln!(p, "- Address: {}", w.address);
    let _ = writeln!(p, "- Total bets: {}", w.bet_count);
    if !w.freshness.is_empty() {
        let _ = writeln!(p, "- Freshness: {}", w.freshness);
    }
    if let Some(joined) = w.join_date {
        let _ = writeln!(p, "- Joined: {}", joined.format("%Y-%m-%d"));
    }

    let _ = writeln!(p, "\nLinks:");
    if !ctx.market_url.is_empty() {
        let _ = writeln!(p, "- Market: {}", ctx.market_url);
    }
    let _ = writeln!(p, "- Profile: {}", ctx.profile_url);

    if let Some(market) = &ctx.market_context {
        let _ = writeln!(p, "\nMarket context:\n{market}");
    }
    if let Some(profile) = &ctx.profile_context {
        let _ = writeln!(p, "\nWallet context:\n{profile}");
    }

    let historical: Vec<&String> = ctx.historical_posts.iter().take(DRAFT_HISTORICAL_EXAMPLES).collect();
    if !historical.is_empty() {
        let _ = writeln!(p, "\nRecent posts from this account:");
        for post in historical {
            let _ = writeln!(p, "- {post}");
        }
    }
    if !ctx.example_posts.is_empty() {
        let _ = writeln!(p, "\nExample posts in the desired style:");
        for post in &ctx.example_posts {
            let _ = writeln!(p, "- {post}");
        }
    }

    let _ = writeln!(
        p,
        "\nRules: at most {} characters. Output only the post text, no quotes or commentary.",
        ctx.max_length
    );
    p
}

/// User instruction for the editor pass over `draft`.
pub fn review_prompt(draft: &str, ctx: &GenerationContext) -> String {
    let mut p = String::new();
    let _ = writeln!(p, "Refine this draft post:\n\n{draft}");

    let curated: Vec<&String> = ctx.example_posts.iter().take(REVIEW_EXAMPLES_PER_SOURCE).collect();
    let historical: Vec<&String> = ctx.historical_posts.iter().take(REVIEW_EXAMPLES_PER_SOURCE).collect();
    if !curated.is_empty() || !historical.is_empty() {
        let _ = writeln!(p, "\nReference posts:");
        for post in curated.into_iter().chain(historical) {
            let _ = writeln!(p, "- {post}");
        }
    }

    let _ = writeln!(
        p,
        "\nKeep every fact, number and link from the draft. Stay under {} characters. \
         Match the tone and structure of the reference posts. Output only the final post text.",
        ctx.max_length
    );
    p
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::types::{TradeEvent, TriggerType, WalletProfile};

    fn ctx() -> GenerationContext {
        GenerationContext {
            trigger_type: TriggerType::BigTrade,
            wallet: WalletProfile {
                address: "0xwallet".into(),
                bet_count: 2,
                freshness: "insider".into(),
                join_date: None,
            },
            trade: Some(TradeEvent {
                market_name: "Fed cuts in March?".into(),
                market_slug: "fed-cuts-march".into(),
                event_title: "Fed decision".into(),
                side: "BUY".into(),
                outcome: "Yes".into(),
                price: 0.34,
                size: 50_000.0,
            }),
            market_url: "https://polymarket.com/event/fed-cuts-march".into(),
            profile_url: "https://polymarket.com/profile/0xwallet".into(),
            market_context: Some("Resolves on the March FOMC statement.".into()),
            profile_context: None,
            custom_prompt: String::new(),
            example_posts: vec!["ex1".into(), "ex2".into(), "ex3".into()],
            historical_posts: vec!["h1".into(), "h2".into(), "h3".into(), "h4".into()],
            review_enabled: false,
            max_length: 280,
        }
    }

    #[test]
    fn draft_prompt_embeds_trade_wallet_links_and_examples() {
        let p = draft_prompt(&ctx());
        assert!(p.contains("Fed cuts in March?"));
        assert!(p.contains("BUY Yes"));
        assert!(p.contains("34c"));
        assert!(p.contains("$17000 notional"));
        assert!(p.contains("Total bets: 2"));
        assert!(p.contains("https://polymarket.com/event/fed-cuts-march"));
        assert!(p.contains("Resolves on the March FOMC statement."));
        assert!(p.contains("at most 280 characters"));
        // Three historical posts at most, every curated example.
        assert!(p.contains("- h3"));
        assert!(!p.contains("- h4"));
        assert!(p.contains("- ex3"));
    }

    #[test]
    fn review_prompt_limits_examples_per_source() {
        let p = review_prompt("draft text", &ctx());
        assert!(p.contains("draft text"));
        assert!(p.contains("- ex2"));
        assert!(!p.contains("- ex3"));
        assert!(p.contains("- h2"));
        assert!(!p.contains("- h3"));
        assert!(p.contains("under 280 characters"));
    }
}
