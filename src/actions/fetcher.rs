//! Optional page context for the draft prompt.
//!
//! Market context comes from Gamma `/events?slug={slug}`, wallet context from the
//! data-api `/positions?user={address}`. Both are best-effort: the pipeline logs a
//! failure and drafts without the extra context.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::fmt::Write as _;
use std::time::Duration;
use tracing::debug;

use crate::config::FetcherConfig;
use crate::error::{ActionError, Result};

/// Positions summarized in the wallet context.
const PROFILE_POSITIONS: usize = 5;
/// Description characters kept in the market context.
const DESCRIPTION_CHARS: usize = 400;

#[async_trait]
pub trait ContentFetcher: Send + Sync {
    /// Short plain-text summary of the market page, `None` when the slug is unknown.
    async fn market_context(&self, slug: &str) -> Result<Option<String>>;

    /// Short plain-text summary of the wallet's open positions.
    async fn profile_context(&self, address: &str) -> Result<Option<String>>;
}

// ── Upstream response types ────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct GammaEvent {
    title: Option<String>,
    description: Option<String>,
    volume: Option<f64>,
    #[serde(rename = "endDate")]
    end_date: Option<String>,
    markets: Option<Vec<GammaMarket>>,
}

#[derive(Debug, Deserialize)]
struct GammaMarket {
    question: Option<String>,
    /// JSON-encoded array of strings, e.g. `["Yes","No"]`.
    outcomes: Option<serde_json::Value>,
    #[serde(rename = "outcomePrices")]
    outcome_prices: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct Position {
    title: Option<String>,
    outcome: Option<String>,
    size: Option<f64>,
    #[serde(rename = "currentValue")]
    current_value: Option<f64>,
    #[serde(rename = "cashPnl")]
    cash_pnl: Option<f64>,
}

pub struct PolymarketFetcher {
    client: Client,
    gamma_url: String,
    data_api_url: String,
}

impl PolymarketFetcher {
    pub fn new(config: &FetcherConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            gamma_url: config.gamma_base_url.trim_end_matches('/').to_string(),
            data_api_url: config.data_api_url.trim_end_matches('/').to_string(),
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str, query: &[(&str, &str)]) -> Result<T> {
        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }
}

#[async_trait]
impl ContentFetcher for PolymarketFetcher {
    async fn market_context(&self, slug: &str) -> Result<Option<String>> {
        if slug.is_empty() {
            return Ok(None);
        }
        let url = format!("{}/events", self.gamma_url);
        // The /events endpoint returns an array
        let events: Vec<GammaEvent> = self.get_json(&url, &[("slug", slug)]).await?;
        let summary = events.into_iter().next().map(|e| summarize_event(&e));
        debug!(slug, found = summary.is_some(), "market context fetched");
        Ok(summary)
    }

    async fn profile_context(&self, address: &str) -> Result<Option<String>> {
        let url = format!("{}/positions", self.data_api_url);
        let limit = PROFILE_POSITIONS.to_string();
        let positions: Vec<Position> = self
            .get_json(&url, &[("user", address), ("sizeThreshold", "1"), ("limit", &limit)])
            .await?;
        debug!(address, positions = positions.len(), "profile context fetched");
        Ok(summarize_positions(&positions))
    }
}

fn summarize_event(event: &GammaEvent) -> String {
    let mut out = String::new();
    if let Some(title) = &event.title {
        let _ = writeln!(out, "Event: {title}");
    }
    if let Some(desc) = event.description.as_deref().filter(|d| !d.trim().is_empty()) {
        let short: String = desc.trim().chars().take(DESCRIPTION_CHARS).collect();
        let _ = writeln!(out, "Description: {short}");
    }
    if let Some(volume) = event.volume {
        let _ = writeln!(out, "Volume: ${volume:.0}");
    }
    if let Some(end) = &event.end_date {
        let _ = writeln!(out, "Ends: {end}");
    }
    for market in event.markets.iter().flatten() {
        let Some(question) = &market.question else { continue };
        let outcomes = string_list(market.outcomes.as_ref());
        let prices = string_list(market.outcome_prices.as_ref());
        let odds: Vec<String> = outcomes
            .iter()
            .zip(prices.iter())
            .filter_map(|(o, p)| p.parse::<f64>().ok().map(|p| format!("{o} {:.0}%", p * 100.0)))
            .collect();
        if odds.is_empty() {
            let _ = writeln!(out, "- {question}");
        } else {
            let _ = writeln!(out, "- {question} ({})", odds.join(", "));
        }
    }
    out.trim_end().to_string()
}

fn summarize_positions(positions: &[Position]) -> Option<String> {
    if positions.is_empty() {
        return None;
    }
    let mut out = String::from("Open positions:");
    for p in positions.iter().take(PROFILE_POSITIONS) {
        let _ = write!(
            out,
            "\n- {} {}: {:.0} shares",
            p.title.as_deref().unwrap_or("unknown market"),
            p.outcome.as_deref().unwrap_or("?"),
            p.size.unwrap_or(0.0),
        );
        if let Some(value) = p.current_value {
            let _ = write!(out, ", worth ${value:.0}");
        }
        if let Some(pnl) = p.cash_pnl {
            let _ = write!(out, ", pnl ${pnl:+.0}");
        }
    }
    Some(out)
}

/// Gamma encodes some arrays as JSON strings (`"[\"Yes\",\"No\"]"`), others as real arrays.
fn string_list(val: Option<&serde_json::Value>) -> Vec<String> {
    let as_strings = |arr: &Vec<serde_json::Value>| {
        arr.iter()
            .map(|v| match v {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect()
    };
    match val {
        Some(serde_json::Value::Array(arr)) => as_strings(arr),
        Some(serde_json::Value::String(s)) => serde_json::from_str::<Vec<serde_json::Value>>(s)
            .map(|arr| as_strings(&arr))
            .unwrap_or_default(),
        _ => Vec::new(),
    }
}

/// Canned contexts for pipeline tests.
#[cfg(test)]
pub mod mock {
    use super::*;

    #[derive(Default)]
    pub struct StaticFetcher {
        pub market: Option<String>,
        pub profile: Option<String>,
        pub fail: bool,
    }

    #[async_trait]
    impl ContentFetcher for StaticFetcher {
        async fn market_context(&self, _slug: &str) -> Result<Option<String>> {
            if self.fail {
                return Err(ActionError::Config("fetch disabled".into()));
            }
            Ok(self.market.clone())
        }

        async fn profile_context(&self, _address: &str) -> Result<Option<String>> {
            if self.fail {
                return Err(ActionError::Config("fetch disabled".into()));
            }
            Ok(self.profile.clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fetcher(server: &MockServer) -> PolymarketFetcher {
        PolymarketFetcher::new(&FetcherConfig {
            gamma_base_url: server.uri(),
            data_api_url: format!("{}/", server.uri()),
            timeout_secs: 5,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn market_context_summarizes_event_and_odds() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/events"))
            .and(query_param("slug", "fed-march"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
                "title": "Fed decision in March",
                "description": "Resolves per the FOMC statement.",
                "volume": 1234567.8,
                "endDate": "2026-03-18T00:00:00Z",
                "markets": [{
                    "question": "Will the Fed cut?",
                    "outcomes": "[\"Yes\",\"No\"]",
                    "outcomePrices": "[\"0.34\",\"0.66\"]"
                }]
            }])))
            .mount(&server)
            .await;

        let ctx = fetcher(&server).market_context("fed-march").await.unwrap().unwrap();
        assert!(ctx.contains("Event: Fed decision in March"));
        assert!(ctx.contains("Volume: $1234568"));
        assert!(ctx.contains("Will the Fed cut? (Yes 34%, No 66%)"));
    }

    #[tokio::test]
    async fn unknown_slug_and_empty_slug_yield_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/events"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;

        let f = fetcher(&server);
        assert!(f.market_context("nope").await.unwrap().is_none());
        assert!(f.market_context("").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn profile_context_lists_positions() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/positions"))
            .and(query_param("user", "0xabc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"title": "Fed cut?", "outcome": "Yes", "size": 5000.0, "currentValue": 1700.0, "cashPnl": -20.0}
            ])))
            .mount(&server)
            .await;

        let ctx = fetcher(&server).profile_context("0xabc").await.unwrap().unwrap();
        assert!(ctx.contains("Fed cut? Yes: 5000 shares, worth $1700, pnl $-20"));
    }

    #[tokio::test]
    async fn upstream_errors_propagate() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = fetcher(&server).profile_context("0xabc").await.unwrap_err();
        assert!(matches!(err, ActionError::Http(_)));
    }

    #[test]
    fn string_list_accepts_both_encodings() {
        assert_eq!(string_list(Some(&json!(["a", "b"]))), vec!["a", "b"]);
        assert_eq!(string_list(Some(&json!("[\"a\",\"b\"]"))), vec!["a", "b"]);
        assert!(string_list(Some(&json!(42))).is_empty());
        assert!(string_list(None).is_empty());
    }
}
