//! Forwards completed and failed actions to the operator chat.

use tokio::sync::{broadcast, watch};
use tracing::{info, warn};

use super::api::{ParseMode, TelegramApi};
use crate::events::bus::ActionEvent;

pub struct AlertForwarder {
    api: TelegramApi,
    chat_id: String,
    events: broadcast::Receiver<ActionEvent>,
}

impl AlertForwarder {
    pub fn new(api: TelegramApi, chat_id: String, events: broadcast::Receiver<ActionEvent>) -> Self {
        Self { api, chat_id, events }
    }

    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!("telegram operator alerts started");
        loop {
            tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                event = self.events.recv() => match event {
                    Ok(ev) => {
                        if let Some(msg) = format_event(&ev) {
                            if let Err(e) = self.api.send_message(&self.chat_id, &msg, ParseMode::Html).await {
                                warn!(error = %e, action_id = %ev.action().id, "failed to send telegram alert");
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "telegram alert receiver lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        info!("event bus closed, telegram alerts shutting down");
                        break;
                    }
                },
            }
        }
    }
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

/// Operator-facing message, `None` for events nobody needs to act on.
pub fn format_event(event: &ActionEvent) -> Option<String> {
    match event {
        ActionEvent::Completed(a) => Some(format!(
            "✅ <b>Posted</b> for <code>{}</code>\nTrigger: {} | Post id: <code>{}</code>\n\n{}",
            escape_html(&a.account_id),
            a.trigger_type,
            escape_html(&a.posted_id),
            escape_html(&a.final_text),
        )),
        ActionEvent::Failed(a) => Some(format!(
            "🚨 <b>Action failed</b> for <code>{}</code>\nAction: <code>{}</code>\nAttempts: {}/{}\nError: {}",
            escape_html(&a.account_id),
            a.id,
            a.retry_count,
            a.max_retries,
            escape_html(&a.error_message),
        )),
        _ => None,
    }
}
