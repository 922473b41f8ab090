use reqwest::blocking::Client;
use serde_json::{json, Value};
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};

use super::{classify_status, Deliverer, DeliveryError, RetryPolicy};
use crate::results::{group_by_file, TodoItem};

/// Slack rejects messages with more than 50 blocks
pub const MAX_BLOCKS_PER_MESSAGE: usize = 45;

/// An incoming-webhook endpoint
#[derive(Debug, Clone)]
pub struct SlackWebhook {
    url: String,
    client: Client,
}

impl SlackWebhook {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, DeliveryError> {
        let url = url.into();
        if url.trim().is_empty() {
            return Err(DeliveryError::permanent("Slack webhook URL is empty"));
        }
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DeliveryError::permanent(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { url, client })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Posts a ping message. Any failure counts as `false`.
    pub fn test_connection(&self) -> bool {
        match self.post(&json!({ "text": "todoscout connection test" })) {
            Ok(()) => true,
            Err(e) => {
                warn!("Slack connection test failed: {}", e);
                false
            }
        }
    }

    /// Sends the grouped digest, one message per chunk. Returns the number
    /// of messages posted.
    pub fn send_digest(
        &self,
        items: &[TodoItem],
        policy: &RetryPolicy,
    ) -> Result<usize, DeliveryError> {
        if items.is_empty() {
            info!("No TODOs to send");
            return Ok(0);
        }

        let chunks = digest_blocks(items);
        for (i, blocks) in chunks.iter().enumerate() {
            let payload = json!({ "text": "TODO list", "blocks": blocks });
            let (result, attempts) = policy.run(|| self.post(&payload));
            result?;
            debug!(
                "Posted digest chunk {}/{} in {} attempt(s)",
                i + 1,
                chunks.len(),
                attempts
            );
        }

        info!("Sent {} TODOs to Slack in {} message(s)", items.len(), chunks.len());
        Ok(chunks.len())
    }

    fn post(&self, payload: &Value) -> Result<(), DeliveryError> {
        let response = self.client.post(&self.url).json(payload).send()?;
        match classify_status("Slack", response.status()) {
            None => Ok(()),
            Some(err) => Err(err),
        }
    }
}

impl Deliverer for SlackWebhook {
    fn name(&self) -> &str {
        "Slack"
    }

    fn deliver(&self, item: &TodoItem) -> Result<(), DeliveryError> {
        self.post(&json!({
            "text": item.content,
            "blocks": item_blocks(item),
        }))
    }
}

fn item_line(item: &TodoItem) -> String {
    let mut line = format!("• *Line {}:* {}", item.line_number, item.content);
    if let Some(priority) = item.priority {
        line.push_str(&format!(" *[{}]*", priority.as_str().to_uppercase()));
    }
    if let Some(assignee) = &item.assignee {
        line.push_str(&format!(" @{}", assignee));
    }
    if let Some(tags) = &item.tags {
        for tag in tags {
            line.push_str(&format!(" #{}", tag));
        }
    }
    line
}

fn mrkdwn_section(text: String) -> Value {
    json!({ "type": "section", "text": { "type": "mrkdwn", "text": text } })
}

/// Blocks for a single-item message
pub fn item_blocks(item: &TodoItem) -> Vec<Value> {
    vec![
        mrkdwn_section(format!("*{}*", item.file_path)),
        mrkdwn_section(item_line(item)),
    ]
}

/// The grouped digest split into messages of at most
/// [`MAX_BLOCKS_PER_MESSAGE`] blocks
pub fn digest_blocks(items: &[TodoItem]) -> Vec<Vec<Value>> {
    let groups = group_by_file(items);
    let mut blocks = vec![
        json!({
            "type": "header",
            "text": { "type": "plain_text", "text": format!("TODO list ({})", items.len()) }
        }),
        json!({ "type": "divider" }),
    ];

    for (path, group) in &groups {
        blocks.push(mrkdwn_section(format!("*{}*", path)));
        blocks.extend(group.iter().map(|item| mrkdwn_section(item_line(item))));
        if groups.len() > 1 {
            blocks.push(json!({ "type": "divider" }));
        }
    }

    let generated = humantime::format_rfc3339_seconds(SystemTime::now());
    blocks.push(json!({
        "type": "context",
        "elements": [{
            "type": "mrkdwn",
            "text": format!("{} TODOs | generated {}", items.len(), generated)
        }]
    }));

    blocks
        .chunks(MAX_BLOCKS_PER_MESSAGE)
        .map(|chunk| chunk.to_vec())
        .collect()
}
