//! Anthropic messages provider.

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::debug;

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const MODEL: &str = "claude-3-haiku-20240307";

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<Message<'a>>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    text: Option<String>,
}

pub(crate) async fn complete(
    http: &reqwest::Client,
    api_key: &str,
    prompt: &str,
) -> Result<String> {
    let request = MessagesRequest {
        model: MODEL,
        max_tokens: 300,
        messages: vec![Message {
            role: "user",
            content: prompt,
        }],
    };

    debug!(model = MODEL, "Claude messages request");
    let response = http
        .post(ANTHROPIC_API_URL)
        .header("x-api-key", api_key)
        .header("anthropic-version", ANTHROPIC_VERSION)
        .json(&request)
        .send()
        .await?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(anyhow!("Claude API error ({status}): {body}"));
    }

    let parsed: MessagesResponse = response.json().await?;
    parsed
        .content
        .into_iter()
        .find_map(|block| block.text)
        .ok_or_else(|| anyhow!("No text block in Claude response"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_shape() {
        let request = MessagesRequest {
            model: MODEL,
            max_tokens: 300,
            messages: vec![Message {
                role: "user",
                content: "prompt",
            }],
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "claude-3-haiku-20240307");
        assert_eq!(json["max_tokens"], 300);
    }

    #[test]
    fn test_response_parsing() {
        let json = r#"{"content": [{"type": "text", "text": "概要文本"}]}"#;
        let parsed: MessagesResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.content[0].text.as_deref(), Some("概要文本"));
    }
}
