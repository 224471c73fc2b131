//! OpenAI chat-completions provider.

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::debug;

const OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";
const MODEL: &str = "gpt-3.5-turbo";

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

/// One completion attempt. Errors carry the HTTP status and body so the
/// gateway can log why the provider fell through.
pub(crate) async fn complete(
    http: &reqwest::Client,
    api_key: &str,
    system: &str,
    prompt: &str,
) -> Result<String> {
    let request = ChatRequest {
        model: MODEL,
        messages: vec![
            Message {
                role: "system",
                content: system,
            },
            Message {
                role: "user",
                content: prompt,
            },
        ],
        max_tokens: 300,
        temperature: 0.3,
    };

    debug!(model = MODEL, "OpenAI chat request");
    let response = http
        .post(OPENAI_API_URL)
        .bearer_auth(api_key)
        .json(&request)
        .send()
        .await?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(anyhow!("OpenAI API error ({status}): {body}"));
    }

    let chat: ChatResponse = response.json().await?;
    chat.choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or_else(|| anyhow!("No content in OpenAI response"))
}
