//! AI summarization gateway.
//!
//! Turns an article's title and body into a short Chinese summary plus a
//! keyword list by trying the configured completion providers in priority
//! order: the preferred provider first, then the remaining ones in default
//! order. Each provider gets exactly one attempt per request — any
//! failure falls through to the next provider, never into a retry.

pub mod claude;
pub mod gemini;
pub mod openai;

use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, info, instrument, warn};

use crate::config::AiConfig;

const SYSTEM_PROMPT: &str = "你是一个专业的半导体行业新闻编辑，擅长生成简洁准确的新闻概要。";

/// A generated summary with its keywords.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Digest {
    pub summary: String,
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    OpenAi,
    Claude,
    Gemini,
}

impl Provider {
    pub fn label(&self) -> &'static str {
        match self {
            Provider::OpenAi => "openai",
            Provider::Claude => "claude",
            Provider::Gemini => "gemini",
        }
    }
}

/// Shape of the JSON object providers are asked to return.
#[derive(Debug, Deserialize)]
struct ReplyJson {
    summary: String,
    #[serde(default)]
    keywords: Vec<String>,
}

pub struct Summarizer {
    config: AiConfig,
    http: reqwest::Client,
}

impl Summarizer {
    pub fn new(config: AiConfig) -> reqwest::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        let summarizer = Self { config, http };
        let configured: Vec<&str> = summarizer.available().iter().map(Provider::label).collect();
        if configured.is_empty() {
            warn!("No AI providers configured; summary generation is disabled");
        } else {
            info!(providers = ?configured, preferred = %summarizer.config.preferred_service, "AI gateway ready");
        }
        Ok(summarizer)
    }

    pub fn is_enabled(&self) -> bool {
        !self.available().is_empty()
    }

    /// Providers with a key present, in default order.
    fn available(&self) -> Vec<Provider> {
        let mut providers = Vec::new();
        if self.config.openai_api_key.is_some() {
            providers.push(Provider::OpenAi);
        }
        if self.config.claude_api_key.is_some() {
            providers.push(Provider::Claude);
        }
        if self.config.gemini_api_key.is_some() {
            providers.push(Provider::Gemini);
        }
        providers
    }

    /// Attempt order: the preferred provider moves to the front, the rest
    /// keep their default order.
    fn provider_order(&self) -> Vec<Provider> {
        let mut providers = self.available();
        if let Some(pos) = providers
            .iter()
            .position(|p| p.label() == self.config.preferred_service)
        {
            let preferred = providers.remove(pos);
            providers.insert(0, preferred);
        }
        providers
    }

    /// Combine title and body into the prompt payload. Returns `None`
    /// when the combined input is too short to be worth a provider call;
    /// oversized bodies are hard-truncated first.
    fn preprocess(&self, title: &str, content: &str) -> Option<String> {
        let content = content.trim();
        if title.chars().count() + content.chars().count() < 50 {
            return None;
        }

        let truncated = if content.chars().count() > self.config.max_content_length {
            let mut cut: String = content
                .chars()
                .take(self.config.max_content_length)
                .collect();
            cut.push_str("...");
            cut
        } else {
            content.to_string()
        };

        Some(format!("标题：{title}\n\n内容：{truncated}"))
    }

    fn prompt(&self, prepared: &str, source: &str) -> String {
        format!(
            r#"请为以下半导体行业新闻生成一个简洁的概要，要求：

1. 概要长度控制在{}字以内
2. 突出新闻的核心内容和关键信息
3. 使用专业的半导体行业术语
4. 保持客观中性的语调
5. 同时提取3-5个关键词

新闻来源：{}

{}

请按以下JSON格式返回结果：
{{
    "summary": "新闻概要内容...",
    "keywords": ["关键词1", "关键词2", "关键词3"]
}}
"#,
            self.config.summary_max_length, source, prepared
        )
    }

    /// Recover a [`Digest`] from a provider reply: the JSON object between
    /// the first `{` and the last `}` when present (a `summary` field is
    /// required), otherwise the first line of the raw reply capped at the
    /// summary length.
    fn parse_reply(&self, reply: &str) -> Option<Digest> {
        if let (Some(start), Some(end)) = (reply.find('{'), reply.rfind('}')) {
            if start < end {
                let parsed: ReplyJson = serde_json::from_str(&reply[start..=end]).ok()?;
                return Some(Digest {
                    summary: parsed.summary.trim().to_string(),
                    keywords: parsed.keywords,
                });
            }
        }

        let first_line = reply.lines().map(str::trim).find(|l| !l.is_empty())?;
        Some(Digest {
            summary: first_line
                .chars()
                .take(self.config.summary_max_length)
                .collect(),
            keywords: Vec::new(),
        })
    }

    /// Generate a summary for one article, or `None` when the input is
    /// too short, no provider is configured, or every provider failed.
    #[instrument(level = "info", skip_all, fields(%title))]
    pub async fn summarize(&self, title: &str, content: &str, source: &str) -> Option<Digest> {
        let order = self.provider_order();
        if order.is_empty() {
            return None;
        }

        let Some(prepared) = self.preprocess(title, content) else {
            debug!(%title, "Content too short for AI processing");
            return None;
        };
        let prompt = self.prompt(&prepared, source);

        for provider in order {
            let result = match provider {
                Provider::OpenAi => {
                    let key = self.config.openai_api_key.as_deref()?;
                    openai::complete(&self.http, key, SYSTEM_PROMPT, &prompt).await
                }
                Provider::Claude => {
                    let key = self.config.claude_api_key.as_deref()?;
                    claude::complete(&self.http, key, &prompt).await
                }
                Provider::Gemini => {
                    let key = self.config.gemini_api_key.as_deref()?;
                    gemini::complete(&self.http, key, &prompt).await
                }
            };

            match result {
                Ok(reply) => match self.parse_reply(&reply) {
                    Some(digest) => {
                        info!(provider = provider.label(), "Generated AI summary");
                        return Some(digest);
                    }
                    None => {
                        warn!(provider = provider.label(), "Unusable provider reply; trying next");
                    }
                },
                Err(e) => {
                    warn!(provider = provider.label(), error = %e, "Provider call failed; trying next");
                }
            }
        }

        warn!(%title, "All AI providers failed to generate a summary");
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(openai: bool, claude: bool, gemini: bool, preferred: &str) -> AiConfig {
        AiConfig {
            openai_api_key: openai.then(|| "sk-test".to_string()),
            claude_api_key: claude.then(|| "ck-test".to_string()),
            gemini_api_key: gemini.then(|| "gk-test".to_string()),
            preferred_service: preferred.to_string(),
            max_content_length: 4000,
            summary_max_length: 200,
            batch_size: 10,
            call_delay_secs: 1,
        }
    }

    fn summarizer(openai: bool, claude: bool, gemini: bool, preferred: &str) -> Summarizer {
        Summarizer::new(config(openai, claude, gemini, preferred)).unwrap()
    }

    #[test]
    fn test_provider_order_prefers_configured_service() {
        let s = summarizer(true, true, true, "claude");
        assert_eq!(
            s.provider_order(),
            vec![Provider::Claude, Provider::OpenAi, Provider::Gemini]
        );
    }

    #[test]
    fn test_provider_order_skips_missing_keys() {
        let s = summarizer(false, true, true, "openai");
        assert_eq!(s.provider_order(), vec![Provider::Claude, Provider::Gemini]);
        assert!(s.is_enabled());

        let none = summarizer(false, false, false, "openai");
        assert!(!none.is_enabled());
        assert!(none.provider_order().is_empty());
    }

    #[test]
    fn test_preprocess_rejects_short_input() {
        let s = summarizer(true, false, false, "openai");
        assert!(s.preprocess("短标题", "短内容").is_none());

        let body = "半导体".repeat(30);
        let prepared = s.preprocess("标题", &body).unwrap();
        assert!(prepared.starts_with("标题：标题"));
        assert!(prepared.contains("内容："));
    }

    #[test]
    fn test_preprocess_truncates_long_bodies() {
        let mut cfg = config(true, false, false, "openai");
        cfg.max_content_length = 100;
        let s = Summarizer::new(cfg).unwrap();
        let body = "字".repeat(500);
        let prepared = s.preprocess("标题", &body).unwrap();
        // 100 body chars plus the ellipsis, wrapped in the prompt frame.
        assert!(prepared.contains(&format!("{}...", "字".repeat(100))));
        assert!(!prepared.contains(&"字".repeat(101)));
    }

    #[test]
    fn test_parse_reply_prefers_embedded_json() {
        let s = summarizer(true, false, false, "openai");
        let reply = r#"好的，结果如下：
{"summary": "三家晶圆厂宣布扩产", "keywords": ["晶圆", "扩产"]}
希望对你有帮助。"#;
        let digest = s.parse_reply(reply).unwrap();
        assert_eq!(digest.summary, "三家晶圆厂宣布扩产");
        assert_eq!(digest.keywords, vec!["晶圆", "扩产"]);
    }

    #[test]
    fn test_parse_reply_keywords_default_empty() {
        let s = summarizer(true, false, false, "openai");
        let digest = s.parse_reply(r#"{"summary": "概要"}"#).unwrap();
        assert_eq!(digest.summary, "概要");
        assert!(digest.keywords.is_empty());
    }

    #[test]
    fn test_parse_reply_requires_summary_field() {
        let s = summarizer(true, false, false, "openai");
        assert!(s.parse_reply(r#"{"keywords": ["a"]}"#).is_none());
        assert!(s.parse_reply(r#"{"summary": broken"#).is_none());
    }

    #[test]
    fn test_parse_reply_falls_back_to_first_line() {
        let mut cfg = config(true, false, false, "openai");
        cfg.summary_max_length = 10;
        let s = Summarizer::new(cfg).unwrap();
        let digest = s.parse_reply("这是一条没有结构的很长很长的概要文本行\n第二行").unwrap();
        assert_eq!(digest.summary.chars().count(), 10);
        assert!(digest.keywords.is_empty());

        assert!(s.parse_reply("   \n  ").is_none());
    }
}
