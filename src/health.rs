//! Website health checker.
//!
//! Probes every active directory entry and writes the outcome back to its
//! active flag and note field. A probe classifies, it never raises: any
//! transport error becomes an "unavailable" outcome with the error text
//! as the note.

use std::time::{Duration, Instant};

use tracing::{info, instrument, warn};

use crate::config::Config;
use crate::store::{Store, StoreResult};

/// Result of probing one directory URL.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeOutcome {
    pub available: bool,
    pub status_code: Option<u16>,
    pub error_message: Option<String>,
    pub response_time: Option<f64>,
}

/// Aggregate of one health-check pass.
#[derive(Debug, Default)]
pub struct CheckReport {
    pub total_checked: usize,
    pub available: usize,
    pub unavailable: usize,
    /// (site name, note) for every unavailable entry.
    pub errors: Vec<(String, String)>,
}

/// Probe client: short timeout, redirects left unfollowed so 3xx statuses
/// stay observable, and invalid certificates tolerated — several of the
/// older directory sites have broken TLS but working content.
pub fn probe_client(config: &Config) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(config.website_check_timeout_secs))
        .user_agent(config.user_agent.clone())
        .redirect(reqwest::redirect::Policy::none())
        .danger_accept_invalid_certs(true)
        .build()
}

fn classify(code: u16, body_chars: usize, location: Option<&str>) -> (bool, Option<String>) {
    match code {
        200 if body_chars > 100 => (true, None),
        200 => (false, Some("页面内容过短，可能是错误页面".to_string())),
        301 | 302 => {
            let note = match location {
                Some(location) => format!("网站重定向到: {location}"),
                None => "网站重定向".to_string(),
            };
            (true, Some(note))
        }
        403 => (false, Some("访问被拒绝 (403 Forbidden)".to_string())),
        404 => (false, Some("页面不存在 (404 Not Found)".to_string())),
        500 => (false, Some("服务器内部错误 (500 Internal Server Error)".to_string())),
        other => (false, Some(format!("HTTP状态码: {other}"))),
    }
}

/// Probe one URL. Never returns an error — timeouts and connection
/// failures are outcomes too.
#[instrument(level = "debug", skip_all, fields(%url))]
pub async fn probe(client: &reqwest::Client, url: &str) -> ProbeOutcome {
    let start = Instant::now();

    let resp = match client.get(url).send().await {
        Ok(resp) => resp,
        Err(e) => {
            let message = if e.is_timeout() {
                "请求超时".to_string()
            } else {
                format!("连接错误: {e}")
            };
            return ProbeOutcome {
                available: false,
                status_code: None,
                error_message: Some(message),
                response_time: None,
            };
        }
    };

    let code = resp.status().as_u16();
    let location = resp
        .headers()
        .get(reqwest::header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .map(String::from);
    let body_chars = if code == 200 {
        resp.text().await.map(|b| b.chars().count()).unwrap_or(0)
    } else {
        0
    };
    let response_time = start.elapsed().as_secs_f64();

    let (available, error_message) = classify(code, body_chars, location.as_deref());
    ProbeOutcome {
        available,
        status_code: Some(code),
        error_message,
        response_time: Some(response_time),
    }
}

/// Probe every active directory entry sequentially, writing each outcome
/// back regardless of result, with the politeness delay between probes.
pub async fn check_all_websites(
    store: &Store,
    client: &reqwest::Client,
    delay: Duration,
) -> StoreResult<CheckReport> {
    let websites = store.websites_for_check().await?;
    info!(count = websites.len(), "Starting website availability check");

    let mut report = CheckReport {
        total_checked: websites.len(),
        ..Default::default()
    };

    for website in &websites {
        let outcome = probe(client, &website.url).await;

        if outcome.available {
            report.available += 1;
            info!(
                name = %website.name,
                status = ?outcome.status_code,
                elapsed_secs = ?outcome.response_time,
                "Website is available"
            );
        } else {
            report.unavailable += 1;
            let note = outcome.error_message.clone().unwrap_or_default();
            warn!(
                name = %website.name,
                url = %website.url,
                status = ?outcome.status_code,
                %note,
                "Website is unavailable"
            );
            report.errors.push((website.name.clone(), note));
        }

        if let Err(e) = store
            .update_website_status(&website.id, outcome.available, outcome.error_message.as_deref())
            .await
        {
            warn!(name = %website.name, error = %e, "Failed to record probe outcome");
        }

        tokio::time::sleep(delay).await;
    }

    info!(
        available = report.available,
        unavailable = report.unavailable,
        "Website check completed"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ok_with_substantial_body_is_available() {
        let (available, note) = classify(200, 5000, None);
        assert!(available);
        assert!(note.is_none());
    }

    #[test]
    fn test_ok_with_short_body_looks_like_error_page() {
        let (available, note) = classify(200, 50, None);
        assert!(!available);
        assert!(note.unwrap().contains("过短"));
    }

    #[test]
    fn test_redirects_stay_available_with_note() {
        let (available, note) = classify(301, 0, Some("https://new.example.com"));
        assert!(available);
        assert!(note.unwrap().contains("https://new.example.com"));

        let (available, _) = classify(302, 0, None);
        assert!(available);
    }

    #[test]
    fn test_known_failure_statuses_have_specific_notes() {
        assert_eq!(
            classify(403, 0, None).1.unwrap(),
            "访问被拒绝 (403 Forbidden)"
        );
        assert_eq!(
            classify(404, 0, None).1.unwrap(),
            "页面不存在 (404 Not Found)"
        );
        assert_eq!(
            classify(500, 0, None).1.unwrap(),
            "服务器内部错误 (500 Internal Server Error)"
        );
    }

    #[test]
    fn test_unknown_status_carries_raw_code() {
        let (available, note) = classify(418, 0, None);
        assert!(!available);
        assert_eq!(note.unwrap(), "HTTP状态码: 418");
    }
}
