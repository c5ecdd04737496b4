//! Content normalizer: raw email body to plain text plus opportunity URLs.
//!
//! Deterministic and infallible. Malformed input yields empty output.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use reqwest::Url;
use tracing::{debug, warn};

use crate::pipeline::types::{EmailInput, NormalizedEmail};

/// Redirect wrappers are unwrapped at most this many levels deep.
const MAX_REDIRECT_DEPTH: usize = 3;

/// Query parameters that carry the real destination in generic redirectors.
const REDIRECT_PARAMS: &[&str] = &[
    "url",
    "u",
    "q",
    "redirect",
    "redirect_url",
    "redirect_uri",
    "target",
    "dest",
    "destination",
];

/// Query parameters that only exist for tracking.
const TRACKING_PARAMS: &[&str] = &[
    "gclid", "fbclid", "mc_cid", "mc_eid", "trk", "trackingid", "refid", "lipi", "midtoken",
    "midsig", "eid", "otptoken", "_hsenc", "_hsmi",
];

/// Any of these in a URL marks it as noise.
const NOISE_MARKERS: &[&str] = &[
    "unsubscribe",
    "opt-out",
    "optout",
    "email-preferences",
    "manage-preferences",
    "notification-settings",
    "/pixel",
    "/beacon",
    "/open.gif",
];

const IMAGE_EXTENSIONS: &[&str] = &[".png", ".jpg", ".jpeg", ".gif", ".svg", ".webp", ".ico", ".bmp"];

/// Path fragments that indicate an opportunity page.
const OPPORTUNITY_PATHS: &[&str] = &[
    "/job",
    "/career",
    "/apply",
    "/position",
    "/vacanc",
    "/opening",
    "/stilling",
    "/ledige",
    "/recruit",
    "/hiring",
];

static DROPPED_BLOCKS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<script\b.*?</script\s*>|<style\b.*?</style\s*>|<head\b.*?</head\s*>|<!--.*?-->")
        .expect("valid block regex")
});

static LIST_ITEM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<li\b[^>]*>").expect("valid li regex"));

static LINE_BREAKS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)<br\s*/?>|</?(?:p|div|tr|table|ul|ol|h[1-6]|section|article|header|footer|blockquote)\b[^>]*>",
    )
    .expect("valid break regex")
});

static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").expect("valid tag regex"));

static HTML_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<(?:html|body|div|p|br|table|a\s|span|td)\b").expect("valid marker regex"));

static NUMERIC_ENTITY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"&#(x[0-9a-fA-F]{1,6}|[0-9]{1,7});").expect("valid entity regex"));

static HREF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)href\s*=\s*(?:"([^"]*)"|'([^']*)')"#).expect("valid href regex")
});

static BARE_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"https?://[^\s"'<>\]\[]+"#).expect("valid url regex"));

/// Normalize an email body into plain text and a filtered URL list.
pub fn normalize(email: &EmailInput) -> NormalizedEmail {
    let body = email.body.as_str();
    let text = if looks_like_html(body) {
        html_to_text(body)
    } else {
        collapse_whitespace(body)
    };

    let raw_urls = extract_urls(body);
    let raw_count = raw_urls.len();

    let mut seen = HashSet::new();
    let urls: Vec<String> = raw_urls
        .into_iter()
        .map(|u| unwrap_redirect(&u))
        .filter_map(|u| clean_url(&u))
        .filter(|u| is_opportunity_url(u))
        .filter(|u| seen.insert(u.clone()))
        .collect();

    debug!(
        text_chars = text.len(),
        raw_urls = raw_count,
        kept_urls = urls.len(),
        "Normalized email"
    );

    let normalized = NormalizedEmail { text, urls };
    if normalized.is_empty() {
        warn!(subject = %email.subject, "Normalized email is empty");
    }
    normalized
}

fn looks_like_html(body: &str) -> bool {
    HTML_MARKER.is_match(body)
}

/// Convert HTML to readable plain text.
pub fn html_to_text(html: &str) -> String {
    let text = DROPPED_BLOCKS.replace_all(html, " ");
    let text = LIST_ITEM.replace_all(&text, "\n- ");
    let text = LINE_BREAKS.replace_all(&text, "\n");
    let text = TAG.replace_all(&text, "");
    collapse_whitespace(&decode_entities(&text))
}

/// Decode the named and numeric HTML entities that show up in mail.
pub fn decode_entities(text: &str) -> String {
    let decoded = NUMERIC_ENTITY.replace_all(text, |caps: &regex::Captures| {
        let raw = &caps[1];
        let code = match raw.strip_prefix(['x', 'X']) {
            Some(hex) => u32::from_str_radix(hex, 16).ok(),
            None => raw.parse::<u32>().ok(),
        };
        code.and_then(char::from_u32)
            .map(String::from)
            .unwrap_or_default()
    });

    // `&amp;` last so `&amp;lt;` stays `&lt;`.
    decoded
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&aelig;", "æ")
        .replace("&AElig;", "Æ")
        .replace("&oslash;", "ø")
        .replace("&Oslash;", "Ø")
        .replace("&aring;", "å")
        .replace("&Aring;", "Å")
        .replace("&ndash;", "–")
        .replace("&mdash;", "—")
        .replace("&hellip;", "…")
        .replace("&amp;", "&")
}

/// Collapse runs of spaces within lines and runs of blank lines.
fn collapse_whitespace(text: &str) -> String {
    let mut out: Vec<String> = Vec::new();
    let mut last_blank = true;
    for line in text.lines() {
        let collapsed = line.split_whitespace().collect::<Vec<_>>().join(" ");
        if collapsed.is_empty() {
            if !last_blank {
                out.push(String::new());
            }
            last_blank = true;
        } else {
            out.push(collapsed);
            last_blank = false;
        }
    }
    while out.last().is_some_and(|l| l.is_empty()) {
        out.pop();
    }
    out.join("\n")
}

/// Every URL in the body: `href` targets first, then bare URLs, in order.
pub fn extract_urls(body: &str) -> Vec<String> {
    let mut urls: Vec<String> = HREF
        .captures_iter(body)
        .filter_map(|caps| caps.get(1).or_else(|| caps.get(2)))
        .map(|m| m.as_str().trim().replace("&amp;", "&"))
        .filter(|u| u.starts_with("http://") || u.starts_with("https://"))
        .collect();

    urls.extend(BARE_URL.find_iter(body).map(|m| {
        m.as_str()
            .replace("&amp;", "&")
            .trim_end_matches(['.', ',', ';', ':', '!', '?', ')', '\''])
            .to_string()
    }));
    urls
}

/// Resolve redirect wrappers (Outlook safe links, Google `/url`, generic
/// `?url=` redirectors) to their destination.
pub fn unwrap_redirect(url: &str) -> String {
    let mut current = url.to_string();
    for _ in 0..MAX_REDIRECT_DEPTH {
        match redirect_target(&current) {
            Some(next) if next != current => current = next,
            _ => break,
        }
    }
    current
}

fn redirect_target(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?.to_lowercase();

    let params: &[&str] = if host.ends_with("safelinks.protection.outlook.com") {
        &["url"]
    } else if host.contains("google.") && parsed.path() == "/url" {
        &["q", "url"]
    } else {
        REDIRECT_PARAMS
    };

    parsed
        .query_pairs()
        .find(|(k, v)| {
            params.contains(&k.to_lowercase().as_str())
                && (v.starts_with("http://") || v.starts_with("https://"))
        })
        .map(|(_, v)| v.into_owned())
}

/// Drop fragments and tracking parameters. `None` for anything that is not
/// an absolute http(s) URL.
pub fn clean_url(url: &str) -> Option<String> {
    let mut parsed = Url::parse(url).ok()?;
    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
        return None;
    }
    parsed.set_fragment(None);

    let kept: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(k, _)| {
            let k = k.to_lowercase();
            !k.starts_with("utm_") && !TRACKING_PARAMS.contains(&k.as_str())
        })
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    if kept.is_empty() {
        parsed.set_query(None);
    } else {
        parsed.query_pairs_mut().clear().extend_pairs(kept);
    }
    Some(parsed.to_string())
}

/// Whether a cleaned URL points at an opportunity page.
pub fn is_opportunity_url(url: &str) -> bool {
    let lower = url.to_lowercase();
    if NOISE_MARKERS.iter().any(|m| lower.contains(m)) {
        return false;
    }

    let Ok(parsed) = Url::parse(&lower) else {
        return false;
    };
    let path = parsed.path();
    if IMAGE_EXTENSIONS.iter().any(|ext| path.ends_with(ext)) {
        return false;
    }

    let host = parsed.host_str().unwrap_or_default();
    host.starts_with("jobs.")
        || host.starts_with("careers.")
        || OPPORTUNITY_PATHS.iter().any(|p| path.contains(p))
}
