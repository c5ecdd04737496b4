//! Email ingestion: RFC 822 messages or JSON-serialised `EmailInput`s.

use std::path::Path;

use chrono::{DateTime, Utc};
use mail_parser::{Address, Message, MessageParser, PartType};

use crate::error::PipelineError;
use crate::pipeline::types::EmailInput;

/// Parse a raw RFC 822 message. The HTML body is preferred so that links
/// survive for the normalizer.
pub fn parse_rfc822(raw: &[u8]) -> Result<EmailInput, PipelineError> {
    let parsed = MessageParser::default()
        .parse(raw)
        .ok_or_else(|| PipelineError::Email("not an RFC 822 message".into()))?;

    let body = extract_body(&parsed);
    if body.trim().is_empty() && parsed.subject().is_none() {
        return Err(PipelineError::Email("message has no subject and no readable body".into()));
    }

    let mut recipients = extract_addresses(parsed.to());
    recipients.extend(extract_addresses(parsed.cc()));

    Ok(EmailInput {
        subject: parsed.subject().unwrap_or_default().trim().to_string(),
        sender: extract_addresses(parsed.from()).into_iter().next().unwrap_or_default(),
        recipients,
        date: parsed
            .date()
            .and_then(|d| DateTime::<Utc>::from_timestamp(d.to_timestamp(), 0)),
        body,
    })
}

/// Load an email from disk: `.json` files hold a serialised `EmailInput`,
/// anything else is parsed as RFC 822.
pub async fn load_email_file(path: &Path) -> Result<EmailInput, PipelineError> {
    let raw = tokio::fs::read(path)
        .await
        .map_err(|e| PipelineError::Email(format!("{}: {e}", path.display())))?;

    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));
    if is_json {
        serde_json::from_slice(&raw).map_err(|e| PipelineError::Email(format!("{}: {e}", path.display())))
    } else {
        parse_rfc822(&raw)
    }
}

/// The first genuine HTML part, else the text body. `body_html` is not used
/// because it renders plain-text messages as HTML.
fn extract_body(parsed: &Message) -> String {
    let html = parsed.html_part(0).and_then(|part| match &part.body {
        PartType::Html(html) => Some(html.to_string()),
        _ => None,
    });
    if let Some(html) = html {
        return html;
    }
    parsed
        .body_text(0)
        .map(|t| t.into_owned())
        .unwrap_or_default()
}

fn extract_addresses(addr: Option<&Address>) -> Vec<String> {
    let Some(addr) = addr else {
        return Vec::new();
    };
    match addr {
        Address::List(addrs) => addrs
            .iter()
            .filter_map(|a| a.address.as_ref().map(|s| s.to_string()))
            .collect(),
        Address::Group(groups) => groups
            .iter()
            .flat_map(|g| {
                g.addresses
                    .iter()
                    .filter_map(|a| a.address.as_ref().map(|s| s.to_string()))
            })
            .collect(),
    }
}
