//! Run notification
//!
//! Builds the status message from the final [`RunSummary`] and sends it
//! with Graph `sendMail`. Composition is pure; only [`Notifier::send`]
//! talks to the network.

use super::{GraphClient, GraphError};
use chrono::NaiveDateTime;
use percent_encoding::percent_decode_str;
use reqwest::Method;
use serde_json::json;
use std::fmt::Write as _;
use tracing::info;
use wqr_common::config::{MailSettings, MessageFormat};
use wqr_common::dates::DateRange;
use wqr_common::summary::RunSummary;

/// A composed message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageContent {
    pub subject: String,
    pub body: String,
    pub format: MessageFormat,
}

impl MessageContent {
    /// Graph `contentType` value
    pub fn content_type(&self) -> &'static str {
        match self.format {
            MessageFormat::Html => "HTML",
            MessageFormat::Text => "Text",
        }
    }
}

/// Run facts shown in the message header
#[derive(Debug, Clone, Copy)]
pub struct MessageContext {
    pub generated_at: NaiveDateTime,
    pub date_range: DateRange,
}

/// Display form of a file name (`%20` and friends decoded)
pub fn display_name(name: &str) -> String {
    percent_decode_str(name).decode_utf8_lossy().to_string()
}

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Mailbox address from `addr` or `Display Name <addr>`
pub fn sender_address(raw: &str) -> String {
    let raw = raw.trim();
    match raw.rfind('<') {
        Some(start) => raw[start + 1..].trim_end_matches('>').trim().to_string(),
        None => raw.to_string(),
    }
}

/// Recipients from a comma- or semicolon-separated list
pub fn recipients(raw: &str) -> Vec<String> {
    raw.split(|c| c == ',' || c == ';')
        .map(sender_address)
        .filter(|a| !a.is_empty())
        .collect()
}

pub fn compose(summary: &RunSummary, context: &MessageContext, format: MessageFormat) -> MessageContent {
    let outcome = summary.outcome();
    let subject = format!("Water Reports Automation - {}", outcome.label());
    let body = match format {
        MessageFormat::Html => html_body(summary, context),
        MessageFormat::Text => text_body(summary, context),
    };
    MessageContent {
        subject,
        body,
        format,
    }
}

fn html_body(summary: &RunSummary, context: &MessageContext) -> String {
    const NONE: &str = "&nbsp;&nbsp;None";
    let outcome = summary.outcome();

    let downloaded = if summary.downloaded.is_empty() {
        NONE.to_string()
    } else {
        summary
            .downloaded
            .iter()
            .enumerate()
            .map(|(i, f)| format!("&nbsp;&nbsp;{}. {}", i + 1, escape_html(&display_name(&f.file_name()))))
            .collect::<Vec<_>>()
            .join("<br>")
    };

    let uploaded = if summary.uploaded.is_empty() {
        NONE.to_string()
    } else {
        summary
            .uploaded
            .iter()
            .enumerate()
            .map(|(i, f)| {
                let name = escape_html(&display_name(&f.name));
                match &f.web_url {
                    Some(url) => format!(
                        "&nbsp;&nbsp;{}. <a href=\"{}\" style=\"color: #007bff; text-decoration: none;\">{}</a>",
                        i + 1,
                        escape_html(url),
                        name
                    ),
                    None => format!("&nbsp;&nbsp;{}. {}", i + 1, name),
                }
            })
            .collect::<Vec<_>>()
            .join("<br>")
    };

    let errors = if summary.errors.is_empty() {
        NONE.to_string()
    } else {
        summary
            .errors
            .iter()
            .map(|e| format!("&nbsp;&nbsp;&bull; {}", escape_html(&e.message)))
            .collect::<Vec<_>>()
            .join("<br>")
    };

    format!(
        r#"<html>
<head>
<style>
  body {{ font-family: Arial, sans-serif; line-height: 1.6; color: #333; }}
  .container {{ max-width: 600px; margin: 0 auto; padding: 20px; }}
  .header {{ background-color: {color}; color: white; padding: 20px; border-radius: 5px 5px 0 0; }}
  .content {{ background-color: #f9f9f9; padding: 20px; border: 1px solid #ddd; border-radius: 0 0 5px 5px; }}
  .section {{ margin-bottom: 20px; }}
  .section-title {{ font-weight: bold; color: #555; margin-bottom: 10px; }}
  .footer {{ margin-top: 20px; padding-top: 20px; border-top: 1px solid #ddd; font-size: 12px; color: #777; }}
</style>
</head>
<body>
<div class="container">
  <div class="header">
    <h2 style="margin: 0;">Water Reports Automation</h2>
    <p style="margin: 5px 0 0 0;">Status: {label}</p>
  </div>
  <div class="content">
    <div class="section">
      <div class="section-title">Date:</div>
      {generated_at} (reports for {range})
    </div>
    <div class="section">
      <div class="section-title">Downloaded Reports ({downloaded_count}):</div>
      {downloaded}
    </div>
    <div class="section">
      <div class="section-title">Uploaded to SharePoint ({uploaded_count}):</div>
      {uploaded}
    </div>
    <div class="section">
      <div class="section-title">Errors ({error_count}):</div>
      {errors}
    </div>
    <div class="footer">
      This is an automated message from the water report automation system.
    </div>
  </div>
</div>
</body>
</html>
"#,
        color = outcome.color(),
        label = outcome.label(),
        generated_at = context.generated_at.format("%Y-%m-%d %H:%M:%S"),
        range = context.date_range,
        downloaded_count = summary.downloaded.len(),
        downloaded = downloaded,
        uploaded_count = summary.uploaded.len(),
        uploaded = uploaded,
        error_count = summary.errors.len(),
        errors = errors,
    )
}

fn text_body(summary: &RunSummary, context: &MessageContext) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Water Reports Automation");
    let _ = writeln!(out, "Status: {}", summary.outcome().label());
    let _ = writeln!(
        out,
        "Date: {} (reports for {})",
        context.generated_at.format("%Y-%m-%d %H:%M:%S"),
        context.date_range
    );

    let _ = writeln!(out, "\nDownloaded Reports ({}):", summary.downloaded.len());
    if summary.downloaded.is_empty() {
        let _ = writeln!(out, "  None");
    }
    for (i, f) in summary.downloaded.iter().enumerate() {
        let _ = writeln!(out, "  {}. {}", i + 1, display_name(&f.file_name()));
    }

    let _ = writeln!(out, "\nUploaded to SharePoint ({}):", summary.uploaded.len());
    if summary.uploaded.is_empty() {
        let _ = writeln!(out, "  None");
    }
    for (i, f) in summary.uploaded.iter().enumerate() {
        match &f.web_url {
            Some(url) => {
                let _ = writeln!(out, "  {}. {} <{}>", i + 1, display_name(&f.name), url);
            }
            None => {
                let _ = writeln!(out, "  {}. {}", i + 1, display_name(&f.name));
            }
        }
    }

    let _ = writeln!(out, "\nErrors ({}):", summary.errors.len());
    if summary.errors.is_empty() {
        let _ = writeln!(out, "  None");
    }
    for e in &summary.errors {
        let _ = writeln!(out, "  - {}", e.message);
    }
    out
}

pub struct Notifier<'a> {
    client: &'a GraphClient,
    settings: &'a MailSettings,
}

impl<'a> Notifier<'a> {
    pub fn new(client: &'a GraphClient, settings: &'a MailSettings) -> Self {
        Self { client, settings }
    }

    /// `POST users/{sender}/sendMail`; Graph answers 202 on acceptance
    pub async fn send(&self, message: &MessageContent) -> Result<(), GraphError> {
        let sender = sender_address(&self.settings.sender);
        let to: Vec<_> = recipients(&self.settings.to)
            .into_iter()
            .map(|address| json!({ "emailAddress": { "address": address } }))
            .collect();

        let payload = json!({
            "message": {
                "subject": message.subject,
                "body": {
                    "contentType": message.content_type(),
                    "content": message.body,
                },
                "toRecipients": to,
            },
            "saveToSentItems": "true",
        });

        info!("Sending notification email via Microsoft Graph");
        let request = self
            .client
            .request(Method::POST, &format!("users/{}/sendMail", sender))
            .await?
            .json(&payload);
        self.client
            .send(request, "Failed to send email", &[202])
            .await?;
        info!("Notification email sent");
        Ok(())
    }
}
