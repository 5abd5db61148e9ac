//! Notification emitter
//!
//! Renders backup events into e-mails and hands them to the mail sink.
//! Delivery problems are logged and never change a run's outcome.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::{
    format_size, BackupErrorPayload, BackupSuccessPayload, BackupSummaryPayload,
    NotificationEvent,
};
use crate::ports::{EmailRequest, NotificationSink};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedEmail {
    pub subject: String,
    pub text: String,
    pub html: String,
}

pub struct NotificationEmitter {
    sink: Arc<dyn NotificationSink>,
    recipients: Vec<String>,
}

impl NotificationEmitter {
    pub fn new(sink: Arc<dyn NotificationSink>, recipients: Vec<String>) -> Self {
        let recipients = recipients
            .into_iter()
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .collect();
        Self { sink, recipients }
    }

    pub fn recipients(&self) -> &[String] {
        &self.recipients
    }

    /// Render and deliver one event. Returns the request when it was handed off.
    pub async fn emit(&self, event: &NotificationEvent) -> Option<EmailRequest> {
        if self.recipients.is_empty() {
            debug!(kind = event.kind(), "No notification recipients, skipping");
            return None;
        }

        let rendered = render(event);
        let payload = match serde_json::to_value(event) {
            Ok(value) => value,
            Err(e) => {
                warn!(kind = event.kind(), error = %e, "Failed to serialize notification");
                return None;
            }
        };
        let request = EmailRequest {
            id: Uuid::new_v4(),
            notification_type: event.kind().to_string(),
            recipients: self.recipients.clone(),
            subject: rendered.subject,
            text: rendered.text,
            html: rendered.html,
            payload,
            created_at: Utc::now(),
        };

        match self.sink.deliver(&request).await {
            Ok(()) => {
                info!(kind = event.kind(), recipients = request.recipients.len(), "Notification queued");
                Some(request)
            }
            Err(e) => {
                warn!(kind = event.kind(), error = %e, "Failed to deliver notification");
                None
            }
        }
    }
}

fn seconds(ms: u64) -> String {
    format!("{:.1}s", ms as f64 / 1000.0)
}

fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn html_rows(rows: &[(&str, String)]) -> String {
    rows.iter()
        .map(|(label, value)| {
            format!(
                "<tr><td style=\"padding:4px 12px 4px 0;font-weight:bold\">{}</td><td>{}</td></tr>",
                label,
                escape(value)
            )
        })
        .collect()
}

fn text_rows(rows: &[(&str, String)]) -> String {
    rows.iter()
        .map(|(label, value)| format!("{}: {}\n", label, value))
        .collect()
}

fn wrap_html(title: &str, color: &str, body: &str) -> String {
    format!(
        "<div style=\"font-family:Arial,sans-serif;max-width:600px\">\
         <h2 style=\"color:{}\">{}</h2>{}\
         <p style=\"color:#888;font-size:12px\">Sent by DriveMirror</p></div>",
        color,
        escape(title),
        body
    )
}

/// Subject and bodies for an event
pub fn render(event: &NotificationEvent) -> RenderedEmail {
    match event {
        NotificationEvent::BackupSuccess(p) => render_success(p),
        NotificationEvent::BackupError(p) => render_error(p),
        NotificationEvent::BackupSummary(p) => render_summary(p),
    }
}

fn render_success(p: &BackupSuccessPayload) -> RenderedEmail {
    let mut rows = vec![
        ("Configuration", p.config_name.clone()),
        ("File", p.file_name.clone()),
        ("Size", format_size(p.file_size)),
        ("Source folders", p.source_folders.to_string()),
        ("Duration", seconds(p.processing_time_ms)),
    ];
    if p.deleted_old_backups > 0 {
        rows.push(("Old backups removed", p.deleted_old_backups.to_string()));
    }
    let title = format!("Backup completed: {}", p.config_name);
    RenderedEmail {
        subject: title.clone(),
        text: format!(
            "{}\n\n{}\nThe archive was uploaded to OneDrive and Google Drive.\n",
            title,
            text_rows(&rows)
        ),
        html: wrap_html(
            &title,
            "#2e7d32",
            &format!(
                "<table>{}</table><p>The archive was uploaded to OneDrive and Google Drive.</p>",
                html_rows(&rows)
            ),
        ),
    }
}

fn render_error(p: &BackupErrorPayload) -> RenderedEmail {
    let rows = vec![
        ("Configuration", p.config_name.clone()),
        ("Error", p.error.clone()),
        ("Duration", seconds(p.processing_time_ms)),
    ];
    let title = format!("Backup failed: {}", p.config_name);
    RenderedEmail {
        subject: title.clone(),
        text: format!("{}\n\n{}", title, text_rows(&rows)),
        html: wrap_html(
            &title,
            "#c62828",
            &format!("<table>{}</table>", html_rows(&rows)),
        ),
    }
}

fn render_summary(p: &BackupSummaryPayload) -> RenderedEmail {
    let subject = format!(
        "Backup summary: {}/{} succeeded",
        p.success_count, p.total_configs
    );
    let totals = vec![
        ("Configurations", p.total_configs.to_string()),
        ("Succeeded", p.success_count.to_string()),
        ("Failed", p.error_count.to_string()),
        ("Total duration", seconds(p.total_processing_time_ms)),
    ];

    let mut text = format!("{}\n\n{}\n", subject, text_rows(&totals));
    let mut items = String::new();
    for result in &p.results {
        let detail = if result.success {
            format!(
                "{} ({})",
                result.file_name.as_deref().unwrap_or("-"),
                format_size(result.file_size.unwrap_or(0))
            )
        } else {
            result
                .error
                .clone()
                .unwrap_or_else(|| "Unknown error".to_string())
        };
        let mark = if result.success { "OK" } else { "FAILED" };
        text.push_str(&format!("[{}] {}: {}\n", mark, result.config_name, detail));
        items.push_str(&format!(
            "<li><strong>{}</strong> {}: {}</li>",
            mark,
            escape(&result.config_name),
            escape(&detail)
        ));
    }

    let color = if p.error_count == 0 { "#2e7d32" } else { "#ef6c00" };
    RenderedEmail {
        html: wrap_html(
            &subject,
            color,
            &format!("<table>{}</table><ul>{}</ul>", html_rows(&totals), items),
        ),
        subject,
        text,
    }
}
