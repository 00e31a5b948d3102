//! Composes the report email and hands it to Graph.

use crate::config::Config;
use crate::graph::{ATTACHMENT_LIMIT_BYTES, GraphClient, MailError, OutgoingMail};
use crate::report::Report;
use anyhow::Context as _;
use chrono::NaiveDate;
use std::sync::LazyLock;
use tera::Tera;

static EMAIL_TEMPLATE: &str = "report_email.html";

static TEMPLATES: LazyLock<Tera> = LazyLock::new(|| {
    let mut tera = Tera::default();
    if let Err(e) = tera.add_raw_template(
        EMAIL_TEMPLATE,
        include_str!("../templates/report_email.html"),
    ) {
        eprintln!("Parsing error(s): {}", e);
        std::process::exit(1);
    }
    tera
});

/// Subject line, e.g. `Job Postings Report: 3 Job Posting(s) - 2025-06-02`.
pub fn subject(report_name: &str, count: usize, date: NaiveDate) -> String {
    format!(
        "{}: {} Job Posting(s) - {}",
        report_name,
        count,
        date.format("%Y-%m-%d")
    )
}

pub fn attachment_name(date: NaiveDate) -> String {
    format!("job-postings-{}.xlsx", date.format("%Y-%m-%d"))
}

fn render_body(report: &Report, config: &Config, attachment_name: &str) -> anyhow::Result<String> {
    let mut context = tera::Context::new();
    context.insert("report_name", &config.report_name);
    context.insert("count", &report.count);
    context.insert("skipped", &report.skipped);
    context.insert(
        "date",
        &report.generated_at.date_naive().format("%Y-%m-%d").to_string(),
    );
    context.insert(
        "generated_at",
        &report.generated_at.format("%Y-%m-%d %H:%M UTC").to_string(),
    );
    context.insert("attachment_name", attachment_name);
    context.insert("table", &report.table_html);
    TEMPLATES
        .render(EMAIL_TEMPLATE, &context)
        .context("rendering report email")
}

/// Sends the report. The size check runs before any network traffic.
pub async fn send_report(
    graph: &GraphClient,
    report: &Report,
    config: &Config,
) -> Result<(), MailError> {
    if report.workbook.len() > ATTACHMENT_LIMIT_BYTES {
        return Err(MailError::AttachmentTooLarge {
            size: report.workbook.len(),
        });
    }

    let date = report.generated_at.date_naive();
    let subject = subject(&config.report_name, report.count, date);
    let attachment_name = attachment_name(date);
    let html_body = render_body(report, config, &attachment_name).map_err(MailError::Compose)?;

    graph
        .send_mail(&OutgoingMail {
            subject: &subject,
            html_body: &html_body,
            to: &config.recipient_email,
            cc: &config.cc_recipients,
            attachment_name: &attachment_name,
            attachment: &report.workbook,
        })
        .await
}
