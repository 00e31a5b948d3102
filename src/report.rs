//! Turns a batch of postings into the report artifacts: an xlsx workbook
//! for the attachment and an HTML table for the email body.

use crate::db::PostingRecord;
use chrono::{DateTime, Utc};
use rust_xlsxwriter::{Format, Workbook, XlsxError};
use std::fmt;

/// Column order shared by the worksheet and the HTML table.
pub static COLUMNS: [&str; 8] = [
    "ID",
    "Title",
    "Company",
    "Location",
    "Posted",
    "URL",
    "Salary",
    "Description",
];

static WORKSHEET_NAME: &str = "Postings";

/// What to do when a row fails validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MalformedPolicy {
    /// Drop the row, log it, and keep going.
    Skip,
    /// Fail the whole run.
    Abort,
}

impl std::str::FromStr for MalformedPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<MalformedPolicy, String> {
        match s {
            "skip" => Ok(MalformedPolicy::Skip),
            "abort" => Ok(MalformedPolicy::Abort),
            other => Err(format!("expected `skip` or `abort`, got `{}`", other)),
        }
    }
}

/// A fully rendered report, ready to hand to the dispatcher.
#[derive(Debug)]
pub struct Report {
    /// The xlsx attachment, already serialized.
    pub workbook: Vec<u8>,
    /// The `<table>` fragment for the email body. Unstyled; the email
    /// template brings the CSS.
    pub table_html: String,
    /// Rows that made it into the report.
    pub count: usize,
    /// Rows dropped by [`MalformedPolicy::Skip`].
    pub skipped: usize,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug)]
pub enum FormattingError {
    /// A malformed row under [`MalformedPolicy::Abort`].
    MissingTitle { id: i64 },
    Workbook(XlsxError),
}

impl std::error::Error for FormattingError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FormattingError::MissingTitle { .. } => None,
            FormattingError::Workbook(e) => Some(e),
        }
    }
}

impl fmt::Display for FormattingError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            FormattingError::MissingTitle { id } => {
                write!(f, "posting {} has no title", id)
            }
            FormattingError::Workbook(e) => write!(f, "writing workbook failed: {}", e),
        }
    }
}

/// Validates the batch and renders both artifacts. The same filtered set
/// of rows feeds the workbook, the table, and `count`, so the subject
/// line can never disagree with the attachment.
pub fn build_report(
    records: &[PostingRecord],
    policy: MalformedPolicy,
    generated_at: DateTime<Utc>,
) -> Result<Report, FormattingError> {
    let mut kept = Vec::with_capacity(records.len());
    let mut skipped = 0;
    for record in records {
        if record.is_well_formed() {
            kept.push(record);
        } else {
            match policy {
                MalformedPolicy::Skip => {
                    tracing::warn!("skipping posting {} with no title", record.id);
                    skipped += 1;
                }
                MalformedPolicy::Abort => {
                    return Err(FormattingError::MissingTitle { id: record.id });
                }
            }
        }
    }

    let workbook = write_workbook(&kept).map_err(FormattingError::Workbook)?;
    let table_html = render_table(&kept);

    Ok(Report {
        workbook,
        table_html,
        count: kept.len(),
        skipped,
        generated_at,
    })
}

fn write_workbook(records: &[&PostingRecord]) -> Result<Vec<u8>, XlsxError> {
    let mut workbook = Workbook::new();
    let header = Format::new().set_bold();

    let worksheet = workbook.add_worksheet();
    worksheet.set_name(WORKSHEET_NAME)?;
    for (col, name) in COLUMNS.iter().enumerate() {
        worksheet.write_string_with_format(0, col as u16, *name, &header)?;
    }

    for (idx, record) in records.iter().enumerate() {
        let row = (idx + 1) as u32;
        worksheet.write_number(row, 0, record.id as f64)?;
        worksheet.write_string(row, 1, record.title.as_deref().unwrap_or(""))?;
        worksheet.write_string(row, 2, record.company.as_deref().unwrap_or(""))?;
        worksheet.write_string(row, 3, record.location.as_deref().unwrap_or(""))?;
        worksheet.write_string(row, 4, &posted_on(record))?;
        worksheet.write_string(row, 5, record.url.as_deref().unwrap_or(""))?;
        worksheet.write_string(row, 6, record.salary.as_deref().unwrap_or(""))?;
        worksheet.write_string(row, 7, record.description.as_deref().unwrap_or(""))?;
    }

    // Leave ID at the default width, widen the text-heavy columns.
    worksheet.set_column_width(1, 36)?;
    worksheet.set_column_width(2, 24)?;
    worksheet.set_column_width(3, 24)?;
    worksheet.set_column_width(5, 40)?;
    worksheet.set_column_width(7, 60)?;

    workbook.save_to_buffer()
}

fn render_table(records: &[&PostingRecord]) -> String {
    let mut html = String::new();
    html.push_str("<table>\n  <thead>\n    <tr>");
    for name in COLUMNS {
        html.push_str("<th>");
        html.push_str(name);
        html.push_str("</th>");
    }
    html.push_str("</tr>\n  </thead>\n  <tbody>\n");
    for record in records {
        html.push_str("    <tr>");
        push_cell(&mut html, &record.id.to_string());
        push_cell(&mut html, record.title.as_deref().unwrap_or(""));
        push_cell(&mut html, record.company.as_deref().unwrap_or(""));
        push_cell(&mut html, record.location.as_deref().unwrap_or(""));
        push_cell(&mut html, &posted_on(record));
        push_link_cell(&mut html, record.url.as_deref());
        push_cell(&mut html, record.salary.as_deref().unwrap_or(""));
        push_cell(&mut html, record.description.as_deref().unwrap_or(""));
        html.push_str("</tr>\n");
    }
    html.push_str("  </tbody>\n</table>");
    html
}

fn push_cell(html: &mut String, text: &str) {
    html.push_str("<td>");
    html.push_str(&escaped(text));
    html.push_str("</td>");
}

fn push_link_cell(html: &mut String, url: Option<&str>) {
    match url {
        Some(url) => {
            let escaped = escaped(url);
            html.push_str("<td><a href=\"");
            html.push_str(&escaped);
            html.push_str("\">");
            html.push_str(&escaped);
            html.push_str("</a></td>");
        }
        None => html.push_str("<td></td>"),
    }
}

fn escaped(text: &str) -> String {
    let mut out = String::new();
    pulldown_cmark_escape::escape_html(&mut out, text)
        .expect("writing into a String cannot fail");
    out
}

fn posted_on(record: &PostingRecord) -> String {
    record
        .posted_at
        .map(|t| t.format("%Y-%m-%d").to_string())
        .unwrap_or_default()
}
