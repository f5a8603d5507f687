//! Small helpers for identifiers, dates, logging and the file system.

use chrono::{DateTime, Local, NaiveDate, TimeZone};
use once_cell::sync::Lazy;
use regex::Regex;
use std::error::Error;
use std::fs as stdfs;
use std::path::Path;
use tokio::fs;
use tracing::{info, instrument};

/// `YY.NNNN`
pub static BUSINESS_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{2}\.\d{4}$").expect("static regex"));
/// `YY.NNNN.NN`
pub static DOCUMENT_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{2}\.\d{4}\.\d{2}$").expect("static regex"));

/// Date format used throughout the site.
pub const SITE_DATE: &str = "%d.%m.%Y";

/// File-system safe form of an identifier: dots become underscores.
///
/// ```ignore
/// assert_eq!(file_stem("23.5153.01"), "23_5153_01");
/// ```
pub fn file_stem(id: &str) -> String {
    id.trim().replace('.', "_")
}

/// Parse a `DD.MM.YYYY` site date.
pub fn parse_site_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), SITE_DATE).ok()
}

/// PDF date string (`D:YYYYMMDDHHmmSS+HH'mm'`) for a local timestamp.
pub fn pdf_timestamp<Tz: TimeZone>(at: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    let offset = at.format("%z").to_string();
    let (hours, minutes) = offset.split_at(offset.len().saturating_sub(2));
    format!("D:{}{}'{}'", at.format("%Y%m%d%H%M%S"), hours, minutes)
}

/// PDF date string for a site date; text that is not a site date is
/// returned unchanged.
pub fn pdf_date(site_date: &str) -> String {
    match parse_site_date(site_date) {
        Some(d) => format!("D:{}000000", d.format("%Y%m%d")),
        None => site_date.to_string(),
    }
}

/// Current local time as a PDF date string.
pub fn pdf_now() -> String {
    pdf_timestamp(&Local::now())
}

/// Truncate a string for logging purposes.
///
/// Long strings are cut to `max` bytes (on a char boundary) with an
/// ellipsis and the number of bytes dropped.
pub fn truncate_for_log(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut cut = max;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}…(+{} bytes)", &s[..cut], s.len() - cut)
}

/// Ensure a directory exists and is writable.
///
/// Creates the directory if needed, then writes and removes a probe file.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn ensure_writable_dir(path: &Path) -> Result<(), Box<dyn Error>> {
    fs::create_dir_all(path).await?;
    let probe_path = path.join("..__probe_write__");
    stdfs::File::create(&probe_path)?;
    let _ = stdfs::remove_file(&probe_path);
    info!("Output directory is writable");
    Ok(())
}
