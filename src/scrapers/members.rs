//! Member overview and member detail extraction.
//!
//! The overview is not a plain GET: it is the result of the site's filtered
//! member search, submitted as a form POST to `/mitglieder`. The filter
//! selects current or former members and a date range.

use chrono::{Local, NaiveDate};
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashMap;
use tracing::{debug, instrument, warn};

use super::{element_text, selector};
use crate::models::{Member, MemberSummary};

static PERSON: Lazy<Selector> = Lazy::new(|| selector("div.person"));
static PERSON_NAME: Lazy<Selector> = Lazy::new(|| selector("h1, h2, h3, h4, h5, .name"));
static DT: Lazy<Selector> = Lazy::new(|| selector("dt"));
static DD: Lazy<Selector> = Lazy::new(|| selector("dd"));

/// Earliest date the member search covers.
pub const SEARCH_FROM: &str = "2005-02-01";

/// Profile field → label shown on the member detail page.
pub const PROFILE_LABELS: [(&str, &str); 4] = [
    ("memberFirstName", "Vorname"),
    ("memberLastName", "Name"),
    ("memberParty", "Partei"),
    ("memberDistrict", "Wahlkreis"),
];

/// Member search filter.
#[derive(Debug, Clone)]
pub struct MemberSearch {
    /// Search former members instead of current ones.
    pub former: bool,
    pub from: NaiveDate,
    pub until: NaiveDate,
}

impl Default for MemberSearch {
    fn default() -> Self {
        Self {
            former: false,
            from: NaiveDate::parse_from_str(SEARCH_FROM, "%Y-%m-%d").unwrap_or_default(),
            until: Local::now().date_naive(),
        }
    }
}

impl MemberSearch {
    /// Form fields for the POST to `/mitglieder`.
    pub fn form(&self) -> Vec<(&'static str, String)> {
        vec![
            ("filter[reiter]", "MIT".to_string()),
            ("filter[search]", String::new()),
            ("filter[section]", String::new()),
            ("list[mit_limit]", String::new()),
            ("list[ordering]", "name".to_string()),
            ("list[direction]", "ASC".to_string()),
            ("template", "MITcards".to_string()),
            ("task", String::new()),
            ("boxchecked", "0".to_string()),
            ("list[fullordering]", "null+ASC".to_string()),
            ("filter[such_ehemalige_mit]", if self.former { "1" } else { "0" }.to_string()),
            ("filter[such_von_mit]", self.from.format("%Y-%m-%d").to_string()),
            ("filter[such_bis_mit]", self.until.format("%Y-%m-%d").to_string()),
        ]
    }
}

/// One [`MemberSummary`] per `div.person` block of the search result.
///
/// The identifier is the `data-uni_nr` attribute of the block's parent.
/// Blocks without a numeric identifier are skipped.
#[instrument(level = "info", skip_all)]
pub fn parse_member_overview(html: &str) -> Vec<MemberSummary> {
    let doc = Html::parse_document(html);
    let mut out = Vec::new();
    for person in doc.select(&PERSON) {
        let raw_id = person
            .parent()
            .and_then(ElementRef::wrap)
            .and_then(|p| p.value().attr("data-uni_nr"));
        let Some(id) = raw_id.and_then(|s| s.trim().parse::<i64>().ok()) else {
            warn!(raw_id = ?raw_id, "Person block without numeric data-uni_nr; skipping");
            continue;
        };
        let display_name = person
            .select(&PERSON_NAME)
            .next()
            .map(element_text)
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| element_text(person));
        out.push(MemberSummary { id, display_name });
    }
    debug!(count = out.len(), "Parsed member overview");
    out
}

/// Build a [`Member`] from a member detail page.
///
/// Labels are read from `dt`, values from the `dd` at the same position.
/// A label missing from the page leaves its field `None`.
pub fn parse_member_detail(id: i64, html: &str) -> Member {
    let doc = Html::parse_document(html);
    let labels = doc.select(&DT).map(element_text);
    let values = doc.select(&DD).map(element_text);
    // Later pairs win on repeated labels.
    let pairs: HashMap<String, String> = labels.zip(values).collect();

    let field = |label: &str| {
        pairs
            .get(label)
            .map(|v| v.trim_end().to_string())
            .filter(|v| !v.is_empty())
    };

    Member {
        id,
        first_name: field(PROFILE_LABELS[0].1),
        last_name: field(PROFILE_LABELS[1].1),
        party: field(PROFILE_LABELS[2].1),
        district: field(PROFILE_LABELS[3].1),
    }
}

/// Fall back to the overview name for members whose profile lacks names.
pub fn fill_names_from_summary(member: &mut Member, summary: &MemberSummary) {
    if member.first_name.is_some() || member.last_name.is_some() {
        return;
    }
    let mut parts = summary.display_name.rsplitn(2, ' ');
    let last = parts.next().filter(|s| !s.is_empty()).map(str::to_string);
    let first = parts.next().map(str::to_string);
    member.first_name = first;
    member.last_name = last;
}
