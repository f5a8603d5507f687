//! Structural extraction of records from the parliament's HTML pages.
//!
//! Every extractor works on structure, never on free text: table cells by
//! position or header, `dt`/`dd` pairs by label, attributes by name.
//!
//! | Page | Module | Produces |
//! |------|--------|----------|
//! | Member overview (search POST) | [`members`] | `MemberSummary` |
//! | Member detail | [`members`] | `Member` |
//! | Member detail, business table | [`business`] | `BusinessItem` |
//! | Member detail, document table | [`business`] | `Document` |
//! | Business detail | [`business`] | `BusinessDetail`, `Document` |
//!
//! # Tolerance
//!
//! A missing table yields no rows. A missing cell yields `None` for that field
//! and the remaining rows are still extracted. Rows without an identifier
//! cannot become records and are skipped.

use itertools::Itertools;
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use url::Url;

pub mod business;
pub mod members;

static TR: Lazy<Selector> = Lazy::new(|| selector("tr"));
static TH: Lazy<Selector> = Lazy::new(|| selector("th"));
static TD: Lazy<Selector> = Lazy::new(|| selector("td"));
static CELL: Lazy<Selector> = Lazy::new(|| selector("th, td"));
static LINK: Lazy<Selector> = Lazy::new(|| selector("a[href]"));

/// Parse a selector known at compile time.
pub(crate) fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("static selector must parse")
}

/// One table cell: display text plus the target of its first link.
///
/// Equality looks at the text only; the link rides along.
#[derive(Debug, Clone)]
pub struct Cell {
    pub text: String,
    pub link: Option<String>,
}

impl PartialEq for Cell {
    fn eq(&self, other: &Self) -> bool {
        self.text == other.text
    }
}

impl Eq for Cell {}

impl Cell {
    /// The text, or `None` when the cell is blank.
    pub fn value(&self) -> Option<String> {
        (!self.text.is_empty()).then(|| self.text.clone())
    }

    fn from_element(el: ElementRef<'_>, origin: &Url) -> Self {
        let link = el
            .select(&LINK)
            .next()
            .and_then(|a| a.value().attr("href"))
            .map(|href| resolve(origin, href));
        Self {
            text: element_text(el),
            link,
        }
    }
}

/// Whitespace-collapsed text content of an element.
pub fn element_text(el: ElementRef<'_>) -> String {
    el.text().flat_map(str::split_whitespace).join(" ")
}

/// Resolve `href` against `origin`; unparsable links are kept verbatim.
pub fn resolve(origin: &Url, href: &str) -> String {
    origin
        .join(href.trim())
        .map(|u| u.to_string())
        .unwrap_or_else(|_| href.to_string())
}

/// A parsed `<table>`: header texts and the `td` cells of each body row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl Table {
    /// Column index of `header`, or `fallback` when the table has no header row.
    pub fn column(&self, header: &str, fallback: usize) -> Option<usize> {
        if self.headers.is_empty() {
            return Some(fallback);
        }
        self.headers.iter().position(|h| h == header)
    }
}

/// Find the first table matching `css` and split it into header and rows.
///
/// Rows made only of `th` cells contribute headers; rows without any
/// non-blank `td` are dropped, so a placeholder row in an empty table
/// yields no rows.
pub fn extract_table(doc: &Html, css: &str, origin: &Url) -> Option<Table> {
    let table_sel = Selector::parse(css).ok()?;
    let table = doc.select(&table_sel).next()?;
    let mut out = Table::default();
    for tr in table.select(&TR) {
        let cells: Vec<Cell> = tr.select(&TD).map(|td| Cell::from_element(td, origin)).collect();
        if cells.is_empty() {
            if out.headers.is_empty() {
                out.headers = tr.select(&TH).map(element_text).collect();
            }
            continue;
        }
        if cells.iter().all(|c| c.text.is_empty() && c.link.is_none()) {
            continue;
        }
        out.rows.push(cells);
    }
    Some(out)
}

/// Rows of a label/value table, every cell (`th` or `td`) kept in order.
pub fn extract_pairs_table(doc: &Html, css: &str, origin: &Url) -> Vec<Vec<Cell>> {
    let Ok(table_sel) = Selector::parse(css) else {
        return Vec::new();
    };
    doc.select(&table_sel)
        .next()
        .map(|table| {
            table
                .select(&TR)
                .map(|tr| tr.select(&CELL).map(|c| Cell::from_element(c, origin)).collect())
                .collect()
        })
        .unwrap_or_default()
}
