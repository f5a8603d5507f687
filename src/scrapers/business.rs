//! Business item and document table extraction.
//!
//! Both the member page and each business detail page carry tables whose
//! cells hold display text and a link. The business identifier cell links to
//! the business detail page; the document title cell links to the PDF.

use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use tracing::debug;
use url::Url;

use super::{Cell, Table, element_text, extract_pairs_table, extract_table, selector};
use crate::models::{BusinessItem, Document};

/// Business listing on a member page: date, identifier (linked), title.
pub const BUSINESS_LIST_TABLE: &str = "table#table_geschaefte";
/// Document listing on a member page, same columns as [`DOCUMENT_TABLE`].
pub const DOCUMENT_LIST_TABLE: &str = "table#table_dokumente";
/// Label/value summary on a business detail page.
pub const RESUME_TABLE: &str = "table#detail_table_geschaeft_resumee";
/// Attachments of a business detail page.
pub const DOCUMENT_TABLE: &str = "table#detail_table_geschaeft_dokumente";

static TITLE: Lazy<Selector> = Lazy::new(|| selector(".title"));

// Row positions inside the resume table.
const RESUME_ID: usize = 0;
const RESUME_TYPE: usize = 1;
const RESUME_CREATOR: usize = 2;
const RESUME_START: usize = 3;
const RESUME_STATUS: usize = 4;

/// Summary fields of a business detail page, as shown (labels unresolved).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BusinessDetail {
    pub id: Option<String>,
    pub type_label: Option<String>,
    pub creator: Option<String>,
    pub start_date: Option<String>,
    pub status_label: Option<String>,
    pub title: Option<String>,
    /// URL the page was fetched from; filled in by the caller.
    pub url: Option<String>,
}

fn cell_value(row: &[Cell], idx: usize) -> Option<String> {
    row.get(idx).and_then(Cell::value)
}

/// Business items listed on a member page, owned by `member_id`.
pub fn parse_business_listing(html: &str, member_id: i64, origin: &Url) -> Vec<BusinessItem> {
    let doc = Html::parse_document(html);
    let Some(table) = extract_table(&doc, BUSINESS_LIST_TABLE, origin) else {
        debug!(member_id, "No business table on member page");
        return Vec::new();
    };
    let items: Vec<BusinessItem> = table
        .rows
        .iter()
        .filter_map(|row| {
            let id_cell = row.get(1)?;
            let id = id_cell.value()?;
            Some(BusinessItem {
                id,
                member_id,
                title: cell_value(row, 2),
                type_code: None,
                status_code: None,
                start_date: cell_value(row, 0),
                url: id_cell.link.clone(),
            })
        })
        .collect();
    debug!(member_id, count = items.len(), "Parsed business listing");
    items
}

/// Resume fields and title of a business detail page.
pub fn parse_business_detail(html: &str, origin: &Url) -> BusinessDetail {
    let doc = Html::parse_document(html);
    let rows = extract_pairs_table(&doc, RESUME_TABLE, origin);
    // The value is the second cell of each label/value row.
    let value = |idx: usize| rows.get(idx).and_then(|row| cell_value(row, 1));
    BusinessDetail {
        id: value(RESUME_ID),
        type_label: value(RESUME_TYPE),
        creator: value(RESUME_CREATOR),
        start_date: value(RESUME_START),
        status_label: value(RESUME_STATUS),
        title: doc
            .select(&TITLE)
            .next()
            .map(element_text)
            .filter(|t| !t.is_empty()),
        url: None,
    }
}

/// Documents of the table matching `css`, attributed to `creator`.
///
/// Columns are found by their `Nummer`/`Datum`/`Titel` headers, or by
/// position 0/1/2 when the table has no header row. The document URL is the
/// title cell's link, else the number cell's link.
///
/// # Arguments
///
/// * `html` - Page source
/// * `css` - Selector of the document table
/// * `creator` - Member id recorded as each document's creator
/// * `origin` - Base URL for relative links
///
/// # Returns
///
/// One [`Document`] per data row; empty when the table is missing.
pub fn parse_document_table(html: &str, css: &str, creator: i64, origin: &Url) -> Vec<Document> {
    let doc = Html::parse_document(html);
    match extract_table(&doc, css, origin) {
        Some(table) => documents_from_table(&table, creator),
        None => Vec::new(),
    }
}

/// Attachments listed on a business detail page.
pub fn parse_detail_documents(html: &str, creator: i64, origin: &Url) -> Vec<Document> {
    parse_document_table(html, DOCUMENT_TABLE, creator, origin)
}

/// Documents listed on a member page.
pub fn parse_document_listing(html: &str, creator: i64, origin: &Url) -> Vec<Document> {
    parse_document_table(html, DOCUMENT_LIST_TABLE, creator, origin)
}

fn documents_from_table(table: &Table, creator: i64) -> Vec<Document> {
    let number = table.column("Nummer", 0);
    let date = table.column("Datum", 1);
    let title = table.column("Titel", 2);
    let Some(number) = number else {
        debug!(headers = ?table.headers, "Document table without a Nummer column");
        return Vec::new();
    };

    table
        .rows
        .iter()
        .filter_map(|row| {
            let number_cell = row.get(number)?;
            let id = number_cell.value()?;
            let title_cell = title.and_then(|i| row.get(i));
            Some(Document {
                id,
                business_id: None,
                doc_type: title_cell.and_then(Cell::value),
                creator: Some(creator),
                doc_date: date.and_then(|i| cell_value(row, i)),
                doc_url: title_cell
                    .and_then(|c| c.link.clone())
                    .or_else(|| number_cell.link.clone()),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn origin() -> Url {
        Url::parse("https://grosserrat.bs.ch").unwrap()
    }

    const MEMBER_PAGE: &str = r#"
        <table id="table_geschaefte">
          <thead><tr><th>Datum</th><th>Nr.</th><th>Titel</th></tr></thead>
          <tbody>
            <tr><td>01.02.2023</td><td><a href="/geschaefte/200112345">23.5153</a></td><td>Anzug betreffend Velowege</td></tr>
            <tr><td>05.05.2022</td><td><a href="/geschaefte/200100001">22.5001</a></td></tr>
            <tr><td>06.06.2021</td><td></td><td>ohne Nummer</td></tr>
          </tbody>
        </table>
        <table id="table_dokumente">
          <tr><th>Nummer</th><th>Datum</th><th>Titel</th></tr>
          <tr><td>23.5153.01</td><td>01.02.2023</td><td><a href="/dokumente/100400001">Text Anzug</a></td></tr>
        </table>"#;

    const DETAIL_PAGE: &str = r#"
        <h3 class="h3 mobile-h4  title">Anzug betreffend  Velowege</h3>
        <table id="detail_table_geschaeft_resumee">
          <tr><th>Geschäftsnummer</th><td>23.5153</td></tr>
          <tr><th>Geschäftstyp</th><td>Anzug</td></tr>
          <tr><th>Urheber</th><td><a href="/mitglieder/42">Peter Muster</a></td></tr>
          <tr><th>Beginn</th><td>01.02.2023</td></tr>
          <tr><th>Status</th><td><span><span> erledigt </span></span></td></tr>
        </table>
        <table id="detail_table_geschaeft_dokumente">
          <thead><tr><th>Nummer</th><th>Datum</th><th>Titel</th></tr></thead>
          <tbody>
            <tr><td><a href="/dokumente/100400001">23.5153.01</a></td><td>01.02.2023</td><td><a href="/dokumente/100400001.pdf">Text Anzug</a></td></tr>
            <tr><td><a href="/dokumente/100400002">23.5153.02</a></td><td>10.03.2023</td><td>Schreiben des RR</td></tr>
            <tr><td>23.5153.03</td></tr>
          </tbody>
        </table>"#;

    #[test]
    fn test_business_listing_rows() {
        let items = parse_business_listing(MEMBER_PAGE, 42, &origin());
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].id, "23.5153");
        assert_eq!(items[0].member_id, 42);
        assert_eq!(items[0].start_date.as_deref(), Some("01.02.2023"));
        assert_eq!(items[0].title.as_deref(), Some("Anzug betreffend Velowege"));
        assert_eq!(
            items[0].url.as_deref(),
            Some("https://grosserrat.bs.ch/geschaefte/200112345")
        );
        // Missing title cell is recorded as None, row still extracted.
        assert_eq!(items[1].id, "22.5001");
        assert_eq!(items[1].title, None);
    }

    #[test]
    fn test_document_listing_on_member_page() {
        let docs = parse_document_listing(MEMBER_PAGE, 42, &origin());
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].id, "23.5153.01");
        assert_eq!(
            docs[0].doc_url.as_deref(),
            Some("https://grosserrat.bs.ch/dokumente/100400001")
        );
    }

    #[test]
    fn test_business_detail_fields() {
        let detail = parse_business_detail(DETAIL_PAGE, &origin());
        assert_eq!(
            detail,
            BusinessDetail {
                id: Some("23.5153".into()),
                type_label: Some("Anzug".into()),
                creator: Some("Peter Muster".into()),
                start_date: Some("01.02.2023".into()),
                status_label: Some("erledigt".into()),
                title: Some("Anzug betreffend Velowege".into()),
                url: None,
            }
        );
    }

    #[test]
    fn test_detail_documents_text_and_link_per_cell() {
        let docs = parse_detail_documents(DETAIL_PAGE, 42, &origin());
        assert_eq!(docs.len(), 3);
        assert_eq!(docs[0].doc_type.as_deref(), Some("Text Anzug"));
        assert_eq!(
            docs[0].doc_url.as_deref(),
            Some("https://grosserrat.bs.ch/dokumente/100400001.pdf")
        );
        // No link in the title cell: fall back to the number cell.
        assert_eq!(
            docs[1].doc_url.as_deref(),
            Some("https://grosserrat.bs.ch/dokumente/100400002")
        );
        // Short row: absent cells are None, the row survives.
        assert_eq!(docs[2].id, "23.5153.03");
        assert_eq!(docs[2].doc_date, None);
        assert_eq!(docs[2].doc_type, None);
        assert_eq!(docs[2].doc_url, None);
        assert!(docs.iter().all(|d| d.creator == Some(42) && d.business_id.is_none()));
    }

    #[test]
    fn test_empty_document_table_is_not_an_error() {
        let html = r#"
            <table id="detail_table_geschaeft_dokumente">
              <thead><tr><th>Nummer</th><th>Datum</th><th>Titel</th></tr></thead>
              <tbody></tbody>
            </table>"#;
        assert!(parse_detail_documents(html, 1, &origin()).is_empty());
        assert!(parse_detail_documents("<p>kein Geschäft</p>", 1, &origin()).is_empty());
    }

    #[test]
    fn test_detail_page_without_resume_table() {
        let detail = parse_business_detail("<html></html>", &origin());
        assert_eq!(detail, BusinessDetail::default());
    }

    #[test]
    fn test_headerless_document_table_uses_positions() {
        let html = r#"<table id="detail_table_geschaeft_dokumente">
              <tr><td>24.0101.01</td><td>02.01.2024</td><td><a href="/d/1">Bericht</a></td></tr>
            </table>"#;
        let docs = parse_detail_documents(html, 9, &origin());
        assert_eq!(docs[0].id, "24.0101.01");
        assert_eq!(docs[0].doc_date.as_deref(), Some("02.01.2024"));
        assert_eq!(docs[0].doc_type.as_deref(), Some("Bericht"));
    }
}
