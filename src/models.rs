//! Record types shared by every pipeline stage.
//!
//! - [`Member`]: a member of parliament, built from the overview listing plus
//!   the member's detail page
//! - [`BusinessItem`]: a "Geschäft" listed on a member page, back-filled from
//!   its detail page
//! - [`Document`]: an attachment of a business item
//! - [`FileRecord`]: a tagged PDF written to disk
//!
//! Field names serialize to the column names used by the store
//! (`memberid`, `gesid`, `docid`, ...), so the JSON and SQLite views agree.

use serde::{Deserialize, Serialize};

/// Type/status code used when a label is missing from the lookup table.
pub const UNKNOWN_CODE: u32 = 99;

/// One person block of the member overview listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberSummary {
    pub id: i64,
    pub display_name: String,
}

/// A member of parliament.
///
/// Every profile field is optional: a detail page missing a label yields
/// `None` for that field instead of failing the member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    #[serde(rename = "memberid")]
    pub id: i64,
    #[serde(rename = "memberFirstName")]
    pub first_name: Option<String>,
    #[serde(rename = "memberLastName")]
    pub last_name: Option<String>,
    #[serde(rename = "memberParty")]
    pub party: Option<String>,
    #[serde(rename = "memberDistrict")]
    pub district: Option<String>,
}

impl Member {
    /// `"<first> <last>"`, or whichever half is present.
    pub fn display_name(&self) -> Option<String> {
        match (self.first_name.as_deref(), self.last_name.as_deref()) {
            (Some(first), Some(last)) => Some(format!("{first} {last}")),
            (Some(only), None) | (None, Some(only)) => Some(only.to_string()),
            (None, None) => None,
        }
    }
}

/// A business item ("Geschäft"), identifier shaped `YY.NNNN`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusinessItem {
    #[serde(rename = "gesid")]
    pub id: String,
    #[serde(rename = "memberid")]
    pub member_id: i64,
    #[serde(rename = "ges_titel")]
    pub title: Option<String>,
    #[serde(rename = "ges_type")]
    pub type_code: Option<u32>,
    #[serde(rename = "ges_status")]
    pub status_code: Option<u32>,
    /// `DD.MM.YYYY` as shown on the site.
    #[serde(rename = "ges_date")]
    pub start_date: Option<String>,
    #[serde(rename = "ges_url")]
    pub url: Option<String>,
}

/// A document attached to a business item, identifier shaped `YY.NNNN.NN`.
///
/// `business_id` is derived from the identifier during reconciliation; the
/// site never states it explicitly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    #[serde(rename = "docid")]
    pub id: String,
    #[serde(rename = "gesid")]
    pub business_id: Option<String>,
    pub doc_type: Option<String>,
    pub creator: Option<i64>,
    pub doc_date: Option<String>,
    pub doc_url: Option<String>,
}

/// A tagged PDF on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    #[serde(rename = "fileid")]
    pub file_id: String,
    #[serde(rename = "docid")]
    pub doc_id: String,
    pub path: String,
}
