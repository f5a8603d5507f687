//! Merging records scraped from different pages into one consistent set.
//!
//! # Steps
//!
//! 1. Apply the [`corrections::CORRECTIONS`] table to every fresh record and
//!    collapse business items listed under several members to one
//! 2. Derive each document's business identifier from its own identifier
//! 3. Left-join detail-page fields (type, status, ...) onto the listing items
//! 4. Right-join detail-page documents onto the documents known from the
//!    listing pass; unknown detail rows are dropped. Without a listing pass
//!    every detail row is kept
//! 5. Flag document identifiers that occur more than once
//!
//! A step that finds no matches for a whole batch leaves its fields `None`
//! and logs a warning, so listing-only runs still produce persistable data.

use itertools::Itertools;
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::{info, instrument, warn};

pub mod corrections;

use crate::config::TypeLookup;
use crate::models::{BusinessItem, Document, UNKNOWN_CODE};
use crate::scrapers::business::BusinessDetail;
use crate::utils::{BUSINESS_ID, DOCUMENT_ID};
use corrections::{CORRECTIONS, CorrectionRule, apply_corrections};

/// Everything one harvest produced, before reconciliation.
#[derive(Debug, Clone, Default)]
pub struct ScrapeBatch {
    /// Items from the member pages' business tables.
    pub business: Vec<BusinessItem>,
    /// Summaries of the business detail pages that were fetched.
    pub details: Vec<BusinessDetail>,
    /// Documents from the member pages' document tables.
    pub listed_documents: Vec<Document>,
    /// Documents from the business detail pages' attachment tables.
    pub detail_documents: Vec<Document>,
}

/// Counters describing what reconciliation did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub corrections: usize,
    /// Identifiers still not of the expected shape after corrections.
    pub malformed_ids: Vec<String>,
    /// Business items removed because an earlier item had the same identifier.
    pub duplicate_business: usize,
    pub details_matched: usize,
    pub detail_documents_dropped: usize,
    /// Documents whose derived business identifier matches no item.
    pub orphan_documents: Vec<String>,
    /// Documents excluded from PDF tagging because their id repeats.
    pub excluded_documents: usize,
}

/// Reconciled record sets.
#[derive(Debug, Clone, Default)]
pub struct Reconciled {
    pub business: Vec<BusinessItem>,
    pub documents: Vec<Document>,
    /// Document identifiers occurring more than once.
    pub ambiguous: BTreeSet<String>,
    pub report: ReconcileReport,
}

impl Reconciled {
    /// Documents safe to tag: their identifier is unique in the set.
    pub fn eligible(&self) -> impl Iterator<Item = &Document> {
        eligible_documents(&self.documents, &self.ambiguous)
    }
}

/// Business identifier of a document: everything before the final
/// `.NN` segment. `23.5153.01` → `23.5153`.
///
/// Identifiers with fewer than two dots have no derivable prefix.
pub fn derive_business_prefix(doc_id: &str) -> Option<String> {
    let (prefix, _) = doc_id.trim().rsplit_once('.')?;
    prefix.contains('.').then(|| prefix.to_string())
}

/// Identifiers that occur more than once in `documents`.
pub fn ambiguous_ids(documents: &[Document]) -> BTreeSet<String> {
    documents
        .iter()
        .map(|d| d.id.as_str())
        .counts()
        .into_iter()
        .filter(|(_, n)| *n > 1)
        .map(|(id, _)| id.to_string())
        .collect()
}

/// Documents whose identifier is not in `ambiguous`.
pub fn eligible_documents<'a>(
    documents: &'a [Document],
    ambiguous: &'a BTreeSet<String>,
) -> impl Iterator<Item = &'a Document> {
    documents.iter().filter(move |d| !ambiguous.contains(&d.id))
}

/// Applies corrections and merges a [`ScrapeBatch`].
#[derive(Debug)]
pub struct Reconciler<'a> {
    lookup: &'a TypeLookup,
    rules: &'a [CorrectionRule],
}

impl<'a> Reconciler<'a> {
    /// A reconciler using the built-in correction table.
    pub fn new(lookup: &'a TypeLookup) -> Self {
        Self::with_rules(lookup, CORRECTIONS)
    }

    pub fn with_rules(lookup: &'a TypeLookup, rules: &'a [CorrectionRule]) -> Self {
        Self { lookup, rules }
    }

    /// Reconcile one harvest into persistable record sets.
    ///
    /// # Arguments
    ///
    /// * `batch` - Listing and detail records exactly as extracted
    ///
    /// # Returns
    ///
    /// Business items unique by identifier, the merged document set, the
    /// ambiguous document identifiers and a [`ReconcileReport`]. Never fails:
    /// a step without matches leaves its fields `None` and logs a warning.
    #[instrument(level = "info", skip_all, fields(
        business = batch.business.len(),
        details = batch.details.len(),
        listed_documents = batch.listed_documents.len(),
        detail_documents = batch.detail_documents.len(),
    ))]
    pub fn reconcile(&self, batch: ScrapeBatch) -> Reconciled {
        let ScrapeBatch {
            mut business,
            mut details,
            mut listed_documents,
            mut detail_documents,
        } = batch;
        let mut report = ReconcileReport::default();

        // 1. corrections
        report.corrections = apply_corrections(self.rules, &mut business)
            + apply_corrections(self.rules, &mut details)
            + apply_corrections(self.rules, &mut listed_documents)
            + apply_corrections(self.rules, &mut detail_documents);
        report.malformed_ids = business
            .iter()
            .map(|b| b.id.as_str())
            .filter(|id| !BUSINESS_ID.is_match(id))
            .chain(
                listed_documents
                    .iter()
                    .chain(detail_documents.iter())
                    .map(|d| d.id.as_str())
                    .filter(|id| !DOCUMENT_ID.is_match(id)),
            )
            .unique()
            .map(str::to_string)
            .collect();
        if !report.malformed_ids.is_empty() {
            warn!(ids = ?report.malformed_ids, "Identifiers with unexpected shape after corrections");
        }

        let before = business.len();
        business = business.into_iter().unique_by(|b| b.id.clone()).collect();
        report.duplicate_business = before - business.len();
        if report.duplicate_business > 0 {
            info!(
                removed = report.duplicate_business,
                "Collapsed business items listed under several members"
            );
        }

        // 2. document -> business linkage
        for doc in listed_documents.iter_mut().chain(detail_documents.iter_mut()) {
            doc.business_id = derive_business_prefix(&doc.id);
        }

        // 3. detail fields onto listing items
        report.details_matched = self.join_details(&mut business, &details);

        // 4. detail documents onto the known document set
        let (documents, dropped) = right_join_documents(listed_documents, detail_documents);
        report.detail_documents_dropped = dropped;

        // 5. ambiguity
        let ambiguous = ambiguous_ids(&documents);
        report.excluded_documents = documents
            .iter()
            .filter(|d| ambiguous.contains(&d.id))
            .count();

        let business_ids: HashSet<&str> = business.iter().map(|b| b.id.as_str()).collect();
        report.orphan_documents = documents
            .iter()
            .filter(|d| {
                d.business_id
                    .as_deref()
                    .is_none_or(|id| !business_ids.contains(id))
            })
            .map(|d| d.id.clone())
            .unique()
            .collect();
        if !report.orphan_documents.is_empty() {
            warn!(
                count = report.orphan_documents.len(),
                ids = ?report.orphan_documents,
                "Documents without a matching business item"
            );
        }

        info!(
            business = business.len(),
            documents = documents.len(),
            corrections = report.corrections,
            duplicates = report.duplicate_business,
            details_matched = report.details_matched,
            dropped = report.detail_documents_dropped,
            ambiguous = ambiguous.len(),
            excluded = report.excluded_documents,
            "Reconciled batch"
        );

        Reconciled {
            business,
            documents,
            ambiguous,
            report,
        }
    }

    /// Left join on identifier. Returns the number of items matched.
    fn join_details(&self, business: &mut [BusinessItem], details: &[BusinessDetail]) -> usize {
        let mut by_id: HashMap<&str, &BusinessDetail> = HashMap::new();
        for detail in details {
            if let Some(id) = detail.id.as_deref() {
                by_id.entry(id).or_insert(detail);
            }
        }

        let mut matched = 0;
        for item in business.iter_mut() {
            let Some(detail) = by_id.get(item.id.as_str()) else {
                continue;
            };
            matched += 1;
            item.type_code = Some(
                detail
                    .type_label
                    .as_deref()
                    .map_or(UNKNOWN_CODE, |l| self.lookup.types.code_for(l)),
            );
            item.status_code = Some(
                detail
                    .status_label
                    .as_deref()
                    .map_or(UNKNOWN_CODE, |l| self.lookup.statuses.code_for(l)),
            );
            if item.start_date.is_none() {
                item.start_date = detail.start_date.clone();
            }
            if item.title.is_none() {
                item.title = detail.title.clone();
            }
        }

        if matched == 0 && !business.is_empty() {
            warn!(
                items = business.len(),
                details = details.len(),
                "No business detail matched; type and status stay empty"
            );
        }
        matched
    }
}

/// Keep detail rows whose identifier the listing pass already knows, filling
/// their gaps from the listing record; keep listed documents that have no
/// detail row. Returns the merged set and the number of dropped detail rows.
///
/// An empty listing means there was no listing pass to join against; the
/// detail rows are then kept as they are.
fn right_join_documents(listed: Vec<Document>, detail: Vec<Document>) -> (Vec<Document>, usize) {
    if listed.is_empty() {
        if !detail.is_empty() {
            warn!(
                detail = detail.len(),
                "No listed documents to join against; keeping every detail document"
            );
        }
        return (detail, 0);
    }

    let known: HashMap<String, Document> = listed
        .iter()
        .rev()
        .map(|d| (d.id.clone(), d.clone()))
        .collect();

    let mut out = Vec::with_capacity(listed.len().max(detail.len()));
    let mut covered: HashSet<String> = HashSet::new();
    let mut dropped = 0;

    for row in detail {
        match known.get(&row.id) {
            Some(listing) => {
                covered.insert(row.id.clone());
                out.push(merge_document(listing, row));
            }
            None => {
                warn!(docid = %row.id, url = ?row.doc_url, "Detail document has no listing counterpart; dropped");
                dropped += 1;
            }
        }
    }

    if covered.is_empty() && !known.is_empty() {
        warn!(listed = known.len(), "No detail document matched the listing");
    }

    out.extend(listed.into_iter().filter(|d| !covered.contains(&d.id)));
    (out, dropped)
}

fn merge_document(listing: &Document, detail: Document) -> Document {
    Document {
        id: detail.id,
        business_id: detail.business_id.or_else(|| listing.business_id.clone()),
        doc_type: detail.doc_type.or_else(|| listing.doc_type.clone()),
        creator: detail.creator.or(listing.creator),
        doc_date: detail.doc_date.or_else(|| listing.doc_date.clone()),
        doc_url: detail.doc_url.or_else(|| listing.doc_url.clone()),
    }
}
