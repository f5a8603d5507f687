//! Stage functions threading record sets from fetch to store.
//!
//! ```text
//! members:  POST /mitglieder → overview → GET /mitglieder/<id> (batch) → Member
//! business: GET /mitglieder/<id> (batch) → listings
//!           GET business detail pages (batch, optionally cached) → reconcile
//! pdfs:     GET document payloads (batch) → tagged files
//! ```
//!
//! Each `*_stage` function loads its inputs from the store, runs the harvest
//! and replaces its output tables. Batches never overlap.

use itertools::Itertools;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use tracing::{info, instrument, warn};
use url::Url;

use crate::config::TypeLookup;
use crate::error::{HarvestError, Result};
use crate::fetch::{BoundedFetcher, FetchResult, PageSource, body_text};
use crate::models::{Member, MemberSummary};
use crate::outputs::json::{CachedPage, load_pages, save_pages};
use crate::outputs::pdf::{PdfTagger, TagOutcome};
use crate::reconcile::{Reconciled, Reconciler, ScrapeBatch};
use crate::scrapers::business::{
    parse_business_detail, parse_business_listing, parse_detail_documents, parse_document_listing,
};
use crate::scrapers::members::{
    MemberSearch, fill_names_from_summary, parse_member_detail, parse_member_overview,
};
use crate::store::PageStore;
use crate::utils::truncate_for_log;

/// URL of a member's page.
pub fn member_url(origin: &Url, id: i64) -> Result<String> {
    Ok(origin.join(&format!("mitglieder/{id}"))?.to_string())
}

/// Search the member overview and read every member's detail page.
///
/// A member whose detail page fails keeps the name from the overview.
///
/// # Arguments
///
/// * `fetcher` - Bounded fetcher for the search POST and the member pages
/// * `origin` - Site origin the `/mitglieder` paths are joined onto
/// * `search` - Current or former members and the date range
///
/// # Returns
///
/// One [`Member`] per distinct overview identifier, in overview order. Fails
/// when the search POST fails or the first member page cannot reach the
/// origin.
#[instrument(level = "info", skip_all, fields(former = search.former))]
pub async fn harvest_members<S: PageSource>(
    fetcher: &BoundedFetcher<S>,
    origin: &Url,
    search: &MemberSearch,
) -> Result<Vec<Member>> {
    let search_url = origin.join("mitglieder")?;
    let overview = fetcher
        .submit_form(search_url.as_str(), &search.form())
        .await
        .map_err(|f| {
            if f.cause.is_unreachable() {
                HarvestError::OriginUnreachable(f)
            } else {
                HarvestError::Fetch(f)
            }
        })?;

    let html = body_text(&overview);
    let summaries: Vec<MemberSummary> = parse_member_overview(&html)
        .into_iter()
        .unique_by(|s| s.id)
        .collect();
    if summaries.is_empty() {
        warn!(preview = %truncate_for_log(&html, 300), "Member search returned no person blocks");
    }
    info!(count = summaries.len(), "Members in overview");

    let urls = summaries
        .iter()
        .map(|s| member_url(origin, s.id))
        .collect::<Result<Vec<_>>>()?;
    let pages = fetcher.fetch_all(&urls).await?;

    let members: Vec<Member> = summaries
        .iter()
        .zip(pages)
        .map(|(summary, page)| {
            let mut member = match page {
                Ok(body) => parse_member_detail(summary.id, &body_text(&body)),
                Err(failure) => {
                    warn!(memberid = summary.id, url = %failure.url, "Keeping overview data only");
                    parse_member_detail(summary.id, "")
                }
            };
            fill_names_from_summary(&mut member, summary);
            member
        })
        .collect();
    info!(count = members.len(), "Harvested members");
    Ok(members)
}

/// Where business detail pages come from.
#[derive(Debug, Clone, Default)]
pub struct DetailCache {
    pub path: PathBuf,
    /// Replay cached pages instead of fetching them.
    pub reuse: bool,
    /// Write the batch to `path` after fetching.
    pub save: bool,
}

async fn fetch_details<S: PageSource>(
    fetcher: &BoundedFetcher<S>,
    urls: &[String],
    cache: &DetailCache,
) -> Result<HashMap<String, FetchResult>> {
    let mut pages: HashMap<String, FetchResult> = HashMap::new();
    if cache.reuse {
        match load_pages(&cache.path).await {
            Ok(cached) => {
                for page in cached {
                    pages.insert(page.url.clone(), CachedPage::into_result(page));
                }
            }
            Err(e) => warn!(path = %cache.path.display(), error = %e, "Page cache unusable; fetching"),
        }
    }

    let missing: Vec<String> = urls
        .iter()
        .filter(|u| !pages.contains_key(*u))
        .cloned()
        .collect();
    info!(cached = urls.len() - missing.len(), missing = missing.len(), "Business detail pages");
    let fetched = fetcher.fetch_all(&missing).await?;

    pages.extend(missing.into_iter().zip(fetched));

    if cache.save {
        save_pages(&cache.path, &cache_entries(urls, &pages)).await?;
    }
    Ok(pages)
}

/// Every page in `pages`: those of `urls` in batch order, then any other
/// cached page sorted by URL.
fn cache_entries(urls: &[String], pages: &HashMap<String, FetchResult>) -> Vec<CachedPage> {
    let batch: HashSet<&str> = urls.iter().map(String::as_str).collect();
    let earlier = pages
        .keys()
        .filter(|u| !batch.contains(u.as_str()))
        .sorted();
    urls.iter()
        .unique()
        .chain(earlier)
        .filter_map(|u| pages.get(u).map(|r| CachedPage::from_result(u, r)))
        .collect()
}

/// Read the member pages of `members`, their business detail pages, and
/// reconcile everything into one record set.
///
/// # Arguments
///
/// * `fetcher` - Bounded fetcher for member and detail pages
/// * `origin` - Site origin used to resolve relative links
/// * `lookup` - Type and status tables for the detail labels
/// * `members` - Members whose listings are read
/// * `cache` - Whether detail pages are replayed from or saved to disk
///
/// # Returns
///
/// The [`Reconciled`] business items and documents. Fails only when a batch
/// cannot reach the origin or the cache file cannot be written.
#[instrument(level = "info", skip_all, fields(members = members.len()))]
pub async fn harvest_business<S: PageSource>(
    fetcher: &BoundedFetcher<S>,
    origin: &Url,
    lookup: &TypeLookup,
    members: &[Member],
    cache: &DetailCache,
) -> Result<Reconciled> {
    let urls = members
        .iter()
        .map(|m| member_url(origin, m.id))
        .collect::<Result<Vec<_>>>()?;
    let pages = fetcher.fetch_all(&urls).await?;

    let mut batch = ScrapeBatch::default();
    for (member, page) in members.iter().zip(pages) {
        let Ok(body) = page else {
            warn!(memberid = member.id, "Member page missing; no business listed");
            continue;
        };
        let html = body_text(&body);
        batch.business.extend(parse_business_listing(&html, member.id, origin));
        batch.listed_documents.extend(parse_document_listing(&html, member.id, origin));
    }
    info!(
        business = batch.business.len(),
        documents = batch.listed_documents.len(),
        "Parsed member listings"
    );

    let detail_urls: Vec<String> = batch
        .business
        .iter()
        .filter_map(|b| b.url.clone())
        .unique()
        .collect();
    let details = fetch_details(fetcher, &detail_urls, cache).await?;

    for item in &batch.business {
        let Some(url) = item.url.as_deref() else {
            continue;
        };
        let Some(Ok(body)) = details.get(url) else {
            continue;
        };
        let html = body_text(body);
        let mut detail = parse_business_detail(&html, origin);
        detail.url = Some(url.to_string());
        detail.id.get_or_insert_with(|| item.id.clone());
        batch.details.push(detail);
        batch
            .detail_documents
            .extend(parse_detail_documents(&html, item.member_id, origin));
    }

    Ok(Reconciler::new(lookup).reconcile(batch))
}

/// Harvest members and replace the `members` table.
///
/// # Returns
///
/// The number of stored members.
pub async fn members_stage<S: PageSource, P: PageStore>(
    fetcher: &BoundedFetcher<S>,
    store: &mut P,
    origin: &Url,
    search: &MemberSearch,
) -> Result<usize> {
    let members = harvest_members(fetcher, origin, search).await?;
    Ok(store.replace_members(&members)?)
}

/// Harvest business items for stored members (or `only` of them) and
/// replace the `geschaefte` and `documents` tables.
pub async fn business_stage<S: PageSource, P: PageStore>(
    fetcher: &BoundedFetcher<S>,
    store: &mut P,
    origin: &Url,
    lookup: &TypeLookup,
    only: &[i64],
    cache: &DetailCache,
) -> Result<Reconciled> {
    let members: Vec<Member> = store
        .load_members()?
        .into_iter()
        .filter(|m| only.is_empty() || only.contains(&m.id))
        .collect();
    if members.is_empty() {
        warn!("No stored members; run the members stage first");
    }
    let reconciled = harvest_business(fetcher, origin, lookup, &members, cache).await?;
    store.replace_business(&reconciled.business)?;
    store.replace_documents(&reconciled.documents)?;
    Ok(reconciled)
}

/// Tag the stored documents' PDFs and replace the `files` table.
pub async fn pdfs_stage<S: PageSource, P: PageStore>(
    fetcher: &BoundedFetcher<S>,
    store: &mut P,
    lookup: &TypeLookup,
    pdf_dir: PathBuf,
) -> Result<TagOutcome> {
    let documents = store.load_documents()?;
    let members = store.load_members()?;
    let business = store.load_business()?;
    let outcome = PdfTagger::new(lookup, pdf_dir)
        .tag_all(fetcher, &documents, &members, &business)
        .await;
    store.replace_files(&outcome.files)?;
    Ok(outcome)
}
