//! Metadata tagging of downloaded document PDFs.
//!
//! Every unambiguous document with a URL is downloaded, its trailer Info
//! dictionary rewritten with member and business metadata, and the result
//! written to `<pdf_dir>/<category>/<docid with '.' → '_'>.pdf`.
//!
//! # Categories
//!
//! | Document label                  | Folder     |
//! |---------------------------------|------------|
//! | contains `Text`                 | `Text`     |
//! | exactly `Schreiben des RR`      | `Antwort`  |
//! | anything else, or no label      | `Diverses` |

use bytes::Bytes;
use lopdf::{Dictionary, Object, StringFormat};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;
use tokio::fs;
use tracing::{debug, error, info, instrument, warn};

use crate::config::TypeLookup;
use crate::fetch::{BoundedFetcher, FetchFailure, PageSource};
use crate::models::{BusinessItem, Document, FileRecord, Member};
use crate::reconcile::{ambiguous_ids, eligible_documents};
use crate::utils::{file_stem, pdf_date, pdf_now};

/// Label of the government council's answer letter.
const ANSWER_LABEL: &str = "Schreiben des RR";

#[derive(Error, Debug)]
pub enum TagError {
    #[error(transparent)]
    Fetch(#[from] FetchFailure),
    #[error("PDF error: {0}")]
    Pdf(#[from] lopdf::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Output folder of a tagged document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Text,
    Antwort,
    Diverses,
}

impl Category {
    pub fn classify(label: Option<&str>) -> Self {
        match label {
            Some(l) if l.contains("Text") => Category::Text,
            Some(ANSWER_LABEL) => Category::Antwort,
            _ => Category::Diverses,
        }
    }

    pub fn dir_name(self) -> &'static str {
        match self {
            Category::Text => "Text",
            Category::Antwort => "Antwort",
            Category::Diverses => "Diverses",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

/// Values written into a PDF's Info dictionary.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PdfMetadata {
    /// Display name of the owning member; written as Author and Creator.
    pub author: Option<String>,
    pub title: Option<String>,
    /// Resolved type label of the business item.
    pub subject: Option<String>,
    /// Site date of the document (`DD.MM.YYYY`).
    pub creation_date: Option<String>,
    pub business_id: Option<String>,
    pub document_id: String,
}

impl PdfMetadata {
    fn write_into(&self, info: &mut Dictionary) {
        let mut put = |key: &str, value: Option<&str>| {
            if let Some(v) = value {
                info.set(key, pdf_text(v));
            }
        };
        put("Author", self.author.as_deref());
        put("Creator", self.author.as_deref());
        put("Title", self.title.as_deref());
        put("Subject", self.subject.as_deref());
        put("CreationDate", self.creation_date.as_deref().map(pdf_date).as_deref());
        put("ModDate", Some(pdf_now().as_str()));
        put("GeschaeftsId", self.business_id.as_deref());
        put("DokumentId", Some(self.document_id.as_str()));
    }
}

/// A PDF text string: literal for ASCII, UTF-16BE with byte order mark
/// otherwise.
pub fn pdf_text(s: &str) -> Object {
    if s.is_ascii() {
        return Object::string_literal(s);
    }
    let mut bytes = vec![0xFE, 0xFF];
    for unit in s.encode_utf16() {
        bytes.extend_from_slice(&unit.to_be_bytes());
    }
    Object::String(bytes, StringFormat::Hexadecimal)
}

fn info_dictionary(doc: &mut lopdf::Document) -> Result<&mut Dictionary, lopdf::Error> {
    let id = match doc.trailer.get(b"Info").and_then(Object::as_reference) {
        Ok(id) => id,
        Err(_) => {
            let id = doc.add_object(Dictionary::new());
            doc.trailer.set("Info", id);
            id
        }
    };
    doc.get_object_mut(id)?.as_dict_mut()
}

/// Rewrite the Info dictionary of the PDF in `payload`.
pub fn tag_pdf(payload: &[u8], meta: &PdfMetadata) -> Result<Vec<u8>, TagError> {
    let mut doc = lopdf::Document::load_mem(payload)?;
    meta.write_into(info_dictionary(&mut doc)?);
    let mut out = Vec::with_capacity(payload.len());
    doc.save_to(&mut out)?;
    Ok(out)
}

/// What a tagging run produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagOutcome {
    pub files: Vec<FileRecord>,
    pub failed: usize,
    /// Eligible documents without a URL.
    pub skipped: usize,
    /// Documents left out because their identifier repeats.
    pub excluded: usize,
}

/// Downloads and tags document PDFs below `pdf_dir`.
#[derive(Debug)]
pub struct PdfTagger<'a> {
    lookup: &'a TypeLookup,
    pdf_dir: PathBuf,
}

impl<'a> PdfTagger<'a> {
    pub fn new(lookup: &'a TypeLookup, pdf_dir: impl Into<PathBuf>) -> Self {
        Self {
            lookup,
            pdf_dir: pdf_dir.into(),
        }
    }

    /// Where a document of `category` with identifier `doc_id` is written.
    pub fn target_path(&self, category: Category, doc_id: &str) -> PathBuf {
        self.pdf_dir
            .join(category.dir_name())
            .join(format!("{}.pdf", file_stem(doc_id)))
    }

    fn metadata(
        &self,
        doc: &Document,
        members: &HashMap<i64, &Member>,
        business: &HashMap<&str, &BusinessItem>,
    ) -> PdfMetadata {
        let owner = doc
            .business_id
            .as_deref()
            .and_then(|id| business.get(id).copied());
        PdfMetadata {
            author: doc
                .creator
                .and_then(|id| members.get(&id))
                .and_then(|m| m.display_name()),
            title: owner.and_then(|b| b.title.clone()),
            subject: owner
                .and_then(|b| b.type_code)
                .and_then(|code| self.lookup.types.label_for(code))
                .map(str::to_string),
            creation_date: doc.doc_date.clone(),
            business_id: doc.business_id.clone(),
            document_id: doc.id.clone(),
        }
    }

    async fn write_one(
        &self,
        doc: &Document,
        payload: Bytes,
        meta: &PdfMetadata,
    ) -> Result<FileRecord, TagError> {
        let tagged = tag_pdf(&payload, meta)?;
        let category = Category::classify(doc.doc_type.as_deref());
        let path = self.target_path(category, &doc.id);
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).await?;
        }
        fs::write(&path, tagged).await?;
        debug!(docid = %doc.id, %category, path = %path.display(), "Wrote tagged PDF");
        Ok(FileRecord {
            file_id: file_stem(&doc.id),
            doc_id: doc.id.clone(),
            path: path.display().to_string(),
        })
    }

    /// Tag every eligible document of `documents`.
    ///
    /// Payloads are fetched as one bounded batch. A document that fails to
    /// download, parse or write is logged with its URL and counted; the rest
    /// carry on, even when the failed download was the first of the batch.
    ///
    /// # Arguments
    ///
    /// * `fetcher` - Bounded fetcher used for the payload batch
    /// * `documents` - Stored documents; repeated identifiers are excluded
    /// * `members` - Stored members, for the Author field
    /// * `business` - Stored business items, for Title and Subject
    ///
    /// # Returns
    ///
    /// A [`TagOutcome`] with one [`FileRecord`] per written file and the
    /// failed, skipped and excluded counts.
    #[instrument(level = "info", skip_all, fields(documents = documents.len(), pdf_dir = %self.pdf_dir.display()))]
    pub async fn tag_all<S: PageSource>(
        &self,
        fetcher: &BoundedFetcher<S>,
        documents: &[Document],
        members: &[Member],
        business: &[BusinessItem],
    ) -> TagOutcome {
        let ambiguous = ambiguous_ids(documents);
        let mut outcome = TagOutcome {
            excluded: documents.iter().filter(|d| ambiguous.contains(&d.id)).count(),
            ..TagOutcome::default()
        };
        if !ambiguous.is_empty() {
            warn!(ids = ?ambiguous, "Skipping documents with repeated identifiers");
        }

        let (with_url, without_url): (Vec<&Document>, Vec<&Document>) =
            eligible_documents(documents, &ambiguous).partition(|d| d.doc_url.is_some());
        outcome.skipped = without_url.len();
        for doc in &without_url {
            warn!(docid = %doc.id, "Document has no URL; skipping");
        }

        let urls: Vec<String> = with_url
            .iter()
            .filter_map(|d| d.doc_url.clone())
            .collect();
        let payloads = fetcher.fetch_each(&urls).await;

        let members: HashMap<i64, &Member> = members.iter().map(|m| (m.id, m)).collect();
        let mut by_business: HashMap<&str, &BusinessItem> = HashMap::new();
        for item in business {
            by_business.entry(item.id.as_str()).or_insert(item);
        }

        for ((doc, url), payload) in with_url.iter().zip(&urls).zip(payloads) {
            let meta = self.metadata(doc, &members, &by_business);
            let result = match payload {
                Ok(body) => self.write_one(doc, body, &meta).await,
                Err(failure) => Err(failure.into()),
            };
            match result {
                Ok(file) => outcome.files.push(file),
                Err(e) => {
                    error!(docid = %doc.id, %url, error = %e, "Failed to tag document");
                    outcome.failed += 1;
                }
            }
        }

        info!(
            written = outcome.files.len(),
            failed = outcome.failed,
            skipped = outcome.skipped,
            excluded = outcome.excluded,
            "Tagging complete"
        );
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FetchSettings;
    use crate::fetch::FetchError;
    use crate::fetch::tests::FakeSource;
    use lopdf::dictionary;

    fn minimal_pdf() -> Vec<u8> {
        let mut doc = lopdf::Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        let mut out = Vec::new();
        doc.save_to(&mut out).unwrap();
        out
    }

    fn info_of(bytes: &[u8]) -> Dictionary {
        let doc = lopdf::Document::load_mem(bytes).unwrap();
        let id = doc.trailer.get(b"Info").unwrap().as_reference().unwrap();
        doc.get_dictionary(id).unwrap().clone()
    }

    fn string_bytes(info: &Dictionary, key: &[u8]) -> Vec<u8> {
        match info.get(key).unwrap() {
            Object::String(bytes, _) => bytes.clone(),
            other => panic!("{} is not a string: {other:?}", String::from_utf8_lossy(key)),
        }
    }

    fn document(id: &str, doc_type: &str, url: Option<&str>) -> Document {
        Document {
            id: id.to_string(),
            business_id: Some(id[..7].to_string()),
            doc_type: Some(doc_type.to_string()),
            creator: Some(42),
            doc_date: Some("01.02.2023".to_string()),
            doc_url: url.map(str::to_string),
        }
    }

    #[test]
    fn test_classify() {
        assert_eq!(Category::classify(Some("Text Anzug")), Category::Text);
        assert_eq!(Category::classify(Some("Schreiben des RR")), Category::Antwort);
        assert_eq!(Category::classify(Some("Schreiben des RR an den GR")), Category::Diverses);
        assert_eq!(Category::classify(Some("Bericht")), Category::Diverses);
        assert_eq!(Category::classify(None), Category::Diverses);
    }

    #[test]
    fn test_non_ascii_text_is_utf16() {
        match pdf_text("Muster") {
            Object::String(bytes, StringFormat::Literal) => assert_eq!(bytes, b"Muster"),
            other => panic!("unexpected {other:?}"),
        }
        match pdf_text("Zürich") {
            Object::String(bytes, StringFormat::Hexadecimal) => {
                assert_eq!(&bytes[..4], &[0xFE, 0xFF, 0x00, b'Z']);
                assert_eq!(&bytes[4..6], &[0x00, 0xFC]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_tag_pdf_writes_info_dictionary() {
        let meta = PdfMetadata {
            author: Some("Peter Muster".into()),
            title: Some("Anzug betreffend Velowege".into()),
            subject: Some("Anzug".into()),
            creation_date: Some("01.02.2023".into()),
            business_id: Some("23.5153".into()),
            document_id: "23.5153.01".into(),
        };
        let info = info_of(&tag_pdf(&minimal_pdf(), &meta).unwrap());
        assert_eq!(string_bytes(&info, b"Author"), b"Peter Muster");
        assert_eq!(string_bytes(&info, b"Creator"), b"Peter Muster");
        assert_eq!(string_bytes(&info, b"Subject"), b"Anzug");
        assert_eq!(string_bytes(&info, b"CreationDate"), b"D:20230201000000");
        assert_eq!(string_bytes(&info, b"GeschaeftsId"), b"23.5153");
        assert_eq!(string_bytes(&info, b"DokumentId"), b"23.5153.01");
        assert!(string_bytes(&info, b"ModDate").starts_with(b"D:"));
    }

    #[test]
    fn test_garbage_payload_is_a_pdf_error() {
        let err = tag_pdf(b"<html>not a pdf</html>", &PdfMetadata::default()).unwrap_err();
        assert!(matches!(err, TagError::Pdf(_)));
    }

    #[tokio::test]
    async fn test_tag_all_skips_ambiguous_and_survives_failures() {
        let tmp = tempfile::tempdir().unwrap();
        let lookup = TypeLookup::embedded().unwrap();
        let members = vec![Member {
            id: 42,
            first_name: Some("Peter".into()),
            last_name: Some("Müller".into()),
            party: None,
            district: None,
        }];
        let business = vec![BusinessItem {
            id: "23.5153".into(),
            member_id: 42,
            title: Some("Anzug betreffend Velowege".into()),
            type_code: Some(1),
            status_code: Some(2),
            start_date: None,
            url: None,
        }];
        let documents = vec![
            document("23.5153.01", "Text Anzug", Some("https://x/1.pdf")),
            document("23.5153.02", "Schreiben des RR", Some("https://x/2.pdf")),
            document("23.5153.03", "Bericht", Some("https://x/3.pdf")),
            document("23.5153.03", "Bericht", Some("https://x/3b.pdf")),
            document("23.5153.04", "Bericht", None),
        ];
        let source = FakeSource::default()
            .with_page("https://x/1.pdf", minimal_pdf())
            .with_page("https://x/2.pdf", "<html>Wartung</html>");
        let fetcher = BoundedFetcher::new(source, &FetchSettings::default());

        let tagger = PdfTagger::new(&lookup, tmp.path());
        let outcome = tagger.tag_all(&fetcher, &documents, &members, &business).await;

        assert_eq!(outcome.files.len(), 1);
        assert_eq!(outcome.failed, 1);
        assert_eq!(outcome.skipped, 1);
        assert_eq!(outcome.excluded, 2);
        let requested = fetcher.source().requested.lock().unwrap().clone();
        assert_eq!(requested, vec!["https://x/1.pdf", "https://x/2.pdf"]);

        let written = tmp.path().join("Text/23_5153_01.pdf");
        assert_eq!(outcome.files[0].path, written.display().to_string());
        assert_eq!(outcome.files[0].file_id, "23_5153_01");

        let info = info_of(&std::fs::read(&written).unwrap());
        assert_eq!(string_bytes(&info, b"Subject"), b"Anzug");
        assert_eq!(string_bytes(&info, b"Title"), b"Anzug betreffend Velowege");
        // Non-ASCII author: UTF-16BE with byte order mark.
        assert_eq!(&string_bytes(&info, b"Author")[..2], &[0xFE, 0xFF]);
    }

    #[tokio::test]
    async fn test_unreachable_first_payload_fails_only_that_document() {
        let tmp = tempfile::tempdir().unwrap();
        let lookup = TypeLookup::embedded().unwrap();
        let documents = vec![
            document("23.5153.01", "Text Anzug", Some("https://down.test/1.pdf")),
            document("23.5153.02", "Schreiben des RR", Some("https://x/2.pdf")),
        ];
        let source = FakeSource::default()
            .with_error("https://down.test/1.pdf", FetchError::Connect("refused".into()))
            .with_page("https://x/2.pdf", minimal_pdf());
        let fetcher = BoundedFetcher::new(source, &FetchSettings::default());

        let outcome = PdfTagger::new(&lookup, tmp.path())
            .tag_all(&fetcher, &documents, &[], &[])
            .await;

        assert_eq!(outcome.failed, 1);
        assert_eq!(outcome.files.len(), 1);
        assert_eq!(outcome.files[0].doc_id, "23.5153.02");
        assert!(tmp.path().join("Antwort/23_5153_02.pdf").exists());
    }
}
