//! Manual corrections for identifiers the site publishes malformed.
//!
//! The rules are plain data so the table can be audited and tested on its
//! own. A rule rewrites a field only while the field still holds the rule's
//! `old` value, so applying the whole table a second time changes nothing.

use crate::models::{BusinessItem, Document};
use crate::scrapers::business::BusinessDetail;

/// Record kind a rule applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Business,
    Document,
}

/// Which records a rule selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Match {
    /// Exact source URL.
    Url(&'static str),
    /// Exact current identifier.
    Id(&'static str),
}

/// The field a rule rewrites.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Id,
    Url,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CorrectionRule {
    pub entity: Entity,
    pub when: Match,
    pub field: Field,
    pub old: &'static str,
    pub new: &'static str,
}

/// Known bad identifiers and links, applied in this order.
pub const CORRECTIONS: &[CorrectionRule] = &[
    CorrectionRule {
        entity: Entity::Document,
        when: Match::Id("11.5186.021"),
        field: Field::Id,
        old: "11.5186.021",
        new: "11.5186.02",
    },
    CorrectionRule {
        entity: Entity::Document,
        when: Match::Id("9.5279.01"),
        field: Field::Id,
        old: "9.5279.01",
        new: "09.5279.01",
    },
    CorrectionRule {
        entity: Entity::Document,
        when: Match::Id("15.5457.1"),
        field: Field::Id,
        old: "15.5457.1",
        new: "15.5457.01",
    },
    // Transposed digits; only the document link identifies the record.
    CorrectionRule {
        entity: Entity::Document,
        when: Match::Url("https://grosserrat.bs.ch/dokumente/100373893"),
        field: Field::Id,
        old: "12.5014.01",
        new: "12.5041.01",
    },
    CorrectionRule {
        entity: Entity::Document,
        when: Match::Id("16.5302.02"),
        field: Field::Url,
        old: "http://www.grosserrat.bs.ch/dokumente/100382101.pdf",
        new: "https://grosserrat.bs.ch/dokumente/100382101.pdf",
    },
    CorrectionRule {
        entity: Entity::Business,
        when: Match::Id("9.5279"),
        field: Field::Id,
        old: "9.5279",
        new: "09.5279",
    },
    CorrectionRule {
        entity: Entity::Business,
        when: Match::Url("https://grosserrat.bs.ch/geschaefte/200105402"),
        field: Field::Id,
        old: "12.5014",
        new: "12.5041",
    },
];

/// A record the correction table can address.
pub trait Correctable {
    const ENTITY: Entity;

    fn id(&self) -> Option<&str>;
    fn url(&self) -> Option<&str>;
    fn field_mut(&mut self, field: Field) -> Option<&mut String>;
}

impl Correctable for Document {
    const ENTITY: Entity = Entity::Document;

    fn id(&self) -> Option<&str> {
        Some(&self.id)
    }

    fn url(&self) -> Option<&str> {
        self.doc_url.as_deref()
    }

    fn field_mut(&mut self, field: Field) -> Option<&mut String> {
        match field {
            Field::Id => Some(&mut self.id),
            Field::Url => self.doc_url.as_mut(),
        }
    }
}

impl Correctable for BusinessItem {
    const ENTITY: Entity = Entity::Business;

    fn id(&self) -> Option<&str> {
        Some(&self.id)
    }

    fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    fn field_mut(&mut self, field: Field) -> Option<&mut String> {
        match field {
            Field::Id => Some(&mut self.id),
            Field::Url => self.url.as_mut(),
        }
    }
}

impl Correctable for BusinessDetail {
    const ENTITY: Entity = Entity::Business;

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    fn field_mut(&mut self, field: Field) -> Option<&mut String> {
        match field {
            Field::Id => self.id.as_mut(),
            Field::Url => self.url.as_mut(),
        }
    }
}

impl CorrectionRule {
    fn selects<R: Correctable>(&self, record: &R) -> bool {
        if R::ENTITY != self.entity {
            return false;
        }
        match self.when {
            Match::Id(id) => record.id() == Some(id),
            Match::Url(url) => record.url() == Some(url),
        }
    }

    /// Rewrite `record` if the rule selects it and the field still holds
    /// `old`. Returns whether the record changed.
    pub fn apply<R: Correctable>(&self, record: &mut R) -> bool {
        if !self.selects(record) {
            return false;
        }
        match record.field_mut(self.field) {
            Some(value) if value.as_str() == self.old => {
                *value = self.new.to_string();
                true
            }
            _ => false,
        }
    }
}

/// Apply `rules` in order to every record; each rule is tried once per
/// record. Returns the number of rewrites.
pub fn apply_corrections<R: Correctable>(rules: &[CorrectionRule], records: &mut [R]) -> usize {
    rules
        .iter()
        .map(|rule| {
            records
                .iter_mut()
                .map(|r| rule.apply(r))
                .filter(|changed| *changed)
                .count()
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(id: &str, url: Option<&str>) -> Document {
        Document {
            id: id.to_string(),
            business_id: None,
            doc_type: None,
            creator: None,
            doc_date: None,
            doc_url: url.map(str::to_string),
        }
    }

    fn item(id: &str, url: &str) -> BusinessItem {
        BusinessItem {
            id: id.to_string(),
            member_id: 1,
            title: None,
            type_code: None,
            status_code: None,
            start_date: None,
            url: Some(url.to_string()),
        }
    }

    fn sample_documents() -> Vec<Document> {
        vec![
            doc("11.5186.021", None),
            doc("9.5279.01", None),
            doc("12.5014.01", Some("https://grosserrat.bs.ch/dokumente/100373893")),
            doc("12.5014.01", Some("https://grosserrat.bs.ch/dokumente/999")),
            doc(
                "16.5302.02",
                Some("http://www.grosserrat.bs.ch/dokumente/100382101.pdf"),
            ),
            doc("23.5153.01", None),
        ]
    }

    #[test]
    fn test_rules_rewrite_expected_fields() {
        let mut docs = sample_documents();
        let applied = apply_corrections(CORRECTIONS, &mut docs);
        assert_eq!(applied, 4);
        assert_eq!(docs[0].id, "11.5186.02");
        assert_eq!(docs[1].id, "09.5279.01");
        assert_eq!(docs[2].id, "12.5041.01");
        // Same identifier, different URL: the URL-keyed rule does not fire.
        assert_eq!(docs[3].id, "12.5014.01");
        assert_eq!(
            docs[4].doc_url.as_deref(),
            Some("https://grosserrat.bs.ch/dokumente/100382101.pdf")
        );
        assert_eq!(docs[5].id, "23.5153.01");
    }

    #[test]
    fn test_applying_twice_is_idempotent() {
        let mut docs = sample_documents();
        let mut items = vec![
            item("9.5279", "https://grosserrat.bs.ch/geschaefte/1"),
            item("12.5014", "https://grosserrat.bs.ch/geschaefte/200105402"),
        ];
        apply_corrections(CORRECTIONS, &mut docs);
        apply_corrections(CORRECTIONS, &mut items);
        let (docs_once, items_once) = (docs.clone(), items.clone());

        assert_eq!(apply_corrections(CORRECTIONS, &mut docs), 0);
        assert_eq!(apply_corrections(CORRECTIONS, &mut items), 0);
        assert_eq!(docs, docs_once);
        assert_eq!(items, items_once);
        assert_eq!(items[0].id, "09.5279");
        assert_eq!(items[1].id, "12.5041");
    }

    #[test]
    fn test_rules_only_touch_their_entity() {
        // A business item whose id happens to equal a document rule's id.
        let mut items = vec![item("9.5279.01", "https://x")];
        assert_eq!(apply_corrections(CORRECTIONS, &mut items), 0);
    }

    #[test]
    fn test_no_rule_feeds_another() {
        for a in CORRECTIONS {
            for b in CORRECTIONS {
                let chained = a.entity == b.entity && a.field == b.field && a.new == b.old;
                assert!(!chained, "rule {a:?} produces input of {b:?}");
            }
        }
    }

    #[test]
    fn test_detail_records_are_corrected_like_items() {
        let mut details = vec![BusinessDetail {
            id: Some("9.5279".into()),
            ..BusinessDetail::default()
        }];
        assert_eq!(apply_corrections(CORRECTIONS, &mut details), 1);
        assert_eq!(details[0].id.as_deref(), Some("09.5279"));
    }
}
