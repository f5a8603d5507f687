//! SQLite persistence for the harvested record sets.
//!
//! Each table is read and written as a whole: a stage loads the records it
//! needs, produces a new set and replaces the table in one transaction. Rows
//! come back in insertion order.

use rusqlite::{Connection, Statement, params};
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::models::{BusinessItem, Document, FileRecord, Member};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Full-table load/replace access to the record sets.
pub trait PageStore {
    fn load_members(&self) -> Result<Vec<Member>, StoreError>;
    fn replace_members(&mut self, members: &[Member]) -> Result<usize, StoreError>;

    fn load_business(&self) -> Result<Vec<BusinessItem>, StoreError>;
    fn replace_business(&mut self, items: &[BusinessItem]) -> Result<usize, StoreError>;

    fn load_documents(&self) -> Result<Vec<Document>, StoreError>;
    fn replace_documents(&mut self, documents: &[Document]) -> Result<usize, StoreError>;

    fn load_files(&self) -> Result<Vec<FileRecord>, StoreError>;
    fn replace_files(&mut self, files: &[FileRecord]) -> Result<usize, StoreError>;
}

const SCHEMA: &str = "
    -- seq keeps the overview order; memberid would sort by number.
    CREATE TABLE IF NOT EXISTS members (
        seq             INTEGER PRIMARY KEY,
        memberid        INTEGER NOT NULL UNIQUE,
        memberFirstName TEXT,
        memberLastName  TEXT,
        memberParty     TEXT,
        memberDistrict  TEXT
    );

    CREATE TABLE IF NOT EXISTS geschaefte (
        gesid      TEXT PRIMARY KEY,
        memberid   INTEGER NOT NULL,
        ges_titel  TEXT,
        ges_type   INTEGER,
        ges_status INTEGER,
        ges_date   TEXT,
        ges_url    TEXT
    );

    -- docid may repeat; repeated ids mark ambiguous documents.
    CREATE TABLE IF NOT EXISTS documents (
        docid    TEXT NOT NULL,
        gesid    TEXT,
        doc_type TEXT,
        creator  INTEGER,
        doc_date TEXT,
        doc_url  TEXT
    );
    CREATE INDEX IF NOT EXISTS idx_documents_docid ON documents(docid);
    CREATE INDEX IF NOT EXISTS idx_documents_gesid ON documents(gesid);

    CREATE TABLE IF NOT EXISTS files (
        fileid TEXT PRIMARY KEY,
        docid  TEXT NOT NULL,
        path   TEXT NOT NULL
    );
";

/// [`PageStore`] backed by a single SQLite database file.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open (or create) the database at `path` and make sure the schema
    /// exists. Missing parent directories are created.
    #[instrument(level = "info", fields(path = %path.display()))]
    pub fn connect(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        let store = Self { conn };
        store.init_schema()?;
        info!("Store ready");
        Ok(store)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let store = Self {
            conn: Connection::open_in_memory()?,
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Create the four tables if they do not exist yet.
    pub fn init_schema(&self) -> Result<(), StoreError> {
        self.conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    fn replace<T>(
        &mut self,
        table: &'static str,
        insert: &str,
        rows: &[T],
        mut bind: impl FnMut(&mut Statement<'_>, &T) -> rusqlite::Result<usize>,
    ) -> Result<usize, StoreError> {
        let tx = self.conn.transaction()?;
        let removed = tx.execute(&format!("DELETE FROM {table}"), [])?;
        {
            let mut stmt = tx.prepare(insert)?;
            for row in rows {
                bind(&mut stmt, row)?;
            }
        }
        tx.commit()?;
        debug!(table, removed, "Cleared table before insert");
        info!(table, rows = rows.len(), "Replaced table");
        Ok(rows.len())
    }
}

impl PageStore for SqliteStore {
    fn load_members(&self) -> Result<Vec<Member>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT memberid, memberFirstName, memberLastName, memberParty, memberDistrict
             FROM members ORDER BY seq",
        )?;
        let rows = stmt.query_map([], |r| {
            Ok(Member {
                id: r.get(0)?,
                first_name: r.get(1)?,
                last_name: r.get(2)?,
                party: r.get(3)?,
                district: r.get(4)?,
            })
        })?;
        let members = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(members)
    }

    fn replace_members(&mut self, members: &[Member]) -> Result<usize, StoreError> {
        self.replace(
            "members",
            "INSERT OR REPLACE INTO members
                (memberid, memberFirstName, memberLastName, memberParty, memberDistrict)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            members,
            |stmt, m| stmt.execute(params![m.id, m.first_name, m.last_name, m.party, m.district]),
        )
    }

    fn load_business(&self) -> Result<Vec<BusinessItem>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT gesid, memberid, ges_titel, ges_type, ges_status, ges_date, ges_url
             FROM geschaefte ORDER BY rowid",
        )?;
        let rows = stmt.query_map([], |r| {
            Ok(BusinessItem {
                id: r.get(0)?,
                member_id: r.get(1)?,
                title: r.get(2)?,
                type_code: r.get(3)?,
                status_code: r.get(4)?,
                start_date: r.get(5)?,
                url: r.get(6)?,
            })
        })?;
        let items = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(items)
    }

    fn replace_business(&mut self, items: &[BusinessItem]) -> Result<usize, StoreError> {
        self.replace(
            "geschaefte",
            "INSERT INTO geschaefte
                (gesid, memberid, ges_titel, ges_type, ges_status, ges_date, ges_url)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            items,
            |stmt, b| {
                stmt.execute(params![
                    b.id,
                    b.member_id,
                    b.title,
                    b.type_code,
                    b.status_code,
                    b.start_date,
                    b.url
                ])
            },
        )
    }

    fn load_documents(&self) -> Result<Vec<Document>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT docid, gesid, doc_type, creator, doc_date, doc_url
             FROM documents ORDER BY rowid",
        )?;
        let rows = stmt.query_map([], |r| {
            Ok(Document {
                id: r.get(0)?,
                business_id: r.get(1)?,
                doc_type: r.get(2)?,
                creator: r.get(3)?,
                doc_date: r.get(4)?,
                doc_url: r.get(5)?,
            })
        })?;
        let documents = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(documents)
    }

    fn replace_documents(&mut self, documents: &[Document]) -> Result<usize, StoreError> {
        self.replace(
            "documents",
            "INSERT INTO documents (docid, gesid, doc_type, creator, doc_date, doc_url)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            documents,
            |stmt, d| {
                stmt.execute(params![
                    d.id,
                    d.business_id,
                    d.doc_type,
                    d.creator,
                    d.doc_date,
                    d.doc_url
                ])
            },
        )
    }

    fn load_files(&self) -> Result<Vec<FileRecord>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT fileid, docid, path FROM files ORDER BY rowid")?;
        let rows = stmt.query_map([], |r| {
            Ok(FileRecord {
                file_id: r.get(0)?,
                doc_id: r.get(1)?,
                path: r.get(2)?,
            })
        })?;
        let files = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(files)
    }

    fn replace_files(&mut self, files: &[FileRecord]) -> Result<usize, StoreError> {
        self.replace(
            "files",
            "INSERT OR REPLACE INTO files (fileid, docid, path) VALUES (?1, ?2, ?3)",
            files,
            |stmt, f| stmt.execute(params![f.file_id, f.doc_id, f.path]),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn document(id: &str) -> Document {
        Document {
            id: id.to_string(),
            business_id: Some(id[..7].to_string()),
            doc_type: Some("Text Anzug".to_string()),
            creator: Some(42),
            doc_date: Some("01.02.2023".to_string()),
            doc_url: None,
        }
    }

    #[test]
    fn test_members_round_trip_with_missing_fields() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let members = vec![
            Member {
                id: 42,
                first_name: Some("Peter".into()),
                last_name: Some("Muster".into()),
                party: Some("X".into()),
                district: None,
            },
            Member {
                id: 7,
                first_name: None,
                last_name: None,
                party: None,
                district: None,
            },
        ];
        assert_eq!(store.replace_members(&members).unwrap(), 2);
        assert_eq!(store.load_members().unwrap(), members);
    }

    #[test]
    fn test_business_id_is_unique() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let item = BusinessItem {
            id: "23.5153".into(),
            member_id: 42,
            title: None,
            type_code: None,
            status_code: None,
            start_date: None,
            url: None,
        };
        let cosigned = BusinessItem {
            member_id: 7,
            ..item.clone()
        };
        assert!(store.replace_business(&[item.clone(), cosigned]).is_err());
        // The failed transaction left the table untouched.
        assert!(store.load_business().unwrap().is_empty());
        store.replace_business(std::slice::from_ref(&item)).unwrap();
        assert_eq!(store.load_business().unwrap(), vec![item]);
    }

    #[test]
    fn test_replace_discards_previous_rows() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        store
            .replace_documents(&[document("23.5153.01"), document("23.5153.02")])
            .unwrap();
        store.replace_documents(&[document("22.5001.01")]).unwrap();
        let ids: Vec<String> = store
            .load_documents()
            .unwrap()
            .into_iter()
            .map(|d| d.id)
            .collect();
        assert_eq!(ids, vec!["22.5001.01"]);
    }

    #[test]
    fn test_duplicate_document_ids_survive() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let docs = vec![document("23.5153.01"), document("23.5153.01")];
        store.replace_documents(&docs).unwrap();
        assert_eq!(store.load_documents().unwrap(), docs);
    }

    #[test]
    fn test_business_codes_and_files_persist() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let item = BusinessItem {
            id: "23.5153".into(),
            member_id: 42,
            title: Some("Anzug betreffend Velowege".into()),
            type_code: Some(1),
            status_code: Some(99),
            start_date: Some("01.02.2023".into()),
            url: Some("https://grosserrat.bs.ch/geschaefte/200112345".into()),
        };
        store.replace_business(std::slice::from_ref(&item)).unwrap();
        assert_eq!(store.load_business().unwrap(), vec![item]);

        let file = FileRecord {
            file_id: "23_5153_01".into(),
            doc_id: "23.5153.01".into(),
            path: "pdfs/Text/23_5153_01.pdf".into(),
        };
        store.replace_files(std::slice::from_ref(&file)).unwrap();
        assert_eq!(store.load_files().unwrap(), vec![file]);
    }

    #[test]
    fn test_connect_creates_parent_and_is_reopenable() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("data/grosserrat.sqlite");
        {
            let mut store = SqliteStore::connect(&path).unwrap();
            store.replace_documents(&[document("23.5153.01")]).unwrap();
        }
        let store = SqliteStore::connect(&path).unwrap();
        store.init_schema().unwrap();
        assert_eq!(store.load_documents().unwrap().len(), 1);
    }
}
