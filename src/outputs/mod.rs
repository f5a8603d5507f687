//! Everything the harvester writes besides the database.
//!
//! # Submodules
//!
//! - [`json`]: JSON cache of fetched business detail pages
//! - [`pdf`]: downloads document PDFs and tags their metadata
//!
//! # Output Structure
//!
//! ```text
//! tmp/
//! └── business_pages.json
//!
//! pdfs/
//! ├── Text/23_5153_01.pdf
//! ├── Antwort/23_5153_02.pdf
//! └── Diverses/22_5001_03.pdf
//! ```

pub mod json;
pub mod pdf;
