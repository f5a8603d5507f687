//! Command-line interface definitions.
//!
//! Global options configure the connection and the database; each subcommand
//! runs one stage of the harvest. Every option can also be set through a
//! `GROSSERRAT_*` environment variable.

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::{DEFAULT_CONCURRENCY, DEFAULT_ORIGIN, DEFAULT_TIMEOUT_SECS, DEFAULT_USER_AGENT};
use crate::outputs::json::DEFAULT_CACHE_FILE;
use crate::pipeline::DetailCache;
use crate::scrapers::members::MemberSearch;

/// Harvests members, business items and documents of the Grosser Rat
/// Basel-Stadt into SQLite and tags the document PDFs.
///
/// # Examples
///
/// ```sh
/// # Current members, then their business items, then PDFs
/// grosserrat run
///
/// # Former members since 2010 into a custom database
/// grosserrat --db data/ehemalige.sqlite members --former --since 2010-01-01
///
/// # Re-run reconciliation from cached detail pages
/// grosserrat business --use-cache
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Site origin every request goes to
    #[arg(long, global = true, env = "GROSSERRAT_ORIGIN", default_value = DEFAULT_ORIGIN)]
    pub origin: String,

    /// SQLite database file
    #[arg(long, global = true, env = "GROSSERRAT_DB", default_value = "data/grosserrat.sqlite")]
    pub db: PathBuf,

    /// Maximum number of concurrent requests
    #[arg(short = 'n', long, global = true, env = "GROSSERRAT_CONCURRENCY", default_value_t = DEFAULT_CONCURRENCY)]
    pub concurrency: usize,

    /// Per-request timeout in seconds
    #[arg(long, global = true, env = "GROSSERRAT_TIMEOUT_SECS", default_value_t = DEFAULT_TIMEOUT_SECS)]
    pub timeout_secs: u64,

    /// User-Agent header sent with every request
    #[arg(long, global = true, env = "GROSSERRAT_USER_AGENT", default_value = DEFAULT_USER_AGENT)]
    pub user_agent: String,

    /// YAML file with business type and status tables (defaults to the built-in tables)
    #[arg(long, global = true, env = "GROSSERRAT_TYPES")]
    pub types: Option<PathBuf>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Scrape the member overview and member pages, replace the members table
    Members(MembersArgs),
    /// Scrape business items and documents of stored members
    Business(BusinessArgs),
    /// Download, tag and file the PDFs of stored documents
    Pdfs(PdfsArgs),
    /// Run members, business and pdfs in order
    Run {
        #[command(flatten)]
        members: MembersArgs,
        #[command(flatten)]
        business: BusinessArgs,
        #[command(flatten)]
        pdfs: PdfsArgs,
    },
}

#[derive(Args, Debug, Clone)]
pub struct MembersArgs {
    /// Search former instead of current members
    #[arg(long)]
    pub former: bool,

    /// Start of the search range (YYYY-MM-DD)
    #[arg(long)]
    pub since: Option<NaiveDate>,
}

#[derive(Args, Debug, Clone)]
pub struct BusinessArgs {
    /// Restrict the harvest to these member ids
    #[arg(long = "member", value_name = "ID")]
    pub members: Vec<i64>,

    /// JSON cache of business detail pages
    #[arg(long, env = "GROSSERRAT_CACHE_FILE", default_value = DEFAULT_CACHE_FILE)]
    pub cache_file: PathBuf,

    /// Read business detail pages from the cache file
    #[arg(long)]
    pub use_cache: bool,

    /// Write fetched business detail pages to the cache file
    #[arg(long)]
    pub save_cache: bool,
}

#[derive(Args, Debug, Clone)]
pub struct PdfsArgs {
    /// Output directory for tagged PDFs
    #[arg(long, env = "GROSSERRAT_PDF_DIR", default_value = "pdfs")]
    pub pdf_dir: PathBuf,
}

impl MembersArgs {
    pub fn search(&self) -> MemberSearch {
        let defaults = MemberSearch::default();
        MemberSearch {
            former: self.former,
            from: self.since.unwrap_or(defaults.from),
            until: defaults.until,
        }
    }
}

impl BusinessArgs {
    pub fn cache(&self) -> DetailCache {
        DetailCache {
            path: self.cache_file.clone(),
            reuse: self.use_cache,
            save: self.save_cache,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::parse_from([
            "grosserrat",
            "--db",
            "/tmp/gr.sqlite",
            "members",
            "--former",
            "--since",
            "2010-01-01",
        ]);

        assert_eq!(cli.global.db, PathBuf::from("/tmp/gr.sqlite"));
        match cli.command {
            Command::Members(args) => {
                assert!(args.former);
                assert_eq!(args.since, NaiveDate::from_ymd_opt(2010, 1, 1));
                let search = args.search();
                assert!(search.former);
                assert_eq!(search.from, NaiveDate::from_ymd_opt(2010, 1, 1).unwrap());
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::parse_from(["grosserrat", "pdfs"]);
        assert_eq!(cli.global.origin, DEFAULT_ORIGIN);
        assert_eq!(cli.global.concurrency, DEFAULT_CONCURRENCY);
        assert_eq!(cli.global.timeout_secs, DEFAULT_TIMEOUT_SECS);
        assert!(cli.global.types.is_none());
        match cli.command {
            Command::Pdfs(args) => assert_eq!(args.pdf_dir, PathBuf::from("pdfs")),
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_business_flags_and_global_after_subcommand() {
        let cli = Cli::parse_from([
            "grosserrat",
            "business",
            "--member",
            "42",
            "--member",
            "7",
            "--use-cache",
            "-n",
            "5",
        ]);
        assert_eq!(cli.global.concurrency, 5);
        match cli.command {
            Command::Business(args) => {
                assert_eq!(args.members, vec![42, 7]);
                assert!(args.use_cache);
                assert!(!args.save_cache);
                assert_eq!(args.cache_file, PathBuf::from(DEFAULT_CACHE_FILE));
                assert!(args.cache().reuse);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_run_accepts_stage_flags() {
        let cli = Cli::parse_from(["grosserrat", "run", "--former", "--save-cache", "--pdf-dir", "out"]);
        match cli.command {
            Command::Run { members, business, pdfs } => {
                assert!(members.former);
                assert!(business.save_cache);
                assert_eq!(pdfs.pdf_dir, PathBuf::from("out"));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
