//! In-memory product catalog for the ganache tool service.
//!
//! This crate owns the dataset the tools query: it loads raw rows once,
//! collapses regional duplicates into one canonical record per identifier,
//! and answers two typed read-only queries.
//!
//! # Core Concepts
//!
//! ## Catalog
//!
//! A [`Catalog`] is either loaded or not. Loading parses JSON Lines (or a
//! JSON array) of raw rows, applies a [`DedupPolicy`], and freezes the
//! result. Queries against an unloaded catalog fail with
//! [`Error::NotReady`]; a loaded catalog is immutable and can be shared
//! across threads without locking.
//!
//! ## DedupPolicy
//!
//! The same material code may appear once per legislation region. The
//! [`DedupPolicy`] keeps the row from the preferred region (default `EU`),
//! falling back to any other region, then to rows without one.
//!
//! ## Queries
//!
//! - [`Catalog::query_by_threshold`] filters on a numeric measure with a
//!   [`Comparison`].
//! - [`Catalog::query_by_category`] runs the four-stage chocolate filter and
//!   reports identifier-prefix mismatches separately in
//!   [`CategoryMatches::flagged`].
//!
//! # Example
//!
//! ```no_run
//! use catalog::{BaseType, Catalog, Comparison, DedupPolicy};
//!
//! let catalog = Catalog::open("data/products.jsonl", &DedupPolicy::default())?;
//!
//! for record in catalog.query_by_threshold("Fat", Comparison::Gt, 30.0, Some(3))? {
//!     println!("{}: {:?}", record.id, record.measure("Fat"));
//! }
//!
//! let callets = catalog.query_by_category(BaseType::Dark, "callets", None)?;
//! println!("{} matches, {} flagged", callets.matches.len(), callets.flagged.len());
//! # Ok::<(), catalog::Error>(())
//! ```

mod error;
mod query;
mod record;
mod store;

pub use error::{Error, Result};
pub use query::{CategoryMatches, Comparison, DEFAULT_CATEGORY_LIMIT, DEFAULT_THRESHOLD_LIMIT};
pub use record::{BaseType, Record};
pub use store::{Catalog, DEFAULT_PREFERRED_REGION, DedupPolicy};
