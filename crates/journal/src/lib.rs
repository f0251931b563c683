//! SQLite-backed transcript journal for ganache chat sessions.
//!
//! Every conversation opened by `ganache chat` gets a [`ConversationId`] and
//! each thing that happens in it (user input, model text, tool calls and
//! their results, degraded finishes) is appended as an [`Entry`]. The
//! journal is append-only; `ganache history` and `ganache show` read it back.
//!
//! # Example
//!
//! ```no_run
//! use journal::{ConversationId, Entry, EntryKind, Journal};
//!
//! let journal = Journal::open("journal.db")?;
//! let id = ConversationId::new();
//! journal.append(&Entry::user(id, "Which dark callets are there?"))?;
//! journal.record(id, EntryKind::Model { text: "Three.".into() })?;
//!
//! for summary in journal.list()? {
//!     println!("{}: {} entries", summary.id, summary.entry_count);
//! }
//! # Ok::<(), journal::Error>(())
//! ```

mod entry;
mod error;
mod store;

pub use entry::{ConversationId, Entry, EntryKind};
pub use error::{Error, Result};
pub use store::{ConversationSummary, Journal};
