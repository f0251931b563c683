//! SQLite journal implementation.

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use tracing::debug;

use crate::{ConversationId, Entry, EntryKind, Error, Result};

/// Listing row for one conversation.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationSummary {
    pub id: ConversationId,
    pub started_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub entry_count: usize,
    /// First user message, if any.
    pub first_prompt: Option<String>,
}

/// SQLite-backed conversation journal.
pub struct Journal {
    conn: Connection,
}

impl Journal {
    /// Open or create a journal at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref())?;
        debug!(path = %path.as_ref().display(), "journal opened");
        Self::with_connection(conn)
    }

    pub fn in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS entries (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                conversation_id TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                kind TEXT NOT NULL,
                data TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_entries_conversation
                ON entries(conversation_id, seq);
            "#,
        )?;
        Ok(Self { conn })
    }

    pub fn append(&self, entry: &Entry) -> Result<()> {
        self.conn.execute(
            "INSERT INTO entries (id, conversation_id, timestamp, kind, data) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                entry.id.to_string(),
                entry.conversation_id.to_string(),
                entry.timestamp.to_rfc3339(),
                entry.kind.name(),
                serde_json::to_string(&entry.kind)?,
            ],
        )?;
        Ok(())
    }

    /// Record `kind` now, under `conversation`.
    pub fn record(&self, conversation: ConversationId, kind: EntryKind) -> Result<()> {
        self.append(&Entry::new(conversation, kind))
    }

    /// All entries of a conversation in insertion order.
    pub fn load(&self, conversation: ConversationId) -> Result<Vec<Entry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, timestamp, data FROM entries
             WHERE conversation_id = ?1 ORDER BY seq",
        )?;

        let rows = stmt.query_map([conversation.to_string()], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;

        let mut entries = Vec::new();
        for row in rows {
            let (id, timestamp, data) = row?;
            entries.push(Entry {
                id: id.parse().map_err(|_| Error::Corrupt(format!("entry id {id}")))?,
                conversation_id: conversation,
                timestamp: parse_time(&timestamp)?,
                kind: serde_json::from_str(&data)?,
            });
        }
        Ok(entries)
    }

    /// Conversations, most recently active first.
    pub fn list(&self) -> Result<Vec<ConversationSummary>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT e.conversation_id, MIN(e.timestamp), MAX(e.timestamp), COUNT(*),
                   (SELECT u.data FROM entries u
                     WHERE u.conversation_id = e.conversation_id AND u.kind = 'user'
                     ORDER BY u.seq LIMIT 1)
            FROM entries e
            GROUP BY e.conversation_id
            ORDER BY MAX(e.seq) DESC
            "#,
        )?;

        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, Option<String>>(4)?,
            ))
        })?;

        let mut summaries = Vec::new();
        for row in rows {
            let (id, first, last, count, prompt) = row?;
            let first_prompt = match prompt {
                Some(data) => match serde_json::from_str(&data)? {
                    EntryKind::User { text } => Some(text),
                    _ => None,
                },
                None => None,
            };
            summaries.push(ConversationSummary {
                id: parse_id(&id)?,
                started_at: parse_time(&first)?,
                last_activity: parse_time(&last)?,
                entry_count: usize::try_from(count).unwrap_or_default(),
                first_prompt,
            });
        }
        Ok(summaries)
    }

    /// Resolve a (possibly abbreviated) conversation id.
    pub fn resolve(&self, prefix: &str) -> Result<ConversationId> {
        let prefix = prefix.trim().to_ascii_lowercase();
        if prefix.is_empty() {
            return Err(Error::NotFound(prefix));
        }

        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT conversation_id FROM entries WHERE substr(conversation_id, 1, ?2) = ?1",
        )?;
        let ids = stmt
            .query_map(params![prefix, prefix.len() as i64], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        match ids.as_slice() {
            [] => Err(Error::NotFound(prefix)),
            [id] => parse_id(id),
            _ => Err(Error::Ambiguous {
                count: ids.len(),
                prefix,
            }),
        }
    }
}

fn parse_id(id: &str) -> Result<ConversationId> {
    id.parse()
        .map_err(|_| Error::Corrupt(format!("conversation id {id}")))
}

fn parse_time(ts: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(ts)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| Error::Corrupt(format!("timestamp {ts}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn populated() -> (Journal, ConversationId, ConversationId) {
        let journal = Journal::in_memory().unwrap();
        let a = ConversationId::new();
        let b = ConversationId::new();

        journal
            .record(a, EntryKind::Start { provider: "ollama".into(), model: "llama3.2".into() })
            .unwrap();
        journal.append(&Entry::user(a, "find fatty skus")).unwrap();
        journal
            .record(
                a,
                EntryKind::ToolCall {
                    call_id: "c1".into(),
                    name: "query_skus_by_fat".into(),
                    arguments: json!({"fat_value": 30}),
                },
            )
            .unwrap();
        journal
            .record(
                a,
                EntryKind::ToolResult {
                    call_id: "c1".into(),
                    name: "query_skus_by_fat".into(),
                    content: "Found 1 SKU(s)".into(),
                    is_error: false,
                },
            )
            .unwrap();
        journal.record(a, EntryKind::Model { text: "One SKU.".into() }).unwrap();
        journal.record(b, EntryKind::End).unwrap();

        (journal, a, b)
    }

    #[test]
    fn load_preserves_insertion_order() {
        let (journal, a, _) = populated();
        let kinds: Vec<_> = journal.load(a).unwrap().into_iter().map(|e| e.kind.name()).collect();
        assert_eq!(kinds, ["start", "user", "tool_call", "tool_result", "model"]);
    }

    #[test]
    fn list_summarizes_conversations() {
        let (journal, a, b) = populated();
        let list = journal.list().unwrap();
        assert_eq!(list.len(), 2);
        // b was written last
        assert_eq!(list[0].id, b);
        assert_eq!(list[0].first_prompt, None);
        assert_eq!(list[1].id, a);
        assert_eq!(list[1].entry_count, 5);
        assert_eq!(list[1].first_prompt.as_deref(), Some("find fatty skus"));
    }

    #[test]
    fn resolve_by_prefix() {
        let (journal, a, _) = populated();
        let full = a.to_string();
        assert_eq!(journal.resolve(&full[..8]).unwrap(), a);
        assert_eq!(journal.resolve(&full.to_uppercase()).unwrap(), a);
        assert!(matches!(journal.resolve("zzzz"), Err(Error::NotFound(_))));
        assert!(matches!(journal.resolve(""), Err(Error::NotFound(_))));
    }

    #[test]
    fn ambiguous_prefix() {
        let (journal, _, _) = populated();
        // two ids sharing their first block
        let x = ConversationId("00000000-0000-4000-8000-000000000001".parse().unwrap());
        let y = ConversationId("00000000-0000-4000-8000-000000000002".parse().unwrap());
        journal.record(x, EntryKind::End).unwrap();
        journal.record(y, EntryKind::End).unwrap();
        assert!(matches!(
            journal.resolve("00000000"),
            Err(Error::Ambiguous { count: 2, .. })
        ));
    }

    #[test]
    fn reopens_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("journal.db");
        let id = ConversationId::new();
        {
            let journal = Journal::open(&path).unwrap();
            journal.append(&Entry::user(id, "hello")).unwrap();
        }
        let journal = Journal::open(&path).unwrap();
        assert_eq!(journal.load(id).unwrap().len(), 1);
    }
}
