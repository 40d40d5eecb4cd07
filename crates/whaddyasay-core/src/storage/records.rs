use super::Database;
use crate::advice::{AdviceResult, SituationType};
use crate::crypto::Cipher;
use crate::error::{Error, Result};
use crate::heuristics::{self, ProcessedContent};
use rusqlite::{params, Row};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// A personal memory: an experience, reflection, or past conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub id: Option<i64>,
    pub title: String,
    pub content: String,
    pub tags: Vec<String>,
    pub memory_type: String,
    pub timestamp: String,
    pub created_at: String,
    pub synced: bool,
    pub encrypted: bool,
    /// Set when the stored ciphertext could not be decrypted
    pub decryption_error: bool,
    /// Encrypted and the vault is locked
    pub locked: bool,
    pub processed: Option<ProcessedContent>,
}

impl MemoryRecord {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            id: None,
            title: title.into(),
            content: content.into(),
            tags: Vec::new(),
            memory_type: "experience".to_string(),
            timestamp: now.clone(),
            created_at: now,
            synced: false,
            encrypted: false,
            decryption_error: false,
            locked: false,
            processed: None,
        }
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_type(mut self, memory_type: impl Into<String>) -> Self {
        self.memory_type = memory_type.into();
        self
    }

    /// Plaintext is available
    pub fn is_readable(&self) -> bool {
        !self.decryption_error && !self.locked
    }

    pub fn searchable_text(&self) -> String {
        match &self.processed {
            Some(p) if !p.searchable_content.trim().is_empty() => p.searchable_content.clone(),
            _ => format!("{} {} {}", self.title, self.content, self.tags.join(" ")),
        }
    }

    fn clear_sensitive(&mut self) {
        self.title.clear();
        self.content.clear();
        self.tags.clear();
        self.processed = None;
    }
}

/// Fields of a memory that are encrypted together
#[derive(Serialize, Deserialize)]
struct MemoryPayload {
    title: String,
    content: String,
    tags: Vec<String>,
    processed: Option<ProcessedContent>,
}

/// A coached conversation and, later, how it went
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationRecord {
    pub id: Option<i64>,
    pub situation: String,
    pub situation_type: SituationType,
    pub advice: Option<AdviceResult>,
    pub timestamp: String,
    pub outcome: Option<String>,
    pub success_rating: Option<u8>,
    pub lessons_learned: Option<String>,
    pub encrypted: bool,
    pub decryption_error: bool,
    pub locked: bool,
}

impl ConversationRecord {
    pub fn new(situation: impl Into<String>, advice: AdviceResult) -> Self {
        Self {
            id: None,
            situation: situation.into(),
            situation_type: advice.analysis().situation_type,
            advice: Some(advice),
            timestamp: chrono::Utc::now().to_rfc3339(),
            outcome: None,
            success_rating: None,
            lessons_learned: None,
            encrypted: false,
            decryption_error: false,
            locked: false,
        }
    }

    pub fn is_readable(&self) -> bool {
        !self.decryption_error && !self.locked
    }

    fn clear_sensitive(&mut self) {
        self.situation.clear();
        self.advice = None;
        self.outcome = None;
        self.lessons_learned = None;
    }
}

#[derive(Serialize, Deserialize)]
struct ConversationPayload {
    situation: String,
    advice: Option<AdviceResult>,
    outcome: Option<String>,
    lessons_learned: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncItem {
    pub id: i64,
    pub item_type: String,
    pub data: serde_json::Value,
    pub timestamp: String,
    pub retries: u32,
    pub synced: bool,
}

#[derive(Debug, Clone, Default)]
pub struct MemorySearch {
    pub query: String,
    pub tags: Vec<String>,
    pub memory_type: Option<String>,
    pub limit: usize,
}

impl MemorySearch {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            limit: 10,
            ..Default::default()
        }
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_type(mut self, memory_type: impl Into<String>) -> Self {
        self.memory_type = Some(memory_type.into());
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    fn matches(&self, memory: &MemoryRecord) -> bool {
        let query = self.query.trim().to_lowercase();
        let text_match = query.is_empty()
            || memory.title.to_lowercase().contains(&query)
            || memory.content.to_lowercase().contains(&query)
            || memory.searchable_text().to_lowercase().contains(&query);
        let tag_match = self.tags.is_empty()
            || self
                .tags
                .iter()
                .any(|t| memory.tags.iter().any(|m| m.eq_ignore_ascii_case(t)));
        text_match && tag_match
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StorageStats {
    pub memories: usize,
    pub conversations: usize,
    pub unsynced: usize,
    pub encrypted: usize,
    pub unreadable: usize,
}

/// Stored shape of a memory row before decryption
struct MemoryRow {
    record: MemoryRecord,
    encrypted_data: Option<String>,
}

struct ConversationRow {
    record: ConversationRecord,
    encrypted_data: Option<String>,
}

fn limit_param(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

const MEMORY_COLUMNS: &str = "id, title, content, tags, memory_type, timestamp, created_at, \
                              synced, encrypted, encrypted_data, processed";
const CONVERSATION_COLUMNS: &str = "id, situation, situation_type, advice, timestamp, outcome, \
                                    success_rating, lessons_learned, encrypted, encrypted_data";

fn json_column<T: serde::de::DeserializeOwned>(raw: Option<String>) -> Option<T> {
    raw.and_then(|text| serde_json::from_str(&text).ok())
}

fn memory_from_row(row: &Row) -> rusqlite::Result<MemoryRow> {
    let tags: String = row.get(3)?;
    Ok(MemoryRow {
        record: MemoryRecord {
            id: Some(row.get(0)?),
            title: row.get(1)?,
            content: row.get(2)?,
            tags: serde_json::from_str(&tags).unwrap_or_default(),
            memory_type: row.get(4)?,
            timestamp: row.get(5)?,
            created_at: row.get(6)?,
            synced: row.get(7)?,
            encrypted: row.get(8)?,
            decryption_error: false,
            locked: false,
            processed: json_column(row.get(10)?),
        },
        encrypted_data: row.get(9)?,
    })
}

fn conversation_from_row(row: &Row) -> rusqlite::Result<ConversationRow> {
    let situation_type: String = row.get(2)?;
    let rating: Option<i64> = row.get(6)?;
    Ok(ConversationRow {
        record: ConversationRecord {
            id: Some(row.get(0)?),
            situation: row.get(1)?,
            situation_type: SituationType::from_str(&situation_type).unwrap_or_default(),
            advice: json_column(row.get(3)?),
            timestamp: row.get(4)?,
            outcome: row.get(5)?,
            success_rating: rating.and_then(|r| u8::try_from(r).ok()),
            lessons_learned: row.get(7)?,
            encrypted: row.get(8)?,
            decryption_error: false,
            locked: false,
        },
        encrypted_data: row.get(9)?,
    })
}

/// Memories, conversations, and the sync queue.
///
/// With a cipher installed, sensitive fields of new records are stored as a
/// single encrypted blob and decrypted on read. A record that fails to
/// decrypt is returned flagged and without plaintext; its siblings are
/// unaffected.
pub struct RecordStore {
    db: Arc<Database>,
    cipher: Option<Cipher>,
}

impl RecordStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db, cipher: None }
    }

    pub fn set_cipher(&mut self, cipher: Option<Cipher>) {
        self.cipher = cipher;
    }

    pub fn is_encrypting(&self) -> bool {
        self.cipher.is_some()
    }

    pub fn store_memory(&self, memory: &MemoryRecord) -> Result<i64> {
        let processed = memory
            .processed
            .clone()
            .unwrap_or_else(|| heuristics::process_memory(&memory.title, &memory.content, &memory.tags));

        let id = {
            let conn = self.db.conn()?;
            match &self.cipher {
                Some(cipher) => {
                    let payload = MemoryPayload {
                        title: memory.title.clone(),
                        content: memory.content.clone(),
                        tags: memory.tags.clone(),
                        processed: Some(processed),
                    };
                    conn.execute(
                        "INSERT INTO memories (memory_type, timestamp, created_at, encrypted, encrypted_data)
                         VALUES (?1, ?2, ?3, 1, ?4)",
                        params![
                            memory.memory_type,
                            memory.timestamp,
                            memory.created_at,
                            cipher.encrypt(&payload)?,
                        ],
                    )?;
                }
                None => {
                    conn.execute(
                        "INSERT INTO memories (title, content, tags, memory_type, timestamp, created_at, processed)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                        params![
                            memory.title,
                            memory.content,
                            serde_json::to_string(&memory.tags)?,
                            memory.memory_type,
                            memory.timestamp,
                            memory.created_at,
                            serde_json::to_string(&processed)?,
                        ],
                    )?;
                }
            }
            conn.last_insert_rowid()
        };

        debug!("Stored memory {}", id);
        self.add_to_sync_queue("memory", &serde_json::json!({ "id": id, "action": "create" }))?;
        Ok(id)
    }

    fn open_memory(&self, row: MemoryRow) -> MemoryRecord {
        let mut record = row.record;
        if !record.encrypted {
            return record;
        }
        record.clear_sensitive();

        let Some(cipher) = &self.cipher else {
            record.locked = true;
            return record;
        };
        let Some(blob) = row.encrypted_data else {
            record.decryption_error = true;
            return record;
        };

        match cipher.decrypt::<MemoryPayload>(&blob) {
            Ok(payload) => {
                record.title = payload.title;
                record.content = payload.content;
                record.tags = payload.tags;
                record.processed = payload.processed;
            }
            Err(e) => {
                warn!("Could not decrypt memory {:?}: {}", record.id, e);
                record.decryption_error = true;
            }
        }
        record
    }

    fn query_memories(&self, sql: &str, args: &[&dyn rusqlite::ToSql]) -> Result<Vec<MemoryRecord>> {
        let conn = self.db.conn()?;
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt
            .query_map(args, memory_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        drop(stmt);
        drop(conn);
        Ok(rows.into_iter().map(|row| self.open_memory(row)).collect())
    }

    /// Newest first
    pub fn get_memories(&self, limit: usize) -> Result<Vec<MemoryRecord>> {
        let sql = format!(
            "SELECT {} FROM memories ORDER BY timestamp DESC, id DESC LIMIT ?1",
            MEMORY_COLUMNS
        );
        self.query_memories(&sql, params![limit_param(limit)])
    }

    pub fn get_memory(&self, id: i64) -> Result<MemoryRecord> {
        let sql = format!("SELECT {} FROM memories WHERE id = ?1", MEMORY_COLUMNS);
        self.query_memories(&sql, params![id])?
            .into_iter()
            .next()
            .ok_or(Error::NotFound(id))
    }

    /// Plaintext search; unreadable records never match
    pub fn search_memories(&self, search: &MemorySearch) -> Result<Vec<MemoryRecord>> {
        let candidates = match &search.memory_type {
            Some(memory_type) => {
                let sql = format!(
                    "SELECT {} FROM memories WHERE memory_type = ?1 ORDER BY timestamp DESC, id DESC",
                    MEMORY_COLUMNS
                );
                self.query_memories(&sql, params![memory_type])?
            }
            None => {
                let sql = format!(
                    "SELECT {} FROM memories ORDER BY timestamp DESC, id DESC",
                    MEMORY_COLUMNS
                );
                self.query_memories(&sql, params![])?
            }
        };

        Ok(candidates
            .into_iter()
            .filter(|m| m.is_readable())
            .filter(|m| search.matches(m))
            .take(search.limit)
            .collect())
    }

    pub fn store_conversation(&self, conversation: &ConversationRecord) -> Result<i64> {
        let rating = conversation.success_rating.map(|r| r.clamp(1, 5));
        let id = {
            let conn = self.db.conn()?;
            match &self.cipher {
                Some(cipher) => {
                    let payload = ConversationPayload {
                        situation: conversation.situation.clone(),
                        advice: conversation.advice.clone(),
                        outcome: conversation.outcome.clone(),
                        lessons_learned: conversation.lessons_learned.clone(),
                    };
                    conn.execute(
                        "INSERT INTO conversations (situation_type, timestamp, success_rating, encrypted, encrypted_data)
                         VALUES (?1, ?2, ?3, 1, ?4)",
                        params![
                            conversation.situation_type.as_str(),
                            conversation.timestamp,
                            rating,
                            cipher.encrypt(&payload)?,
                        ],
                    )?;
                }
                None => {
                    let advice = match &conversation.advice {
                        Some(advice) => Some(serde_json::to_string(advice)?),
                        None => None,
                    };
                    conn.execute(
                        "INSERT INTO conversations (situation, situation_type, advice, timestamp, outcome, success_rating, lessons_learned)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                        params![
                            conversation.situation,
                            conversation.situation_type.as_str(),
                            advice,
                            conversation.timestamp,
                            conversation.outcome,
                            rating,
                            conversation.lessons_learned,
                        ],
                    )?;
                }
            }
            conn.last_insert_rowid()
        };

        debug!("Stored conversation {}", id);
        self.add_to_sync_queue(
            "conversation",
            &serde_json::json!({ "id": id, "action": "create" }),
        )?;
        Ok(id)
    }

    fn open_conversation(&self, row: ConversationRow) -> ConversationRecord {
        let mut record = row.record;
        if !record.encrypted {
            return record;
        }
        record.clear_sensitive();

        let Some(cipher) = &self.cipher else {
            record.locked = true;
            return record;
        };
        let Some(blob) = row.encrypted_data else {
            record.decryption_error = true;
            return record;
        };

        match cipher.decrypt::<ConversationPayload>(&blob) {
            Ok(payload) => {
                record.situation = payload.situation;
                record.advice = payload.advice;
                record.outcome = payload.outcome;
                record.lessons_learned = payload.lessons_learned;
            }
            Err(e) => {
                warn!("Could not decrypt conversation {:?}: {}", record.id, e);
                record.decryption_error = true;
            }
        }
        record
    }

    fn query_conversations(
        &self,
        sql: &str,
        args: &[&dyn rusqlite::ToSql],
    ) -> Result<Vec<ConversationRecord>> {
        let conn = self.db.conn()?;
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt
            .query_map(args, conversation_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        drop(stmt);
        drop(conn);
        Ok(rows.into_iter().map(|row| self.open_conversation(row)).collect())
    }

    /// Newest first
    pub fn get_conversations(&self, limit: usize) -> Result<Vec<ConversationRecord>> {
        let sql = format!(
            "SELECT {} FROM conversations ORDER BY timestamp DESC, id DESC LIMIT ?1",
            CONVERSATION_COLUMNS
        );
        self.query_conversations(&sql, params![limit_param(limit)])
    }

    pub fn get_conversation(&self, id: i64) -> Result<ConversationRecord> {
        let sql = format!("SELECT {} FROM conversations WHERE id = ?1", CONVERSATION_COLUMNS);
        self.query_conversations(&sql, params![id])?
            .into_iter()
            .next()
            .ok_or(Error::NotFound(id))
    }

    pub fn conversations_by_type(
        &self,
        situation_type: SituationType,
        limit: usize,
    ) -> Result<Vec<ConversationRecord>> {
        let sql = format!(
            "SELECT {} FROM conversations WHERE situation_type = ?1 ORDER BY timestamp DESC, id DESC LIMIT ?2",
            CONVERSATION_COLUMNS
        );
        self.query_conversations(&sql, params![situation_type.as_str(), limit_param(limit)])
    }

    /// Attach the outcome of a conversation; rating is clamped to 1-5
    pub fn record_outcome(
        &self,
        id: i64,
        outcome: &str,
        rating: u8,
        lessons_learned: Option<&str>,
    ) -> Result<()> {
        let rating = rating.clamp(1, 5);
        let existing = self.get_conversation(id)?;

        let conn = self.db.conn()?;
        if existing.encrypted {
            let cipher = self.cipher.as_ref().ok_or(Error::VaultLocked)?;
            if existing.decryption_error {
                return Err(Error::Decryption(format!("conversation {} is unreadable", id)));
            }
            let payload = ConversationPayload {
                situation: existing.situation,
                advice: existing.advice,
                outcome: Some(outcome.to_string()),
                lessons_learned: lessons_learned.map(str::to_string),
            };
            conn.execute(
                "UPDATE conversations SET success_rating = ?1, encrypted_data = ?2 WHERE id = ?3",
                params![rating, cipher.encrypt(&payload)?, id],
            )?;
        } else {
            conn.execute(
                "UPDATE conversations SET outcome = ?1, success_rating = ?2, lessons_learned = ?3 WHERE id = ?4",
                params![outcome, rating, lessons_learned, id],
            )?;
        }
        Ok(())
    }

    pub fn add_to_sync_queue(&self, item_type: &str, data: &serde_json::Value) -> Result<i64> {
        let conn = self.db.conn()?;
        conn.execute(
            "INSERT INTO sync_queue (item_type, data, timestamp) VALUES (?1, ?2, ?3)",
            params![item_type, serde_json::to_string(data)?, chrono::Utc::now().to_rfc3339()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn unsynced_items(&self) -> Result<Vec<SyncItem>> {
        let conn = self.db.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, item_type, data, timestamp, retries, synced FROM sync_queue
             WHERE synced = 0 ORDER BY id",
        )?;
        let items = stmt
            .query_map([], |row| {
                let data: String = row.get(2)?;
                Ok(SyncItem {
                    id: row.get(0)?,
                    item_type: row.get(1)?,
                    data: serde_json::from_str(&data).unwrap_or(serde_json::Value::Null),
                    timestamp: row.get(3)?,
                    retries: row.get(4)?,
                    synced: row.get(5)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(items)
    }

    /// Returns false when no such item exists
    pub fn mark_synced(&self, id: i64) -> Result<bool> {
        let conn = self.db.conn()?;
        let updated = conn.execute(
            "UPDATE sync_queue SET synced = 1, synced_at = ?1 WHERE id = ?2",
            params![chrono::Utc::now().to_rfc3339(), id],
        )?;
        Ok(updated > 0)
    }

    /// Delete all memories, conversations, and queued sync items
    pub fn clear_all(&self) -> Result<()> {
        let mut conn = self.db.conn()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM memories", [])?;
        tx.execute("DELETE FROM conversations", [])?;
        tx.execute("DELETE FROM sync_queue", [])?;
        tx.commit()?;
        Ok(())
    }

    pub fn stats(&self) -> Result<StorageStats> {
        let memories = self.get_memories(usize::MAX)?;
        let conversations = self.get_conversations(usize::MAX)?;

        let unsynced: i64 = {
            let conn = self.db.conn()?;
            conn.query_row("SELECT COUNT(*) FROM sync_queue WHERE synced = 0", [], |row| {
                row.get(0)
            })?
        };

        Ok(StorageStats {
            memories: memories.len(),
            conversations: conversations.len(),
            unsynced: unsynced as usize,
            encrypted: memories.iter().filter(|m| m.encrypted).count()
                + conversations.iter().filter(|c| c.encrypted).count(),
            unreadable: memories.iter().filter(|m| m.decryption_error).count()
                + conversations.iter().filter(|c| c.decryption_error).count(),
        })
    }

    /// Overwrite a memory's ciphertext; used to simulate corruption in tests
    #[doc(hidden)]
    pub fn overwrite_encrypted_memory(&self, id: i64, blob: &str) -> Result<()> {
        let conn = self.db.conn()?;
        let updated = conn.execute(
            "UPDATE memories SET encrypted_data = ?1 WHERE id = ?2",
            params![blob, id],
        )?;
        if updated == 0 {
            return Err(Error::NotFound(id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::advice::{AdviceContent, AdviceSource};

    fn store() -> RecordStore {
        RecordStore::new(Arc::new(Database::open_in_memory().unwrap()))
    }

    fn advice() -> AdviceResult {
        let mut content = AdviceContent {
            strategy: "Lead with numbers".to_string(),
            key_points: vec!["Bring data".to_string()],
            helpful_phrases: vec!["I'd like to discuss my role".to_string()],
            ..Default::default()
        };
        content.situation_analysis.situation_type = SituationType::Professional;
        AdviceResult::new(content, AdviceSource::Template, "enhanced-templates")
    }

    #[test]
    fn test_memory_round_trip_with_processing() {
        let store = store();
        let id = store
            .store_memory(
                &MemoryRecord::new("Raise talk", "I was nervous but my boss was happy with my project")
                    .with_tags(vec!["work".to_string()]),
            )
            .unwrap();

        let memory = store.get_memory(id).unwrap();
        assert_eq!(memory.title, "Raise talk");
        assert_eq!(memory.tags, vec!["work"]);
        let processed = memory.processed.unwrap();
        assert!(processed.topics.iter().any(|t| t.topic == "work"));
        assert!(!processed.searchable_content.is_empty());
        assert!(matches!(store.get_memory(999), Err(Error::NotFound(999))));
    }

    #[test]
    fn test_memories_newest_first_and_limited() {
        let store = store();
        for i in 0..5 {
            let mut m = MemoryRecord::new(format!("m{}", i), "content");
            m.timestamp = format!("2024-01-0{}T00:00:00+00:00", i + 1);
            store.store_memory(&m).unwrap();
        }
        let memories = store.get_memories(3).unwrap();
        let titles: Vec<_> = memories.iter().map(|m| m.title.as_str()).collect();
        assert_eq!(titles, vec!["m4", "m3", "m2"]);
    }

    #[test]
    fn test_search_by_query_tag_and_type() {
        let store = store();
        store
            .store_memory(&MemoryRecord::new("Boss", "salary review").with_tags(vec!["work".into()]))
            .unwrap();
        store
            .store_memory(
                &MemoryRecord::new("Mom", "call on sunday")
                    .with_tags(vec!["family".into()])
                    .with_type("reflection"),
            )
            .unwrap();

        assert_eq!(store.search_memories(&MemorySearch::new("SALARY")).unwrap().len(), 1);
        assert_eq!(
            store
                .search_memories(&MemorySearch::new("").with_tags(vec!["Family".into()]))
                .unwrap()[0]
                .title,
            "Mom"
        );
        assert_eq!(
            store
                .search_memories(&MemorySearch::new("").with_type("reflection"))
                .unwrap()
                .len(),
            1
        );
        assert_eq!(
            store.search_memories(&MemorySearch::new("").with_limit(1)).unwrap().len(),
            1
        );
    }

    #[test]
    fn test_encrypted_memory_hidden_while_locked() {
        let mut store = store();
        let cipher = Cipher::generate();
        store.set_cipher(Some(cipher.clone()));
        let id = store.store_memory(&MemoryRecord::new("secret", "boss raise")).unwrap();

        let memory = store.get_memory(id).unwrap();
        assert!(memory.encrypted);
        assert_eq!(memory.content, "boss raise");

        store.set_cipher(None);
        let locked = store.get_memory(id).unwrap();
        assert!(locked.locked);
        assert!(locked.content.is_empty());
        assert!(store.search_memories(&MemorySearch::new("boss")).unwrap().is_empty());
    }

    #[test]
    fn test_conversation_outcome_and_strategy_lookup() {
        let store = store();
        let id = store
            .store_conversation(&ConversationRecord::new("asking for a raise", advice()))
            .unwrap();

        store.record_outcome(id, "Got the raise", 9, Some("Data works")).unwrap();
        let conversation = store.get_conversation(id).unwrap();
        assert_eq!(conversation.success_rating, Some(5));
        assert_eq!(conversation.outcome.as_deref(), Some("Got the raise"));
        assert_eq!(conversation.situation_type, SituationType::Professional);
        assert_eq!(conversation.advice.unwrap().strategy(), "Lead with numbers");

        let found = store
            .conversations_by_type(SituationType::Professional, 10)
            .unwrap();
        assert_eq!(found.len(), 1);
        assert!(store
            .conversations_by_type(SituationType::Romantic, 10)
            .unwrap()
            .is_empty());
        assert!(matches!(
            store.record_outcome(42, "x", 3, None),
            Err(Error::NotFound(42))
        ));
    }

    #[test]
    fn test_encrypted_conversation_outcome() {
        let mut store = store();
        store.set_cipher(Some(Cipher::generate()));
        let id = store
            .store_conversation(&ConversationRecord::new("apologizing", advice()))
            .unwrap();
        store.record_outcome(id, "went well", 4, None).unwrap();

        let conversation = store.get_conversation(id).unwrap();
        assert!(conversation.encrypted);
        assert_eq!(conversation.situation, "apologizing");
        assert_eq!(conversation.outcome.as_deref(), Some("went well"));
        assert_eq!(conversation.success_rating, Some(4));

        store.set_cipher(None);
        assert!(matches!(
            store.record_outcome(id, "again", 4, None),
            Err(Error::VaultLocked)
        ));
    }

    #[test]
    fn test_sync_queue() {
        let store = store();
        store.store_memory(&MemoryRecord::new("a", "b")).unwrap();
        let extra = store
            .add_to_sync_queue("settings", &serde_json::json!({"k": 1}))
            .unwrap();

        let items = store.unsynced_items().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].item_type, "memory");

        assert!(store.mark_synced(extra).unwrap());
        assert!(!store.mark_synced(9999).unwrap());
        assert_eq!(store.unsynced_items().unwrap().len(), 1);
    }

    #[test]
    fn test_stats_and_clear_all() {
        let mut store = store();
        store.store_memory(&MemoryRecord::new("plain", "text")).unwrap();
        store.set_cipher(Some(Cipher::generate()));
        store.store_memory(&MemoryRecord::new("hidden", "text")).unwrap();
        store
            .store_conversation(&ConversationRecord::new("talk", advice()))
            .unwrap();

        let stats = store.stats().unwrap();
        assert_eq!(stats.memories, 2);
        assert_eq!(stats.conversations, 1);
        assert_eq!(stats.encrypted, 2);
        assert_eq!(stats.unsynced, 3);
        assert_eq!(stats.unreadable, 0);

        store.clear_all().unwrap();
        assert_eq!(store.stats().unwrap(), StorageStats::default());
    }
}
