//! SQLite storage backend for convo-sync.

use super::{RecordCounts, RecordStore, StoreTransaction};
use crate::error::{StorageError, StorageResult};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{Executor, Sqlite, Transaction};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use sync_core::{Cardinality, EntitySchema, StoreSchema};
use sync_types::{ConversationRecord, MessageRecord, RemoteId, UserId};
use tracing::debug;

/// How a table column shows up in the logical schema.
#[derive(Clone, Copy)]
enum Mapped {
    Attribute(&'static str),
    Relationship(&'static str, Cardinality),
}

const CONVERSATION_COLUMNS: &[(&str, Mapped)] = &[
    ("identifier", Mapped::Attribute("identifier")),
    ("created_at", Mapped::Attribute("createdAt")),
    (
        "last_message_id",
        Mapped::Relationship("lastMessage", Cardinality::ToOne),
    ),
];

const MESSAGE_COLUMNS: &[(&str, Mapped)] = &[
    ("identifier", Mapped::Attribute("identifier")),
    ("idx", Mapped::Attribute("index")),
    ("is_sent", Mapped::Attribute("isSent")),
    ("sent_at", Mapped::Attribute("sentAt")),
    ("received_at", Mapped::Attribute("receivedAt")),
    ("sent_by_user_id", Mapped::Attribute("sentByUserID")),
    (
        "conversation_id",
        Mapped::Relationship("conversation", Cardinality::ToOne),
    ),
];

/// SQLite-based record store.
///
/// Uses WAL mode for concurrent reads/writes.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
    read_only: bool,
    conversation_entity: String,
    message_entity: String,
}

impl SqliteStore {
    /// Open (or create) a store at the given database path and migrate it.
    pub async fn new(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(10)
            .connect_with(options)
            .await?;

        let store = Self::from_pool(pool, false);
        store.run_migrations().await?;
        debug!(path = %path.display(), "opened sqlite store");
        Ok(store)
    }

    /// Open an existing store without write access.
    ///
    /// The engine refuses such a handle; it is useful for inspection.
    pub async fn open_read_only(path: &Path) -> StorageResult<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .read_only(true)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        Ok(Self::from_pool(pool, true))
    }

    /// Create an in-memory SQLite store (for testing).
    pub async fn in_memory() -> StorageResult<Self> {
        let options = SqliteConnectOptions::from_str(":memory:")?
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);

        // One connection that never expires: the database lives in it.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let store = Self::from_pool(pool, false);
        store.run_migrations().await?;
        Ok(store)
    }

    /// Report the two entities under different names.
    pub fn with_entity_names(mut self, conversation: &str, message: &str) -> Self {
        self.conversation_entity = conversation.to_string();
        self.message_entity = message.to_string();
        self
    }

    /// Close the pool. Later calls fail with [`StorageError::Closed`].
    pub async fn close(&self) {
        self.pool.close().await;
    }

    fn from_pool(pool: SqlitePool, read_only: bool) -> Self {
        Self {
            pool,
            read_only,
            conversation_entity: "Conversation".to_string(),
            message_entity: "Message".to_string(),
        }
    }

    /// Run database migrations.
    async fn run_migrations(&self) -> StorageResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS conversations (
                identifier TEXT PRIMARY KEY,
                created_at INTEGER NOT NULL,
                last_message_id TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS messages (
                identifier TEXT PRIMARY KEY,
                conversation_id TEXT NOT NULL,
                idx INTEGER NOT NULL,
                is_sent INTEGER NOT NULL DEFAULT 0,
                sent_at INTEGER,
                received_at INTEGER,
                sent_by_user_id TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_messages_conversation_idx ON messages(conversation_id, idx)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_conversations_last_message ON conversations(last_message_id)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn table_columns(&self, table: &str) -> StorageResult<Vec<String>> {
        let columns: Vec<String> = sqlx::query_scalar("SELECT name FROM pragma_table_info(?1)")
            .bind(table)
            .fetch_all(&self.pool)
            .await?;
        Ok(columns)
    }

    fn ensure_open(&self) -> StorageResult<()> {
        if self.pool.is_closed() {
            return Err(StorageError::Closed);
        }
        Ok(())
    }
}

fn map_columns(name: &str, columns: &[String], mapping: &[(&str, Mapped)]) -> EntitySchema {
    let mut entity = EntitySchema::new(name);
    for (column, mapped) in mapping {
        if !columns.iter().any(|c| c == column) {
            continue;
        }
        entity = match *mapped {
            Mapped::Attribute(attribute) => entity.with_attribute(attribute),
            Mapped::Relationship(relationship, cardinality) => {
                entity.with_relationship(relationship, cardinality)
            }
        };
    }
    entity
}

#[async_trait]
impl RecordStore for SqliteStore {
    type Tx = SqliteTransaction;

    async fn schema(&self) -> StorageResult<StoreSchema> {
        self.ensure_open()?;
        let conversation_columns = self.table_columns("conversations").await?;
        let message_columns = self.table_columns("messages").await?;

        let mut schema = StoreSchema::new();

        if !conversation_columns.is_empty() {
            let mut entity = map_columns(
                &self.conversation_entity,
                &conversation_columns,
                CONVERSATION_COLUMNS,
            );
            // Inverse of messages.conversation_id.
            if message_columns.iter().any(|c| c == "conversation_id") {
                entity = entity.with_relationship("messages", Cardinality::ToMany);
            }
            schema = schema.with_entity(entity);
        }

        if !message_columns.is_empty() {
            let mut entity = map_columns(&self.message_entity, &message_columns, MESSAGE_COLUMNS);
            // Inverse of conversations.last_message_id.
            if conversation_columns.iter().any(|c| c == "last_message_id") {
                entity = entity.with_relationship("lastMessageConversation", Cardinality::ToOne);
            }
            schema = schema.with_entity(entity);
        }

        Ok(schema)
    }

    fn check_handle(&self) -> StorageResult<()> {
        self.ensure_open()?;
        if self.read_only {
            return Err(StorageError::ReadOnly);
        }
        Ok(())
    }

    async fn begin(&self) -> StorageResult<SqliteTransaction> {
        self.check_handle()?;
        let tx = self.pool.begin().await?;
        Ok(SqliteTransaction { tx })
    }

    async fn conversation(&self, id: &RemoteId) -> StorageResult<Option<ConversationRecord>> {
        self.ensure_open()?;
        fetch_conversation(&self.pool, id).await
    }

    async fn message(&self, id: &RemoteId) -> StorageResult<Option<MessageRecord>> {
        self.ensure_open()?;
        fetch_message(&self.pool, id).await
    }

    async fn messages_in(&self, conversation: &RemoteId) -> StorageResult<Vec<MessageRecord>> {
        self.ensure_open()?;
        fetch_messages_in(&self.pool, conversation).await
    }

    async fn counts(&self) -> StorageResult<RecordCounts> {
        self.ensure_open()?;
        let (conversations, messages): (i64, i64) = sqlx::query_as(
            r#"
            SELECT
                (SELECT COUNT(*) FROM conversations),
                (SELECT COUNT(*) FROM messages)
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(RecordCounts {
            conversations: conversations as u64,
            messages: messages as u64,
        })
    }
}

/// A transaction on a [`SqliteStore`].
pub struct SqliteTransaction {
    tx: Transaction<'static, Sqlite>,
}

#[async_trait]
impl StoreTransaction for SqliteTransaction {
    async fn find_conversation(
        &mut self,
        id: &RemoteId,
    ) -> StorageResult<Option<ConversationRecord>> {
        fetch_conversation(&mut *self.tx, id).await
    }

    async fn find_message(&mut self, id: &RemoteId) -> StorageResult<Option<MessageRecord>> {
        fetch_message(&mut *self.tx, id).await
    }

    async fn messages_in(&mut self, conversation: &RemoteId) -> StorageResult<Vec<MessageRecord>> {
        fetch_messages_in(&mut *self.tx, conversation).await
    }

    async fn put_conversation(&mut self, record: &ConversationRecord) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO conversations (identifier, created_at, last_message_id)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(identifier) DO UPDATE SET
                created_at = excluded.created_at,
                last_message_id = excluded.last_message_id
            "#,
        )
        .bind(record.identifier.as_str())
        .bind(record.created_at)
        .bind(record.last_message.as_ref().map(RemoteId::as_str))
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn put_message(&mut self, record: &MessageRecord) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO messages
                (identifier, conversation_id, idx, is_sent, sent_at, received_at, sent_by_user_id)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(identifier) DO UPDATE SET
                conversation_id = excluded.conversation_id,
                idx = excluded.idx,
                is_sent = excluded.is_sent,
                sent_at = excluded.sent_at,
                received_at = excluded.received_at,
                sent_by_user_id = excluded.sent_by_user_id
            "#,
        )
        .bind(record.identifier.as_str())
        .bind(record.conversation.as_str())
        .bind(record.index)
        .bind(record.is_sent)
        .bind(record.sent_at)
        .bind(record.received_at)
        .bind(record.sent_by_user_id.as_ref().map(UserId::as_str))
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn delete_conversation(&mut self, id: &RemoteId) -> StorageResult<bool> {
        let result = sqlx::query("DELETE FROM conversations WHERE identifier = ?1")
            .bind(id.as_str())
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_message(&mut self, id: &RemoteId) -> StorageResult<bool> {
        let result = sqlx::query("DELETE FROM messages WHERE identifier = ?1")
            .bind(id.as_str())
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn commit(self) -> StorageResult<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self) -> StorageResult<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}

async fn fetch_conversation<'e, E>(
    executor: E,
    id: &RemoteId,
) -> StorageResult<Option<ConversationRecord>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query_as::<_, ConversationRow>(
        r#"
        SELECT identifier, created_at, last_message_id
        FROM conversations
        WHERE identifier = ?1
        "#,
    )
    .bind(id.as_str())
    .fetch_optional(executor)
    .await?;

    row.map(ConversationRecord::try_from).transpose()
}

async fn fetch_message<'e, E>(executor: E, id: &RemoteId) -> StorageResult<Option<MessageRecord>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query_as::<_, MessageRow>(
        r#"
        SELECT identifier, conversation_id, idx, is_sent, sent_at, received_at, sent_by_user_id
        FROM messages
        WHERE identifier = ?1
        "#,
    )
    .bind(id.as_str())
    .fetch_optional(executor)
    .await?;

    row.map(MessageRecord::try_from).transpose()
}

async fn fetch_messages_in<'e, E>(
    executor: E,
    conversation: &RemoteId,
) -> StorageResult<Vec<MessageRecord>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let rows = sqlx::query_as::<_, MessageRow>(
        r#"
        SELECT identifier, conversation_id, idx, is_sent, sent_at, received_at, sent_by_user_id
        FROM messages
        WHERE conversation_id = ?1
        ORDER BY idx ASC, identifier ASC
        "#,
    )
    .bind(conversation.as_str())
    .fetch_all(executor)
    .await?;

    rows.into_iter().map(MessageRecord::try_from).collect()
}

/// Internal row type for conversation queries.
#[derive(sqlx::FromRow)]
struct ConversationRow {
    identifier: String,
    created_at: i64,
    last_message_id: Option<String>,
}

/// Internal row type for message queries.
#[derive(sqlx::FromRow)]
struct MessageRow {
    identifier: String,
    conversation_id: String,
    idx: i64,
    is_sent: bool,
    sent_at: Option<i64>,
    received_at: Option<i64>,
    sent_by_user_id: Option<String>,
}

fn non_empty(table: &'static str, column: &str, value: String) -> StorageResult<RemoteId> {
    let id = RemoteId::new(value);
    if id.is_empty() {
        return Err(StorageError::CorruptRow {
            table,
            reason: format!("empty {column}"),
        });
    }
    Ok(id)
}

impl TryFrom<ConversationRow> for ConversationRecord {
    type Error = StorageError;

    fn try_from(row: ConversationRow) -> Result<Self, Self::Error> {
        Ok(ConversationRecord {
            identifier: non_empty("conversations", "identifier", row.identifier)?,
            created_at: row.created_at,
            last_message: row
                .last_message_id
                .map(|id| non_empty("conversations", "last_message_id", id))
                .transpose()?,
        })
    }
}

impl TryFrom<MessageRow> for MessageRecord {
    type Error = StorageError;

    fn try_from(row: MessageRow) -> Result<Self, Self::Error> {
        Ok(MessageRecord {
            identifier: non_empty("messages", "identifier", row.identifier)?,
            conversation: non_empty("messages", "conversation_id", row.conversation_id)?,
            index: row.idx,
            is_sent: row.is_sent,
            sent_at: row.sent_at,
            received_at: row.received_at,
            sent_by_user_id: row.sent_by_user_id.map(UserId::new),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sync_core::{validate, CONVERSATION_ENTITY, MESSAGE_ENTITY};

    fn conversation(id: &str) -> ConversationRecord {
        ConversationRecord {
            identifier: RemoteId::new(id),
            created_at: 1_700_000_000_000,
            last_message: None,
        }
    }

    fn message(id: &str, conversation: &str, index: i64) -> MessageRecord {
        MessageRecord {
            identifier: RemoteId::new(id),
            conversation: RemoteId::new(conversation),
            index,
            is_sent: false,
            sent_at: None,
            received_at: None,
            sent_by_user_id: Some(UserId::new("u1")),
        }
    }

    #[tokio::test]
    async fn put_and_find_within_transaction() {
        let store = SqliteStore::in_memory().await.unwrap();
        let mut tx = store.begin().await.unwrap();

        tx.put_conversation(&conversation("c1")).await.unwrap();
        tx.put_message(&message("m1", "c1", 0)).await.unwrap();

        let found = tx.find_message(&RemoteId::new("m1")).await.unwrap();
        assert_eq!(found, Some(message("m1", "c1", 0)));
        tx.commit().await.unwrap();

        let c = store.conversation(&RemoteId::new("c1")).await.unwrap();
        assert_eq!(c, Some(conversation("c1")));
    }

    #[tokio::test]
    async fn rollback_discards_writes() {
        let store = SqliteStore::in_memory().await.unwrap();
        let mut tx = store.begin().await.unwrap();
        tx.put_conversation(&conversation("c1")).await.unwrap();
        tx.rollback().await.unwrap();

        assert!(store
            .conversation(&RemoteId::new("c1"))
            .await
            .unwrap()
            .is_none());
        assert_eq!(store.counts().await.unwrap(), RecordCounts::default());
    }

    #[tokio::test]
    async fn uncommitted_writes_are_invisible_outside() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::new(&dir.path().join("convo.db")).await.unwrap();

        let mut tx = store.begin().await.unwrap();
        tx.put_conversation(&conversation("c1")).await.unwrap();

        assert!(store
            .conversation(&RemoteId::new("c1"))
            .await
            .unwrap()
            .is_none());

        tx.commit().await.unwrap();
        assert!(store
            .conversation(&RemoteId::new("c1"))
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn upsert_replaces_fields() {
        let store = SqliteStore::in_memory().await.unwrap();
        let mut tx = store.begin().await.unwrap();
        tx.put_message(&message("m1", "c1", 0)).await.unwrap();

        let mut updated = message("m1", "c1", 4);
        updated.is_sent = true;
        updated.sent_at = Some(42);
        tx.put_message(&updated).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(
            store.message(&RemoteId::new("m1")).await.unwrap(),
            Some(updated)
        );
        assert_eq!(store.counts().await.unwrap().messages, 1);
    }

    #[tokio::test]
    async fn messages_ordered_by_index_then_identifier() {
        let store = SqliteStore::in_memory().await.unwrap();
        let mut tx = store.begin().await.unwrap();
        tx.put_message(&message("b", "c1", 2)).await.unwrap();
        tx.put_message(&message("a", "c1", 2)).await.unwrap();
        tx.put_message(&message("z", "c1", 0)).await.unwrap();
        tx.put_message(&message("x", "c2", 1)).await.unwrap();
        tx.commit().await.unwrap();

        let ids: Vec<_> = store
            .messages_in(&RemoteId::new("c1"))
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.identifier.as_str().to_string())
            .collect();
        assert_eq!(ids, vec!["z", "a", "b"]);
    }

    #[tokio::test]
    async fn delete_reports_existence() {
        let store = SqliteStore::in_memory().await.unwrap();
        let mut tx = store.begin().await.unwrap();
        tx.put_message(&message("m1", "c1", 0)).await.unwrap();

        assert!(tx.delete_message(&RemoteId::new("m1")).await.unwrap());
        assert!(!tx.delete_message(&RemoteId::new("m1")).await.unwrap());
        assert!(!tx
            .delete_conversation(&RemoteId::new("nope"))
            .await
            .unwrap());
        tx.commit().await.unwrap();
    }

    #[tokio::test]
    async fn last_message_pointer_persists() {
        let store = SqliteStore::in_memory().await.unwrap();
        let mut c = conversation("c1");
        c.last_message = Some(RemoteId::new("m1"));

        let mut tx = store.begin().await.unwrap();
        tx.put_conversation(&c).await.unwrap();
        tx.commit().await.unwrap();

        let stored = store.conversation(&RemoteId::new("c1")).await.unwrap();
        assert_eq!(stored.unwrap().last_message, Some(RemoteId::new("m1")));
    }

    #[tokio::test]
    async fn introspected_schema_matches_descriptors() {
        let store = SqliteStore::in_memory().await.unwrap();
        let schema = store.schema().await.unwrap();

        assert_eq!(schema, StoreSchema::canonical("Conversation", "Message"));
        assert!(validate(&CONVERSATION_ENTITY, "Conversation", &schema).is_ok());
        assert!(validate(&MESSAGE_ENTITY, "Message", &schema).is_ok());
    }

    #[tokio::test]
    async fn schema_uses_configured_entity_names() {
        let store = SqliteStore::in_memory()
            .await
            .unwrap()
            .with_entity_names("Thread", "Post");
        let schema = store.schema().await.unwrap();

        assert!(validate(&CONVERSATION_ENTITY, "Thread", &schema).is_ok());
        assert!(validate(&MESSAGE_ENTITY, "Post", &schema).is_ok());
    }

    #[tokio::test]
    async fn dropped_column_fails_validation() {
        let store = SqliteStore::in_memory().await.unwrap();
        sqlx::query("ALTER TABLE messages DROP COLUMN sent_by_user_id")
            .execute(&store.pool)
            .await
            .unwrap();

        let schema = store.schema().await.unwrap();
        assert!(validate(&MESSAGE_ENTITY, "Message", &schema).is_err());
    }

    #[tokio::test]
    async fn closed_store_rejects_calls() {
        let store = SqliteStore::in_memory().await.unwrap();
        store.close().await;

        assert!(matches!(store.check_handle(), Err(StorageError::Closed)));
        assert!(matches!(store.begin().await, Err(StorageError::Closed)));
    }

    #[tokio::test]
    async fn read_only_store_is_flagged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("convo.db");
        let writer = SqliteStore::new(&path).await.unwrap();
        assert!(writer.check_handle().is_ok());

        let store = SqliteStore::open_read_only(&path).await.unwrap();
        assert!(matches!(store.check_handle(), Err(StorageError::ReadOnly)));
        assert_eq!(store.counts().await.unwrap(), RecordCounts::default());
    }

    #[tokio::test]
    async fn creates_missing_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("deeper").join("convo.db");
        let store = SqliteStore::new(&path).await.unwrap();

        assert!(path.exists());
        assert!(store.check_handle().is_ok());
    }
}
