//! Persistance SQLite des documents

use super::{BulkOp, DocumentStore, FindOptions, Selector, doc_id};
use crate::{Error, Result};
use async_trait::async_trait;
use rusqlite::{Connection, OptionalExtension, Transaction, params};
use serde_json::Value;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

/// Store SQLite : une table `documents(collection, id, body)`
///
/// Chaque appel à `bulk_write` s'exécute dans une seule transaction.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Ouvre (ou crée) la base
    pub fn new(db_path: &Path) -> Result<Self> {
        // Créer le répertoire parent si nécessaire
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::Storage(format!("Failed to create directory: {}", e)))?;
        }

        let conn = Connection::open(db_path)
            .map_err(|e| Error::Storage(format!("Failed to open database: {}", e)))?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS documents (
                collection TEXT NOT NULL,
                id TEXT NOT NULL,
                body TEXT NOT NULL,
                PRIMARY KEY (collection, id)
            )",
            [],
        )
        .map_err(|e| Error::Storage(format!("Failed to create documents table: {}", e)))?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::Storage("SQLite connection lock poisoned".into()))
    }

    fn load_collection(conn: &Connection, collection: &str) -> Result<Vec<(String, Value)>> {
        let mut stmt = conn.prepare("SELECT id, body FROM documents WHERE collection = ?1 ORDER BY id")?;
        let rows = stmt.query_map(params![collection], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut docs = Vec::new();
        for row in rows {
            let (id, body) = row?;
            docs.push((id, serde_json::from_str(&body)?));
        }
        Ok(docs)
    }

    fn find_blocking(&self, collection: &str, selector: &Selector, options: &FindOptions) -> Result<Vec<Value>> {
        let conn = self.lock()?;

        let mut found = match selector.target_id() {
            Some(id) => {
                let body: Option<String> = conn
                    .query_row(
                        "SELECT body FROM documents WHERE collection = ?1 AND id = ?2",
                        params![collection, id],
                        |row| row.get(0),
                    )
                    .optional()?;
                match body {
                    Some(body) => vec![serde_json::from_str::<Value>(&body)?],
                    None => Vec::new(),
                }
            }
            None => Self::load_collection(&conn, collection)?
                .into_iter()
                .map(|(_, doc)| doc)
                .collect(),
        };

        found.retain(|d| selector.matches(d));
        options.apply(&mut found);
        Ok(found)
    }

    fn write_doc(tx: &Transaction<'_>, collection: &str, id: &str, doc: &Value) -> Result<()> {
        tx.execute(
            "INSERT OR REPLACE INTO documents (collection, id, body) VALUES (?1, ?2, ?3)",
            params![collection, id, serde_json::to_string(doc)?],
        )?;
        Ok(())
    }

    fn bulk_write_blocking(&self, collection: &str, ops: Vec<BulkOp>) -> Result<usize> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let mut touched = 0;

        for op in ops {
            match op {
                BulkOp::InsertOne(doc) => {
                    let id = doc_id(&doc)?;
                    tx.execute(
                        "INSERT INTO documents (collection, id, body) VALUES (?1, ?2, ?3)",
                        params![collection, id, serde_json::to_string(&doc)?],
                    )
                    .map_err(|e| Error::Storage(format!("Failed to insert {} into {}: {}", id, collection, e)))?;
                    touched += 1;
                }
                BulkOp::ReplaceOne { id, doc } => {
                    Self::write_doc(&tx, collection, &id, &doc)?;
                    touched += 1;
                }
                BulkOp::UpdateMany { selector, modifier } => {
                    for (id, mut doc) in Self::load_collection(&tx, collection)? {
                        if selector.matches(&doc) {
                            modifier.apply(&mut doc);
                            Self::write_doc(&tx, collection, &id, &doc)?;
                            touched += 1;
                        }
                    }
                }
                BulkOp::DeleteMany(selector) => {
                    for (id, doc) in Self::load_collection(&tx, collection)? {
                        if selector.matches(&doc) {
                            tx.execute(
                                "DELETE FROM documents WHERE collection = ?1 AND id = ?2",
                                params![collection, id],
                            )?;
                            touched += 1;
                        }
                    }
                }
            }
        }

        // Un retour anticipé abandonne la transaction (rollback au drop)
        tx.commit()?;
        debug!(collection, touched, "SQLite bulk write committed");
        Ok(touched)
    }
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn find(&self, collection: &str, selector: &Selector, options: &FindOptions) -> Result<Vec<Value>> {
        self.find_blocking(collection, selector, options)
    }

    async fn bulk_write(&self, collection: &str, ops: Vec<BulkOp>) -> Result<usize> {
        self.bulk_write_blocking(collection, ops)
    }
}
