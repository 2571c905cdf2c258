//! Stockage de documents
//!
//! Le cache ne dépend que des primitives exposées par [`DocumentStore`] :
//! `find`, `find_one`, `insert`, `update`, `remove` et `bulk_write`.
//! Deux implémentations sont fournies : [`MemoryStore`] (tests, dump
//! octet par octet) et [`SqliteStore`] (persistance, écritures groupées
//! transactionnelles).

mod memory;
mod query;
mod sqlite;

pub use memory::MemoryStore;
pub use query::{FindOptions, Modifier, Selector, SortOrder};
pub use sqlite::SqliteStore;

use crate::model::Document;
use crate::{Error, Result};
use async_trait::async_trait;
use serde_json::Value;

/// Opération élémentaire d'une écriture groupée
#[derive(Debug, Clone, PartialEq)]
pub enum BulkOp {
    InsertOne(Value),
    /// Remplace (ou crée) le document d'identifiant donné
    ReplaceOne { id: String, doc: Value },
    UpdateMany { selector: Selector, modifier: Modifier },
    DeleteMany(Selector),
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn find(
        &self,
        collection: &str,
        selector: &Selector,
        options: &FindOptions,
    ) -> Result<Vec<Value>>;

    /// Applique toutes les opérations, ou aucune
    ///
    /// Retourne le nombre de documents touchés.
    async fn bulk_write(&self, collection: &str, ops: Vec<BulkOp>) -> Result<usize>;

    async fn find_one(&self, collection: &str, selector: &Selector) -> Result<Option<Value>> {
        let mut docs = self
            .find(collection, selector, &FindOptions::default().limit(1))
            .await?;
        Ok(docs.pop())
    }

    async fn insert(&self, collection: &str, doc: Value) -> Result<()> {
        self.bulk_write(collection, vec![BulkOp::InsertOne(doc)]).await?;
        Ok(())
    }

    async fn update(&self, collection: &str, selector: &Selector, modifier: &Modifier) -> Result<usize> {
        self.bulk_write(
            collection,
            vec![BulkOp::UpdateMany {
                selector: selector.clone(),
                modifier: modifier.clone(),
            }],
        )
        .await
    }

    async fn remove(&self, collection: &str, selector: &Selector) -> Result<usize> {
        self.bulk_write(collection, vec![BulkOp::DeleteMany(selector.clone())])
            .await
    }
}

/// Accès typé aux collections
#[async_trait]
pub trait DocumentStoreExt: DocumentStore {
    async fn find_docs<T: Document>(&self, selector: &Selector, options: &FindOptions) -> Result<Vec<T>> {
        self.find(T::COLLECTION, selector, options)
            .await?
            .into_iter()
            .map(|v| serde_json::from_value(v).map_err(Error::from))
            .collect()
    }

    async fn find_doc<T: Document>(&self, id: &str) -> Result<Option<T>> {
        match self.find_one(T::COLLECTION, &Selector::Id(id.to_string())).await? {
            Some(v) => Ok(Some(serde_json::from_value(v)?)),
            None => Ok(None),
        }
    }

    async fn insert_doc<T: Document>(&self, doc: &T) -> Result<()> {
        self.insert(T::COLLECTION, serde_json::to_value(doc)?).await
    }
}

impl<S: DocumentStore + ?Sized> DocumentStoreExt for S {}

pub(crate) fn doc_id(doc: &Value) -> Result<String> {
    doc.get("_id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| Error::Storage("Document has no _id".into()))
}
