//! Collections du cache : lecture seule ou écriture différée

use crate::model::Document;
use crate::store::{BulkOp, DocumentStore, DocumentStoreExt, FindOptions, Modifier, Selector};
use crate::{Error, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;

/// Bilan d'une écriture vers le store
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Changes {
    pub added: usize,
    pub updated: usize,
    pub removed: usize,
}

impl Changes {
    pub fn anything_changed(&self) -> bool {
        self.added + self.updated + self.removed > 0
    }

    pub fn sum(all: &[Changes]) -> Changes {
        all.iter().fold(Changes::default(), |acc, c| Changes {
            added: acc.added + c.added,
            updated: acc.updated + c.updated,
            removed: acc.removed + c.removed,
        })
    }
}

/// Élément du cache dont les modifications sont écrites au commit
#[async_trait]
pub trait DbCacheWritable: Send {
    fn name(&self) -> &'static str;

    fn is_modified(&self) -> bool;

    fn discard_changes(&mut self);

    /// Vide la collection et refuse toute écriture ultérieure
    fn mark_for_removal(&mut self);

    async fn update_database_with_data(&mut self, store: &dyn DocumentStore) -> Result<Changes>;

    /// Le timeline est écrit avant tout le reste
    fn is_high_priority(&self) -> bool {
        self.name().to_lowercase().contains("timeline")
    }
}

/// Collection chargée une fois, jamais écrite
#[derive(Debug, Clone)]
pub struct ReadCollection<T: Document> {
    documents: BTreeMap<String, T>,
}

impl<T: Document> ReadCollection<T> {
    pub async fn load(store: &dyn DocumentStore, selector: Selector) -> Result<Self> {
        let docs: Vec<T> = store.find_docs(&selector, &FindOptions::default()).await?;
        Ok(Self::from_docs(docs))
    }

    pub fn from_docs(docs: impl IntoIterator<Item = T>) -> Self {
        Self {
            documents: docs.into_iter().map(|d| (d.id().to_string(), d)).collect(),
        }
    }

    pub fn find_one(&self, id: &str) -> Option<&T> {
        self.documents.get(id)
    }

    pub fn find(&self, pred: impl Fn(&T) -> bool) -> Vec<&T> {
        self.documents.values().filter(|d| pred(d)).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.documents.values()
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

/// Collection dont les écritures sont mises en attente jusqu'au commit
///
/// L'état chargé est conservé sous forme sérialisée ; le commit calcule la
/// différence document par document (insertion, `$set`/`$unset`, suppression).
#[derive(Debug, Clone)]
pub struct WriteCollection<T: Document> {
    original: BTreeMap<String, Value>,
    documents: BTreeMap<String, T>,
    removed: bool,
}

impl<T: Document> WriteCollection<T> {
    pub async fn load(store: &dyn DocumentStore, selector: Selector) -> Result<Self> {
        let docs: Vec<T> = store.find_docs(&selector, &FindOptions::default()).await?;
        Self::from_loaded(docs)
    }

    /// Collection initialisée avec des documents déjà présents dans le store
    pub fn from_loaded(docs: impl IntoIterator<Item = T>) -> Result<Self> {
        let documents: BTreeMap<String, T> = docs.into_iter().map(|d| (d.id().to_string(), d)).collect();
        let original = documents
            .iter()
            .map(|(id, d)| Ok((id.clone(), serde_json::to_value(d)?)))
            .collect::<Result<_>>()?;
        Ok(Self {
            original,
            documents,
            removed: false,
        })
    }

    pub fn find_one(&self, id: &str) -> Option<&T> {
        self.documents.get(id)
    }

    pub fn find(&self, pred: impl Fn(&T) -> bool) -> Vec<&T> {
        self.documents.values().filter(|d| pred(d)).collect()
    }

    pub fn find_first(&self, pred: impl Fn(&T) -> bool) -> Option<&T> {
        self.documents.values().find(|d| pred(d))
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.documents.values()
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    fn check_writable(&self) -> Result<()> {
        if self.removed {
            return Err(Error::invalid_state(format!(
                "Collection {} is marked for removal",
                T::COLLECTION
            )));
        }
        Ok(())
    }

    pub fn insert(&mut self, doc: T) -> Result<()> {
        self.check_writable()?;
        let id = doc.id().to_string();
        if self.documents.contains_key(&id) {
            return Err(Error::invariant(format!(
                "Document {} already exists in {}",
                id,
                T::COLLECTION
            )));
        }
        self.documents.insert(id, doc);
        Ok(())
    }

    /// Insère ou remplace
    pub fn replace(&mut self, doc: T) -> Result<()> {
        self.check_writable()?;
        self.documents.insert(doc.id().to_string(), doc);
        Ok(())
    }

    pub fn update(&mut self, id: &str, f: impl FnOnce(&mut T)) -> Result<()> {
        self.check_writable()?;
        let doc = self
            .documents
            .get_mut(id)
            .ok_or_else(|| Error::not_found(T::COLLECTION, id))?;
        f(doc);
        Ok(())
    }

    pub fn update_where(&mut self, pred: impl Fn(&T) -> bool, mut f: impl FnMut(&mut T)) -> Result<usize> {
        self.check_writable()?;
        let mut count = 0;
        for doc in self.documents.values_mut().filter(|d| pred(d)) {
            f(doc);
            count += 1;
        }
        Ok(count)
    }

    pub fn remove(&mut self, id: &str) -> Result<Option<T>> {
        self.check_writable()?;
        Ok(self.documents.remove(id))
    }

    pub fn remove_where(&mut self, pred: impl Fn(&T) -> bool) -> Result<usize> {
        self.check_writable()?;
        let before = self.documents.len();
        self.documents.retain(|_, d| !pred(d));
        Ok(before - self.documents.len())
    }

    fn pending_ops(&self) -> Result<(Vec<BulkOp>, Changes)> {
        let mut ops = Vec::new();
        let mut changes = Changes::default();

        for (id, doc) in &self.documents {
            let value = serde_json::to_value(doc)?;
            match self.original.get(id) {
                None => {
                    ops.push(BulkOp::InsertOne(value));
                    changes.added += 1;
                }
                Some(old) if *old != value => {
                    ops.push(BulkOp::UpdateMany {
                        selector: Selector::Id(id.clone()),
                        modifier: Modifier::diff(old, &value),
                    });
                    changes.updated += 1;
                }
                Some(_) => {}
            }
        }
        for id in self.original.keys() {
            if !self.documents.contains_key(id) {
                ops.push(BulkOp::DeleteMany(Selector::Id(id.clone())));
                changes.removed += 1;
            }
        }
        Ok((ops, changes))
    }
}

#[async_trait]
impl<T: Document> DbCacheWritable for WriteCollection<T> {
    fn name(&self) -> &'static str {
        T::COLLECTION
    }

    fn is_modified(&self) -> bool {
        match self.pending_ops() {
            Ok((ops, _)) => !ops.is_empty(),
            Err(_) => true,
        }
    }

    fn discard_changes(&mut self) {
        let restored: BTreeMap<String, T> = self
            .original
            .iter()
            .filter_map(|(id, v)| serde_json::from_value(v.clone()).ok().map(|d| (id.clone(), d)))
            .collect();
        self.documents = restored;
        self.removed = false;
    }

    fn mark_for_removal(&mut self) {
        self.documents.clear();
        self.removed = true;
    }

    async fn update_database_with_data(&mut self, store: &dyn DocumentStore) -> Result<Changes> {
        if self.removed {
            return Ok(Changes::default());
        }
        let (ops, changes) = self.pending_ops()?;
        if ops.is_empty() {
            return Ok(changes);
        }
        store.bulk_write(T::COLLECTION, ops).await?;

        self.original = self
            .documents
            .iter()
            .map(|(id, d)| Ok((id.clone(), serde_json::to_value(d)?)))
            .collect::<Result<_>>()?;
        Ok(changes)
    }
}
