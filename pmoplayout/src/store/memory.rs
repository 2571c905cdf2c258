use super::{BulkOp, DocumentStore, FindOptions, Selector, doc_id};
use crate::{Error, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Mutex;

type Collections = BTreeMap<String, BTreeMap<String, Value>>;

/// Store en mémoire
///
/// Les documents sont rangés par collection puis par identifiant, ce qui
/// rend [`MemoryStore::dump`] stable d'un appel à l'autre.
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: Mutex<Collections>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sérialisation complète du contenu
    pub fn dump(&self) -> Result<String> {
        let collections = self.lock()?;
        Ok(serde_json::to_string(&*collections)?)
    }

    pub fn count(&self, collection: &str) -> Result<usize> {
        Ok(self.lock()?.get(collection).map(BTreeMap::len).unwrap_or(0))
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Collections>> {
        self.collections
            .lock()
            .map_err(|_| Error::Storage("Memory store lock poisoned".into()))
    }

    fn find_blocking(&self, collection: &str, selector: &Selector, options: &FindOptions) -> Result<Vec<Value>> {
        let collections = self.lock()?;
        let Some(docs) = collections.get(collection) else {
            return Ok(Vec::new());
        };
        let mut found: Vec<Value> = match selector.target_id() {
            Some(id) => docs.get(id).into_iter().filter(|d| selector.matches(d)).cloned().collect(),
            None => docs.values().filter(|d| selector.matches(d)).cloned().collect(),
        };
        options.apply(&mut found);
        Ok(found)
    }

    fn bulk_write_blocking(&self, collection: &str, ops: Vec<BulkOp>) -> Result<usize> {
        let mut collections = self.lock()?;
        // Appliqué sur une copie pour rester tout-ou-rien
        let mut docs = collections.get(collection).cloned().unwrap_or_default();
        let mut touched = 0;

        for op in ops {
            match op {
                BulkOp::InsertOne(doc) => {
                    let id = doc_id(&doc)?;
                    if docs.contains_key(&id) {
                        return Err(Error::Storage(format!(
                            "Duplicate key {} in {}",
                            id, collection
                        )));
                    }
                    docs.insert(id, doc);
                    touched += 1;
                }
                BulkOp::ReplaceOne { id, doc } => {
                    docs.insert(id, doc);
                    touched += 1;
                }
                BulkOp::UpdateMany { selector, modifier } => {
                    for doc in docs.values_mut().filter(|d| selector.matches(d)) {
                        modifier.apply(doc);
                        touched += 1;
                    }
                }
                BulkOp::DeleteMany(selector) => {
                    let before = docs.len();
                    docs.retain(|_, d| !selector.matches(d));
                    touched += before - docs.len();
                }
            }
        }

        if docs.is_empty() {
            collections.remove(collection);
        } else {
            collections.insert(collection.to_string(), docs);
        }
        Ok(touched)
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn find(&self, collection: &str, selector: &Selector, options: &FindOptions) -> Result<Vec<Value>> {
        self.find_blocking(collection, selector, options)
    }

    async fn bulk_write(&self, collection: &str, ops: Vec<BulkOp>) -> Result<usize> {
        self.bulk_write_blocking(collection, ops)
    }
}
