use super::collection::{Changes, DbCacheWritable};
use crate::model::Document;
use crate::store::{BulkOp, DocumentStore, Modifier, Selector};
use crate::{Error, Result};
use async_trait::async_trait;
use serde_json::Value;

/// Document unique chargé en écriture (le playlist d'une opération)
#[derive(Debug, Clone)]
pub struct WriteObject<T: Document> {
    original: Value,
    doc: T,
    removed: bool,
}

impl<T: Document> WriteObject<T> {
    pub fn new(doc: T) -> Result<Self> {
        Ok(Self {
            original: serde_json::to_value(&doc)?,
            doc,
            removed: false,
        })
    }

    pub fn doc(&self) -> &T {
        &self.doc
    }

    pub fn update(&mut self, f: impl FnOnce(&mut T)) -> Result<()> {
        if self.removed {
            return Err(Error::invalid_state(format!(
                "{} {} is marked for removal",
                T::COLLECTION,
                self.doc.id()
            )));
        }
        f(&mut self.doc);
        Ok(())
    }
}

impl<T: Document> std::ops::Deref for WriteObject<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.doc
    }
}

#[async_trait]
impl<T: Document> DbCacheWritable for WriteObject<T> {
    fn name(&self) -> &'static str {
        T::COLLECTION
    }

    fn is_modified(&self) -> bool {
        serde_json::to_value(&self.doc).map_or(true, |v| v != self.original)
    }

    fn discard_changes(&mut self) {
        if let Ok(doc) = serde_json::from_value(self.original.clone()) {
            self.doc = doc;
        }
        self.removed = false;
    }

    fn mark_for_removal(&mut self) {
        self.removed = true;
    }

    async fn update_database_with_data(&mut self, store: &dyn DocumentStore) -> Result<Changes> {
        if self.removed {
            return Ok(Changes::default());
        }
        let current = serde_json::to_value(&self.doc)?;
        if current == self.original {
            return Ok(Changes::default());
        }
        store
            .bulk_write(
                T::COLLECTION,
                vec![BulkOp::UpdateMany {
                    selector: Selector::Id(self.doc.id().to_string()),
                    modifier: Modifier::diff(&self.original, &current),
                }],
            )
            .await?;
        self.original = current;
        Ok(Changes {
            updated: 1,
            ..Changes::default()
        })
    }
}
