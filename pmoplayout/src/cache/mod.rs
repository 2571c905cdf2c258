//! Couche cache / transaction
//!
//! Chaque opération possède son propre cache : un instantané des
//! collections lues, et des collections en écriture dont les différences
//! ne sont écrites qu'au commit. Le timeline est toujours écrit en premier.

mod base;
mod collection;
mod object;
mod playout;
mod studio;

pub use base::{AfterSaveFn, Cache, CacheCore, CacheOptions, DeferredFn, save_all};
pub use collection::{Changes, DbCacheWritable, ReadCollection, WriteCollection};
pub use object::WriteObject;
pub use playout::CacheForPlayout;
pub use studio::CacheForStudio;
