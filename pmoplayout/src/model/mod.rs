//! Modèle de données du playout
//!
//! Tous les documents sont des structures `serde` persistées en JSON
//! (`camelCase`, identifiant sous la clé `_id`). Chaque type de document
//! connaît le nom de sa collection via le trait [`Document`].

use serde::{Serialize, de::DeserializeOwned};

/// Document stocké dans une collection
pub trait Document: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Nom de la collection dans le store
    const COLLECTION: &'static str;

    /// Identifiant unique (`_id`)
    fn id(&self) -> &str;
}

macro_rules! impl_document {
    ($ty:ty, $collection:expr) => {
        impl $crate::model::Document for $ty {
            const COLLECTION: &'static str = $collection;

            fn id(&self) -> &str {
                &self.id
            }
        }
    };
}
pub(crate) use impl_document;

pub(crate) fn is_false(b: &bool) -> bool {
    !*b
}

mod mapping;
mod part;
mod piece;
mod playlist;
mod rundown;
mod studio;
mod timeline;

pub use mapping::{DeviceMapping, DeviceType, LookaheadMode, Mapping};
pub use part::{Part, PartInstance, PartInstanceTimings};
pub use piece::{InfiniteInfo, Piece, PieceContent, PieceEnable, PieceInstance, PieceLifespan, UserDuration};
pub use playlist::{HoldState, RundownPlaylist};
pub use rundown::{Rundown, RundownBaselineObjects, Segment};
pub use studio::{PeripheralDevice, Studio};
pub use timeline::{
    EnableValue, HoldMode, TimelineEnable, TimelineKeyframe, TimelineObject, TimelineObjectType,
};
