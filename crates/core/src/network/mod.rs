//! The track network: an arena of track items keyed by id.
//!
//! Items refer to each other (neighbours, conflict item, route entry side)
//! by [`TiId`] only. The network owns every item and resolves those ids.

#![allow(missing_docs)]

pub mod item;
pub mod record;

use std::collections::BTreeMap;

use tracing::debug;

use crate::{context::SimulationContext, error::RecordError};

pub use item::{ItemKind, SignalState, TiId, TrackItem};
pub use record::{ItemRecord, SpeedField};

/// Owner of all track items.
#[derive(Debug, Clone, Default)]
pub struct Network {
    items: BTreeMap<TiId, TrackItem>,
}

impl Network {
    /// Empty network.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a network from persisted records, then check that every link
    /// resolves and that neighbour links are symmetric.
    pub fn from_records<'a>(
        records: impl IntoIterator<Item = &'a ItemRecord>,
    ) -> Result<Self, RecordError> {
        let mut network = Self::new();
        for record in records {
            network.insert(TrackItem::from_record(record)?)?;
        }
        network.validate()?;
        debug!("loaded network with {} items", network.len());
        Ok(network)
    }

    /// Records for every item, ordered by id.
    pub fn save_records(&self) -> Vec<ItemRecord> {
        self.items.values().map(TrackItem::save_record).collect()
    }

    /// Add an item. Ids are unique.
    pub fn insert(&mut self, item: TrackItem) -> Result<(), RecordError> {
        let id = item.id();
        if self.items.contains_key(&id) {
            return Err(RecordError::DuplicateId(id));
        }
        self.items.insert(id, item);
        Ok(())
    }

    pub fn get(&self, id: TiId) -> Option<&TrackItem> {
        self.items.get(&id)
    }

    pub fn get_mut(&mut self, id: TiId) -> Option<&mut TrackItem> {
        self.items.get_mut(&id)
    }

    pub fn contains(&self, id: TiId) -> bool {
        self.items.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Items in id order.
    pub fn items(&self) -> impl Iterator<Item = &TrackItem> {
        self.items.values()
    }

    /// Sum of the real lengths of all items.
    pub fn total_length(&self) -> f64 {
        self.items.values().map(TrackItem::real_length).sum()
    }

    /// Connect `from.next` to `to.previous`.
    pub fn link(&mut self, from: TiId, to: TiId) -> Result<(), RecordError> {
        if !self.contains(to) {
            return Err(RecordError::DanglingLink {
                item: from,
                field: "ntiid",
                target: to,
            });
        }
        let item = self.items.get_mut(&from).ok_or(RecordError::DanglingLink {
            item: to,
            field: "ptiid",
            target: from,
        })?;
        item.set_next_item(Some(to));
        if let Some(item) = self.items.get_mut(&to) {
            item.set_previous_item(Some(from));
        }
        Ok(())
    }

    /// Change the conflict item of `id` in the editor. The target must exist.
    pub fn set_conflict_item(
        &mut self,
        ctx: &SimulationContext,
        id: TiId,
        conflict: Option<TiId>,
    ) -> Result<bool, RecordError> {
        if let Some(target) = conflict.filter(|target| !self.contains(*target)) {
            return Err(RecordError::DanglingLink {
                item: id,
                field: "conflicttiid",
                target,
            });
        }
        match self.items.get_mut(&id) {
            Some(item) if ctx.is_editing() => {
                item.set_conflict_item(conflict);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Item reached by crossing `item` after arriving from `preceding`.
    pub fn following_item(&self, item: TiId, preceding: Option<TiId>) -> Option<TiId> {
        self.get(item)?.following_item(preceding)
    }

    /// Whether `a` and `b` are neighbours, in either orientation.
    pub fn are_linked(&self, a: TiId, b: TiId) -> bool {
        self.get(a)
            .map(|item| item.previous_item() == Some(b) || item.next_item() == Some(b))
            .unwrap_or(false)
    }

    /// Check link targets exist and that every neighbour links back.
    pub fn validate(&self) -> Result<(), RecordError> {
        for item in self.items.values() {
            let id = item.id();
            let links = [
                ("ptiid", item.previous_item()),
                ("ntiid", item.next_item()),
                ("conflicttiid", item.conflict_item()),
            ];
            for (field, target) in links {
                let Some(target) = target else { continue };
                if !self.contains(target) {
                    return Err(RecordError::DanglingLink {
                        item: id,
                        field,
                        target,
                    });
                }
                if field != "conflicttiid" && !self.are_linked(target, id) {
                    return Err(RecordError::AsymmetricLink {
                        item: id,
                        neighbour: target,
                    });
                }
            }
        }
        Ok(())
    }
}
