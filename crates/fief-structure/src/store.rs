//! Index-stable arena of structures.

use fief_core::{SimError, SimResult, StructureId};
use fief_grid::MapPos;

use crate::structure::Structure;

/// Arena keyed by [`StructureId`].  Removed slots are reused by later
/// insertions.
#[derive(Clone, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StructureStore {
    structures: Vec<Option<Structure>>,
}

impl StructureStore {
    pub fn new() -> StructureStore {
        StructureStore::default()
    }

    pub fn add(&mut self, structure: Structure) -> StructureId {
        for (i, slot) in self.structures.iter_mut().enumerate() {
            if slot.is_none() {
                *slot = Some(structure);
                return StructureId(i as u32);
            }
        }
        self.structures.push(Some(structure));
        StructureId(self.structures.len() as u32 - 1)
    }

    pub fn remove(&mut self, id: StructureId) -> Option<Structure> {
        self.structures.get_mut(id.index())?.take()
    }

    #[inline]
    pub fn get(&self, id: StructureId) -> Option<&Structure> {
        self.structures.get(id.index())?.as_ref()
    }

    #[inline]
    pub fn get_mut(&mut self, id: StructureId) -> Option<&mut Structure> {
        self.structures.get_mut(id.index())?.as_mut()
    }

    /// Lookup that treats a dangling ID as state corruption.
    pub fn try_get(&self, id: StructureId) -> SimResult<&Structure> {
        self.get(id).ok_or(SimError::StructureNotFound(id))
    }

    pub fn try_get_mut(&mut self, id: StructureId) -> SimResult<&mut Structure> {
        self.structures
            .get_mut(id.index())
            .and_then(|s| s.as_mut())
            .ok_or(SimError::StructureNotFound(id))
    }

    /// Live structure IDs in ascending order.
    pub fn ids(&self) -> impl Iterator<Item = StructureId> + '_ {
        self.structures
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|_| StructureId(i as u32)))
    }

    pub fn len(&self) -> usize {
        self.structures.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The structure anchored at `pos`, if any.
    pub fn at_pos(&self, pos: MapPos) -> Option<StructureId> {
        self.ids().find(|id| self.get(*id).is_some_and(|s| s.pos == pos))
    }
}
