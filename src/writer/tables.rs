use crate::types::ObjectId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Renumbering record for one input object.
///
/// `renumber` is 0 while unvisited and -1 transiently while the containing
/// object stream is being enqueued (the loop sentinel); after enqueue it is
/// the positive output object number. `object_stream`, when positive, is the
/// input id of the object stream this object is written into.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ObjEntry {
    pub renumber: i32,
    pub object_stream: i32,
    pub gen: u16,
}

/// Input-id keyed renumbering table.
#[derive(Debug, Default)]
pub struct ObjTable {
    map: BTreeMap<ObjectId, ObjEntry>,
    pub streams_empty: bool,
}

impl ObjTable {
    pub fn new() -> Self {
        ObjTable {
            map: BTreeMap::new(),
            streams_empty: false,
        }
    }

    pub fn entry(&mut self, id: ObjectId) -> &mut ObjEntry {
        self.map.entry(id).or_default()
    }

    /// Copy of the entry, default (all zero) if never touched.
    pub fn get(&self, id: ObjectId) -> ObjEntry {
        self.map.get(&id).copied().unwrap_or_default()
    }

    pub fn renumber(&self, id: ObjectId) -> i32 {
        self.get(id).renumber
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.map.contains_key(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ObjectId, &ObjEntry)> {
        self.map.iter()
    }
}

/// One output cross-reference entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum NewXref {
    #[default]
    Free,
    /// Type 1: byte offset of an uncompressed object.
    Offset(u64),
    /// Type 2: position inside an object stream.
    InStream { stream: i32, index: u32 },
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NewObjEntry {
    pub xref: NewXref,
    pub length: u64,
}

/// Output-id indexed table; slot 0 is the permanently free object.
#[derive(Debug, Default)]
pub struct NewObjTable {
    entries: Vec<NewObjEntry>,
}

impl NewObjTable {
    pub fn new() -> Self {
        NewObjTable {
            entries: Vec::new(),
        }
    }

    pub fn at(&mut self, id: i32) -> &mut NewObjEntry {
        let idx = id.max(0) as usize;
        if idx >= self.entries.len() {
            self.entries.resize(idx + 1, NewObjEntry::default());
        }
        &mut self.entries[idx]
    }

    pub fn get(&self, id: i32) -> NewObjEntry {
        self.entries
            .get(id.max(0) as usize)
            .copied()
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_obj_table_defaults() {
        let mut table = ObjTable::new();
        let id = ObjectId::new(3, 0);
        assert_eq!(table.renumber(id), 0);
        table.entry(id).renumber = 5;
        assert_eq!(table.renumber(id), 5);
    }

    #[test]
    fn test_new_obj_table_grows() {
        let mut table = NewObjTable::new();
        table.at(10).xref = NewXref::Offset(99);
        assert_eq!(table.get(10).xref, NewXref::Offset(99));
        assert_eq!(table.get(3).xref, NewXref::Free);
    }
}
