pub mod bits;
pub mod hints;
mod writer;

use crate::types::ObjectId;
use hints::{HGeneric, HPageOffset, HSharedObject};
use std::collections::{BTreeMap, BTreeSet};

/// How an indirect object is reached from the document root. The tag set
/// of an object decides which linearization part it lands in.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum ObjUser {
    /// Referenced from the given zero-based page.
    Page(usize),
    /// Referenced from the given page's thumbnail.
    Thumb(usize),
    /// Referenced from a trailer key (name stored without the slash).
    TrailerKey(String),
    /// Referenced from a document catalog key.
    RootKey(String),
    /// The document catalog itself.
    Root,
}

/// Computed per-page values feeding the page offset hint table.
#[derive(Debug, Clone, Default)]
pub struct CHPageOffsetEntry {
    pub nobjects: i32,
    pub nshared_objects: i32,
    /// Indices into the shared object table.
    pub shared_identifiers: Vec<i32>,
}

/// Computed shared-object values; entries are input object numbers.
#[derive(Debug, Clone, Default)]
pub struct CHSharedObject {
    pub first_shared_obj: u32,
    pub nshared_first_page: i32,
    pub nshared_total: i32,
    pub entries: Vec<u32>,
}

/// All linearization working state: the user maps built by traversal, the
/// nine-part classification, and the computed and packed hint tables.
#[derive(Debug, Default)]
pub struct LinData {
    pub obj_user_to_objects: BTreeMap<ObjUser, BTreeSet<ObjectId>>,
    pub object_to_obj_users: BTreeMap<ObjectId, BTreeSet<ObjUser>>,

    pub part4: Vec<ObjectId>,
    pub part6: Vec<ObjectId>,
    pub part7: Vec<ObjectId>,
    pub part8: Vec<ObjectId>,
    pub part9: Vec<ObjectId>,

    pub first_page_object: u32,
    pub c_page_offset: Vec<CHPageOffsetEntry>,
    pub c_shared: CHSharedObject,
    /// Computed outline data; `first_object` holds an input object number.
    pub c_outline: HGeneric,

    pub page_offset_hints: HPageOffset,
    pub shared_object_hints: HSharedObject,
    pub outline_hints: HGeneric,
}
