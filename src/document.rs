use crate::types::{ObjectId, PdfDictionary, PdfValue};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// PDF header version plus the Adobe extension level carried in
/// `/Extensions/ADBE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PdfVersion {
    pub major: u8,
    pub minor: u8,
}

impl PdfVersion {
    pub fn new(major: u8, minor: u8) -> Self {
        PdfVersion { major, minor }
    }

    /// Parses "major.minor". Returns `None` if the string does not round-trip.
    pub fn from_string(s: &str) -> Option<Self> {
        let parts: Vec<&str> = s.split('.').collect();
        if parts.len() == 2 {
            let major = parts[0].parse().ok()?;
            let minor = parts[1].parse().ok()?;
            Some(PdfVersion::new(major, minor))
        } else {
            None
        }
    }
}

impl Default for PdfVersion {
    fn default() -> Self {
        PdfVersion::new(1, 3)
    }
}

impl fmt::Display for PdfVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// One input cross-reference entry, as reported by the parser.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum XRefEntry {
    Free {
        next_free_object: u32,
        generation: u16,
    },
    InUse {
        offset: u64,
        generation: u16,
    },
    Compressed {
        stream_object: u32,
        index: u32,
    },
}

/// Encryption parameters recovered by the parser from an encrypted input,
/// sufficient to re-encrypt with the same security handler.
#[derive(Debug, Clone)]
pub struct InputEncryption {
    pub v: i32,
    pub r: i32,
    pub length_bytes: usize,
    pub p: i32,
    pub o: Vec<u8>,
    pub u: Vec<u8>,
    pub oe: Vec<u8>,
    pub ue: Vec<u8>,
    pub perms: Vec<u8>,
    pub encrypt_metadata: bool,
    /// The file encryption key the parser derived during authentication.
    /// Required for V5 where the key cannot be recomputed from the password
    /// by this writer.
    pub file_key: Vec<u8>,
    /// The user password padded to 32 bytes, for V < 5 key recomputation.
    pub padded_user_password: Vec<u8>,
}

/// The in-memory object graph handed to the writer: everything of the input
/// contract in one place — object map, trailer, input xref types, ordered
/// page list and parser-derived encryption parameters.
#[derive(Debug, Clone, Default)]
pub struct Document {
    objects: BTreeMap<ObjectId, PdfValue>,
    pub trailer: PdfDictionary,
    pub version: PdfVersion,
    pub extension_level: i32,
    xref: BTreeMap<ObjectId, XRefEntry>,
    pages: Vec<ObjectId>,
    pub encryption: Option<InputEncryption>,
    next_fresh_id: u32,
}

impl Document {
    pub fn new(version: PdfVersion) -> Self {
        Document {
            version,
            ..Default::default()
        }
    }

    /// Installs an indirect object at a specific slot.
    pub fn insert_object(&mut self, id: ObjectId, value: PdfValue) {
        if id.number >= self.next_fresh_id {
            self.next_fresh_id = id.number + 1;
        }
        self.objects.insert(id, value);
    }

    /// Adds an indirect object at the next free slot and returns its id.
    pub fn add_object(&mut self, value: PdfValue) -> ObjectId {
        let id = self.fresh_id();
        self.objects.insert(id, value);
        id
    }

    /// Reserves a fresh object number without storing anything.
    pub fn fresh_id(&mut self) -> ObjectId {
        let number = self.next_fresh_id.max(
            self.objects
                .keys()
                .next_back()
                .map(|id| id.number + 1)
                .unwrap_or(1),
        );
        self.next_fresh_id = number + 1;
        ObjectId::new(number, 0)
    }

    pub fn get(&self, id: ObjectId) -> Option<&PdfValue> {
        self.objects.get(&id)
    }

    pub fn get_mut(&mut self, id: ObjectId) -> Option<&mut PdfValue> {
        self.objects.get_mut(&id)
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.objects.contains_key(&id)
    }

    /// All indirect objects in id order.
    pub fn iter(&self) -> impl Iterator<Item = (&ObjectId, &PdfValue)> {
        self.objects.iter()
    }

    pub fn object_ids(&self) -> Vec<ObjectId> {
        self.objects.keys().copied().collect()
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    /// Follows an indirect reference one level; other values come back
    /// unchanged. A dangling reference resolves to null.
    pub fn resolve<'a>(&'a self, value: &'a PdfValue) -> &'a PdfValue {
        static NULL: PdfValue = PdfValue::Null;
        match value {
            PdfValue::Reference(r) => self.get(r.id()).unwrap_or(&NULL),
            other => other,
        }
    }

    pub fn set_xref_entry(&mut self, id: ObjectId, entry: XRefEntry) {
        self.xref.insert(id, entry);
    }

    pub fn xref_entry(&self, id: ObjectId) -> Option<&XRefEntry> {
        self.xref.get(&id)
    }

    pub fn xref_iter(&self) -> impl Iterator<Item = (&ObjectId, &XRefEntry)> {
        self.xref.iter()
    }

    /// The flattened, ordered page list supplied by the pages module.
    pub fn set_pages(&mut self, pages: Vec<ObjectId>) {
        self.pages = pages;
    }

    pub fn pages(&self) -> &[ObjectId] {
        &self.pages
    }

    pub fn root_id(&self) -> Option<ObjectId> {
        self.trailer
            .get("Root")
            .and_then(|v| v.as_reference())
            .map(|r| r.id())
    }

    /// Resolves every reference to a missing slot by materializing a null
    /// object there, so each reference written later has an xref entry.
    pub fn fix_dangling_references(&mut self) {
        let mut missing: Vec<ObjectId> = Vec::new();
        {
            let mut note = |v: &PdfValue, missing: &mut Vec<ObjectId>| {
                collect_references(v, missing, &self.objects);
            };
            let trailer = self.trailer.clone();
            for (_, value) in trailer.iter() {
                note(value, &mut missing);
            }
            for value in self.objects.values() {
                collect_references(value, &mut missing, &self.objects);
            }
        }
        for id in missing {
            self.objects.entry(id).or_insert(PdfValue::Null);
        }
    }
}

fn collect_references(
    value: &PdfValue,
    missing: &mut Vec<ObjectId>,
    objects: &BTreeMap<ObjectId, PdfValue>,
) {
    match value {
        PdfValue::Reference(r) => {
            if !objects.contains_key(&r.id()) {
                missing.push(r.id());
            }
        }
        PdfValue::Array(a) => {
            for item in a {
                collect_references(item, missing, objects);
            }
        }
        PdfValue::Dictionary(d) => {
            for (_, v) in d {
                collect_references(v, missing, objects);
            }
        }
        PdfValue::Stream(s) => {
            for (_, v) in &s.dict {
                collect_references(v, missing, objects);
            }
        }
        _ => {}
    }
}
