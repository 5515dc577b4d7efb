use serde::{Deserialize, Serialize};
use std::fmt;

/// An indirect reference as it appears inside another object: `id gen R`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PdfReference {
    pub object_number: u32,
    pub generation_number: u16,
}

impl PdfReference {
    pub fn new(object_number: u32, generation_number: u16) -> Self {
        PdfReference {
            object_number,
            generation_number,
        }
    }

    pub fn id(&self) -> ObjectId {
        ObjectId {
            number: self.object_number,
            generation: self.generation_number,
        }
    }
}

impl fmt::Display for PdfReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} R", self.object_number, self.generation_number)
    }
}

/// The `(id, gen)` slot an indirect object lives at.
///
/// Ordered by object number, then generation, so that sets and maps of ids
/// iterate in the order objects appear in a cross-reference section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectId {
    pub number: u32,
    pub generation: u16,
}

impl ObjectId {
    pub fn new(number: u32, generation: u16) -> Self {
        ObjectId { number, generation }
    }

    pub fn to_reference(&self) -> PdfReference {
        PdfReference::new(self.number, self.generation)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.number, self.generation)
    }
}

impl From<(u32, u16)> for ObjectId {
    fn from((number, generation): (u32, u16)) -> Self {
        ObjectId::new(number, generation)
    }
}

impl From<ObjectId> for PdfReference {
    fn from(id: ObjectId) -> Self {
        id.to_reference()
    }
}

impl From<PdfReference> for ObjectId {
    fn from(reference: PdfReference) -> Self {
        reference.id()
    }
}

impl From<&PdfReference> for ObjectId {
    fn from(reference: &PdfReference) -> Self {
        reference.id()
    }
}
