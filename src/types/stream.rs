use crate::types::{PdfDictionary, PdfName, PdfValue};
use std::fmt;

/// An indirect stream: a dictionary plus its raw (still encoded) body.
///
/// The writer never mutates a stream it did not create; `data_modified`
/// records whether a caller replaced the body after parsing, which forces
/// re-filtering on output.
#[derive(Debug, Clone, PartialEq)]
pub struct PdfStream {
    pub dict: PdfDictionary,
    data: Vec<u8>,
    data_modified: bool,
    filter_on_write: bool,
}

impl PdfStream {
    pub fn new(dict: PdfDictionary, data: Vec<u8>) -> Self {
        PdfStream {
            dict,
            data,
            data_modified: false,
            filter_on_write: true,
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Replace the stream body with already-decoded data. The old `/Filter`
    /// chain no longer applies, so output must re-filter.
    pub fn replace_data(&mut self, data: Vec<u8>) {
        self.data = data;
        self.data_modified = true;
        self.dict.remove("Filter");
        self.dict.remove("DecodeParms");
    }

    pub fn is_data_modified(&self) -> bool {
        self.data_modified
    }

    pub fn filter_on_write(&self) -> bool {
        self.filter_on_write
    }

    pub fn set_filter_on_write(&mut self, val: bool) {
        self.filter_on_write = val;
    }

    /// The `/Filter` chain as a list of `(name, decode parms)` pairs, in
    /// application order.
    pub fn filter_chain(&self) -> Vec<(PdfName, Option<PdfDictionary>)> {
        let names: Vec<PdfName> = match self.dict.get("Filter") {
            Some(PdfValue::Name(n)) => vec![n.clone()],
            Some(PdfValue::Array(a)) => a
                .iter()
                .filter_map(|v| v.as_name())
                .cloned()
                .collect(),
            _ => Vec::new(),
        };
        if names.is_empty() {
            return Vec::new();
        }

        let mut parms: Vec<Option<PdfDictionary>> = match self.dict.get("DecodeParms") {
            Some(PdfValue::Dictionary(d)) => vec![Some(d.clone())],
            Some(PdfValue::Array(a)) => a.iter().map(|v| v.as_dict().cloned()).collect(),
            _ => Vec::new(),
        };
        parms.resize(names.len(), None);

        names.into_iter().zip(parms).collect()
    }

    /// True if the only filter is FlateDecode (or its abbreviation).
    pub fn is_flate_only(&self) -> bool {
        match self.dict.get("Filter") {
            Some(PdfValue::Name(n)) => n == "FlateDecode" || n == "Fl",
            _ => false,
        }
    }

    pub fn is_type(&self, name: &str) -> bool {
        self.dict.is_type(name)
    }
}

impl fmt::Display for PdfStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} stream[{} bytes]", self.dict, self.data.len())
    }
}
