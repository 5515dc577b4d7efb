//! PDF-Forge: a PDF document writer and linearizer.
//!
//! Given an in-memory PDF object graph (objects, trailer, xref map and page
//! list), this library serializes it back to a conforming byte stream.
//!
//! Four output modes share one object-serialization core:
//! - Standard: single pass with an xref table or xref stream at the end
//! - QDF: normalized, human-editable form with indirect stream lengths
//! - PCLm: the restricted raster-only subset
//! - Linearized: two-pass "fast web view" layout with a hint stream
//!
//! The writer supports object streams (preserve or generate), stream
//! re-filtering, and the standard security handler (RC4 and AES-CBC,
//! revisions 2 through 6).

/// The standard security handler: key derivation and symmetric ciphers.
pub mod crypto;
/// The input object graph contract.
pub mod document;
/// Error taxonomy for the writer.
pub mod error;
/// Stream filters: Flate, ASCII codecs, predictors, content normalization.
pub mod filters;
/// Linearization: object classification and hint stream construction.
pub mod linearize;
/// The composable counting byte-sink stack.
pub mod pipeline;
/// Core PDF value types and their canonical serialized forms.
pub mod types;
/// The writer driver, configuration and serialization engine.
pub mod writer;

pub use document::{Document, InputEncryption, PdfVersion, XRefEntry};
pub use error::{WriteError, WriteResult};
pub use types::{
    ObjectId, PdfArray, PdfDictionary, PdfName, PdfReference, PdfStream, PdfString, PdfValue,
};
pub use writer::{ObjectStreamMode, PdfWriter, StreamDataMode, WriterConfig};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_types() {
        let name = PdfName::new("Type");
        assert_eq!(name.as_str(), "/Type");

        let string = PdfString::new_literal(b"Hello PDF".to_vec());
        assert_eq!(string.to_string_lossy(), "Hello PDF");

        let mut dict = PdfDictionary::new();
        dict.insert("Type", PdfValue::Name(PdfName::new("Catalog")));
        assert!(dict.contains_key("Type"));
        assert!(dict.is_type("Catalog"));
    }

    #[test]
    fn test_minimal_document_writes() {
        let mut doc = Document::new(PdfVersion::new(1, 4));
        let pages_id = ObjectId::new(2, 0);
        let page_id = ObjectId::new(3, 0);

        let mut catalog = PdfDictionary::new();
        catalog.insert("Type", PdfValue::Name(PdfName::new("Catalog")));
        catalog.insert("Pages", PdfValue::Reference(pages_id.into()));
        let catalog_id = ObjectId::new(1, 0);
        doc.insert_object(catalog_id, PdfValue::Dictionary(catalog));

        let mut pages = PdfDictionary::new();
        pages.insert("Type", PdfValue::Name(PdfName::new("Pages")));
        pages.insert(
            "Kids",
            PdfValue::Array(PdfArray::from(vec![PdfValue::Reference(page_id.into())])),
        );
        pages.insert("Count", PdfValue::Integer(1));
        doc.insert_object(pages_id, PdfValue::Dictionary(pages));

        let mut page = PdfDictionary::new();
        page.insert("Type", PdfValue::Name(PdfName::new("Page")));
        page.insert("Parent", PdfValue::Reference(pages_id.into()));
        doc.insert_object(page_id, PdfValue::Dictionary(page));

        doc.trailer.insert("Size", PdfValue::Integer(4));
        doc.trailer.insert("Root", PdfValue::Reference(catalog_id.into()));
        doc.set_pages(vec![page_id]);

        let mut config = WriterConfig::new();
        config.static_id(true);
        let mut writer = PdfWriter::new(&mut doc, config);
        let output = writer.write_to_memory().unwrap();

        let text = String::from_utf8_lossy(&output);
        assert!(text.starts_with("%PDF-1.4\n"));
        assert!(text.contains("1 0 obj"));
        assert!(text.ends_with("%%EOF\n"));
    }
}
