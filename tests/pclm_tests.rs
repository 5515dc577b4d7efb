mod common;

use common::*;
use pdf_forge::{
    Document, ObjectId, PdfArray, PdfDictionary, PdfStream, PdfValue, PdfVersion, PdfWriter,
    WriterConfig,
};

/// A raster page in PCLm form: the page content draws image strips held as
/// XObjects in the page resources.
fn raster_document() -> Document {
    let mut doc = Document::new(PdfVersion::new(1, 4));

    let mut catalog = PdfDictionary::new();
    catalog.insert("Type", name("Catalog"));
    catalog.insert("Pages", reference(2));
    doc.insert_object(ObjectId::new(1, 0), PdfValue::Dictionary(catalog));

    let mut pages = PdfDictionary::new();
    pages.insert("Type", name("Pages"));
    pages.insert("Kids", PdfValue::Array(PdfArray::from(vec![reference(3)])));
    pages.insert("Count", PdfValue::Integer(1));
    doc.insert_object(ObjectId::new(2, 0), PdfValue::Dictionary(pages));

    let mut strips = PdfDictionary::new();
    for (i, strip_obj) in [5u32, 6].iter().enumerate() {
        strips.insert(format!("Image{}", i), reference(*strip_obj));

        let mut image = PdfDictionary::new();
        image.insert("Type", name("XObject"));
        image.insert("Subtype", name("Image"));
        image.insert("Width", PdfValue::Integer(64));
        image.insert("Height", PdfValue::Integer(16));
        image.insert("Length", PdfValue::Integer(4));
        doc.insert_object(
            ObjectId::new(*strip_obj, 0),
            PdfValue::Stream(PdfStream::new(image, vec![0xff, 0x00, 0xff, 0x00])),
        );
    }

    let mut resources = PdfDictionary::new();
    resources.insert("XObject", PdfValue::Dictionary(strips));

    let mut page = PdfDictionary::new();
    page.insert("Type", name("Page"));
    page.insert("Parent", reference(2));
    page.insert("MediaBox", media_box());
    page.insert("Resources", PdfValue::Dictionary(resources));
    page.insert("Contents", reference(4));
    doc.insert_object(ObjectId::new(3, 0), PdfValue::Dictionary(page));

    let body = b"/P <</MCID 0>> BDC q 64 0 0 16 0 0 cm /Image0 Do Q EMC\n".to_vec();
    let mut contents = PdfDictionary::new();
    contents.insert("Length", PdfValue::Integer(body.len() as i64));
    doc.insert_object(
        ObjectId::new(4, 0),
        PdfValue::Stream(PdfStream::new(contents, body)),
    );

    doc.trailer.insert("Size", PdfValue::Integer(7));
    doc.trailer.insert("Root", reference(1));
    doc.set_pages(vec![ObjectId::new(3, 0)]);
    doc
}

#[test]
fn test_pclm_header() {
    let mut doc = raster_document();
    let mut config = WriterConfig::new();
    config.pclm(true).unwrap();
    let mut writer = PdfWriter::new(&mut doc, config);
    let output = writer.write_to_memory().unwrap();
    let text = String::from_utf8_lossy(&output);
    assert!(text.starts_with("%PDF-1.4\n%PCLm 1.0\n"));
    assert!(text.ends_with("%%EOF\n"));
}

#[test]
fn test_pclm_synthesizes_image_transform_streams() {
    let mut doc = raster_document();
    let mut config = WriterConfig::new();
    config.pclm(true).unwrap();
    let mut writer = PdfWriter::new(&mut doc, config);
    let output = writer.write_to_memory().unwrap();
    let text = String::from_utf8_lossy(&output).into_owned();
    // One transform stream per image strip.
    assert_eq!(text.matches("q /image Do Q").count(), 2);
}

#[test]
fn test_pclm_leaves_stream_data_alone() {
    let mut doc = raster_document();
    let mut config = WriterConfig::new();
    config.pclm(true).unwrap();
    let mut writer = PdfWriter::new(&mut doc, config);
    let output = writer.write_to_memory().unwrap();
    let text = String::from_utf8_lossy(&output).into_owned();
    // No compression in PCLm mode; the raster bytes pass through.
    assert!(!text.contains("/FlateDecode"));
    assert!(find_bytes(&output, &[0xff, 0x00, 0xff, 0x00]).is_some());
}

#[test]
fn test_pclm_uses_xref_table() {
    let mut doc = raster_document();
    let mut config = WriterConfig::new();
    config.pclm(true).unwrap();
    let mut writer = PdfWriter::new(&mut doc, config);
    let output = writer.write_to_memory().unwrap();
    let text = String::from_utf8_lossy(&output).into_owned();
    assert!(text.contains("xref\n0 "));
    let entries = parse_xref_table(&text);
    // Pages, page, contents, two strips, two transforms, catalog.
    assert_eq!(entries.len(), 8);
    for (num, offset) in entries {
        let expected = format!("{} 0 obj", num);
        assert_eq!(
            &output[offset as usize..offset as usize + expected.len()],
            expected.as_bytes()
        );
    }
}
