mod common;

use common::*;
use pdf_forge::{
    Document, ObjectId, ObjectStreamMode, PdfValue, PdfWriter, WriterConfig, XRefEntry,
};

#[test]
fn test_generate_packs_dictionaries() {
    let mut doc = three_page_document();
    let mut config = WriterConfig::new();
    config.object_streams(ObjectStreamMode::Generate);
    let mut writer = PdfWriter::new(&mut doc, config);
    let output = writer.write_to_memory().unwrap();
    let text = String::from_utf8_lossy(&output).into_owned();

    assert!(text.contains("/Type /ObjStm"));
    assert!(text.contains("/N "));
    assert!(text.contains("/First "));
    // The xref comes as a stream with a predictor.
    assert!(text.contains("/Type /XRef"));
    assert!(text.contains("/Predictor 12"));
    assert!(text.contains("/W [ 1 "));
}

#[test]
fn test_streams_stay_out_of_object_streams() {
    let mut doc = three_page_document();
    let mut config = WriterConfig::new();
    config.object_streams(ObjectStreamMode::Generate);
    let mut writer = PdfWriter::new(&mut doc, config);
    let output = writer.write_to_memory().unwrap();

    // Content streams remain top-level objects with offsets in the written
    // xref, never compressed entries.
    let mut top_level_streams = 0;
    for (num, entry) in writer.written_xref_table() {
        match entry {
            pdf_forge::writer::NewXref::Offset(offset) => {
                let expected = format!("{} 0 obj", num);
                let at = &output[*offset as usize..*offset as usize + expected.len()];
                assert_eq!(at, expected.as_bytes());
                let tail = &output[*offset as usize..];
                if find_bytes(&tail[..find_bytes(tail, b"endobj").unwrap()], b"stream").is_some() {
                    top_level_streams += 1;
                }
            }
            pdf_forge::writer::NewXref::InStream { .. } => {}
            pdf_forge::writer::NewXref::Free => {}
        }
    }
    // Three content streams plus the object stream and the xref stream.
    assert!(top_level_streams >= 5);
}

#[test]
fn test_encrypted_catalog_not_compressed() {
    let mut doc = three_page_document();
    let mut config = WriterConfig::new();
    config.object_streams(ObjectStreamMode::Generate);
    let mut writer = PdfWriter::new(&mut doc, config);
    writer
        .set_r3_encryption("", "", Default::default())
        .unwrap();
    let output = writer.write_to_memory().unwrap();
    let text = String::from_utf8_lossy(&output).into_owned();
    // The document catalog is written as a regular top-level object.
    assert!(text.contains("/Type /Catalog"));
    let pos = text.find("/Type /Catalog").unwrap();
    let before = &text[..pos];
    let obj_open = before.rfind(" 0 obj").unwrap();
    let between = &text[obj_open..pos];
    assert!(!between.contains("stream"));
}

#[test]
fn test_preserve_membership_from_input_xref() {
    let mut doc = three_page_document();
    // Pretend the font (9) came from object stream 30 in the input.
    doc.insert_object(ObjectId::new(30, 0), PdfValue::Null);
    doc.set_xref_entry(
        ObjectId::new(9, 0),
        XRefEntry::Compressed {
            stream_object: 30,
            index: 0,
        },
    );

    let mut config = WriterConfig::new();
    config.object_streams(ObjectStreamMode::Preserve);
    let mut writer = PdfWriter::new(&mut doc, config);
    let output = writer.write_to_memory().unwrap();
    let text = String::from_utf8_lossy(&output).into_owned();
    assert!(text.contains("/Type /ObjStm"));
    assert!(text.contains("/N 1"));

    // One compressed entry in the written xref.
    let compressed = writer
        .written_xref_table()
        .values()
        .filter(|e| matches!(e, pdf_forge::writer::NewXref::InStream { .. }))
        .count();
    assert_eq!(compressed, 1);
}

#[test]
fn test_preserve_without_compressed_entries_uses_xref_table() {
    let mut doc = three_page_document();
    let mut config = WriterConfig::new();
    config.object_streams(ObjectStreamMode::Preserve);
    let mut writer = PdfWriter::new(&mut doc, config);
    let output = writer.write_to_memory().unwrap();
    let text = String::from_utf8_lossy(&output).into_owned();
    assert!(!text.contains("/Type /ObjStm"));
    assert!(text.contains("xref\n0 "));
}

#[test]
fn test_qdf_object_stream_banners() {
    let mut doc = three_page_document();
    let mut config = WriterConfig::new();
    config.object_streams(ObjectStreamMode::Generate);
    config.qdf(true).unwrap();
    let mut writer = PdfWriter::new(&mut doc, config);
    let output = writer.write_to_memory().unwrap();
    let text = String::from_utf8_lossy(&output).into_owned();
    assert!(text.contains("%% Object stream: object "));
    assert!(text.contains("; original object ID: "));
    // QDF object streams are never Flate compressed.
    let objstm_pos = text.find("/Type /ObjStm").unwrap();
    let dict_end = text[objstm_pos..].find("stream").unwrap();
    assert!(!text[objstm_pos..objstm_pos + dict_end].contains("/FlateDecode"));
}

#[test]
fn test_forced_old_version_disables_object_streams() {
    let mut doc = three_page_document();
    let mut config = WriterConfig::new();
    config.object_streams(ObjectStreamMode::Generate);
    config.forced_pdf_version("1.4", 0);
    let mut writer = PdfWriter::new(&mut doc, config);
    let output = writer.write_to_memory().unwrap();
    let text = String::from_utf8_lossy(&output).into_owned();
    assert!(!text.contains("/Type /ObjStm"));
    assert!(output.starts_with(b"%PDF-1.4\n"));
}

#[test]
fn test_loop_between_stream_and_member_is_resolved() {
    // A member that references its own object stream: the enqueue loop
    // sentinel must not recurse forever.
    let mut doc = Document::new(pdf_forge::PdfVersion::new(1, 5));
    let mut catalog = pdf_forge::PdfDictionary::new();
    catalog.insert("Type", name("Catalog"));
    catalog.insert("Pages", reference(2));
    catalog.insert("Other", reference(3));
    doc.insert_object(ObjectId::new(1, 0), PdfValue::Dictionary(catalog));

    let mut pages = pdf_forge::PdfDictionary::new();
    pages.insert("Type", name("Pages"));
    pages.insert("Kids", PdfValue::Array(pdf_forge::PdfArray::from(vec![])));
    pages.insert("Count", PdfValue::Integer(0));
    doc.insert_object(ObjectId::new(2, 0), PdfValue::Dictionary(pages));

    let mut member = pdf_forge::PdfDictionary::new();
    member.insert("Self", reference(3));
    doc.insert_object(ObjectId::new(3, 0), PdfValue::Dictionary(member));
    doc.insert_object(ObjectId::new(4, 0), PdfValue::Null);
    doc.set_xref_entry(
        ObjectId::new(3, 0),
        XRefEntry::Compressed {
            stream_object: 4,
            index: 0,
        },
    );

    doc.trailer.insert("Size", PdfValue::Integer(5));
    doc.trailer.insert("Root", reference(1));
    doc.set_pages(Vec::new());

    let mut config = WriterConfig::new();
    config.object_streams(ObjectStreamMode::Preserve);
    let mut writer = PdfWriter::new(&mut doc, config);
    let output = writer.write_to_memory().unwrap();
    assert!(String::from_utf8_lossy(&output).contains("/Type /ObjStm"));
}
