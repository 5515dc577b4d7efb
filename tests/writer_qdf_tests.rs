mod common;

use common::*;
use pdf_forge::{PdfWriter, WriterConfig};

fn qdf_output(suppress_ids: bool) -> String {
    let mut doc = three_page_document();
    let mut config = WriterConfig::new();
    config.qdf(true).unwrap();
    config.static_id(true);
    if suppress_ids {
        config.no_original_object_ids(true);
    }
    let mut writer = PdfWriter::new(&mut doc, config);
    let output = writer.write_to_memory().unwrap();
    String::from_utf8_lossy(&output).into_owned()
}

#[test]
fn test_qdf_header() {
    let text = qdf_output(false);
    assert!(text.starts_with("%PDF-1.5\n"));
    let after_binary = text.find("%QDF-1.0\n\n").unwrap();
    assert!(after_binary < 32);
}

#[test]
fn test_qdf_page_banners() {
    let text = qdf_output(false);
    assert!(text.contains("%% Page 1\n"));
    assert!(text.contains("%% Page 2\n"));
    assert!(text.contains("%% Page 3\n"));
    assert!(text.contains("%% Contents for page 1\n"));
    assert!(text.contains("%% Contents for page 3\n"));
}

#[test]
fn test_qdf_original_object_id_comments() {
    let text = qdf_output(false);
    assert!(text.contains("%% Original object ID: 1 0\n"));
    let text = qdf_output(true);
    assert!(!text.contains("%% Original object ID"));
}

#[test]
fn test_qdf_disables_compression() {
    let text = qdf_output(false);
    assert!(!text.contains("/FlateDecode"));
    // Content streams stay readable.
    assert!(text.contains("(Page 1) Tj ET"));
}

#[test]
fn test_qdf_indirect_stream_lengths() {
    let text = qdf_output(false);
    // Every stream dictionary stores its length as an indirect reference,
    // with the companion length object directly after the stream.
    let pos = text.find("/Length").unwrap();
    let tail = &text[pos..];
    assert!(tail.starts_with("/Length ") && tail[8..].contains(" 0 R"));
    let first_r = tail[..40].find(" 0 R");
    assert!(first_r.is_some());
}

#[test]
fn test_qdf_indentation_and_blank_lines() {
    let text = qdf_output(false);
    // Dictionary entries each on their own line, two-space indent.
    assert!(text.contains("<<\n  /Type /Catalog\n"));
    // A blank line follows endobj.
    assert!(text.contains("endobj\n\n"));
}

#[test]
fn test_qdf_content_normalization() {
    use pdf_forge::{ObjectId, PdfDictionary, PdfStream, PdfValue};
    let mut doc = one_page_document();
    // Replace the content stream body with CRLF line endings.
    let body = b"BT /F1 12 Tf\r\n(Hi) Tj\rET\n".to_vec();
    let mut dict = PdfDictionary::new();
    dict.insert("Length", PdfValue::Integer(body.len() as i64));
    doc.insert_object(
        ObjectId::new(4, 0),
        PdfValue::Stream(PdfStream::new(dict, body)),
    );

    let mut config = WriterConfig::new();
    config.qdf(true).unwrap();
    let mut writer = PdfWriter::new(&mut doc, config);
    let output = writer.write_to_memory().unwrap();
    let text = String::from_utf8_lossy(&output);
    assert!(text.contains("BT /F1 12 Tf\n(Hi) Tj\nET\n"));
}
