mod common;

use common::*;
use pdf_forge::crypto::encryption::Encryption;
use pdf_forge::crypto::{compute_data_key, rc4};
use pdf_forge::types::unparse_string;
use pdf_forge::{InputEncryption, PdfValue, PdfWriter, StreamDataMode, WriterConfig};

const STATIC_ID: [u8; 17] = [
    0x31, 0x41, 0x59, 0x26, 0x53, 0x58, 0x97, 0x93, 0x23, 0x84, 0x62, 0x64, 0x33, 0x83, 0x27,
    0x95, 0x00,
];

#[test]
fn test_r3_encryption_dictionary_shape() {
    let mut doc = three_page_document();
    let mut config = WriterConfig::new();
    config.static_id(true);
    let mut writer = PdfWriter::new(&mut doc, config);
    writer
        .set_r3_encryption("user", "owner", Default::default())
        .unwrap();
    let output = writer.write_to_memory().unwrap();
    let text = String::from_utf8_lossy(&output).into_owned();

    assert!(text.contains("/Filter /Standard"));
    assert!(text.contains("/V 2"));
    assert!(text.contains("/R 3"));
    assert!(text.contains("/Length 128"));
    assert!(text.contains("/P -1"));
    assert!(text.contains("/Encrypt "));
    // R3 requires at least PDF 1.4; the input was already 1.5.
    assert!(output.starts_with(b"%PDF-1.5\n"));
}

#[test]
fn test_r3_string_encryption_round_trip() {
    // The secret lives in the page dictionary, which becomes object 3.
    let mut doc = one_page_document();
    if let Some(page) = doc
        .get_mut(pdf_forge::ObjectId::new(3, 0))
        .and_then(PdfValue::as_dict_mut)
    {
        page.insert(
            "Marker",
            PdfValue::String(pdf_forge::PdfString::new_literal(b"secret42".to_vec())),
        );
    }

    let mut config = WriterConfig::new();
    config.static_id(true);
    let mut writer = PdfWriter::new(&mut doc, config);
    writer
        .set_r3_encryption("user", "owner", Default::default())
        .unwrap();
    let output = writer.write_to_memory().unwrap();
    let text = String::from_utf8_lossy(&output).into_owned();

    // Plaintext must not appear anywhere.
    assert!(!text.contains("secret42"));

    // Recompute the file key the way a conforming reader would and check
    // the ciphertext the writer actually emitted.
    let mut reference = Encryption::new(2, 3, 16, true);
    reference.set_id1(STATIC_ID.to_vec());
    let key = reference.compute_parameters("user", "owner").unwrap();
    let data_key = compute_data_key(&key, 3, 0, false, 2);
    let expected = unparse_string(&rc4(b"secret42", &data_key), false);
    assert!(
        text.contains(&format!("/Marker {}", expected)),
        "expected ciphertext not found in output"
    );
}

#[test]
fn test_aes_stream_length_arithmetic() {
    let mut doc = one_page_document();
    let mut config = WriterConfig::new();
    config.static_id(true);
    config.static_aes_iv(true);
    config.stream_data(StreamDataMode::Preserve).unwrap();
    let mut writer = PdfWriter::new(&mut doc, config);
    writer
        .set_r6_encryption("user", "owner", Default::default(), true)
        .unwrap();
    let output = writer.write_to_memory().unwrap();
    let text = String::from_utf8_lossy(&output).into_owned();

    // AES output is the input, padded to the next multiple of 16, plus a
    // 16 byte initialization vector.
    let in_len = "BT /F1 12 Tf 72 720 Td (Hello) Tj ET\n".len() as i64;
    let expected = in_len + (16 - in_len % 16) + 16;
    let length = parse_int_after(&text, "/Length ").unwrap();
    assert_eq!(length, expected);
}

#[test]
fn test_r6_encryption_dictionary_shape() {
    let mut doc = one_page_document();
    let mut writer = PdfWriter::new(&mut doc, WriterConfig::new());
    writer
        .set_r6_encryption("user", "owner", Default::default(), true)
        .unwrap();
    let output = writer.write_to_memory().unwrap();
    let text = String::from_utf8_lossy(&output).into_owned();

    assert!(text.contains("/CF << /StdCF << /AuthEvent /DocOpen /CFM /AESV3 /Length 32 >> >>"));
    assert!(text.contains("/StmF /StdCF /StrF /StdCF"));
    assert!(text.contains("/V 5"));
    assert!(text.contains("/R 6"));
    assert!(text.contains("/Length 256"));
    assert!(text.contains("/OE <"));
    assert!(text.contains("/UE <"));
    assert!(text.contains("/Perms <"));
    // R6 needs 1.7 with extension level; the header carries the version.
    assert!(output.starts_with(b"%PDF-1.7\n"));
}

#[test]
fn test_preserved_r4_aes_encryption() {
    let mut doc = three_page_document();
    doc.trailer.insert("Encrypt", reference(40));
    doc.trailer.insert(
        "ID",
        PdfValue::Array(pdf_forge::PdfArray::from(vec![
            PdfValue::String(pdf_forge::PdfString::new_literal(vec![0x11; 16])),
            PdfValue::String(pdf_forge::PdfString::new_literal(vec![0x22; 16])),
        ])),
    );
    doc.encryption = Some(InputEncryption {
        v: 4,
        r: 4,
        length_bytes: 16,
        p: -3904,
        o: vec![0x41; 32],
        u: vec![0x42; 32],
        oe: Vec::new(),
        ue: Vec::new(),
        perms: Vec::new(),
        encrypt_metadata: true,
        file_key: Vec::new(),
        padded_user_password: pdf_forge::crypto::pad_password(b"").to_vec(),
    });

    let mut writer = PdfWriter::new(&mut doc, WriterConfig::new());
    let output = writer.write_to_memory().unwrap();
    let text = String::from_utf8_lossy(&output).into_owned();

    assert!(text.contains("/CF << /StdCF << /AuthEvent /DocOpen /CFM /AESV2 /Length 16 >> >>"));
    assert!(text.contains("/StmF /StdCF /StrF /StdCF"));
    assert!(text.contains("/V 4"));
    assert!(text.contains("/R 4"));
    assert!(text.contains("/P -3904"));
    // The original first id survives into the output /ID.
    assert!(text.contains("/ID [<11111111111111111111111111111111><"));
    // AES raises the minimum version to 1.6.
    assert!(output.starts_with(b"%PDF-1.6\n"));
}

#[test]
fn test_forced_version_disables_incompatible_encryption() {
    let mut doc = three_page_document();
    let mut config = WriterConfig::new();
    config.forced_pdf_version("1.3", 0);
    let mut writer = PdfWriter::new(&mut doc, config);
    writer
        .set_r6_encryption("user", "owner", Default::default(), true)
        .unwrap();
    let output = writer.write_to_memory().unwrap();
    let text = String::from_utf8_lossy(&output).into_owned();
    assert!(!text.contains("/Encrypt"));
    assert!(output.starts_with(b"%PDF-1.3\n"));
}

#[test]
fn test_signature_contents_stay_unencrypted() {
    let mut doc = one_page_document();
    let mut sig = pdf_forge::PdfDictionary::new();
    sig.insert("Type", name("Sig"));
    sig.insert(
        "ByteRange",
        PdfValue::Array(pdf_forge::PdfArray::from(vec![
            PdfValue::Integer(0),
            PdfValue::Integer(100),
        ])),
    );
    sig.insert(
        "Contents",
        PdfValue::String(pdf_forge::PdfString::new_literal(vec![0xDE, 0xAD, 0xBE, 0xEF])),
    );
    let sig_id = doc.add_object(PdfValue::Dictionary(sig));
    if let Some(page) = doc
        .get_mut(pdf_forge::ObjectId::new(3, 0))
        .and_then(PdfValue::as_dict_mut)
    {
        page.insert("Sig", PdfValue::Reference(sig_id.into()));
    }

    let mut config = WriterConfig::new();
    config.static_id(true);
    let mut writer = PdfWriter::new(&mut doc, config);
    writer
        .set_r3_encryption("user", "owner", Default::default())
        .unwrap();
    let output = writer.write_to_memory().unwrap();
    let text = String::from_utf8_lossy(&output).into_owned();
    // Written hex, with the original bytes visible.
    assert!(text.contains("/Contents <deadbeef>"));
}

#[test]
fn test_encrypted_hint_stream_lengths_reconcile() {
    // Encryption plus linearization: both passes must agree on every
    // padded length even though stream content differs by random IVs.
    let mut doc = three_page_document();
    let mut config = WriterConfig::new();
    config.linearize(true).unwrap();
    let mut writer = PdfWriter::new(&mut doc, config);
    writer
        .set_r3_encryption("user", "owner", Default::default())
        .unwrap();
    let output = writer.write_to_memory().unwrap();
    let text = String::from_utf8_lossy(&output).into_owned();
    let declared = parse_int_after(&text, " /L ").unwrap();
    assert_eq!(declared as usize, output.len());
    assert!(text.contains("/Encrypt "));
}
