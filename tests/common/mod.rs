#![allow(dead_code)]

use pdf_forge::{
    Document, ObjectId, PdfArray, PdfDictionary, PdfName, PdfStream, PdfValue, PdfVersion,
};

pub fn name(n: &str) -> PdfValue {
    PdfValue::Name(PdfName::new(n))
}

pub fn reference(number: u32) -> PdfValue {
    PdfValue::Reference(ObjectId::new(number, 0).into())
}

pub fn media_box() -> PdfValue {
    PdfValue::Array(PdfArray::from(vec![
        PdfValue::Integer(0),
        PdfValue::Integer(0),
        PdfValue::Integer(612),
        PdfValue::Integer(792),
    ]))
}

fn content_stream(text: &str) -> PdfValue {
    let body = format!("BT /F1 12 Tf 72 720 Td ({}) Tj ET\n", text);
    let mut dict = PdfDictionary::new();
    dict.insert("Length", PdfValue::Integer(body.len() as i64));
    PdfValue::Stream(PdfStream::new(dict, body.into_bytes()))
}

fn font_dict() -> PdfValue {
    let mut font = PdfDictionary::new();
    font.insert("Type", name("Font"));
    font.insert("Subtype", name("Type1"));
    font.insert("BaseFont", name("Helvetica"));
    PdfValue::Dictionary(font)
}

fn page_dict(parent: u32, contents: u32, font: u32) -> PdfValue {
    let mut resources = PdfDictionary::new();
    let mut fonts = PdfDictionary::new();
    fonts.insert("F1", reference(font));
    resources.insert("Font", PdfValue::Dictionary(fonts));

    let mut page = PdfDictionary::new();
    page.insert("Type", name("Page"));
    page.insert("Parent", reference(parent));
    page.insert("MediaBox", media_box());
    page.insert("Resources", PdfValue::Dictionary(resources));
    page.insert("Contents", reference(contents));
    PdfValue::Dictionary(page)
}

/// A three-page document with one content stream per page and a font
/// shared by all pages:
///   1 catalog, 2 pages tree, 3/5/7 pages, 4/6/8 content streams, 9 font.
pub fn three_page_document() -> Document {
    let mut doc = Document::new(PdfVersion::new(1, 5));

    let mut catalog = PdfDictionary::new();
    catalog.insert("Type", name("Catalog"));
    catalog.insert("Pages", reference(2));
    doc.insert_object(ObjectId::new(1, 0), PdfValue::Dictionary(catalog));

    let mut pages = PdfDictionary::new();
    pages.insert("Type", name("Pages"));
    pages.insert(
        "Kids",
        PdfValue::Array(PdfArray::from(vec![
            reference(3),
            reference(5),
            reference(7),
        ])),
    );
    pages.insert("Count", PdfValue::Integer(3));
    doc.insert_object(ObjectId::new(2, 0), PdfValue::Dictionary(pages));

    for (i, (page_num, contents_num)) in [(3u32, 4u32), (5, 6), (7, 8)].iter().enumerate() {
        doc.insert_object(
            ObjectId::new(*page_num, 0),
            page_dict(2, *contents_num, 9),
        );
        doc.insert_object(
            ObjectId::new(*contents_num, 0),
            content_stream(&format!("Page {}", i + 1)),
        );
    }

    doc.insert_object(ObjectId::new(9, 0), font_dict());

    doc.trailer.insert("Size", PdfValue::Integer(10));
    doc.trailer.insert("Root", reference(1));
    doc.set_pages(vec![
        ObjectId::new(3, 0),
        ObjectId::new(5, 0),
        ObjectId::new(7, 0),
    ]);
    doc
}

/// A single-page document: 1 catalog, 2 pages tree, 3 page, 4 contents.
pub fn one_page_document() -> Document {
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

    let mut page = PdfDictionary::new();
    page.insert("Type", name("Page"));
    page.insert("Parent", reference(2));
    page.insert("MediaBox", media_box());
    page.insert("Contents", reference(4));
    doc.insert_object(ObjectId::new(3, 0), PdfValue::Dictionary(page));

    doc.insert_object(ObjectId::new(4, 0), content_stream("Hello"));

    doc.trailer.insert("Size", PdfValue::Integer(5));
    doc.trailer.insert("Root", reference(1));
    doc.set_pages(vec![ObjectId::new(3, 0)]);
    doc
}

/// Byte offset of `obj_num 0 obj` at the start of a line, if present.
pub fn object_offset(output: &[u8], obj_num: u32) -> Option<usize> {
    let marker = format!("{} 0 obj", obj_num).into_bytes();
    for (pos, window) in output.windows(marker.len()).enumerate() {
        if window == marker.as_slice() && (pos == 0 || output[pos - 1] == b'\n') {
            return Some(pos);
        }
    }
    None
}

/// All `(object number, offset)` entries parsed from the final xref table.
pub fn parse_xref_table(text: &str) -> Vec<(u32, u64)> {
    // "startxref" also contains "xref", so anchor on the preceding newline.
    let start = match text.rfind("\nxref\n") {
        Some(pos) => pos + 6,
        None => return Vec::new(),
    };
    let mut lines = text[start..].lines();
    let header = match lines.next() {
        Some(h) => h,
        None => return Vec::new(),
    };
    let mut parts = header.split_whitespace();
    let first: u32 = parts.next().and_then(|s| s.parse().ok()).unwrap_or(0);
    let count: usize = parts.next().and_then(|s| s.parse().ok()).unwrap_or(0);

    let mut entries = Vec::new();
    for (i, line) in lines.take(count).enumerate() {
        let mut fields = line.split_whitespace();
        let offset: u64 = fields.next().and_then(|s| s.parse().ok()).unwrap_or(0);
        let _gen = fields.next();
        let kind = fields.next().unwrap_or("");
        if kind == "n" {
            entries.push((first + i as u32, offset));
        }
    }
    entries
}

/// First position of `needle` in `haystack`.
pub fn find_bytes(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// The integer following `key ` at its first occurrence.
pub fn parse_int_after(text: &str, key: &str) -> Option<i64> {
    let pos = text.find(key)? + key.len();
    let rest = &text[pos..];
    let digits: String = rest
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '-')
        .collect();
    digits.parse().ok()
}

/// The hex string following `key <` at its first occurrence.
pub fn parse_hex_after(text: &str, key: &str) -> Option<Vec<u8>> {
    let pos = text.find(key)?;
    let rest = &text[pos + key.len()..];
    let rest = rest.trim_start();
    let rest = rest.strip_prefix('<')?;
    let end = rest.find('>')?;
    let hex: String = rest[..end].chars().filter(|c| !c.is_whitespace()).collect();
    if hex.len() % 2 != 0 {
        return None;
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&hex[i..i + 2], 16).ok())
        .collect()
}
