use crate::types::{PdfDictionary, PdfName, PdfStream, PdfValue};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::io::{Read, Write};
use thiserror::Error;

pub mod predictor;

#[derive(Error, Debug)]
pub enum FilterError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error("unsupported filter: {0}")]
    UnsupportedFilter(String),

    #[error("decompression error: {0}")]
    DecompressionError(String),
}

pub type FilterResult<T> = Result<T, FilterError>;

/// How aggressively streams may be decoded on output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum DecodeLevel {
    #[default]
    None,
    Generalized,
    Specialized,
    All,
}

/// Re-encoding requested for a decoded stream body.
#[derive(Debug, Clone, Copy, Default)]
pub struct EncodeFlags {
    pub compress: bool,
    pub normalize: bool,
}

/// The decode level at which a filter becomes decodable, or `None` for
/// filters this crate cannot decode at all (lossy image codecs, LZW,
/// `/Crypt`).
fn filter_decode_level(name: &PdfName) -> Option<DecodeLevel> {
    match name.without_slash() {
        "FlateDecode" | "Fl" => Some(DecodeLevel::Generalized),
        "ASCIIHexDecode" | "AHx" => Some(DecodeLevel::Generalized),
        "ASCII85Decode" | "A85" => Some(DecodeLevel::Generalized),
        "RunLengthDecode" | "RL" => Some(DecodeLevel::Specialized),
        _ => None,
    }
}

/// Whether the whole filter chain of `stream` can be decoded at `level`.
pub fn stream_filterable(stream: &PdfStream, level: DecodeLevel) -> bool {
    stream
        .filter_chain()
        .iter()
        .all(|(name, _)| filter_decode_level(name).map(|l| l <= level).unwrap_or(false))
}

/// Decode a stream body, then apply the requested re-encoding.
///
/// Returns `(filtered, data)`: `filtered` is false when the filter chain is
/// not decodable at the requested level, in which case `data` is the raw
/// body unchanged. Actual decode failures are errors, which the caller
/// degrades to a raw retry.
pub fn pipe_stream_data(
    stream: &PdfStream,
    encode: EncodeFlags,
    level: DecodeLevel,
) -> FilterResult<(bool, Vec<u8>)> {
    if level == DecodeLevel::None || !stream_filterable(stream, level) {
        return Ok((false, stream.data().to_vec()));
    }

    let mut data = stream.data().to_vec();
    for (name, parms) in stream.filter_chain() {
        data = decode_one(&data, &name, parms.as_ref())?;
    }

    if encode.normalize {
        data = normalize_content(&data);
    }
    if encode.compress {
        data = flate_compress(&data);
    }
    Ok((true, data))
}

fn decode_one(
    data: &[u8],
    name: &PdfName,
    parms: Option<&PdfDictionary>,
) -> FilterResult<Vec<u8>> {
    match name.without_slash() {
        "FlateDecode" | "Fl" => {
            let decoded = flate_decompress(data)?;
            apply_predictor(decoded, parms)
        }
        "ASCIIHexDecode" | "AHx" => decode_ascii_hex(data),
        "ASCII85Decode" | "A85" => decode_ascii85(data),
        "RunLengthDecode" | "RL" => decode_run_length(data),
        other => Err(FilterError::UnsupportedFilter(other.to_string())),
    }
}

fn apply_predictor(data: Vec<u8>, parms: Option<&PdfDictionary>) -> FilterResult<Vec<u8>> {
    let Some(parms) = parms else {
        return Ok(data);
    };
    let get = |key: &str, default: i64| {
        parms
            .get(key)
            .and_then(PdfValue::as_integer)
            .unwrap_or(default)
    };
    let pred = get("Predictor", 1);
    if pred <= 1 {
        return Ok(data);
    }
    let colors = get("Colors", 1) as u8;
    let bpc = get("BitsPerComponent", 8) as u8;
    let columns = get("Columns", 1) as u32;
    predictor::PredictorDecoder::new(pred as i32, colors, bpc, columns).decode(&data)
}

pub fn flate_compress(data: &[u8]) -> Vec<u8> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    // Writing to a Vec cannot fail.
    let _ = encoder.write_all(data);
    encoder.finish().unwrap_or_default()
}

pub fn flate_decompress(data: &[u8]) -> FilterResult<Vec<u8>> {
    let mut decoder = ZlibDecoder::new(data);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| FilterError::DecompressionError(e.to_string()))?;
    Ok(out)
}

fn decode_ascii_hex(data: &[u8]) -> FilterResult<Vec<u8>> {
    let mut result = Vec::new();
    let mut chars = data.iter().filter(|&&c| !c.is_ascii_whitespace());

    while let Some(&c1) = chars.next() {
        if c1 == b'>' {
            break;
        }
        let c2 = chars.next().copied().unwrap_or(b'0');
        let c2 = if c2 == b'>' { b'0' } else { c2 };
        let hi = hex_value(c1)?;
        let lo = hex_value(c2)?;
        result.push(hi << 4 | lo);
    }
    Ok(result)
}

fn hex_value(c: u8) -> FilterResult<u8> {
    match c {
        b'0'..=b'9' => Ok(c - b'0'),
        b'a'..=b'f' => Ok(c - b'a' + 10),
        b'A'..=b'F' => Ok(c - b'A' + 10),
        _ => Err(FilterError::InvalidData(format!(
            "invalid hex character: {}",
            c as char
        ))),
    }
}

/// Powers of 85 for ASCII85 decoding: [85^4, 85^3, 85^2, 85^1, 85^0]
const ASCII85_POWERS: [u32; 5] = [52200625, 614125, 7225, 85, 1];

fn decode_ascii85(data: &[u8]) -> FilterResult<Vec<u8>> {
    let mut result = Vec::new();
    let mut tuple: Vec<u8> = Vec::with_capacity(5);

    let mut data = data;
    if data.starts_with(b"<~") {
        data = &data[2..];
    }

    for &byte in data {
        if byte.is_ascii_whitespace() {
            continue;
        }
        if byte == b'~' {
            break;
        }
        if byte == b'z' && tuple.is_empty() {
            result.extend_from_slice(&[0, 0, 0, 0]);
            continue;
        }
        if !(b'!'..=b'u').contains(&byte) {
            return Err(FilterError::InvalidData(format!(
                "invalid ASCII85 character: {}",
                byte as char
            )));
        }
        tuple.push(byte - b'!');
        if tuple.len() == 5 {
            let value = ascii85_tuple(&tuple);
            result.extend_from_slice(&value.to_be_bytes());
            tuple.clear();
        }
    }

    if !tuple.is_empty() {
        let missing = 5 - tuple.len();
        if missing == 4 {
            return Err(FilterError::InvalidData(
                "ASCII85 group with a single character".to_string(),
            ));
        }
        let mut padded = tuple.clone();
        padded.resize(5, 84);
        let value = ascii85_tuple(&padded);
        let bytes = value.to_be_bytes();
        result.extend_from_slice(&bytes[..4 - missing]);
    }
    Ok(result)
}

fn ascii85_tuple(tuple: &[u8]) -> u32 {
    tuple
        .iter()
        .zip(ASCII85_POWERS.iter())
        .fold(0u32, |acc, (&d, &p)| acc.wrapping_add(d as u32 * p))
}

fn decode_run_length(data: &[u8]) -> FilterResult<Vec<u8>> {
    let mut result = Vec::new();
    let mut i = 0;
    while i < data.len() {
        let length = data[i];
        i += 1;
        match length {
            0..=127 => {
                let n = length as usize + 1;
                if i + n > data.len() {
                    return Err(FilterError::InvalidData(
                        "run length literal overruns data".to_string(),
                    ));
                }
                result.extend_from_slice(&data[i..i + n]);
                i += n;
            }
            128 => break,
            _ => {
                if i >= data.len() {
                    return Err(FilterError::InvalidData(
                        "run length repeat overruns data".to_string(),
                    ));
                }
                result.extend(std::iter::repeat(data[i]).take(257 - length as usize));
                i += 1;
            }
        }
    }
    Ok(result)
}

/// Normalize line endings in a content stream: CR and CRLF become LF.
pub fn normalize_content(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut i = 0;
    while i < data.len() {
        let b = data[i];
        if b == b'\r' {
            if i + 1 < data.len() && data[i + 1] == b'\n' {
                i += 1;
            }
            out.push(b'\n');
        } else {
            out.push(b);
        }
        i += 1;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PdfDictionary;

    #[test]
    fn test_flate_round_trip() {
        let data = b"stream data stream data stream data".to_vec();
        let compressed = flate_compress(&data);
        assert_eq!(flate_decompress(&compressed).unwrap(), data);
    }

    #[test]
    fn test_ascii_hex() {
        assert_eq!(decode_ascii_hex(b"48 65 6C 6C 6F>").unwrap(), b"Hello");
        // An odd final digit is padded with zero.
        assert_eq!(decode_ascii_hex(b"7>").unwrap(), vec![0x70]);
    }

    #[test]
    fn test_run_length() {
        // literal run of 3, then 4 repeats of 0x61, then EOD
        let encoded = [2u8, b'a', b'b', b'c', 253, b'a', 128];
        assert_eq!(decode_run_length(&encoded).unwrap(), b"abcaaaa");
    }

    #[test]
    fn test_normalize_content() {
        assert_eq!(normalize_content(b"a\r\nb\rc\n"), b"a\nb\nc\n");
    }

    #[test]
    fn test_filterable_levels() {
        let mut dict = PdfDictionary::new();
        dict.insert("Filter", PdfValue::Name(PdfName::new("FlateDecode")));
        let stream = PdfStream::new(dict, flate_compress(b"x"));
        assert!(!stream_filterable(&stream, DecodeLevel::None));
        assert!(stream_filterable(&stream, DecodeLevel::Generalized));

        let mut dct = PdfDictionary::new();
        dct.insert("Filter", PdfValue::Name(PdfName::new("DCTDecode")));
        let jpeg = PdfStream::new(dct, vec![0xff, 0xd8]);
        assert!(!stream_filterable(&jpeg, DecodeLevel::All));
    }

    #[test]
    fn test_pipe_stream_data_decode_and_recompress() {
        let body = b"BT /F1 12 Tf ET".to_vec();
        let mut dict = PdfDictionary::new();
        dict.insert("Filter", PdfValue::Name(PdfName::new("FlateDecode")));
        let stream = PdfStream::new(dict, flate_compress(&body));

        let (filtered, out) = pipe_stream_data(
            &stream,
            EncodeFlags {
                compress: false,
                normalize: false,
            },
            DecodeLevel::Generalized,
        )
        .unwrap();
        assert!(filtered);
        assert_eq!(out, body);
    }
}
