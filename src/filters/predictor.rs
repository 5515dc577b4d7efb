use super::{FilterError, FilterResult};

/// PNG and TIFF predictors for PDF streams.
///
/// Decoding supports the full PNG row-filter set plus the TIFF horizontal
/// predictor. Encoding only ever emits the PNG up filter (predictor 12),
/// which is what cross-reference streams use.

#[derive(Debug, Clone, Copy)]
pub enum PredictorType {
    None,
    Tiff,
    Png,
}

pub struct PredictorDecoder {
    predictor: PredictorType,
    colors: u8,
    bits_per_component: u8,
    columns: u32,
}

impl PredictorDecoder {
    pub fn new(predictor: i32, colors: u8, bits_per_component: u8, columns: u32) -> Self {
        let predictor_type = match predictor {
            2 => PredictorType::Tiff,
            10..=15 => PredictorType::Png,
            _ => PredictorType::None,
        };
        Self {
            predictor: predictor_type,
            colors,
            bits_per_component,
            columns,
        }
    }

    pub fn decode(&self, data: &[u8]) -> FilterResult<Vec<u8>> {
        match self.predictor {
            PredictorType::None => Ok(data.to_vec()),
            PredictorType::Tiff => self.decode_tiff(data),
            PredictorType::Png => self.decode_png(data),
        }
    }

    fn bytes_per_pixel(&self) -> usize {
        ((self.colors as u32 * self.bits_per_component as u32).div_ceil(8)) as usize
    }

    fn bytes_per_row(&self) -> usize {
        ((self.columns * self.colors as u32 * self.bits_per_component as u32).div_ceil(8)) as usize
    }

    fn decode_tiff(&self, data: &[u8]) -> FilterResult<Vec<u8>> {
        let bpp = self.bytes_per_pixel();
        let row_len = self.bytes_per_row();
        if row_len == 0 || data.len() % row_len != 0 {
            return Err(FilterError::InvalidData(
                "data length not divisible by row length for TIFF predictor".to_string(),
            ));
        }

        let mut result = Vec::with_capacity(data.len());
        for row in data.chunks_exact(row_len) {
            let mut decoded = row.to_vec();
            for i in bpp..decoded.len() {
                decoded[i] = decoded[i].wrapping_add(decoded[i - bpp]);
            }
            result.extend_from_slice(&decoded);
        }
        Ok(result)
    }

    fn decode_png(&self, data: &[u8]) -> FilterResult<Vec<u8>> {
        let bpp = self.bytes_per_pixel();
        let row_len = self.bytes_per_row();
        let full_row = row_len + 1; // +1 for the per-row filter byte
        if full_row == 1 || data.len() % full_row != 0 {
            return Err(FilterError::InvalidData(
                "data length not compatible with PNG predictor format".to_string(),
            ));
        }

        let mut result = Vec::with_capacity(data.len());
        let mut previous = vec![0u8; row_len];

        for chunk in data.chunks_exact(full_row) {
            let filter = chunk[0];
            let row = &chunk[1..];
            let mut decoded = vec![0u8; row_len];

            match filter {
                0 => decoded.copy_from_slice(row),
                1 => {
                    for i in 0..row_len {
                        let left = if i >= bpp { decoded[i - bpp] } else { 0 };
                        decoded[i] = row[i].wrapping_add(left);
                    }
                }
                2 => {
                    for i in 0..row_len {
                        decoded[i] = row[i].wrapping_add(previous[i]);
                    }
                }
                3 => {
                    for i in 0..row_len {
                        let left = if i >= bpp { decoded[i - bpp] as u16 } else { 0 };
                        let up = previous[i] as u16;
                        decoded[i] = row[i].wrapping_add(((left + up) / 2) as u8);
                    }
                }
                4 => {
                    for i in 0..row_len {
                        let left = if i >= bpp { decoded[i - bpp] as i32 } else { 0 };
                        let up = previous[i] as i32;
                        let up_left = if i >= bpp { previous[i - bpp] as i32 } else { 0 };
                        decoded[i] = row[i].wrapping_add(paeth(left, up, up_left));
                    }
                }
                other => {
                    return Err(FilterError::InvalidData(format!(
                        "unknown PNG row filter: {}",
                        other
                    )));
                }
            }

            result.extend_from_slice(&decoded);
            previous = decoded;
        }
        Ok(result)
    }
}

fn paeth(a: i32, b: i32, c: i32) -> u8 {
    let p = a + b - c;
    let pa = (p - a).abs();
    let pb = (p - b).abs();
    let pc = (p - c).abs();
    if pa <= pb && pa <= pc {
        a as u8
    } else if pb <= pc {
        b as u8
    } else {
        c as u8
    }
}

/// Encode with the PNG up filter (PDF predictor 12): each row is prefixed
/// with filter byte 2 and stores the byte-wise difference from the row
/// above. Data length must be a whole number of rows.
pub fn encode_png_up(data: &[u8], columns: usize) -> FilterResult<Vec<u8>> {
    if columns == 0 || data.len() % columns != 0 {
        return Err(FilterError::InvalidData(
            "data length not divisible by columns for up-filter encoding".to_string(),
        ));
    }
    let mut result = Vec::with_capacity(data.len() + data.len() / columns);
    let mut previous = vec![0u8; columns];
    for row in data.chunks_exact(columns) {
        result.push(2);
        for i in 0..columns {
            result.push(row[i].wrapping_sub(previous[i]));
        }
        previous = row.to_vec();
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_predictor() {
        let decoder = PredictorDecoder::new(1, 1, 8, 4);
        let data = vec![1, 2, 3, 4];
        assert_eq!(decoder.decode(&data).unwrap(), data);
    }

    #[test]
    fn test_png_up_round_trip() {
        let rows = vec![10u8, 20, 30, 15, 25, 35, 0, 1, 2];
        let encoded = encode_png_up(&rows, 3).unwrap();
        assert_eq!(encoded.len(), rows.len() + 3);
        let decoder = PredictorDecoder::new(12, 1, 8, 3);
        assert_eq!(decoder.decode(&encoded).unwrap(), rows);
    }

    #[test]
    fn test_png_sub() {
        let decoder = PredictorDecoder::new(10, 1, 8, 4);
        let data = vec![1, 10, 5, 3, 7];
        assert_eq!(decoder.decode(&data).unwrap(), vec![10, 15, 18, 25]);
    }

    #[test]
    fn test_tiff_predictor() {
        let decoder = PredictorDecoder::new(2, 1, 8, 3);
        let data = vec![10, 5, 5];
        assert_eq!(decoder.decode(&data).unwrap(), vec![10, 15, 20]);
    }
}
