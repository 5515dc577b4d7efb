use crate::error::{WriteError, WriteResult};
use crate::filters::{flate_compress, predictor::encode_png_up};
use crate::writer::driver::{Driver, TrailerKind};
use crate::writer::NewXref;

pub(crate) fn bytes_needed(mut n: u64) -> u32 {
    let mut bytes = 0;
    while n != 0 {
        bytes += 1;
        n >>= 8;
    }
    bytes
}

impl Driver<'_, '_, '_> {
    pub(crate) fn write_binary(&mut self, val: u64, bytes: u32) -> WriteResult<()> {
        if bytes > 8 {
            return Err(WriteError::internal(
                "write_binary called with too many bytes",
            ));
        }
        let all = val.to_be_bytes();
        self.write_bytes(&all[8 - bytes as usize..])
    }

    pub(crate) fn write_xref_table(
        &mut self,
        which: TrailerKind,
        first: i32,
        last: i32,
        size: i32,
    ) -> WriteResult<u64> {
        self.write_xref_table_full(which, first, last, size, 0, false, 0, 0, 0, 0)
    }

    /// Emit a classic cross-reference table plus its trailer. Returns the
    /// offset of the whitespace before the first entry (the `/T` value for
    /// linearization).
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn write_xref_table_full(
        &mut self,
        which: TrailerKind,
        first: i32,
        last: i32,
        size: i32,
        prev: u64,
        suppress_offsets: bool,
        hint_id: i32,
        hint_offset: u64,
        hint_length: u64,
        linearization_pass: i32,
    ) -> WriteResult<u64> {
        self.write_str("xref\n")?;
        self.write_int(first as i64)?;
        self.write_str(" ")?;
        self.write_int((last - first + 1) as i64)?;
        let space_before_zero = self.pipeline.count();
        self.write_str("\n")?;
        let mut first = first;
        if first == 0 {
            self.write_str("0000000000 65535 f \n")?;
            first += 1;
        }
        for i in first..=last {
            let mut offset = 0;
            if !suppress_offsets {
                offset = match self.new_obj.get(i).xref {
                    NewXref::Offset(o) => o,
                    _ => 0,
                };
                if hint_id != 0 && i != hint_id && offset >= hint_offset {
                    offset += hint_length;
                }
            }
            self.write_str(&format!("{:010} 00000 n \n", offset))?;
        }
        self.write_trailer(which, size, false, prev, linearization_pass)?;
        self.write_str("\n")?;
        Ok(space_before_zero)
    }

    /// Emit a cross-reference stream. Returns the offset of the byte before
    /// the stream object (the `/T` value for linearization).
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn write_xref_stream(
        &mut self,
        xref_id: i32,
        max_id: i32,
        max_offset: u64,
        which: TrailerKind,
        first: i32,
        last: i32,
        size: i32,
        prev: u64,
        hint_id: i32,
        hint_offset: u64,
        hint_length: u64,
        skip_compression: bool,
        linearization_pass: i32,
    ) -> WriteResult<u64> {
        let xref_offset = self.pipeline.count();
        let space_before_zero = xref_offset.saturating_sub(1);

        // Field 1 holds offsets and object stream ids, field 2 holds
        // object stream indices.
        let f1_size = bytes_needed(max_offset + hint_length).max(bytes_needed(max_id as u64));
        let f2_size = bytes_needed(self.max_ostream_index as u64);
        let esize = 1 + f1_size + f2_size;

        // The entry for the xref stream itself must be in place before its
        // own row is produced.
        self.new_obj.at(xref_id).xref = NewXref::Offset(xref_offset);

        let compressed = self.cfg.compress_streams && !self.cfg.qdf;
        let handle = self.pipeline.activate_buffer();
        for i in first..=last {
            match self.new_obj.get(i).xref {
                NewXref::Free => {
                    self.write_binary(0, 1)?;
                    self.write_binary(0, f1_size)?;
                    self.write_binary(0, f2_size)?;
                }
                NewXref::Offset(o) => {
                    let mut offset = o;
                    if hint_id != 0 && i != hint_id && offset >= hint_offset {
                        offset += hint_length;
                    }
                    self.write_binary(1, 1)?;
                    self.write_binary(offset, f1_size)?;
                    self.write_binary(0, f2_size)?;
                }
                NewXref::InStream { stream, index } => {
                    self.write_binary(2, 1)?;
                    self.write_binary(stream as u64, f1_size)?;
                    self.write_binary(index as u64, f2_size)?;
                }
            }
        }
        let mut xref_data = self.pipeline.pop(handle)?;

        if compressed {
            xref_data = encode_png_up(&xref_data, esize as usize)
                .map_err(|e| WriteError::internal(e.to_string()))?;
            if !skip_compression {
                // Pass 1 of linearization writes the dictionary for the
                // compressed form but leaves the data uncompressed so the
                // padding calculation is deterministic.
                xref_data = flate_compress(&xref_data);
            }
        }

        self.open_object(xref_id)?;
        self.write_str("<<")?;
        self.qdf("\n ")?;
        self.write_str(" /Type /XRef")?;
        self.qdf("\n ")?;
        self.write_str(" /Length ")?;
        self.write_int(xref_data.len() as i64)?;
        if compressed {
            self.qdf("\n ")?;
            self.write_str(" /Filter /FlateDecode")?;
            self.qdf("\n ")?;
            self.write_str(" /DecodeParms << /Columns ")?;
            self.write_int(esize as i64)?;
            self.write_str(" /Predictor 12 >>")?;
        }
        self.qdf("\n ")?;
        self.write_str(" /W [ 1 ")?;
        self.write_int(f1_size as i64)?;
        self.write_str(" ")?;
        self.write_int(f2_size as i64)?;
        self.write_str(" ]")?;
        if !(first == 0 && last == size - 1) {
            self.write_str(" /Index [ ")?;
            self.write_int(first as i64)?;
            self.write_str(" ")?;
            self.write_int((last - first + 1) as i64)?;
            self.write_str(" ]")?;
        }
        self.write_trailer(which, size, true, prev, linearization_pass)?;
        self.write_str("\nstream\n")?;
        self.write_bytes(&xref_data)?;
        self.write_str("\nendstream")?;
        self.close_object(xref_id)?;
        Ok(space_before_zero)
    }

    /// Worst-case growth when the pass 1 xref stream data gets compressed
    /// in pass 2: zlib can expand by 6 bytes plus 5 per 16K, plus room for
    /// number length increases.
    pub(crate) fn calculate_xref_stream_padding(&self, xref_bytes: u64) -> usize {
        (16 + 5 * xref_bytes.div_ceil(16384)) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bytes_needed() {
        assert_eq!(bytes_needed(0), 0);
        assert_eq!(bytes_needed(255), 1);
        assert_eq!(bytes_needed(256), 2);
        assert_eq!(bytes_needed(1 << 24), 4);
    }
}
