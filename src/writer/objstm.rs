use crate::error::{WriteError, WriteResult};
use crate::filters::flate_compress;
use crate::types::{ObjectId, PdfValue};
use crate::writer::driver::Driver;
use crate::writer::unparse::F_IN_OSTREAM;
use crate::writer::NewXref;

impl Driver<'_, '_, '_> {
    fn write_object_stream_offsets(&mut self, offsets: &[u64], first_obj: i32) -> WriteResult<()> {
        if first_obj <= 0 {
            return Err(WriteError::internal(
                "object stream offsets written with non-positive first object",
            ));
        }
        let mut id = first_obj as i64;
        for (i, offset) in offsets.iter().enumerate() {
            if i > 0 {
                self.qdf("\n")?;
                self.no_qdf(" ")?;
            }
            self.write_int(id)?;
            self.write_str(" ")?;
            self.write_int(*offset as i64)?;
            id += 1;
        }
        self.write_str("\n")
    }

    /// Pack and emit one object stream. The members are written twice: once
    /// into a buffer to learn their offsets, then again after the id/offset
    /// header whose own size shifts `/First`.
    pub(crate) fn write_object_stream(&mut self, old_id: ObjectId) -> WriteResult<()> {
        // The original object may be a null placeholder when the stream is
        // generated from scratch.
        let new_stream_id = self.obj.renumber(old_id);
        let members = self
            .object_stream_to_objects
            .get(&old_id.number)
            .cloned()
            .unwrap_or_default();
        if members.is_empty() {
            return Err(WriteError::internal("object stream with no members"));
        }

        let compressed = self.cfg.compress_streams && !self.cfg.qdf;
        let mut offsets: Vec<u64> = Vec::with_capacity(members.len());
        let mut first_obj = -1;

        // Pass 1: learn per-member offsets.
        let pass1_handle = self.pipeline.activate_buffer();
        let mut count: i32 = -1;
        for og in &members {
            count += 1;
            let new_o = self.obj.renumber(*og);
            if first_obj == -1 {
                first_obj = new_o;
            }
            if self.cfg.qdf {
                let mut banner = format!("%% Object stream: object {}, index {}", new_o, count);
                if !self.cfg.no_original_object_ids {
                    banner.push_str(&format!("; original object ID: {}", og.number));
                    // Object streams only hold generation 0 objects, but a
                    // generated stream can absorb an older object.
                    if og.generation != 0 {
                        banner.push_str(&format!(" {}", og.generation));
                    }
                }
                banner.push('\n');
                self.write_str(&banner)?;
            }

            offsets.push(self.pipeline.count());
            // Members are also counted by write_object; cancel the double
            // count for progress reporting.
            self.indicate_progress(true, false);
            self.write_object(*og, count)?;

            self.new_obj.at(new_o).xref = NewXref::InStream {
                stream: new_stream_id,
                index: count as u32,
            };
        }
        let pass1_buffer = self.pipeline.pop(pass1_handle)?;

        // Offsets are relative to the start of the body, which begins after
        // the first member's banner.
        let first_offset = offsets[0];
        for offset in &mut offsets {
            *offset -= first_offset;
        }
        let mut first = first_offset;

        {
            // One throwaway pass over the header to size it.
            let discard = self.pipeline.activate(true);
            self.write_object_stream_offsets(&offsets, first_obj)?;
            first += self.pipeline.count();
            self.pipeline.pop(discard)?;
        }

        let body_handle = self.pipeline.activate_buffer();
        self.write_object_stream_offsets(&offsets, first_obj)?;
        self.write_bytes(&pass1_buffer)?;
        drop(pass1_buffer);
        let mut body = self.pipeline.pop(body_handle)?;
        if compressed {
            body = flate_compress(&body);
        }

        // Emit the stream object itself.
        self.open_object(new_stream_id)?;
        self.set_data_key(new_stream_id);
        self.write_str("<<")?;
        self.qdf("\n ")?;
        self.write_str(" /Type /ObjStm")?;
        self.qdf("\n ")?;
        let mut length = body.len() as u64;
        self.adjust_aes_stream_length(&mut length);
        self.write_str(" /Length ")?;
        self.write_int(length as i64)?;
        self.qdf("\n ")?;
        if compressed {
            self.write_str(" /Filter /FlateDecode")?;
        }
        self.write_str(" /N ")?;
        self.write_int(offsets.len() as i64)?;
        self.qdf("\n ")?;
        self.write_str(" /First ")?;
        self.write_int(first as i64)?;

        let extends = match self.doc.get(old_id) {
            Some(PdfValue::Stream(s)) => match s.dict.get("Extends") {
                Some(v @ PdfValue::Reference(_)) => Some(v.clone()),
                _ => None,
            },
            _ => None,
        };
        if let Some(extends) = extends {
            self.qdf("\n ")?;
            self.write_str(" /Extends ")?;
            self.unparse_child(&extends, 1, F_IN_OSTREAM)?;
        }

        self.qdf("\n")?;
        self.no_qdf(" ")?;
        self.write_str(">>\nstream\n")?;
        self.write_encrypted(&body)?;
        self.write_str(if self.cfg.newline_before_endstream {
            "\nendstream"
        } else {
            "endstream"
        })?;
        if self.encryption.is_some() {
            self.cur_data_key.clear();
        }
        self.close_object(new_stream_id)?;
        Ok(())
    }
}
