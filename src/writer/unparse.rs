use crate::error::{WriteError, WriteResult};
use crate::filters::{pipe_stream_data, DecodeLevel, EncodeFlags};
use crate::types::{ObjectId, PdfDictionary, PdfName, PdfStream, PdfValue};
use crate::writer::driver::Driver;

// Flags used by unparse_object.
pub(crate) const F_STREAM: u32 = 1 << 0;
pub(crate) const F_FILTERED: u32 = 1 << 1;
pub(crate) const F_IN_OSTREAM: u32 = 1 << 2;
pub(crate) const F_HEX_STRING: u32 = 1 << 3;
pub(crate) const F_NO_ENCRYPTION: u32 = 1 << 4;

impl Driver<'_, '_, '_> {
    pub(crate) fn unparse_child(
        &mut self,
        child: &PdfValue,
        level: usize,
        flags: u32,
    ) -> WriteResult<()> {
        if !self.cfg.linearize {
            self.enqueue(child);
        }
        if let PdfValue::Reference(r) = child {
            let renumber = self.obj.renumber(r.id());
            self.write_int(renumber as i64)?;
            self.write_str(" 0 R")
        } else {
            self.unparse_object(child, level, flags, 0, false, None)
        }
    }

    pub(crate) fn unparse_object(
        &mut self,
        object: &PdfValue,
        level: usize,
        flags: u32,
        stream_length: u64,
        compress: bool,
        old_id: Option<ObjectId>,
    ) -> WriteResult<()> {
        let child_flags = flags & !F_STREAM;

        // For non-QDF output both indents are a single space between
        // tokens; for QDF they include the preceding newline.
        let mut indent_large = " ".to_string();
        if self.cfg.qdf {
            indent_large = format!("\n{}", " ".repeat(2 * (level + 1)));
        }
        let indent: String = if self.cfg.qdf {
            indent_large[..indent_large.len() - 2].to_string()
        } else {
            " ".to_string()
        };

        match object {
            PdfValue::Array(array) => {
                // A space always follows the open bracket: some readers
                // require one after the [ in the /H key of the
                // linearization parameter dictionary, and doing it
                // everywhere costs little.
                self.write_str("[")?;
                for item in array {
                    self.write_str(&indent_large)?;
                    self.unparse_child(item, level + 1, child_flags)?;
                }
                self.write_str(&indent)?;
                self.write_str("]")?;
            }
            PdfValue::Dictionary(dict) => {
                let mut dict = dict.clone();

                if old_id.is_some() && old_id == self.root_id {
                    self.reconcile_extensions(&mut dict);
                }

                if flags & F_STREAM != 0 {
                    // /Length is written explicitly below.
                    dict.remove("Length");

                    // An empty /DecodeParms entry serves no purpose.
                    if matches!(dict.get("DecodeParms"), Some(PdfValue::Array(a)) if a.is_empty())
                        || matches!(dict.get("DecodeParms"), Some(PdfValue::Null))
                    {
                        dict.remove("DecodeParms");
                    }

                    if flags & F_FILTERED != 0 {
                        // We will supply our own filter and decode
                        // parameters.
                        dict.remove("Filter");
                        dict.remove("DecodeParms");
                    } else {
                        strip_crypt_filter(&mut dict);
                    }
                }

                let is_sig_dict = dict.is_type("Sig") && dict.contains_key("ByteRange");

                self.write_str("<<")?;
                let entries = dict.clone();
                for (key, value) in entries.iter() {
                    if value.is_null() {
                        continue;
                    }
                    self.write_str(&indent_large)?;
                    self.write_name(key)?;
                    self.write_str(" ")?;
                    if is_sig_dict && key == "Contents" {
                        // Signature contents cover file bytes by range and
                        // must stay hex and unencrypted.
                        self.unparse_child(
                            value,
                            level + 1,
                            child_flags | F_HEX_STRING | F_NO_ENCRYPTION,
                        )?;
                    } else {
                        self.unparse_child(value, level + 1, child_flags)?;
                    }
                }

                if flags & F_STREAM != 0 {
                    self.write_str(&indent_large)?;
                    self.write_str("/Length ")?;
                    if self.cfg.direct_stream_lengths {
                        self.write_int(stream_length as i64)?;
                    } else {
                        self.write_int(self.cur_stream_length_id as i64)?;
                        self.write_str(" 0 R")?;
                    }
                    if compress && flags & F_FILTERED != 0 {
                        self.write_str(&indent_large)?;
                        self.write_str("/Filter /FlateDecode")?;
                    }
                }

                self.write_str(&indent)?;
                self.write_str(">>")?;
            }
            PdfValue::Stream(stream) => {
                let old_id = old_id.ok_or_else(|| {
                    WriteError::internal("stream unparsed without an object identity")
                })?;
                if !self.cfg.direct_stream_lengths {
                    self.cur_stream_length_id = self.obj.renumber(old_id) + 1;
                }

                let flags = flags | F_STREAM;
                let (filtered, compress_stream, is_root_metadata, stream_data) =
                    self.will_filter_stream(old_id, stream)?;
                let flags = if filtered { flags | F_FILTERED } else { flags };

                self.cur_stream_length = stream_data.len() as u64;
                if is_root_metadata
                    && self
                        .encryption
                        .as_ref()
                        .map(|e| !e.encrypt_metadata())
                        .unwrap_or(false)
                {
                    // The metadata stream is never encrypted in that case.
                    self.cur_data_key.clear();
                }
                let mut length = self.cur_stream_length;
                self.adjust_aes_stream_length(&mut length);
                self.cur_stream_length = length;

                self.unparse_object(
                    &PdfValue::Dictionary(stream.dict.clone()),
                    0,
                    flags,
                    length,
                    compress_stream,
                    None,
                )?;

                let last_char = stream_data.last().copied();
                self.write_str("\nstream\n")?;
                self.write_encrypted(&stream_data)?;
                self.added_newline = self.cfg.newline_before_endstream
                    || (self.cfg.qdf && last_char != Some(b'\n'));
                self.write_str(if self.added_newline {
                    "\nendstream"
                } else {
                    "endstream"
                })?;
            }
            PdfValue::String(s) => {
                let encrypt = self.encryption.is_some()
                    && flags & F_IN_OSTREAM == 0
                    && flags & F_NO_ENCRYPTION == 0
                    && !self.cur_data_key.is_empty();
                if encrypt {
                    let bytes = s.as_bytes();
                    if self.cfg.encrypt_use_aes {
                        let iv = self.aes_iv();
                        let encrypted =
                            crate::crypto::aes_pdf_encrypt(bytes, &self.cur_data_key, &iv)
                                .map_err(|e| WriteError::data(e.to_string()))?;
                        self.write_string_bytes(&encrypted, true)?;
                    } else {
                        let encrypted = crate::crypto::rc4(bytes, &self.cur_data_key);
                        self.write_string_bytes(&encrypted, false)?;
                    }
                } else if flags & F_HEX_STRING != 0 {
                    self.write_string_bytes(s.as_bytes(), true)?;
                } else {
                    let unparsed = object.unparse_scalar();
                    self.write_str(&unparsed)?;
                }
            }
            other => {
                let unparsed = other.unparse_scalar();
                self.write_str(&unparsed)?;
            }
        }
        Ok(())
    }

    /// Reconcile `/Extensions/ADBE` on the document catalog against the
    /// final output version. The dictionary passed in is already a copy of
    /// the root, so it can be edited freely.
    fn reconcile_extensions(&self, root: &mut PdfDictionary) {
        let need_adbe = self.final_extension_level > 0;
        let have_extensions = matches!(root.get("Extensions"), Some(PdfValue::Dictionary(_)));
        if !(need_adbe || have_extensions) {
            return;
        }

        let mut extensions = match root.get("Extensions") {
            Some(PdfValue::Dictionary(d)) => d.clone(),
            _ => PdfDictionary::new(),
        };
        let have_adbe = extensions.contains_key("ADBE");
        let have_other = extensions.len() > usize::from(have_adbe);

        if need_adbe {
            let current_ok = extensions
                .get("ADBE")
                .and_then(PdfValue::as_dict)
                .map(|adbe| {
                    adbe.get("BaseVersion")
                        .and_then(PdfValue::as_name)
                        .map(|n| n == self.final_version.to_string().as_str())
                        .unwrap_or(false)
                        && adbe.get("ExtensionLevel").and_then(PdfValue::as_integer)
                            == Some(self.final_extension_level as i64)
                })
                .unwrap_or(false);
            if !current_ok {
                let mut adbe = PdfDictionary::new();
                adbe.insert(
                    "BaseVersion",
                    PdfValue::Name(PdfName::new(self.final_version.to_string())),
                );
                adbe.insert(
                    "ExtensionLevel",
                    PdfValue::Integer(self.final_extension_level as i64),
                );
                extensions.insert("ADBE", PdfValue::Dictionary(adbe));
            }
            root.insert("Extensions", PdfValue::Dictionary(extensions));
        } else if have_adbe {
            if have_other {
                extensions.remove("ADBE");
                root.insert("Extensions", PdfValue::Dictionary(extensions));
            } else {
                root.remove("Extensions");
            }
        }
    }

    /// Decide whether to decode and re-encode a stream, producing the bytes
    /// to write. Returns `(filtered, compressed, is_root_metadata, data)`.
    pub(crate) fn will_filter_stream(
        &mut self,
        id: ObjectId,
        stream: &PdfStream,
    ) -> WriteResult<(bool, bool, bool, Vec<u8>)> {
        let is_root_metadata = self.is_root_metadata(id);
        let mut filter = false;
        let mut decode_level = self.cfg.decode_level;
        let mut encode = EncodeFlags::default();

        if stream.filter_on_write() && !self.raw_streams.contains(&id) {
            filter = stream.is_data_modified()
                || self.cfg.compress_streams
                || decode_level != DecodeLevel::None;
            if self.cfg.compress_streams
                && stream.is_flate_only()
                && !self.cfg.recompress_flate
                && !stream.is_data_modified()
            {
                // Already Flate: recompressing wastes time and may make the
                // output larger if the original used a better compressor.
                filter = false;
            }
            let encrypt_metadata = self
                .encryption
                .as_ref()
                .map(|e| e.encrypt_metadata())
                .unwrap_or(false);
            if is_root_metadata && !encrypt_metadata {
                filter = true;
                decode_level = DecodeLevel::All;
            } else if self.cfg.normalize_content && self.normalized_streams.contains(&id) {
                encode.normalize = true;
                filter = true;
            } else if filter && self.cfg.compress_streams {
                encode.compress = true;
            }
        }

        // Compression of empty streams hurts compatibility.
        if stream.is_empty() {
            filter = true;
            encode = EncodeFlags::default();
        }

        if filter {
            match pipe_stream_data(stream, encode, decode_level) {
                Ok((true, data)) => return Ok((true, encode.compress, is_root_metadata, data)),
                Ok((false, data)) => return Ok((false, false, is_root_metadata, data)),
                Err(e) => {
                    log::warn!(
                        "object {} 0: error while getting stream data: {}",
                        id.number,
                        e
                    );
                    log::warn!(
                        "object {} 0: attempting to write the damaged stream unchanged",
                        id.number
                    );
                    self.raw_streams.insert(id);
                    // Raw retry below.
                }
            }
        }

        match pipe_stream_data(stream, EncodeFlags::default(), DecodeLevel::None) {
            Ok((_, data)) => Ok((false, false, is_root_metadata, data)),
            Err(e) => Err(WriteError::Stream {
                id: id.number,
                message: e.to_string(),
            }),
        }
    }

    /// The filter decision alone, as needed by linearization's stream
    /// parameter handling, with a per-object cache.
    pub(crate) fn will_filter_stream_check(&mut self, id: ObjectId) -> WriteResult<bool> {
        if let Some(&cached) = self.will_filter_cache.get(&id.number) {
            return Ok(cached != 0);
        }
        let stream = match self.doc.get(id) {
            Some(PdfValue::Stream(s)) => s.clone(),
            _ => return Ok(false),
        };
        let (filtered, _, _, _) = self.will_filter_stream(id, &stream)?;
        self.will_filter_cache
            .insert(id.number, i32::from(filtered));
        Ok(filtered)
    }

    pub(crate) fn is_root_metadata(&self, id: ObjectId) -> bool {
        let Some(root_id) = self.root_id else {
            return false;
        };
        self.doc
            .get(root_id)
            .and_then(PdfValue::as_dict)
            .and_then(|d| d.get("Metadata"))
            .and_then(PdfValue::as_reference)
            .map(|r| r.id() == id)
            .unwrap_or(false)
    }
}

/// Remove `/Crypt` from a stream dictionary's filter list along with its
/// paired decode parameters entry.
fn strip_crypt_filter(dict: &mut PdfDictionary) {
    let single = matches!(dict.get("Filter"), Some(v) if v.is_name("Crypt"));
    if single {
        dict.remove("Filter");
        dict.remove("DecodeParms");
        return;
    }
    let idx = match dict.get("Filter") {
        Some(PdfValue::Array(a)) => a.iter().position(|v| v.is_name("Crypt")),
        _ => None,
    };
    if let Some(idx) = idx {
        if let Some(filter) = dict.get_mut("Filter").and_then(PdfValue::as_array_mut) {
            filter.remove(idx);
        }
        if let Some(parms) = dict.get_mut("DecodeParms").and_then(PdfValue::as_array_mut) {
            if idx < parms.len() {
                parms.remove(idx);
            }
        }
    }
}
