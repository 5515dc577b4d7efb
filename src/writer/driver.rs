use crate::crypto::encryption::Encryption;
use crate::crypto::compute_data_key;
use crate::document::{Document, PdfVersion, XRefEntry};
use crate::error::{WriteError, WriteResult};
use crate::linearize::LinData;
use crate::pipeline::PipelineStack;
use crate::types::{ObjectId, PdfDictionary, PdfName, PdfStream, PdfValue};
use crate::writer::unparse::F_IN_OSTREAM;
use crate::writer::{
    compare_versions, encryption_minimum_version, NewObjTable, NewXref, ObjTable,
    ObjectStreamMode, ProgressReporter, WriterConfig,
};
use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;

/// Which trailer variant is being written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TrailerKind {
    Normal,
    LinFirst,
    LinSecond,
}

/// Per-write state: renumbering tables, pipeline, encryption and the
/// object queue. Owns the output for the duration of one `write`.
pub(crate) struct Driver<'a, 'w, 'p> {
    pub(crate) doc: &'a mut Document,
    pub(crate) cfg: &'a mut WriterConfig,
    pub(crate) pipeline: PipelineStack<'w>,
    pub(crate) encryption: Option<Encryption>,
    pub(crate) encryption_key: Vec<u8>,
    pub(crate) id1: Vec<u8>,
    pub(crate) id2: Vec<u8>,
    pub(crate) min_version: PdfVersion,
    pub(crate) min_extension_level: i32,
    pub(crate) final_version: PdfVersion,
    pub(crate) final_extension_level: i32,
    pub(crate) root_id: Option<ObjectId>,
    pub(crate) encryption_dict_objid: i32,
    pub(crate) cur_data_key: Vec<u8>,
    pub(crate) object_queue: Vec<ObjectId>,
    pub(crate) object_queue_front: usize,
    pub(crate) obj: ObjTable,
    pub(crate) new_obj: NewObjTable,
    pub(crate) next_objid: i32,
    pub(crate) cur_stream_length_id: i32,
    pub(crate) cur_stream_length: u64,
    pub(crate) added_newline: bool,
    pub(crate) max_ostream_index: usize,
    pub(crate) normalized_streams: BTreeSet<ObjectId>,
    pub(crate) page_object_to_seq: BTreeMap<ObjectId, usize>,
    pub(crate) contents_to_page_seq: BTreeMap<ObjectId, usize>,
    pub(crate) object_stream_to_objects: BTreeMap<u32, Vec<ObjectId>>,
    pub(crate) raw_streams: BTreeSet<ObjectId>,
    pub(crate) will_filter_cache: BTreeMap<u32, i32>,
    pub(crate) deterministic_id_data: String,
    pub(crate) lin: LinData,
    did_write_setup: bool,
    events_expected: i64,
    events_seen: i64,
    next_progress_report: i64,
    progress: Option<&'a mut ProgressReporter<'p>>,
}

impl<'a, 'w, 'p> Driver<'a, 'w, 'p> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        doc: &'a mut Document,
        cfg: &'a mut WriterConfig,
        encryption: Option<Encryption>,
        encryption_key: Vec<u8>,
        id1: Vec<u8>,
        id2: Vec<u8>,
        min_version: PdfVersion,
        min_extension_level: i32,
        out: &'w mut dyn Write,
        progress: Option<&'a mut ProgressReporter<'p>>,
    ) -> Self {
        let root_id = doc.root_id();
        Driver {
            doc,
            cfg,
            pipeline: PipelineStack::new(out),
            encryption,
            encryption_key,
            id1,
            id2,
            min_version,
            min_extension_level,
            final_version: min_version,
            final_extension_level: 0,
            root_id,
            encryption_dict_objid: 0,
            cur_data_key: Vec::new(),
            object_queue: Vec::new(),
            object_queue_front: 0,
            obj: ObjTable::new(),
            new_obj: NewObjTable::new(),
            next_objid: 1,
            cur_stream_length_id: 0,
            cur_stream_length: 0,
            added_newline: false,
            max_ostream_index: 0,
            normalized_streams: BTreeSet::new(),
            page_object_to_seq: BTreeMap::new(),
            contents_to_page_seq: BTreeMap::new(),
            object_stream_to_objects: BTreeMap::new(),
            raw_streams: BTreeSet::new(),
            will_filter_cache: BTreeMap::new(),
            deterministic_id_data: String::new(),
            lin: LinData::default(),
            did_write_setup: false,
            events_expected: 0,
            events_seen: 0,
            next_progress_report: 0,
            progress,
        }
    }

    pub(crate) fn write(&mut self) -> WriteResult<()> {
        self.do_write_setup()?;

        // Two passes for linearized files; events are an approximation for
        // progress reporting only.
        self.events_expected =
            self.doc.object_count() as i64 * if self.cfg.linearize { 2 } else { 1 };

        self.prepare_file_for_write();

        if self.cfg.linearize {
            self.write_linearized()?;
        } else {
            self.write_standard()?;
        }

        self.pipeline.finish()?;
        self.indicate_progress(false, true);
        Ok(())
    }

    /// Mapping from output object number to its written xref entry.
    pub(crate) fn written_xref_table(&self) -> BTreeMap<u32, NewXref> {
        let mut result = BTreeMap::new();
        for id in 1..self.new_obj.len() as i32 {
            let entry = self.new_obj.get(id);
            if entry.xref != NewXref::Free {
                result.insert(id as u32, entry.xref);
            }
        }
        result
    }

    // ---- setup ----

    pub(crate) fn do_write_setup(&mut self) -> WriteResult<()> {
        if self.did_write_setup {
            return Ok(());
        }
        self.did_write_setup = true;

        if self.cfg.linearize {
            self.cfg.qdf = false;
        }
        if self.cfg.pclm {
            self.encryption = None;
        }

        if self.encryption.is_some() {
            // Encryption was requested explicitly.
            self.cfg.preserve_encryption = false;
        } else if self.cfg.normalize_content || self.cfg.pclm {
            // Encryption makes looking at contents pretty useless.
            self.cfg.preserve_encryption = false;
        }

        if self.cfg.preserve_encryption {
            self.copy_encryption_parameters()?;
        }

        if let Some((version, extension_level)) = self.cfg.forced_pdf_version.clone() {
            let (major, minor) = parse_version_lenient(&version);
            self.disable_incompatible_encryption(major, minor, extension_level);
            if compare_pair(major, minor, 1, 5) < 0 {
                self.cfg.object_streams = ObjectStreamMode::Disable;
            }
        }

        if self.cfg.qdf || self.cfg.normalize_content {
            self.initialize_special_streams();
        }

        match self.cfg.object_streams {
            ObjectStreamMode::Disable => {
                self.obj.streams_empty = true;
            }
            ObjectStreamMode::Preserve => self.preserve_object_streams(),
            ObjectStreamMode::Generate => self.generate_object_streams(),
        }

        if !self.obj.streams_empty {
            if self.cfg.linearize {
                // Page dictionaries are not allowed to be compressed objects.
                for page in self.doc.pages().to_vec() {
                    if self.obj.get(page).object_stream > 0 {
                        self.obj.entry(page).object_stream = 0;
                    }
                }
            }

            if self.cfg.linearize || self.encryption.is_some() {
                // Neither is the document catalog.
                if let Some(root) = self.root_id {
                    if self.obj.get(root).object_stream > 0 {
                        self.obj.entry(root).object_stream = 0;
                    }
                }
            }

            let mut reverse: BTreeMap<u32, Vec<ObjectId>> = BTreeMap::new();
            for (id, entry) in self.obj.iter() {
                if entry.object_stream > 0 {
                    reverse
                        .entry(entry.object_stream as u32)
                        .or_default()
                        .push(*id);
                }
            }
            self.max_ostream_index = reverse
                .values()
                .map(|v| v.len())
                .max()
                .unwrap_or(0)
                .saturating_sub(1);
            self.object_stream_to_objects = reverse;

            if self.object_stream_to_objects.is_empty() {
                self.obj.streams_empty = true;
            } else {
                self.set_minimum_version(PdfVersion::new(1, 5), 0);
            }
        }

        self.set_minimum_version(self.doc.version, self.doc.extension_level);
        self.final_version = self.min_version;
        self.final_extension_level = self.min_extension_level;
        if let Some((version, extension_level)) = self.cfg.forced_pdf_version.clone() {
            if let Some(v) = PdfVersion::from_string(&version) {
                self.final_version = v;
            }
            self.final_extension_level = extension_level;
        }
        Ok(())
    }

    fn copy_encryption_parameters(&mut self) -> WriteResult<()> {
        self.cfg.preserve_encryption = false;
        if !self.doc.trailer.contains_key("Encrypt") {
            return Ok(());
        }
        let input = self.doc.encryption.clone().ok_or_else(|| {
            WriteError::data("input has /Encrypt but no parser-derived encryption parameters")
        })?;

        generate_id(
            self.doc,
            self.cfg,
            true,
            &self.deterministic_id_data,
            &mut self.id1,
            &mut self.id2,
        )?;
        self.id1 = original_id1(self.doc);

        if input.v >= 4 {
            // Acrobat does not create V >= 4 files without AES; use it
            // regardless of what the original file did.
            self.cfg.encrypt_use_aes = true;
        }

        let mut enc = Encryption::from_parameters(
            input.v,
            input.r,
            input.length_bytes,
            input.p,
            input.o.clone(),
            input.u.clone(),
            input.oe.clone(),
            input.ue.clone(),
            input.perms.clone(),
            self.id1.clone(),
            input.encrypt_metadata,
        );
        enc.set_id1(self.id1.clone());
        self.encryption_key = if input.v >= 5 {
            input.file_key.clone()
        } else {
            enc.compute_encryption_key(&input.padded_user_password)
        };
        let (version, level) = encryption_minimum_version(&enc, self.cfg.encrypt_use_aes);
        self.set_minimum_version(version, level);
        self.encryption = Some(enc);
        Ok(())
    }

    fn disable_incompatible_encryption(&mut self, major: i32, minor: i32, extension_level: i32) {
        let Some(enc) = self.encryption.as_ref() else {
            return;
        };
        let v = enc.v();
        let r = enc.r();
        let disable = if compare_pair(major, minor, 1, 3) < 0 {
            true
        } else if compare_pair(major, minor, 1, 4) < 0 {
            v > 1 || r > 2
        } else if compare_pair(major, minor, 1, 5) < 0 {
            v > 2 || r > 3
        } else if compare_pair(major, minor, 1, 6) < 0 {
            self.cfg.encrypt_use_aes
        } else if compare_pair(major, minor, 1, 7) < 0
            || (compare_pair(major, minor, 1, 7) == 0 && extension_level < 3)
        {
            v >= 5 || r >= 5
        } else {
            false
        };
        if disable {
            self.encryption = None;
            self.encryption_key.clear();
        }
    }

    pub(crate) fn set_minimum_version(&mut self, version: PdfVersion, extension_level: i32) {
        let compare = compare_versions(version, self.min_version);
        if compare > 0 {
            self.min_version = version;
            self.min_extension_level = extension_level;
        } else if compare == 0 && extension_level > self.min_extension_level {
            self.min_extension_level = extension_level;
        }
    }

    fn initialize_special_streams(&mut self) {
        // Mark all page content streams in case we are filtering or
        // normalizing.
        let pages = self.doc.pages().to_vec();
        for (i, page_id) in pages.iter().enumerate() {
            let num = i + 1;
            self.page_object_to_seq.insert(*page_id, num);

            let contents = self
                .doc
                .get(*page_id)
                .and_then(PdfValue::as_dict)
                .and_then(|d| d.get("Contents"))
                .cloned();
            let mut contents_objects: Vec<ObjectId> = Vec::new();
            match contents {
                Some(PdfValue::Array(a)) => {
                    for item in &a {
                        if let Some(r) = item.as_reference() {
                            contents_objects.push(r.id());
                        }
                    }
                }
                Some(PdfValue::Reference(r)) => {
                    if matches!(self.doc.get(r.id()), Some(PdfValue::Stream(_))) {
                        contents_objects.push(r.id());
                    }
                }
                _ => {}
            }
            for c in contents_objects {
                self.contents_to_page_seq.insert(c, num);
                self.normalized_streams.insert(c);
            }
        }
    }

    fn encryption_dict_id(&self) -> Option<ObjectId> {
        self.doc
            .trailer
            .get("Encrypt")
            .and_then(PdfValue::as_reference)
            .map(|r| r.id())
    }

    /// Object-stream membership eligibility: generation zero, not itself a
    /// stream, not the encryption dictionary.
    fn compressible(&self, id: ObjectId) -> bool {
        if id.generation != 0 {
            return false;
        }
        if self.encryption_dict_id() == Some(id) {
            return false;
        }
        match self.doc.get(id) {
            Some(PdfValue::Stream(_)) => false,
            Some(_) => true,
            None => false,
        }
    }

    fn preserve_object_streams(&mut self) {
        self.obj.streams_empty = true;
        let entries: Vec<(ObjectId, u32)> = self
            .doc
            .xref_iter()
            .filter_map(|(id, e)| match e {
                XRefEntry::Compressed { stream_object, .. } => Some((*id, *stream_object)),
                _ => None,
            })
            .collect();
        for (id, stream_object) in entries {
            self.obj.streams_empty = false;
            if self.compressible(id) {
                self.obj.entry(id).object_stream = stream_object as i32;
            }
        }
    }

    fn generate_object_streams(&mut self) {
        // Distribute eligible objects approximately evenly without any
        // object stream exceeding 100 members.
        let eligible: Vec<ObjectId> = self
            .doc
            .object_ids()
            .into_iter()
            .filter(|id| self.compressible(*id))
            .collect();
        let n_streams = eligible.len().div_ceil(100);
        if n_streams == 0 {
            self.obj.streams_empty = true;
            return;
        }
        let n_per = eligible.len().div_ceil(n_streams);

        let mut n = 0;
        let mut cur_stream = self.doc.add_object(PdfValue::Null).number as i32;
        for item in eligible {
            if n == n_per {
                n = 0;
                // A fresh null object stands in for the object stream we
                // are creating from scratch.
                cur_stream = self.doc.add_object(PdfValue::Null).number as i32;
            }
            let entry = self.obj.entry(item);
            entry.object_stream = cur_stream;
            entry.gen = item.generation;
            n += 1;
        }
    }

    fn prepare_file_for_write(&mut self) {
        self.doc.fix_dangling_references();

        // The extension level information must be direct so the output
        // adjustments can be made on a shallow copy.
        let Some(root_id) = self.root_id else {
            return;
        };
        let extensions = self
            .doc
            .get(root_id)
            .and_then(PdfValue::as_dict)
            .and_then(|d| d.get("Extensions"))
            .cloned();
        if let Some(PdfValue::Reference(r)) = extensions {
            let resolved = self.doc.get(r.id()).cloned().unwrap_or(PdfValue::Null);
            if let Some(dict) = self.doc.get_mut(root_id).and_then(PdfValue::as_dict_mut) {
                dict.insert("Extensions", resolved);
            }
        }
        let adbe = self
            .doc
            .get(root_id)
            .and_then(PdfValue::as_dict)
            .and_then(|d| d.get("Extensions"))
            .and_then(PdfValue::as_dict)
            .and_then(|d| d.get("ADBE"))
            .cloned();
        if let Some(PdfValue::Reference(r)) = adbe {
            let resolved = self.doc.get(r.id()).cloned().unwrap_or(PdfValue::Null);
            if let Some(ext) = self
                .doc
                .get_mut(root_id)
                .and_then(PdfValue::as_dict_mut)
                .and_then(|d| d.get_mut("Extensions"))
                .and_then(PdfValue::as_dict_mut)
            {
                ext.insert("ADBE", resolved);
            }
        }
    }

    // ---- enqueue ----

    pub(crate) fn assign_compressed_object_numbers(&mut self, id: ObjectId) {
        if id.generation != 0 || !self.object_stream_to_objects.contains_key(&id.number) {
            // Not an object stream.
            return;
        }
        let members = self.object_stream_to_objects[&id.number].clone();
        for member in members {
            self.obj.entry(member).renumber = self.next_objid;
            self.next_objid += 1;
        }
    }

    pub(crate) fn enqueue(&mut self, value: &PdfValue) {
        if let PdfValue::Reference(r) = value {
            let id = r.id();

            if self.cfg.qdf {
                // Extraneous XRef streams would confuse QDF post-processors,
                // which expect exactly one xref stream at the end of the
                // file.
                if let Some(PdfValue::Stream(s)) = self.doc.get(id) {
                    if s.is_type("XRef") {
                        return;
                    }
                }
            }

            let entry = self.obj.get(id);
            if entry.renumber == 0 {
                if entry.object_stream > 0 {
                    // The object is written inside an object stream; enqueue
                    // the stream instead. The invalid renumber -1 detects
                    // membership loops and is overwritten later.
                    self.obj.entry(id).renumber = -1;
                    let stream_ref =
                        PdfValue::Reference(ObjectId::new(entry.object_stream as u32, 0).into());
                    self.enqueue(&stream_ref);
                } else {
                    self.object_queue.push(id);
                    self.obj.entry(id).renumber = self.next_objid;
                    self.next_objid += 1;

                    if id.generation == 0 && self.object_stream_to_objects.contains_key(&id.number)
                    {
                        // For linearized files compressed objects are
                        // numbered elsewhere.
                        if !self.cfg.linearize {
                            self.assign_compressed_object_numbers(id);
                        }
                    } else if !self.cfg.direct_stream_lengths
                        && matches!(self.doc.get(id), Some(PdfValue::Stream(_)))
                    {
                        // Reserve the next id for the length object.
                        self.next_objid += 1;
                    }
                }
            }
            return;
        }

        if self.cfg.linearize {
            // Everything is already reachable through the part lists.
            return;
        }

        match value {
            PdfValue::Array(a) => {
                for item in a {
                    self.enqueue(item);
                }
            }
            PdfValue::Dictionary(d) => {
                for (_, v) in d {
                    if !v.is_null() {
                        self.enqueue(v);
                    }
                }
            }
            _ => {}
        }
    }

    pub(crate) fn enqueue_objects_standard(&mut self) {
        if self.cfg.preserve_unreferenced {
            for id in self.doc.object_ids() {
                let value = PdfValue::Reference(id.into());
                self.enqueue(&value);
            }
        }

        // Root goes first, then everything else reachable from the trailer.
        let trailer = self.trimmed_trailer();
        if let Some(root) = trailer.get("Root").cloned() {
            self.enqueue(&root);
        }
        for (_, value) in trailer.iter() {
            if !value.is_null() {
                self.enqueue(value);
            }
        }
    }

    pub(crate) fn enqueue_objects_pclm(&mut self) {
        // Image transform stream content for page strip images. One such
        // stream follows every image strip in the PCLm file.
        let image_transform_content = b"q /image Do Q\n".to_vec();

        let pages = self.doc.pages().to_vec();
        for page_id in pages {
            let value = PdfValue::Reference(page_id.into());
            self.enqueue(&value);

            let page = self
                .doc
                .get(page_id)
                .and_then(PdfValue::as_dict)
                .cloned()
                .unwrap_or_default();
            if let Some(contents) = page.get("Contents") {
                let contents = contents.clone();
                self.enqueue(&contents);
            }

            let xobjects: Vec<PdfValue> = page
                .get("Resources")
                .map(|v| self.doc.resolve(v).clone())
                .and_then(|v| v.as_dict().and_then(|d| d.get("XObject").cloned()))
                .map(|v| self.doc.resolve(&v).clone())
                .and_then(|v| v.as_dict().map(|d| d.iter().map(|(_, v)| v.clone()).collect()))
                .unwrap_or_default();
            for image in xobjects {
                if image.is_null() {
                    continue;
                }
                self.enqueue(&image);
                let mut dict = PdfDictionary::new();
                dict.insert(
                    "Length",
                    PdfValue::Integer(image_transform_content.len() as i64),
                );
                let transform_id = self.doc.add_object(PdfValue::Stream(PdfStream::new(
                    dict,
                    image_transform_content.clone(),
                )));
                let transform_ref = PdfValue::Reference(transform_id.into());
                self.enqueue(&transform_ref);
            }
        }

        let root = self.trimmed_trailer().get("Root").cloned();
        if let Some(root) = root {
            self.enqueue(&root);
        }
    }

    pub(crate) fn enqueue_part(&mut self, part: &[ObjectId]) {
        for id in part {
            let value = PdfValue::Reference((*id).into());
            self.enqueue(&value);
        }
    }

    /// The input trailer with the keys that have to be regenerated removed.
    pub(crate) fn trimmed_trailer(&self) -> PdfDictionary {
        let mut trailer = self.doc.trailer.clone();
        // Encryption and id keys
        trailer.remove("ID");
        trailer.remove("Encrypt");
        // Modification information
        trailer.remove("Prev");
        // Keys that potentially come from a cross-reference stream
        trailer.remove("Index");
        trailer.remove("W");
        trailer.remove("Length");
        trailer.remove("Filter");
        trailer.remove("DecodeParms");
        trailer.remove("Type");
        trailer.remove("XRefStm");
        trailer
    }

    // ---- low-level output ----

    pub(crate) fn write_str(&mut self, s: &str) -> WriteResult<()> {
        self.pipeline.write_str(s)
    }

    pub(crate) fn write_bytes(&mut self, data: &[u8]) -> WriteResult<()> {
        self.pipeline.write_bytes(data)
    }

    pub(crate) fn write_int(&mut self, val: i64) -> WriteResult<()> {
        self.pipeline.write_str(&val.to_string())
    }

    pub(crate) fn write_name(&mut self, name: &PdfName) -> WriteResult<()> {
        let normalized = name.normalized();
        self.pipeline.write_str(&normalized)
    }

    pub(crate) fn write_string_bytes(&mut self, data: &[u8], force_binary: bool) -> WriteResult<()> {
        let unparsed = crate::types::unparse_string(data, force_binary);
        self.pipeline.write_str(&unparsed)
    }

    pub(crate) fn qdf(&mut self, s: &str) -> WriteResult<()> {
        if self.cfg.qdf {
            self.pipeline.write_str(s)?;
        }
        Ok(())
    }

    pub(crate) fn no_qdf(&mut self, s: &str) -> WriteResult<()> {
        if !self.cfg.qdf {
            self.pipeline.write_str(s)?;
        }
        Ok(())
    }

    pub(crate) fn open_object(&mut self, objid: i32) -> WriteResult<i32> {
        let objid = if objid == 0 {
            let id = self.next_objid;
            self.next_objid += 1;
            id
        } else {
            objid
        };
        if objid <= 0 {
            return Err(WriteError::internal("attempt to open a non-positive object id"));
        }
        self.new_obj.at(objid).xref = NewXref::Offset(self.pipeline.count());
        self.write_int(objid as i64)?;
        self.write_str(" 0 obj\n")?;
        Ok(objid)
    }

    pub(crate) fn close_object(&mut self, objid: i32) -> WriteResult<()> {
        // A newline before endobj makes the file easier to repair.
        self.write_str("\nendobj\n")?;
        self.qdf("\n")?;
        let offset = match self.new_obj.get(objid).xref {
            NewXref::Offset(o) => o,
            _ => return Err(WriteError::internal("closeObject on an unopened object")),
        };
        self.new_obj.at(objid).length = self.pipeline.count() - offset;
        Ok(())
    }

    pub(crate) fn set_data_key(&mut self, objid: i32) {
        if let Some(enc) = &self.encryption {
            self.cur_data_key = compute_data_key(
                &self.encryption_key,
                objid as u32,
                0,
                self.cfg.encrypt_use_aes,
                enc.v(),
            );
        }
    }

    pub(crate) fn adjust_aes_stream_length(&self, length: &mut u64) {
        if self.encryption.is_some() && !self.cur_data_key.is_empty() && self.cfg.encrypt_use_aes {
            // Padded to the next multiple of 16 and prefixed with a 16-byte
            // initialization vector.
            *length += 32 - (*length & 0xf);
        }
    }

    pub(crate) fn write_encrypted(&mut self, data: &[u8]) -> WriteResult<()> {
        if self.encryption.is_none() || self.cur_data_key.is_empty() {
            return self.write_bytes(data);
        }
        if self.cfg.encrypt_use_aes {
            let iv = self.aes_iv();
            let encrypted = crate::crypto::aes_pdf_encrypt(data, &self.cur_data_key, &iv)
                .map_err(|e| WriteError::data(e.to_string()))?;
            self.write_bytes(&encrypted)
        } else {
            let encrypted = crate::crypto::rc4(data, &self.cur_data_key);
            self.write_bytes(&encrypted)
        }
    }

    pub(crate) fn aes_iv(&self) -> [u8; 16] {
        if self.cfg.static_aes_iv {
            [0u8; 16]
        } else {
            use rand::RngCore;
            let mut iv = [0u8; 16];
            rand::rngs::OsRng.fill_bytes(&mut iv);
            iv
        }
    }

    pub(crate) fn indicate_progress(&mut self, decrement: bool, finished: bool) {
        if decrement {
            self.events_seen -= 1;
            return;
        }
        self.events_seen += 1;

        let Some(progress) = self.progress.as_mut() else {
            return;
        };

        if finished || self.events_seen >= self.next_progress_report {
            let percentage = if finished {
                100
            } else if self.next_progress_report == 0 {
                0
            } else {
                (1 + (100 * self.events_seen) / self.events_expected.max(1)).min(99) as i32
            };
            (progress)(percentage);
        }
        let increment = (self.events_expected / 100).max(1);
        while self.events_seen >= self.next_progress_report {
            self.next_progress_report += increment;
        }
    }

    // ---- headers, objects, trailers ----

    pub(crate) fn write_header(&mut self) -> WriteResult<()> {
        let version = self.final_version.to_string();
        self.write_str("%PDF-")?;
        self.write_str(&version)?;
        if self.cfg.pclm {
            self.write_str("\n%PCLm 1.0\n")?;
        } else {
            // Binary comment line; deliberately not valid UTF-8.
            self.write_bytes(b"\n%\xbf\xf7\xa2\xfe\n")?;
        }
        self.qdf("%QDF-1.0\n\n")?;

        // Extra header text is not written here: linearized files must keep
        // the linearization parameter dictionary within the first 1024
        // bytes, so it goes after that dictionary instead.
        Ok(())
    }

    pub(crate) fn write_object(&mut self, id: ObjectId, object_stream_index: i32) -> WriteResult<()> {
        if object_stream_index == -1
            && id.generation == 0
            && self.object_stream_to_objects.contains_key(&id.number)
        {
            return self.write_object_stream(id);
        }

        self.indicate_progress(false, false);
        let new_id = self.obj.renumber(id);
        if new_id <= 0 {
            return Err(WriteError::internal(format!(
                "object {} written without renumbering",
                id
            )));
        }

        if self.cfg.qdf {
            if let Some(seq) = self.page_object_to_seq.get(&id).copied() {
                self.write_str(&format!("%% Page {}\n", seq))?;
            }
            if let Some(seq) = self.contents_to_page_seq.get(&id).copied() {
                self.write_str(&format!("%% Contents for page {}\n", seq))?;
            }
        }

        let mut value = self.doc.get(id).cloned().unwrap_or(PdfValue::Null);
        if object_stream_index >= 0 && matches!(value, PdfValue::Stream(_)) {
            log::warn!(
                "object {} 0: stream found inside object stream; treating as null",
                id.number
            );
            value = PdfValue::Null;
        }
        let is_stream = matches!(value, PdfValue::Stream(_));

        if object_stream_index == -1 {
            if self.cfg.qdf && !self.cfg.no_original_object_ids {
                self.write_str(&format!(
                    "%% Original object ID: {} {}\n",
                    id.number, id.generation
                ))?;
            }
            self.open_object(new_id)?;
            self.set_data_key(new_id);
            self.unparse_object(&value, 0, 0, 0, false, Some(id))?;
            self.cur_data_key.clear();
            self.close_object(new_id)?;
        } else {
            self.unparse_object(&value, 0, F_IN_OSTREAM, 0, false, Some(id))?;
            self.write_str("\n")?;
        }

        if !self.cfg.direct_stream_lengths && is_stream {
            if self.cfg.qdf && self.added_newline {
                self.write_str("%QDF: ignore_newline\n")?;
            }
            self.open_object(new_id + 1)?;
            let length = self.cur_stream_length;
            self.write_int(length as i64)?;
            self.close_object(new_id + 1)?;
        }
        Ok(())
    }

    pub(crate) fn write_encryption_dictionary(&mut self) -> WriteResult<()> {
        self.encryption_dict_objid = self.open_object(self.encryption_dict_objid)?;
        let enc = self
            .encryption
            .clone()
            .ok_or_else(|| WriteError::internal("writing encryption dictionary without encryption"))?;
        let v = enc.v();

        self.write_str("<<")?;
        if v >= 4 {
            self.write_str(" /CF << /StdCF << /AuthEvent /DocOpen /CFM ")?;
            self.write_str(if self.cfg.encrypt_use_aes {
                if v < 5 {
                    "/AESV2"
                } else {
                    "/AESV3"
                }
            } else {
                "/V2"
            })?;
            // The /Length key is nominally optional, but some viewers
            // refuse encrypted files without it.
            self.write_str(if v < 5 {
                " /Length 16 >> >>"
            } else {
                " /Length 32 >> >>"
            })?;
            if !enc.encrypt_metadata() {
                self.write_str(" /EncryptMetadata false")?;
            }
        }
        self.write_str(" /Filter /Standard /Length ")?;
        self.write_int((enc.length_bytes() * 8) as i64)?;
        self.write_str(" /O ")?;
        self.write_string_bytes(enc.o(), true)?;
        if v >= 4 {
            self.write_str(" /OE ")?;
            self.write_string_bytes(enc.oe(), true)?;
        }
        self.write_str(" /P ")?;
        self.write_int(enc.p() as i64)?;
        if v >= 5 {
            self.write_str(" /Perms ")?;
            self.write_string_bytes(enc.perms(), true)?;
        }
        self.write_str(" /R ")?;
        self.write_int(enc.r() as i64)?;
        if v >= 4 {
            self.write_str(" /StmF /StdCF /StrF /StdCF")?;
        }
        self.write_str(" /U ")?;
        self.write_string_bytes(enc.u(), true)?;
        if v >= 4 {
            self.write_str(" /UE ")?;
            self.write_string_bytes(enc.ue(), true)?;
        }
        self.write_str(" /V ")?;
        self.write_int(v as i64)?;
        self.write_str(" >>")?;
        self.close_object(self.encryption_dict_objid)?;
        Ok(())
    }

    pub(crate) fn write_trailer(
        &mut self,
        which: TrailerKind,
        size: i32,
        xref_stream: bool,
        prev: u64,
        linearization_pass: i32,
    ) -> WriteResult<()> {
        let trailer = self.trimmed_trailer();
        if xref_stream {
            self.cur_data_key.clear();
        } else {
            self.write_str("trailer <<")?;
        }
        self.qdf("\n")?;
        if which == TrailerKind::LinSecond {
            self.write_str(" /Size ")?;
            self.write_int(size as i64)?;
        } else {
            for (key, value) in trailer.iter() {
                if value.is_null() {
                    continue;
                }
                let key = key.clone();
                let value = value.clone();
                self.qdf("  ")?;
                self.no_qdf(" ")?;
                self.write_name(&key)?;
                self.write_str(" ")?;
                if key == "Size" {
                    self.write_int(size as i64)?;
                    if which == TrailerKind::LinFirst {
                        self.write_str(" /Prev ")?;
                        let pos = self.pipeline.count();
                        self.write_int(prev as i64)?;
                        let pad = (pos + 21).saturating_sub(self.pipeline.count());
                        self.pipeline.write_pad(pad as usize, b' ')?;
                    }
                } else {
                    self.unparse_child(&value, 1, 0)?;
                }
                self.qdf("\n")?;
            }
        }

        // /ID
        self.qdf(" ")?;
        self.write_str(" /ID [")?;
        if linearization_pass == 1 {
            // Placeholders must have the same written length as the real
            // ids so pass 2 reproduces identical offsets. The generated id
            // is 16 bytes, or 17 in static-id mode.
            let generated_len = if self.cfg.static_id { 34 } else { 32 };
            let original_id1 = original_id1(self.doc);
            let id1_len = if original_id1.is_empty() {
                generated_len
            } else {
                crate::types::unparse_string(&original_id1, true).len() - 2
            };
            self.write_str("<")?;
            self.pipeline.write_pad(id1_len, b'0')?;
            self.write_str(">")?;
            self.write_str("<")?;
            self.pipeline.write_pad(generated_len, b'0')?;
            self.write_str(">")?;
        } else {
            if linearization_pass == 0 && self.cfg.deterministic_id {
                self.compute_deterministic_id_data()?;
            }
            let encrypted = self.encryption.is_some();
            generate_id(
                self.doc,
                self.cfg,
                encrypted,
                &self.deterministic_id_data,
                &mut self.id1,
                &mut self.id2,
            )?;
            let id1 = self.id1.clone();
            let id2 = self.id2.clone();
            self.write_string_bytes(&id1, true)?;
            self.write_string_bytes(&id2, true)?;
        }
        self.write_str("]")?;

        if which != TrailerKind::LinSecond {
            if self.encryption.is_some() {
                self.write_str(" /Encrypt ")?;
                self.write_int(self.encryption_dict_objid as i64)?;
                self.write_str(" 0 R")?;
            }
        }

        self.qdf("\n>>")?;
        self.no_qdf(" >>")?;
        Ok(())
    }

    pub(crate) fn compute_deterministic_id_data(&mut self) -> WriteResult<()> {
        if !self.id2.is_empty() {
            return Err(WriteError::internal(
                "deterministic ID computation attempted after ID generation",
            ));
        }
        if !self.deterministic_id_data.is_empty() {
            return Err(WriteError::internal(
                "deterministic ID data computed twice",
            ));
        }
        self.deterministic_id_data = self.pipeline.hex_digest()?;
        Ok(())
    }

    // ---- standard path ----

    pub(crate) fn write_standard(&mut self) -> WriteResult<()> {
        let md5_handle = if self.cfg.deterministic_id {
            Some(self.pipeline.activate_md5()?)
        } else {
            None
        };

        self.write_header()?;
        let extra = self.cfg.extra_header_text.clone();
        self.write_str(&extra)?;

        if self.cfg.pclm {
            self.enqueue_objects_pclm();
        } else {
            self.enqueue_objects_standard();
        }

        while self.object_queue_front < self.object_queue.len() {
            let id = self.object_queue[self.object_queue_front];
            self.object_queue_front += 1;
            self.write_object(id, -1)?;
        }

        if self.encryption.is_some() {
            self.write_encryption_dictionary()?;
        }

        let xref_offset = self.pipeline.count();
        if self.object_stream_to_objects.is_empty() {
            self.write_xref_table(TrailerKind::Normal, 0, self.next_objid - 1, self.next_objid)?;
        } else {
            let xref_id = self.next_objid;
            self.next_objid += 1;
            self.write_xref_stream(
                xref_id,
                xref_id,
                xref_offset,
                TrailerKind::Normal,
                0,
                self.next_objid - 1,
                self.next_objid,
                0,
                0,
                0,
                0,
                false,
                0,
            )?;
        }
        self.write_str("startxref\n")?;
        self.write_int(xref_offset as i64)?;
        self.write_str("\n%%EOF\n")?;

        if let Some(handle) = md5_handle {
            self.pipeline.pop(handle)?;
        }
        Ok(())
    }
}

pub(crate) fn original_id1(doc: &Document) -> Vec<u8> {
    doc.trailer
        .get("ID")
        .and_then(PdfValue::as_array)
        .and_then(|a| a.get(0))
        .and_then(PdfValue::as_string)
        .map(|s| s.as_bytes().to_vec())
        .unwrap_or_default()
}

/// Lazily generate the two `/ID` strings, honoring static and deterministic
/// modes. No-op once `id2` is set.
pub(crate) fn generate_id(
    doc: &Document,
    cfg: &WriterConfig,
    encrypted: bool,
    deterministic_id_data: &str,
    id1: &mut Vec<u8>,
    id2: &mut Vec<u8>,
) -> WriteResult<()> {
    if !id2.is_empty() {
        return Ok(());
    }

    let result: Vec<u8> = if cfg.static_id {
        // For test suite use only.
        vec![
            0x31, 0x41, 0x59, 0x26, 0x53, 0x58, 0x97, 0x93, 0x23, 0x84, 0x62, 0x64, 0x33, 0x83,
            0x27, 0x95, 0x00,
        ]
    } else {
        // The only hard requirement on the ID is that it is very likely to
        // be unique. The deterministic variant digests the file content
        // written so far; the default variant digests the time, the output
        // name and the /Info strings. The output name is omitted from the
        // deterministic seed so renaming the output does not change the ID.
        let mut seed = String::new();
        if cfg.deterministic_id {
            if encrypted {
                return Err(WriteError::usage(
                    "unable to generate a deterministic ID because the file to be written is \
                     encrypted (even though the file may not require a password)",
                ));
            }
            if deterministic_id_data.is_empty() {
                return Err(WriteError::internal(
                    "generate_id has no data for deterministic ID",
                ));
            }
            seed += deterministic_id_data;
        } else {
            let now = std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0);
            seed += &now.to_string();
            seed += &cfg.output_name;
            seed += " ";
        }
        seed += " QPDF ";
        if let Some(info) = doc.trailer.get("Info") {
            let info = doc.resolve(info);
            if let Some(dict) = info.as_dict() {
                for (_, value) in dict {
                    if let PdfValue::String(s) = value {
                        seed += " ";
                        seed += &s.to_string_lossy();
                    }
                }
            }
        }
        crate::crypto::md5(seed.as_bytes())
    };

    // If the input had an /ID, keep its first word and generate a new
    // second word (even with a static id).
    *id2 = result;
    *id1 = original_id1(doc);
    if id1.is_empty() {
        *id1 = id2.clone();
    }
    Ok(())
}

fn parse_version_lenient(version: &str) -> (i32, i32) {
    fn leading_int(s: &str) -> i32 {
        let trimmed = s.trim_start();
        let mut end = 0;
        let bytes = trimmed.as_bytes();
        if end < bytes.len() && (bytes[end] == b'-' || bytes[end] == b'+') {
            end += 1;
        }
        while end < bytes.len() && bytes[end].is_ascii_digit() {
            end += 1;
        }
        trimmed[..end].parse().unwrap_or(0)
    }
    let major = leading_int(version);
    let minor = version
        .split_once('.')
        .map(|(_, rest)| leading_int(rest))
        .unwrap_or(0);
    // A version string that does not round-trip is probably invalid; there
    // is no warning channel for this, so it is ignored.
    (major, minor)
}

fn compare_pair(major1: i32, minor1: i32, major2: i32, minor2: i32) -> i32 {
    if major1 < major2 {
        -1
    } else if major1 > major2 {
        1
    } else if minor1 < minor2 {
        -1
    } else if minor1 > minor2 {
        1
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_version_lenient() {
        assert_eq!(parse_version_lenient("1.7"), (1, 7));
        assert_eq!(parse_version_lenient("2.0"), (2, 0));
        assert_eq!(parse_version_lenient("abc"), (0, 0));
        assert_eq!(parse_version_lenient("1.x"), (1, 0));
    }

    #[test]
    fn test_compare_pair() {
        assert_eq!(compare_pair(1, 4, 1, 5), -1);
        assert_eq!(compare_pair(1, 5, 1, 5), 0);
        assert_eq!(compare_pair(2, 0, 1, 7), 1);
    }
}
