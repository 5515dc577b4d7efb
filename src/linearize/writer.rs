use super::hints::generate_hint_stream;
use super::{CHPageOffsetEntry, ObjUser};
use crate::error::{WriteError, WriteResult};
use crate::types::{ObjectId, PdfValue};
use crate::writer::driver::{Driver, TrailerKind};
use crate::writer::NewXref;
use std::collections::{BTreeMap, BTreeSet};

struct TraversalFrame {
    ou: ObjUser,
    value: PdfValue,
    top: bool,
}

impl Driver<'_, '_, '_> {
    /// Build the object-user maps by traversing from the pages, the
    /// trailer and the root. Idempotent.
    pub(crate) fn optimize(&mut self) -> WriteResult<()> {
        if !self.lin.obj_user_to_objects.is_empty() {
            return Ok(());
        }

        let root_id = self
            .root_id
            .ok_or_else(|| WriteError::data("no document catalog while linearizing"))?;

        // /Outlines must be an indirect reference; repair direct ones (seen
        // in the wild).
        let outlines = self
            .doc
            .get(root_id)
            .and_then(PdfValue::as_dict)
            .and_then(|d| d.get("Outlines"))
            .cloned();
        if let Some(PdfValue::Dictionary(dict)) = outlines {
            let new_id = self.doc.add_object(PdfValue::Dictionary(dict));
            if let Some(root) = self.doc.get_mut(root_id).and_then(PdfValue::as_dict_mut) {
                root.insert("Outlines", PdfValue::Reference(new_id.into()));
            }
        }

        // Pages, with inherited attributes already pushed down by the pages
        // module.
        let pages = self.doc.pages().to_vec();
        for (n, page) in pages.iter().enumerate() {
            let value = PdfValue::Reference((*page).into());
            self.update_object_maps(ObjUser::Page(n), value)?;
        }

        // Document-level items.
        let trailer = self.doc.trailer.clone();
        for (key, value) in trailer.iter() {
            if key == "Root" {
                // handled separately
                continue;
            }
            if !value.is_null() {
                self.update_object_maps(
                    ObjUser::TrailerKey(key.without_slash().to_string()),
                    value.clone(),
                )?;
            }
        }

        let root_dict = self
            .doc
            .get(root_id)
            .and_then(PdfValue::as_dict)
            .cloned()
            .unwrap_or_default();
        for (key, value) in root_dict.iter() {
            // /I keys of /Thread dictionaries are nominally handled
            // separately, but readers tolerate them being lumped in here.
            if !value.is_null() {
                self.update_object_maps(
                    ObjUser::RootKey(key.without_slash().to_string()),
                    value.clone(),
                )?;
            }
        }

        self.lin
            .obj_user_to_objects
            .entry(ObjUser::Root)
            .or_default()
            .insert(root_id);
        self.lin
            .object_to_obj_users
            .entry(root_id)
            .or_default()
            .insert(ObjUser::Root);

        self.filter_compressed_objects();
        Ok(())
    }

    fn update_object_maps(&mut self, first_ou: ObjUser, first_value: PdfValue) -> WriteResult<()> {
        let mut visited: BTreeSet<ObjectId> = BTreeSet::new();
        let mut pending = vec![TraversalFrame {
            ou: first_ou,
            value: first_value,
            top: true,
        }];

        // Traverse from this point, taking care not to cross page
        // boundaries.
        while let Some(cur) = pending.pop() {
            let (content, indirect_id) = match &cur.value {
                PdfValue::Reference(r) => (
                    self.doc.get(r.id()).cloned().unwrap_or(PdfValue::Null),
                    Some(r.id()),
                ),
                other => (other.clone(), None),
            };

            let is_page_node = content
                .as_dict()
                .map(|d| d.is_type("Page"))
                .unwrap_or(false);
            if is_page_node && !cur.top {
                continue;
            }

            if let Some(id) = indirect_id {
                if !visited.insert(id) {
                    // Loop detected.
                    continue;
                }
                self.lin
                    .obj_user_to_objects
                    .entry(cur.ou.clone())
                    .or_default()
                    .insert(id);
                self.lin
                    .object_to_obj_users
                    .entry(id)
                    .or_default()
                    .insert(cur.ou.clone());
            }

            match content {
                PdfValue::Array(array) => {
                    for item in array {
                        pending.push(TraversalFrame {
                            ou: cur.ou.clone(),
                            value: item,
                            top: false,
                        });
                    }
                }
                PdfValue::Dictionary(_) | PdfValue::Stream(_) => {
                    let (dict, ssp) = match content {
                        PdfValue::Stream(s) => {
                            // Parameters that get rewritten on output must
                            // not affect classification.
                            let ssp = match indirect_id {
                                Some(id) => {
                                    if self.will_filter_stream_check(id)? {
                                        2
                                    } else {
                                        1
                                    }
                                }
                                None => 0,
                            };
                            (s.dict, ssp)
                        }
                        PdfValue::Dictionary(d) => (d, 0),
                        _ => unreachable!(),
                    };

                    let pageno = match cur.ou {
                        ObjUser::Page(n) | ObjUser::Thumb(n) => n,
                        _ => 0,
                    };
                    for (key, value) in dict {
                        if value.is_null() {
                            continue;
                        }
                        if is_page_node && key == "Thumb" {
                            // A page has at most one /Thumb; traverse it
                            // under the thumbnail tag.
                            pending.push(TraversalFrame {
                                ou: ObjUser::Thumb(pageno),
                                value,
                                top: false,
                            });
                        } else if is_page_node && key == "Parent" {
                            // Don't traverse back up the page tree.
                        } else if (ssp >= 1 && key == "Length")
                            || (ssp >= 2 && (key == "Filter" || key == "DecodeParms"))
                        {
                            // Skipped stream parameters.
                        } else {
                            pending.push(TraversalFrame {
                                ou: cur.ou.clone(),
                                value,
                                top: false,
                            });
                        }
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Rewrite both maps so users of compressed objects become users of the
    /// containing object stream.
    fn filter_compressed_objects(&mut self) {
        if self.obj.streams_empty {
            return;
        }

        let map_id = |obj: &crate::writer::ObjTable, og: ObjectId| -> ObjectId {
            let stream = obj.get(og).object_stream;
            if stream <= 0 {
                og
            } else {
                ObjectId::new(stream as u32, 0)
            }
        };

        let mut t_user_to_objects: BTreeMap<ObjUser, BTreeSet<ObjectId>> = BTreeMap::new();
        for (ou, ogs) in &self.lin.obj_user_to_objects {
            for og in ogs {
                t_user_to_objects
                    .entry(ou.clone())
                    .or_default()
                    .insert(map_id(&self.obj, *og));
            }
        }

        let mut t_object_to_users: BTreeMap<ObjectId, BTreeSet<ObjUser>> = BTreeMap::new();
        for (og, ous) in &self.lin.object_to_obj_users {
            for ou in ous {
                t_object_to_users
                    .entry(map_id(&self.obj, *og))
                    .or_default()
                    .insert(ou.clone());
            }
        }

        self.lin.obj_user_to_objects = t_user_to_objects;
        self.lin.object_to_obj_users = t_object_to_users;
    }

    fn uncompressed_object(&self, id: ObjectId) -> ObjectId {
        let stream = self.obj.get(id).object_stream;
        if stream > 0 {
            ObjectId::new(stream as u32, 0)
        } else {
            id
        }
    }

    /// Sort every classified object into parts 4, 6, 7, 8 and 9 and compute
    /// the object-count side of the hint tables.
    pub(crate) fn calculate_linearization_data(&mut self) -> WriteResult<()> {
        if self.lin.object_to_obj_users.is_empty() {
            return Err(WriteError::internal(
                "calculate_linearization_data called before optimize",
            ));
        }

        let root_id = self
            .root_id
            .ok_or_else(|| WriteError::data("no document catalog while linearizing"))?;
        let root_dict = self
            .doc
            .get(root_id)
            .and_then(PdfValue::as_dict)
            .cloned()
            .unwrap_or_default();

        let mut outlines_in_first_page = false;
        if let Some(PdfValue::Name(pagemode)) = root_dict.get("PageMode") {
            if pagemode == "UseOutlines" && root_dict.contains_key("Outlines") {
                outlines_in_first_page = true;
            }
        }

        let open_document_keys = [
            "ViewerPreferences",
            "PageMode",
            "Threads",
            "OpenAction",
            "AcroForm",
        ];

        let mut lc_open_document: BTreeSet<ObjectId> = BTreeSet::new();
        let mut lc_first_page_private: BTreeSet<ObjectId> = BTreeSet::new();
        let mut lc_first_page_shared: BTreeSet<ObjectId> = BTreeSet::new();
        let mut lc_other_page_private: BTreeSet<ObjectId> = BTreeSet::new();
        let mut lc_other_page_shared: BTreeSet<ObjectId> = BTreeSet::new();
        let mut lc_thumbnail_private: BTreeSet<ObjectId> = BTreeSet::new();
        let mut lc_thumbnail_shared: BTreeSet<ObjectId> = BTreeSet::new();
        let mut lc_other: BTreeSet<ObjectId> = BTreeSet::new();
        let mut lc_outlines: BTreeSet<ObjectId> = BTreeSet::new();
        let mut lc_root: BTreeSet<ObjectId> = BTreeSet::new();

        for (og, ous) in &self.lin.object_to_obj_users {
            let mut in_open_document = false;
            let mut in_first_page = false;
            let mut other_pages = 0;
            let mut thumbs = 0;
            let mut others = 0;
            let mut in_outlines = false;
            let mut is_root = false;

            for ou in ous {
                match ou {
                    ObjUser::TrailerKey(key) => {
                        if key == "Encrypt" {
                            in_open_document = true;
                        } else {
                            others += 1;
                        }
                    }
                    ObjUser::Thumb(_) => {
                        thumbs += 1;
                    }
                    ObjUser::RootKey(key) => {
                        if open_document_keys.contains(&key.as_str()) {
                            in_open_document = true;
                        } else if key == "Outlines" {
                            in_outlines = true;
                        } else {
                            others += 1;
                        }
                    }
                    ObjUser::Page(0) => {
                        in_first_page = true;
                    }
                    ObjUser::Page(_) => {
                        other_pages += 1;
                    }
                    ObjUser::Root => {
                        is_root = true;
                    }
                }
            }

            if is_root {
                lc_root.insert(*og);
            } else if in_outlines {
                lc_outlines.insert(*og);
            } else if in_open_document {
                lc_open_document.insert(*og);
            } else if in_first_page && others == 0 && other_pages == 0 && thumbs == 0 {
                lc_first_page_private.insert(*og);
            } else if in_first_page {
                lc_first_page_shared.insert(*og);
            } else if other_pages == 1 && others == 0 && thumbs == 0 {
                lc_other_page_private.insert(*og);
            } else if other_pages > 1 {
                lc_other_page_shared.insert(*og);
            } else if thumbs == 1 && others == 0 {
                lc_thumbnail_private.insert(*og);
            } else if thumbs > 1 {
                lc_thumbnail_shared.insert(*og);
            } else {
                lc_other.insert(*og);
            }
        }

        let pages = self.doc.pages().to_vec();
        let uc_pages: Vec<ObjectId> = pages.iter().map(|p| self.uncompressed_object(*p)).collect();
        let npages = pages.len();

        self.lin.part4.clear();
        self.lin.part6.clear();
        self.lin.part7.clear();
        self.lin.part8.clear();
        self.lin.part9.clear();
        self.lin.c_page_offset = vec![CHPageOffsetEntry::default(); npages];
        self.lin.c_shared = Default::default();
        self.lin.c_outline = Default::default();

        // Part 4: the catalog, then the open-document objects in set order.
        if lc_root.len() != 1 {
            return Err(WriteError::data(
                "found other than one root while calculating linearization data",
            ));
        }
        let root_og = lc_root
            .first()
            .copied()
            .ok_or_else(|| WriteError::internal("root set empty after size check"))?;
        self.lin.part4.push(root_og);
        for og in &lc_open_document {
            self.lin.part4.push(*og);
        }

        // Part 6: the first page object itself, then its private objects,
        // then the first-page shared objects.
        if uc_pages.is_empty() {
            return Err(WriteError::data(
                "no pages found while calculating linearization data",
            ));
        }
        let first_page_og = uc_pages[0];
        if !lc_first_page_private.remove(&first_page_og) {
            return Err(WriteError::data("unable to linearize first page"));
        }
        self.lin.first_page_object = uc_pages[0].number;
        self.lin.part6.push(first_page_og);
        for og in &lc_first_page_private {
            self.lin.part6.push(*og);
        }
        for og in &lc_first_page_shared {
            self.lin.part6.push(*og);
        }
        if outlines_in_first_page {
            self.push_outlines_to_part(true, &mut lc_outlines);
        }
        self.lin.c_page_offset[0].nobjects = self.lin.part6.len() as i32;

        // Part 7: per page in page order, the page object then its private
        // objects.
        for (i, page) in uc_pages.iter().enumerate().skip(1) {
            if !lc_other_page_private.remove(page) {
                return Err(WriteError::data(format!("unable to linearize page {}", i)));
            }
            self.lin.part7.push(*page);
            self.lin.c_page_offset[i].nobjects = 1;

            let page_objects = self
                .lin
                .obj_user_to_objects
                .get(&ObjUser::Page(i))
                .cloned()
                .ok_or_else(|| {
                    WriteError::data(
                        "found unreferenced page while calculating linearization data",
                    )
                })?;
            for og in page_objects {
                if lc_other_page_private.remove(&og) {
                    self.lin.part7.push(og);
                    self.lin.c_page_offset[i].nobjects += 1;
                }
            }
        }
        if !lc_other_page_private.is_empty() {
            return Err(WriteError::internal(
                "lc_other_page_private is not empty after generation of part7",
            ));
        }

        // Part 8: remaining shared objects, set order.
        for og in &lc_other_page_shared {
            self.lin.part8.push(*og);
        }

        // Part 9: pages tree nodes, then private thumbnails in page order,
        // then shared thumbnails, then outlines unless placed in part 6,
        // then everything left.
        let pages_ogs = self
            .lin
            .obj_user_to_objects
            .get(&ObjUser::RootKey("Pages".to_string()))
            .cloned()
            .unwrap_or_default();
        if pages_ogs.is_empty() {
            return Err(WriteError::data(
                "found empty pages tree while calculating linearization data",
            ));
        }
        for og in pages_ogs {
            if lc_other.remove(&og) {
                self.lin.part9.push(og);
            }
        }

        for (i, page) in uc_pages.iter().enumerate() {
            let thumb = self
                .doc
                .get(*page)
                .and_then(PdfValue::as_dict)
                .and_then(|d| d.get("Thumb"))
                .and_then(PdfValue::as_reference)
                .map(|r| self.uncompressed_object(r.id()));
            if let Some(thumb_og) = thumb {
                // The thumbnail itself, unless referenced from elsewhere
                // and classified into some other set.
                if lc_thumbnail_private.remove(&thumb_og) {
                    self.lin.part9.push(thumb_og);
                }
            }
            if let Some(ogs) = self.lin.obj_user_to_objects.get(&ObjUser::Thumb(i)).cloned() {
                for og in ogs {
                    if lc_thumbnail_private.remove(&og) {
                        self.lin.part9.push(og);
                    }
                }
            }
        }
        if !lc_thumbnail_private.is_empty() {
            return Err(WriteError::internal(
                "lc_thumbnail_private not empty after placing thumbnails",
            ));
        }

        for og in &lc_thumbnail_shared {
            self.lin.part9.push(*og);
        }
        if !outlines_in_first_page {
            self.push_outlines_to_part(false, &mut lc_outlines);
        }
        for og in &lc_other {
            self.lin.part9.push(*og);
        }

        let num_placed = self.lin.part4.len()
            + self.lin.part6.len()
            + self.lin.part7.len()
            + self.lin.part8.len()
            + self.lin.part9.len();
        let num_wanted = self.lin.object_to_obj_users.len();
        if num_placed != num_wanted {
            // Typically means the catalog ended up inside the pages tree.
            return Err(WriteError::data(format!(
                "wrong number of objects placed while calculating linearization data \
                 (num_placed = {}; number of objects = {})",
                num_placed, num_wanted
            )));
        }

        // Shared object table: all of part 6 in order, then all of part 8.
        let mut obj_to_index: BTreeMap<u32, i32> = BTreeMap::new();
        self.lin.c_shared.nshared_first_page = self.lin.part6.len() as i32;
        self.lin.c_shared.nshared_total =
            self.lin.c_shared.nshared_first_page + self.lin.part8.len() as i32;
        for og in &self.lin.part6 {
            obj_to_index.insert(og.number, self.lin.c_shared.entries.len() as i32);
            self.lin.c_shared.entries.push(og.number);
        }
        if !self.lin.part8.is_empty() {
            self.lin.c_shared.first_shared_obj = self.lin.part8[0].number;
            for og in &self.lin.part8 {
                obj_to_index.insert(og.number, self.lin.c_shared.entries.len() as i32);
                self.lin.c_shared.entries.push(og.number);
            }
        }
        if self.lin.c_shared.nshared_total as usize != self.lin.c_shared.entries.len() {
            return Err(WriteError::internal(
                "shared object hint table has wrong number of entries",
            ));
        }

        // Shared object references for every page after the first.
        for i in 1..npages {
            let page_objects = self
                .lin
                .obj_user_to_objects
                .get(&ObjUser::Page(i))
                .cloned()
                .unwrap_or_default();
            for og in page_objects {
                let shared = self
                    .lin
                    .object_to_obj_users
                    .get(&og)
                    .map(|u| u.len() > 1)
                    .unwrap_or(false);
                if shared {
                    if let Some(idx) = obj_to_index.get(&og.number) {
                        let pe = &mut self.lin.c_page_offset[i];
                        pe.nshared_objects += 1;
                        pe.shared_identifiers.push(*idx);
                    }
                }
            }
        }
        Ok(())
    }

    fn push_outlines_to_part(&mut self, to_part6: bool, lc_outlines: &mut BTreeSet<ObjectId>) {
        let outlines = self
            .root_id
            .and_then(|r| self.doc.get(r))
            .and_then(PdfValue::as_dict)
            .and_then(|d| d.get("Outlines"))
            .and_then(PdfValue::as_reference)
            .map(|r| self.uncompressed_object(r.id()));
        let Some(outlines_og) = outlines else {
            return;
        };
        let part = if to_part6 {
            &mut self.lin.part6
        } else {
            &mut self.lin.part9
        };
        if lc_outlines.remove(&outlines_og) {
            part.push(outlines_og);
            self.lin.c_outline.first_object = outlines_og.number;
            self.lin.c_outline.nobjects = 1;
        }
        for og in lc_outlines.iter() {
            if self.lin.c_outline.first_object == 0 {
                self.lin.c_outline.first_object = og.number;
            }
            part.push(*og);
            self.lin.c_outline.nobjects += 1;
        }
        lc_outlines.clear();
    }

    fn write_hint_stream(&mut self, hint_id: i32) -> WriteResult<()> {
        let compressed = self.cfg.compress_streams;
        let pages = self.doc.pages().to_vec();
        let (hint_buffer, s, o) =
            generate_hint_stream(&mut self.lin, &pages, &self.new_obj, &self.obj, compressed)?;

        self.open_object(hint_id)?;
        self.set_data_key(hint_id);

        let mut hlen = hint_buffer.len() as u64;
        self.write_str("<< ")?;
        if compressed {
            self.write_str("/Filter /FlateDecode ")?;
        }
        self.write_str("/S ")?;
        self.write_int(s as i64)?;
        if o != 0 {
            self.write_str(" /O ")?;
            self.write_int(o as i64)?;
        }
        self.adjust_aes_stream_length(&mut hlen);
        self.write_str(" /Length ")?;
        self.write_int(hlen as i64)?;
        self.write_str(" >>\nstream\n")?;
        self.write_encrypted(&hint_buffer)?;
        self.write_str(
            if hint_buffer.is_empty() || hint_buffer.last() != Some(&b'\n') {
                "\nendstream"
            } else {
                "endstream"
            },
        )?;
        self.close_object(hint_id)?;
        if self.encryption.is_some() {
            self.cur_data_key.clear();
        }
        Ok(())
    }

    /// The two-pass linearized write. Pass 1 goes to a discard (or debug)
    /// sink to learn offsets and the hint stream; pass 2 produces the real
    /// file with every xref stream padded to the pass 1 size.
    pub(crate) fn write_linearized(&mut self) -> WriteResult<()> {
        self.optimize()?;
        self.calculate_linearization_data()?;

        let part4 = self.lin.part4.clone();
        let part6 = self.lin.part6.clone();
        let part7 = self.lin.part7.clone();
        let part8 = self.lin.part8.clone();
        let part9 = self.lin.part9.clone();

        // Object number sequence:
        //
        //  second half
        //    second half uncompressed objects
        //    second half xref stream, if any
        //    second half compressed objects
        //  first half
        //    linearization dictionary
        //    first half xref stream, if any
        //    part 4 uncompressed objects
        //    encryption dictionary, if any
        //    hint stream
        //    part 6 uncompressed objects
        //    first half compressed objects

        let second_half_uncompressed = (part7.len() + part8.len() + part9.len()) as i32;
        let second_half_first_obj = 1;
        let after_second_half = 1 + second_half_uncompressed;
        self.next_objid = after_second_half;
        let need_xref_stream = !self.obj.streams_empty;
        let mut second_half_xref = 0;
        if need_xref_stream {
            second_half_xref = self.next_objid;
            self.next_objid += 1;
        }
        for og in part7.iter().chain(&part8).chain(&part9) {
            self.assign_compressed_object_numbers(*og);
        }
        let second_half_end = self.next_objid - 1;
        let second_trailer_size = self.next_objid;

        let first_half_start = self.next_objid;
        let lindict_id = self.next_objid;
        self.next_objid += 1;
        let mut first_half_xref = 0;
        if need_xref_stream {
            first_half_xref = self.next_objid;
            self.next_objid += 1;
        }
        let part4_first_obj = self.next_objid;
        self.next_objid += part4.len() as i32;
        let after_part4 = self.next_objid;
        if self.encryption.is_some() {
            self.encryption_dict_objid = self.next_objid;
            self.next_objid += 1;
        }
        let hint_id = self.next_objid;
        self.next_objid += 1;
        let part6_first_obj = self.next_objid;
        self.next_objid += part6.len() as i32;
        let after_part6 = self.next_objid;
        for og in part4.iter().chain(&part6) {
            self.assign_compressed_object_numbers(*og);
        }
        let first_half_end = self.next_objid - 1;
        let first_trailer_size = self.next_objid;

        let part4_end_marker = part4.last().map(|o| o.number).unwrap_or(0);
        let part6_end_marker = part6.last().map(|o| o.number).unwrap_or(0);
        let mut space_before_zero = 0u64;
        let mut file_size = 0u64;
        let mut part6_end_offset = 0u64;
        let mut first_half_max_obj_offset = 0u64;
        let mut second_xref_offset = 0u64;
        let mut first_xref_end = 0u64;
        let mut second_xref_end = 0u64;

        self.next_objid = part4_first_obj;
        self.enqueue_part(&part4);
        if self.next_objid != after_part4 {
            // Happens with very botched files: the classification made
            // assumptions the enqueue pass disproved.
            return Err(WriteError::data(
                "error encountered after writing part 4 of linearized data",
            ));
        }
        self.next_objid = part6_first_obj;
        self.enqueue_part(&part6);
        if self.next_objid != after_part6 {
            return Err(WriteError::data(
                "error encountered after writing part 6 of linearized data",
            ));
        }
        self.next_objid = second_half_first_obj;
        self.enqueue_part(&part7);
        self.enqueue_part(&part8);
        self.enqueue_part(&part9);
        if self.next_objid != after_second_half {
            return Err(WriteError::data(
                "error encountered after writing part 9 of linearized data",
            ));
        }

        let mut hint_length = 0u64;
        let mut hint_buffer: Vec<u8> = Vec::new();
        let npages = self.doc.pages().len();

        // Part numbers below follow the PDF 1.4 linearized layout.
        for pass in [1, 2] {
            let mut pass1_handle = None;
            let mut md5_handle = None;
            if pass == 1 {
                // The debug path keeps pass 1 bytes; otherwise discard.
                pass1_handle = Some(if self.cfg.linearize_pass1.is_some() {
                    self.pipeline.activate_buffer()
                } else {
                    self.pipeline.activate(true)
                });
                if self.cfg.deterministic_id {
                    md5_handle = Some(self.pipeline.activate_md5()?);
                }
            }

            // Part 1: header

            self.write_header()?;

            // Part 2: linearization parameter dictionary. The slack after
            // it gives pass 2 room for the real values; 200 characters
            // covers every numeric entry at 20 digits with margin. The
            // whole dictionary must stay within the first 1024 bytes.

            let pos = self.pipeline.count();
            self.open_object(lindict_id)?;
            self.write_str("<<")?;
            if pass == 2 {
                let hint_offset = match self.new_obj.get(hint_id).xref {
                    NewXref::Offset(o) => o,
                    _ => 0,
                };
                let first_page = self.doc.pages().first().copied().ok_or_else(|| {
                    WriteError::data("no pages found while writing linearized data")
                })?;
                self.write_str(" /Linearized 1 /L ")?;
                self.write_int((file_size + hint_length) as i64)?;
                // A space is mandatory after this open bracket.
                self.write_str(" /H [ ")?;
                self.write_int(hint_offset as i64)?;
                self.write_str(" ")?;
                self.write_int(hint_length as i64)?;
                self.write_str(" ] /O ")?;
                self.write_int(self.obj.renumber(first_page) as i64)?;
                self.write_str(" /E ")?;
                self.write_int((part6_end_offset + hint_length) as i64)?;
                self.write_str(" /N ")?;
                self.write_int(npages as i64)?;
                self.write_str(" /T ")?;
                self.write_int((space_before_zero + hint_length) as i64)?;
            }
            self.write_str(" >>")?;
            self.close_object(lindict_id)?;
            const LINDICT_PAD: u64 = 200;
            let pad = (pos + LINDICT_PAD)
                .checked_sub(self.pipeline.count())
                .ok_or_else(|| {
                    WriteError::internal("linearization parameter dictionary overflowed its slack")
                })?;
            self.pipeline.write_pad(pad as usize, b' ')?;
            self.write_str("\n")?;

            // Extra header text belongs after the linearization parameter
            // dictionary.
            let extra = self.cfg.extra_header_text.clone();
            self.write_str(&extra)?;

            // Part 3: first page cross reference table and trailer.

            let first_xref_offset = self.pipeline.count();
            let hint_offset = if pass == 2 {
                match self.new_obj.get(hint_id).xref {
                    NewXref::Offset(o) => o,
                    _ => 0,
                }
            } else {
                0
            };
            if need_xref_stream {
                if pass == 1 {
                    // Large enough to force four byte file offsets, which
                    // holds as long as page 1 ends within the first 4 GB.
                    first_half_max_obj_offset = 1 << 25;
                }
                let pos = self.pipeline.count();
                self.write_xref_stream(
                    first_half_xref,
                    first_half_end,
                    first_half_max_obj_offset,
                    TrailerKind::LinFirst,
                    first_half_start,
                    first_half_end,
                    first_trailer_size,
                    hint_length + second_xref_offset,
                    hint_id,
                    hint_offset,
                    hint_length,
                    pass == 1,
                    pass,
                )?;
                let endpos = self.pipeline.count();
                if pass == 1 {
                    // Room for the compressed form in pass 2.
                    let pad = self.calculate_xref_stream_padding(endpos - pos);
                    self.pipeline.write_pad(pad, b' ')?;
                    first_xref_end = self.pipeline.count();
                } else {
                    // Line the next object up with its pass 1 position.
                    let pad = first_xref_end.checked_sub(endpos).ok_or_else(|| {
                        WriteError::internal(format!(
                            "insufficient padding for first pass xref stream; \
                             first_xref_end={}; endpos={}",
                            first_xref_end, endpos
                        ))
                    })?;
                    self.pipeline.write_pad(pad as usize, b' ')?;
                    if self.pipeline.count() != first_xref_end {
                        return Err(WriteError::internal(
                            "insufficient padding for first pass xref stream",
                        ));
                    }
                }
                self.write_str("\n")?;
            } else {
                self.write_xref_table_full(
                    TrailerKind::LinFirst,
                    first_half_start,
                    first_half_end,
                    first_trailer_size,
                    hint_length + second_xref_offset,
                    pass == 1,
                    hint_id,
                    hint_offset,
                    hint_length,
                    pass,
                )?;
                self.write_str("startxref\n0\n%%EOF\n")?;
            }

            // Parts 4 through 9

            let queue = self.object_queue.clone();
            for cur in &queue {
                if cur.number == part6_end_marker {
                    first_half_max_obj_offset = self.pipeline.count();
                }
                self.write_object(*cur, -1)?;
                if cur.number == part4_end_marker {
                    if self.encryption.is_some() {
                        self.write_encryption_dictionary()?;
                    }
                    if pass == 1 {
                        self.new_obj.at(hint_id).xref = NewXref::Offset(self.pipeline.count());
                    } else {
                        // Part 5: hint stream
                        self.write_bytes(&hint_buffer)?;
                    }
                }
                if cur.number == part6_end_marker {
                    part6_end_offset = self.pipeline.count();
                }
            }

            // Part 10: overflow hint stream -- not used

            // Part 11: main cross reference table and trailer

            second_xref_offset = self.pipeline.count();
            if need_xref_stream {
                let pos = self.pipeline.count();
                space_before_zero = self.write_xref_stream(
                    second_half_xref,
                    second_half_end,
                    second_xref_offset,
                    TrailerKind::LinSecond,
                    0,
                    second_half_end,
                    second_trailer_size,
                    0,
                    0,
                    0,
                    0,
                    pass == 1,
                    pass,
                )?;
                let endpos = self.pipeline.count();

                if pass == 1 {
                    let pad = self.calculate_xref_stream_padding(endpos - pos);
                    self.pipeline.write_pad(pad, b' ')?;
                    self.write_str("\n")?;
                    second_xref_end = self.pipeline.count();
                } else {
                    // Make the file size come out the same as pass 1.
                    let padding = (second_xref_end + hint_length)
                        .checked_sub(self.pipeline.count() + 1)
                        .ok_or_else(|| {
                            WriteError::internal(
                                "count mismatch after xref stream; possible insufficient padding?",
                            )
                        })?;
                    self.pipeline.write_pad(padding as usize, b' ')?;
                    self.write_str("\n")?;
                    if self.pipeline.count() != second_xref_end + hint_length {
                        return Err(WriteError::internal(
                            "count mismatch after xref stream; possible insufficient padding?",
                        ));
                    }
                }
            } else {
                space_before_zero = self.write_xref_table_full(
                    TrailerKind::LinSecond,
                    0,
                    second_half_end,
                    second_trailer_size,
                    0,
                    false,
                    0,
                    0,
                    0,
                    pass,
                )?;
            }
            self.write_str("startxref\n")?;
            self.write_int(first_xref_offset as i64)?;
            self.write_str("\n%%EOF\n")?;

            if pass == 1 {
                if self.cfg.deterministic_id {
                    self.compute_deterministic_id_data()?;
                    if let Some(handle) = md5_handle.take() {
                        self.pipeline.pop(handle)?;
                    }
                }

                // Close the pass 1 sink.
                file_size = self.pipeline.count();
                let handle = pass1_handle
                    .take()
                    .ok_or_else(|| WriteError::internal("pass 1 pipeline handle missing"))?;
                let pass1_bytes = self.pipeline.pop(handle)?;
                if let Some(path) = self.cfg.linearize_pass1.clone() {
                    std::fs::write(&path, &pass1_bytes)?;
                }

                // The hint stream offset is restored after open_object
                // zeroes it while writing to the buffer.
                let hint_offset1 = self.new_obj.get(hint_id).xref;
                let handle = self.pipeline.activate_buffer();
                self.write_hint_stream(hint_id)?;
                hint_buffer = self.pipeline.pop(handle)?;
                hint_length = hint_buffer.len() as u64;
                self.new_obj.at(hint_id).xref = hint_offset1;
            }
        }
        Ok(())
    }
}
