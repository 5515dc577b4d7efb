use super::bits::{nbits, BitWriter};
use super::LinData;
use crate::error::{WriteError, WriteResult};
use crate::types::ObjectId;
use crate::writer::{NewObjTable, NewXref, ObjTable};

/// Page offset hint table (13 header fields plus per-page entries).
#[derive(Debug, Clone, Default)]
pub struct HPageOffset {
    pub min_nobjects: i32,
    pub first_page_offset: u64,
    pub nbits_delta_nobjects: u32,
    pub min_page_length: i64,
    pub nbits_delta_page_length: u32,
    pub min_content_offset: i64,
    pub nbits_delta_content_offset: u32,
    pub min_content_length: i64,
    pub nbits_delta_content_length: u32,
    pub nbits_nshared_objects: u32,
    pub nbits_shared_identifier: u32,
    pub nbits_shared_numerator: u32,
    pub shared_denominator: i32,
    pub entries: Vec<HPageOffsetEntry>,
}

#[derive(Debug, Clone, Default)]
pub struct HPageOffsetEntry {
    pub delta_nobjects: i64,
    pub delta_page_length: i64,
    pub nshared_objects: i32,
    pub shared_identifiers: Vec<i32>,
    pub shared_numerators: Vec<i32>,
    pub delta_content_offset: i64,
    pub delta_content_length: i64,
}

/// Shared object hint table (7 header fields plus entries).
#[derive(Debug, Clone, Default)]
pub struct HSharedObject {
    pub first_shared_obj: i32,
    pub first_shared_offset: u64,
    pub nshared_first_page: i32,
    pub nshared_total: i32,
    pub nbits_nobjects: u32,
    pub min_group_length: i64,
    pub nbits_delta_group_length: u32,
    pub entries: Vec<HSharedObjectEntry>,
}

#[derive(Debug, Clone, Default)]
pub struct HSharedObjectEntry {
    pub delta_group_length: i64,
    pub signature_present: i32,
    pub nobjects_minus_one: i32,
}

/// Generic hint table: used for outlines.
#[derive(Debug, Clone, Default)]
pub struct HGeneric {
    pub first_object: u32,
    pub first_object_offset: u64,
    pub nobjects: i32,
    pub group_length: i64,
}

fn xref_offset(entry: NewXref) -> u64 {
    match entry {
        NewXref::Offset(o) => o,
        _ => 0,
    }
}

/// Length in the output of `n` consecutive objects starting with whatever
/// `in_object` from the input was renumbered to.
pub(crate) fn output_length_next_n(
    in_object: u32,
    n: i32,
    new_obj: &NewObjTable,
    obj: &ObjTable,
) -> WriteResult<i64> {
    let first = obj.renumber(ObjectId::new(in_object, 0));
    if first <= 0 {
        return Err(WriteError::data(
            "found object that is not renumbered while writing linearization data",
        ));
    }
    let mut length = 0i64;
    for i in first..first + n {
        let l = new_obj.get(i).length;
        if l == 0 {
            return Err(WriteError::data(
                "found item with unknown length while writing linearization data",
            ));
        }
        length += l as i64;
    }
    Ok(length)
}

pub(crate) fn calculate_h_page_offset(
    lin: &mut LinData,
    pages: &[ObjectId],
    new_obj: &NewObjTable,
    obj: &ObjTable,
) -> WriteResult<()> {
    let npages = pages.len();
    let mut min_nobjects = i32::MAX;
    let mut max_nobjects = 0i32;
    let mut min_length = i64::MAX;
    let mut max_length = 0i64;
    let mut max_shared = 0i32;

    let mut entries: Vec<HPageOffsetEntry> = Vec::with_capacity(npages);
    for (i, page) in pages.iter().enumerate() {
        // Full values are assigned to the delta fields first and adjusted
        // down by the minima afterwards.
        let ce = &lin.c_page_offset[i];
        let nobjects = ce.nobjects;
        let length = output_length_next_n(page.number, nobjects, new_obj, obj)?;
        let nshared = ce.nshared_objects;

        min_nobjects = min_nobjects.min(nobjects);
        max_nobjects = max_nobjects.max(nobjects);
        min_length = min_length.min(length);
        max_length = max_length.max(length);
        max_shared = max_shared.max(nshared);

        entries.push(HPageOffsetEntry {
            delta_nobjects: nobjects as i64,
            delta_page_length: length,
            nshared_objects: nshared,
            ..Default::default()
        });
    }

    let ph = &mut lin.page_offset_hints;
    ph.min_nobjects = min_nobjects;
    let first_page_new = obj.renumber(pages[0]);
    ph.first_page_offset = xref_offset(new_obj.get(first_page_new).xref);
    ph.nbits_delta_nobjects = nbits((max_nobjects - min_nobjects) as i64);
    ph.min_page_length = min_length;
    ph.nbits_delta_page_length = nbits(max_length - min_length);
    ph.nbits_nshared_objects = nbits(max_shared as i64);
    ph.nbits_shared_identifier = nbits(lin.c_shared.nshared_total as i64);
    // Acrobat-compatible constant; the value is not actually used.
    ph.shared_denominator = 4;

    // Content offset and length cannot be computed without interleaving
    // page objects with their content streams; use the page values, with a
    // zero offset, which is what the dominant implementations write.
    ph.nbits_delta_content_length = ph.nbits_delta_page_length;
    ph.min_content_length = ph.min_page_length;

    for (i, entry) in entries.iter_mut().enumerate() {
        if entry.delta_nobjects < min_nobjects as i64 || entry.delta_page_length < min_length {
            return Err(WriteError::data(
                "found too small delta nobjects or delta page length while writing linearization \
                 data",
            ));
        }
        entry.delta_nobjects -= min_nobjects as i64;
        entry.delta_page_length -= min_length;
        entry.delta_content_length = entry.delta_page_length;

        let si = &lin.c_page_offset[i].shared_identifiers;
        entry.shared_identifiers.extend_from_slice(si);
        entry.shared_numerators.extend(std::iter::repeat(0).take(si.len()));
    }
    ph.entries = entries;
    Ok(())
}

pub(crate) fn calculate_h_shared_object(
    lin: &mut LinData,
    new_obj: &NewObjTable,
    obj: &ObjTable,
) -> WriteResult<()> {
    let cso = &lin.c_shared;
    if cso.entries.is_empty() {
        return Err(WriteError::internal(
            "shared object hint table calculated with no entries",
        ));
    }
    let mut entries: Vec<HSharedObjectEntry> = Vec::with_capacity(cso.entries.len());

    let mut min_length = output_length_next_n(cso.entries[0], 1, new_obj, obj)?;
    let mut max_length = min_length;

    for object in &cso.entries {
        let length = output_length_next_n(*object, 1, new_obj, obj)?;
        min_length = min_length.min(length);
        max_length = max_length.max(length);
        entries.push(HSharedObjectEntry {
            delta_group_length: length,
            ..Default::default()
        });
    }
    if entries.len() != cso.nshared_total as usize {
        return Err(WriteError::internal(
            "shared object hint table has wrong number of entries",
        ));
    }

    let so = &mut lin.shared_object_hints;
    so.nshared_total = cso.nshared_total;
    so.nshared_first_page = cso.nshared_first_page;
    if so.nshared_total > so.nshared_first_page {
        so.first_shared_obj = obj.renumber(ObjectId::new(cso.first_shared_obj, 0));
        so.first_shared_offset = xref_offset(new_obj.get(so.first_shared_obj).xref);
    }
    so.min_group_length = min_length;
    so.nbits_delta_group_length = nbits(max_length - min_length);

    for entry in &mut entries {
        if entry.delta_group_length < min_length {
            return Err(WriteError::data(
                "found too small group length while writing linearization data",
            ));
        }
        entry.delta_group_length -= min_length;
    }
    so.entries = entries;
    Ok(())
}

pub(crate) fn calculate_h_outline(
    lin: &mut LinData,
    new_obj: &NewObjTable,
    obj: &ObjTable,
) -> WriteResult<()> {
    let cho = &lin.c_outline;
    if cho.nobjects == 0 {
        return Ok(());
    }
    let first_new = obj.renumber(ObjectId::new(cho.first_object, 0));
    let group_length = output_length_next_n(cho.first_object, cho.nobjects, new_obj, obj)?;
    let ho = &mut lin.outline_hints;
    ho.first_object = first_new.max(0) as u32;
    ho.first_object_offset = xref_offset(new_obj.get(first_new).xref);
    ho.nobjects = cho.nobjects;
    ho.group_length = group_length;
    Ok(())
}

fn write_h_page_offset(w: &mut BitWriter, t: &HPageOffset) {
    w.write_bits_int(t.min_nobjects as i64, 32); // 1
    w.write_bits(t.first_page_offset, 32); // 2
    w.write_bits(t.nbits_delta_nobjects as u64, 16); // 3
    w.write_bits_int(t.min_page_length, 32); // 4
    w.write_bits(t.nbits_delta_page_length as u64, 16); // 5
    w.write_bits_int(t.min_content_offset, 32); // 6
    w.write_bits(t.nbits_delta_content_offset as u64, 16); // 7
    w.write_bits_int(t.min_content_length, 32); // 8
    w.write_bits(t.nbits_delta_content_length as u64, 16); // 9
    w.write_bits(t.nbits_nshared_objects as u64, 16); // 10
    w.write_bits(t.nbits_shared_identifier as u64, 16); // 11
    w.write_bits(t.nbits_shared_numerator as u64, 16); // 12
    w.write_bits_int(t.shared_denominator as i64, 16); // 13

    // Each per-entry column starts on a byte boundary.
    for entry in &t.entries {
        w.write_bits_int(entry.delta_nobjects, t.nbits_delta_nobjects);
    }
    w.flush();
    for entry in &t.entries {
        w.write_bits_int(entry.delta_page_length, t.nbits_delta_page_length);
    }
    w.flush();
    for entry in &t.entries {
        w.write_bits_int(entry.nshared_objects as i64, t.nbits_nshared_objects);
    }
    w.flush();
    for entry in &t.entries {
        for identifier in &entry.shared_identifiers {
            w.write_bits_int(*identifier as i64, t.nbits_shared_identifier);
        }
    }
    w.flush();
    for entry in &t.entries {
        for numerator in &entry.shared_numerators {
            w.write_bits_int(*numerator as i64, t.nbits_shared_numerator);
        }
    }
    w.flush();
    for entry in &t.entries {
        w.write_bits_int(entry.delta_content_offset, t.nbits_delta_content_offset);
    }
    w.flush();
    for entry in &t.entries {
        w.write_bits_int(entry.delta_content_length, t.nbits_delta_content_length);
    }
    w.flush();
}

fn write_h_shared_object(w: &mut BitWriter, t: &HSharedObject) -> WriteResult<()> {
    w.write_bits_int(t.first_shared_obj as i64, 32); // 1
    w.write_bits(t.first_shared_offset, 32); // 2
    w.write_bits_int(t.nshared_first_page as i64, 32); // 3
    w.write_bits_int(t.nshared_total as i64, 32); // 4
    w.write_bits(t.nbits_nobjects as u64, 16); // 5
    w.write_bits_int(t.min_group_length, 32); // 6
    w.write_bits(t.nbits_delta_group_length as u64, 16); // 7

    for entry in &t.entries {
        w.write_bits_int(entry.delta_group_length, t.nbits_delta_group_length);
    }
    w.flush();
    for entry in &t.entries {
        w.write_bits_int(entry.signature_present as i64, 1);
    }
    w.flush();
    for entry in &t.entries {
        // A present signature would require a 128-bit hash nobody supports.
        if entry.signature_present != 0 {
            return Err(WriteError::internal(
                "found unexpected signature present while writing linearization data",
            ));
        }
    }
    for entry in &t.entries {
        w.write_bits_int(entry.nobjects_minus_one as i64, t.nbits_nobjects);
    }
    w.flush();
    Ok(())
}

fn write_h_generic(w: &mut BitWriter, t: &HGeneric) {
    w.write_bits(t.first_object as u64, 32); // 1
    w.write_bits(t.first_object_offset, 32); // 2
    w.write_bits_int(t.nobjects as i64, 32); // 3
    w.write_bits_int(t.group_length, 32); // 4
}

/// Build the hint stream body. Returns `(data, shared_offset,
/// outline_offset)` where the offsets are into the uncompressed data.
pub(crate) fn generate_hint_stream(
    lin: &mut LinData,
    pages: &[ObjectId],
    new_obj: &NewObjTable,
    obj: &ObjTable,
    compressed: bool,
) -> WriteResult<(Vec<u8>, usize, usize)> {
    calculate_h_page_offset(lin, pages, new_obj, obj)?;
    calculate_h_shared_object(lin, new_obj, obj)?;
    calculate_h_outline(lin, new_obj, obj)?;

    let mut w = BitWriter::new();
    write_h_page_offset(&mut w, &lin.page_offset_hints);
    let s = w.position();
    write_h_shared_object(&mut w, &lin.shared_object_hints)?;
    let mut o = 0;
    if lin.outline_hints.nobjects > 0 {
        o = w.position();
        write_h_generic(&mut w, &lin.outline_hints);
    }
    let mut buffer = w.into_bytes();
    if compressed {
        buffer = crate::filters::flate_compress(&buffer);
    }
    Ok((buffer, s, o))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_length_next_n() {
        let mut obj = ObjTable::new();
        obj.entry(ObjectId::new(5, 0)).renumber = 2;
        let mut new_obj = NewObjTable::new();
        new_obj.at(2).length = 10;
        new_obj.at(3).length = 7;
        assert_eq!(output_length_next_n(5, 2, &new_obj, &obj).unwrap(), 17);
        // Unknown length is an error, not a zero.
        new_obj.at(4).length = 0;
        assert!(output_length_next_n(5, 3, &new_obj, &obj).is_err());
    }

    #[test]
    fn test_page_offset_header_is_byte_aligned() {
        // 13 header fields: 5 x 32-bit + 8 x 16-bit = 288 bits = 36 bytes.
        let t = HPageOffset::default();
        let mut w = BitWriter::new();
        write_h_page_offset(&mut w, &t);
        assert_eq!(w.position(), 36);
    }
}
