//! Summary-information property set ([MS-OLEPS]).
//!
//! The `\x05SummaryInformation` stream carries document properties as a
//! single section of (id, offset) pairs followed by typed values. Only the
//! fixed field set this crate surfaces is read; everything else is skipped.

use std::collections::HashMap;

use chrono::{DateTime, Duration, TimeZone, Utc};

use super::codepage::decode_bytes;
use super::consts::*;
use crate::common::error::{Error, Result};
use crate::common::metadata::DocumentMetadata;

/// Stream name of the standard property set.
pub const SUMMARY_INFORMATION: &str = "\u{0005}SummaryInformation";

/// A decoded property value. Types the metadata mapping does not use decode
/// to `Skipped`.
#[derive(Debug, Clone)]
enum PropertyValue {
    Text(String),
    Filetime(u64),
    Skipped,
}

/// Parse a summary-information stream into document metadata.
pub fn parse_summary_information(data: &[u8]) -> Result<DocumentMetadata> {
    let properties = parse_property_section(data)?;
    let mut meta = DocumentMetadata::default();

    let take_text = |pid: u32, slot: &mut Option<String>| {
        if let Some(PropertyValue::Text(s)) = properties.get(&pid) {
            DocumentMetadata::set_text(slot, s.clone());
        }
    };
    take_text(PID_TITLE, &mut meta.title);
    take_text(PID_SUBJECT, &mut meta.subject);
    take_text(PID_AUTHOR, &mut meta.creator);
    take_text(PID_COMMENTS, &mut meta.description);
    take_text(PID_LAST_AUTHOR, &mut meta.contributor);

    if let Some(PropertyValue::Filetime(ticks)) = properties.get(&PID_CREATE_DTM) {
        meta.created = Some(filetime_to_datetime(*ticks, "created")?);
    }
    if let Some(PropertyValue::Filetime(ticks)) = properties.get(&PID_LAST_SAVE_DTM) {
        meta.modified = Some(filetime_to_datetime(*ticks, "modified")?);
    }

    Ok(meta)
}

/// Parse the first property section of the stream. The 48-byte preamble is
/// the property-set header (28 bytes) plus one format-id/offset pair.
fn parse_property_section(data: &[u8]) -> Result<HashMap<u32, PropertyValue>> {
    if data.len() < 48 {
        return Err(Error::ContainerFormat(
            "property stream too short for a section".to_string(),
        ));
    }

    let section = read_u32(data, 44) as usize;
    if section + 8 > data.len() {
        return Err(Error::ContainerFormat(
            "property section offset past end of stream".to_string(),
        ));
    }

    // Cap how many entries a hostile count can demand.
    let num_props = read_u32(data, section + 4).min(1000);

    // The codepage property governs byte-string decoding, so resolve it
    // before any string value.
    let mut codepage: Option<u16> = None;
    let mut entries = Vec::with_capacity(num_props as usize);
    for i in 0..num_props as usize {
        let entry = section + 8 + i * 8;
        if entry + 8 > data.len() {
            break;
        }
        let prop_id = read_u32(data, entry);
        let value_offset = section + read_u32(data, entry + 4) as usize;
        if value_offset + 4 > data.len() {
            continue;
        }
        let prop_type = u16::from_le_bytes([data[value_offset], data[value_offset + 1]]);
        if prop_id == PID_CODEPAGE && prop_type == VT_I2 && value_offset + 6 <= data.len() {
            codepage = Some(u16::from_le_bytes([
                data[value_offset + 4],
                data[value_offset + 5],
            ]));
        }
        entries.push((prop_id, value_offset + 4, prop_type));
    }

    let mut properties = HashMap::new();
    for (prop_id, offset, prop_type) in entries {
        if let Some(value) = parse_property_value(data, offset, prop_type, codepage) {
            properties.insert(prop_id, value);
        }
    }
    Ok(properties)
}

/// Decode one typed value at `offset`. Truncated values yield `None` rather
/// than failing the whole stream.
fn parse_property_value(
    data: &[u8],
    offset: usize,
    prop_type: u16,
    codepage: Option<u16>,
) -> Option<PropertyValue> {
    match prop_type {
        VT_LPSTR => {
            let len = read_u32(data, offset) as usize;
            let bytes = data.get(offset + 4..offset + 4 + len)?;
            let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
            Some(PropertyValue::Text(decode_bytes(&bytes[..end], codepage)))
        }
        VT_LPWSTR => {
            let chars = read_u32(data, offset) as usize;
            let bytes = data.get(offset + 4..offset + 4 + chars * 2)?;
            let units: Vec<u16> = bytes
                .chunks_exact(2)
                .map(|c| u16::from_le_bytes([c[0], c[1]]))
                .take_while(|&u| u != 0)
                .collect();
            Some(PropertyValue::Text(String::from_utf16_lossy(&units)))
        }
        VT_FILETIME => {
            let bytes = data.get(offset..offset + 8)?;
            let mut raw = [0u8; 8];
            raw.copy_from_slice(bytes);
            Some(PropertyValue::Filetime(u64::from_le_bytes(raw)))
        }
        _ => Some(PropertyValue::Skipped),
    }
}

fn read_u32(data: &[u8], offset: usize) -> u32 {
    match data.get(offset..offset + 4) {
        Some(b) => u32::from_le_bytes([b[0], b[1], b[2], b[3]]),
        None => 0,
    }
}

/// Convert a FILETIME (100ns ticks since 1601-01-01) to a UTC datetime.
fn filetime_to_datetime(ticks: u64, field: &'static str) -> Result<DateTime<Utc>> {
    let out_of_range = || Error::MetadataFormat {
        field,
        value: ticks.to_string(),
    };
    let base = Utc
        .with_ymd_and_hms(1601, 1, 1, 0, 0, 0)
        .single()
        .ok_or_else(out_of_range)?;
    let micros = i64::try_from(ticks / 10).map_err(|_| out_of_range())?;
    base.checked_add_signed(Duration::microseconds(micros))
        .ok_or_else(out_of_range)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a minimal one-section property stream from (id, type, payload).
    fn build_stream(props: &[(u32, u16, Vec<u8>)]) -> Vec<u8> {
        let section_start = 48usize;
        let mut stream = vec![0u8; section_start];
        stream[44..48].copy_from_slice(&(section_start as u32).to_le_bytes());

        let table_len = 8 + props.len() * 8;
        let mut values = Vec::new();
        let mut table = Vec::new();
        table.extend_from_slice(&0u32.to_le_bytes()); // section size, unused
        table.extend_from_slice(&(props.len() as u32).to_le_bytes());
        for (id, ty, payload) in props {
            let value_offset = table_len + values.len();
            table.extend_from_slice(&id.to_le_bytes());
            table.extend_from_slice(&(value_offset as u32).to_le_bytes());
            values.extend_from_slice(&(*ty as u32).to_le_bytes());
            values.extend_from_slice(payload);
        }
        stream.extend_from_slice(&table);
        stream.extend_from_slice(&values);
        stream
    }

    fn lpstr(s: &str) -> Vec<u8> {
        let mut payload = ((s.len() + 1) as u32).to_le_bytes().to_vec();
        payload.extend_from_slice(s.as_bytes());
        payload.push(0);
        payload
    }

    #[test]
    fn extracts_standard_fields() {
        let stream = build_stream(&[
            (PID_TITLE, VT_LPSTR, lpstr("Report")),
            (PID_AUTHOR, VT_LPSTR, lpstr("Jane")),
            (PID_LAST_AUTHOR, VT_LPSTR, lpstr("Joe")),
        ]);
        let meta = parse_summary_information(&stream).unwrap();
        assert_eq!(meta.title.as_deref(), Some("Report"));
        assert_eq!(meta.creator.as_deref(), Some("Jane"));
        assert_eq!(meta.contributor.as_deref(), Some("Joe"));
        assert!(meta.created.is_none());
    }

    #[test]
    fn converts_filetimes() {
        // 2020-01-01T00:00:00Z in 100ns ticks since 1601-01-01.
        let ticks: u64 = 132_223_104_000_000_000;
        let stream = build_stream(&[(PID_CREATE_DTM, VT_FILETIME, ticks.to_le_bytes().to_vec())]);
        let meta = parse_summary_information(&stream).unwrap();
        let created = meta.created.unwrap();
        assert_eq!(created, Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn short_stream_is_a_container_fault() {
        let err = parse_summary_information(&[0u8; 10]).unwrap_err();
        assert!(matches!(err, Error::ContainerFormat(_)));
    }

    #[test]
    fn empty_strings_are_omitted() {
        let stream = build_stream(&[(PID_TITLE, VT_LPSTR, lpstr(""))]);
        let meta = parse_summary_information(&stream).unwrap();
        assert!(meta.title.is_none());
        assert!(!meta.has_data());
    }
}
