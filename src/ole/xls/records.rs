//! BIFF record parsing.
//!
//! A legacy workbook stream is a flat sequence of records, each a 4-byte
//! header (sid + payload length) followed by the payload. Oversized payloads
//! spill into CONTINUE records. This module provides the record iterator and
//! the typed parses for the record kinds the extractor dispatches on.

use crate::ole::codepage::decode_bytes;
use crate::common::error::{Error, Result};

// Record sids.
pub const SID_BOF: u16 = 0x0809;
pub const SID_EOF: u16 = 0x000A;
pub const SID_BOUND_SHEET: u16 = 0x0085;
pub const SID_SST: u16 = 0x00FC;
pub const SID_CONTINUE: u16 = 0x003C;
pub const SID_CODEPAGE: u16 = 0x0042;
pub const SID_DATE_1904: u16 = 0x0022;
pub const SID_XF: u16 = 0x00E0;
pub const SID_ROW: u16 = 0x0208;
pub const SID_BLANK: u16 = 0x0201;
pub const SID_NUMBER: u16 = 0x0203;
pub const SID_RK: u16 = 0x027E;
pub const SID_MUL_RK: u16 = 0x00BD;
pub const SID_LABEL: u16 = 0x0204;
pub const SID_LABEL_SST: u16 = 0x00FD;
pub const SID_BOOL_ERR: u16 = 0x0205;
pub const SID_FORMULA: u16 = 0x0006;
pub const SID_STRING: u16 = 0x0207;

/// BOF substream type for a worksheet.
pub const BOF_WORKSHEET: u16 = 0x0010;

/// One record: sid plus a borrowed payload.
#[derive(Debug, Clone, Copy)]
pub struct Record<'a> {
    pub sid: u16,
    pub data: &'a [u8],
}

/// Iterator over the records of an in-memory stream. A truncated trailing
/// record ends iteration with an error.
pub struct RecordIter<'a> {
    stream: &'a [u8],
    pos: usize,
}

impl<'a> RecordIter<'a> {
    pub fn new(stream: &'a [u8]) -> Self {
        Self { stream, pos: 0 }
    }
}

impl<'a> Iterator for RecordIter<'a> {
    type Item = Result<Record<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos + 4 > self.stream.len() {
            return None;
        }
        let sid = u16::from_le_bytes([self.stream[self.pos], self.stream[self.pos + 1]]);
        let len = u16::from_le_bytes([self.stream[self.pos + 2], self.stream[self.pos + 3]]) as usize;
        let start = self.pos + 4;
        let end = start + len;
        if end > self.stream.len() {
            self.pos = self.stream.len();
            return Some(Err(Error::ContainerFormat(format!(
                "record 0x{sid:04X} payload runs past end of stream"
            ))));
        }
        self.pos = end;
        Some(Ok(Record {
            sid,
            data: &self.stream[start..end],
        }))
    }
}

fn read_u16(data: &[u8], offset: usize) -> Result<u16> {
    data.get(offset..offset + 2)
        .map(|b| u16::from_le_bytes([b[0], b[1]]))
        .ok_or_else(|| Error::ContainerFormat("truncated record field".to_string()))
}

fn read_u32(data: &[u8], offset: usize) -> Result<u32> {
    data.get(offset..offset + 4)
        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .ok_or_else(|| Error::ContainerFormat("truncated record field".to_string()))
}

fn read_f64(data: &[u8], offset: usize) -> Result<f64> {
    let bytes = data
        .get(offset..offset + 8)
        .ok_or_else(|| Error::ContainerFormat("truncated record field".to_string()))?;
    let mut raw = [0u8; 8];
    raw.copy_from_slice(bytes);
    Ok(f64::from_le_bytes(raw))
}

/// BOF record: format version and substream type.
#[derive(Debug, Clone, Copy)]
pub struct BofRecord {
    pub version: u16,
    pub substream: u16,
}

impl BofRecord {
    pub fn parse(data: &[u8]) -> Result<Self> {
        Ok(Self {
            version: read_u16(data, 0)?,
            substream: read_u16(data, 2)?,
        })
    }

    pub fn is_worksheet(&self) -> bool {
        self.substream == BOF_WORKSHEET
    }
}

/// BoundSheet8: sheet name and the position of its BOF in the stream.
#[derive(Debug, Clone)]
pub struct BoundSheetRecord {
    pub position: u32,
    pub name: String,
}

impl BoundSheetRecord {
    pub fn parse(data: &[u8], biff8: bool, codepage: Option<u16>) -> Result<Self> {
        let position = read_u32(data, 0)?;
        let name_data = data
            .get(6..)
            .ok_or_else(|| Error::ContainerFormat("truncated BoundSheet record".to_string()))?;
        let name = parse_short_string(name_data, biff8, codepage)?;
        Ok(Self { position, name })
    }
}

/// CodePage record payload.
pub fn parse_codepage(data: &[u8]) -> Result<u16> {
    read_u16(data, 0)
}

/// Date1904 record payload: nonzero selects the 1904 epoch.
pub fn parse_date_1904(data: &[u8]) -> Result<bool> {
    Ok(read_u16(data, 0)? != 0)
}

/// XF record: only the number-format id matters here.
pub fn parse_xf_format_id(data: &[u8]) -> Result<u16> {
    read_u16(data, 2)
}

/// Common (row, col, xf) prefix of every cell record.
#[derive(Debug, Clone, Copy)]
pub struct CellHeader {
    pub row: u16,
    pub col: u16,
    pub xf_index: u16,
}

fn parse_cell_header(data: &[u8]) -> Result<CellHeader> {
    Ok(CellHeader {
        row: read_u16(data, 0)?,
        col: read_u16(data, 2)?,
        xf_index: read_u16(data, 4)?,
    })
}

/// Cached result of a formula cell. A string result is carried by the
/// String record that follows the Formula record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FormulaValue {
    Number(f64),
    Bool(bool),
    Error(u8),
    PendingString,
    Blank,
}

/// The typed cell records.
#[derive(Debug, Clone)]
pub enum CellRecord {
    Blank(CellHeader),
    Number(CellHeader, f64),
    Rk(CellHeader, f64),
    /// MulRk packs one row span of RK cells: (header, value) per column.
    MulRk(Vec<(CellHeader, f64)>),
    Label(CellHeader, String),
    LabelSst(CellHeader, u32),
    BoolErr(CellHeader),
    Formula(CellHeader, FormulaValue),
}

impl CellRecord {
    /// Parse one of the cell record sids. Returns `None` for other sids.
    pub fn parse(
        sid: u16,
        data: &[u8],
        biff8: bool,
        codepage: Option<u16>,
    ) -> Result<Option<Self>> {
        let record = match sid {
            SID_BLANK => CellRecord::Blank(parse_cell_header(data)?),
            SID_NUMBER => CellRecord::Number(parse_cell_header(data)?, read_f64(data, 6)?),
            SID_RK => CellRecord::Rk(parse_cell_header(data)?, rk_to_f64(read_u32(data, 6)?)),
            SID_MUL_RK => CellRecord::MulRk(parse_mul_rk(data)?),
            SID_LABEL => {
                let header = parse_cell_header(data)?;
                let text_data = data
                    .get(6..)
                    .ok_or_else(|| Error::ContainerFormat("truncated Label record".to_string()))?;
                let (text, _) = parse_unicode_string(text_data, biff8, codepage)?;
                CellRecord::Label(header, text)
            }
            SID_LABEL_SST => CellRecord::LabelSst(parse_cell_header(data)?, read_u32(data, 6)?),
            SID_BOOL_ERR => CellRecord::BoolErr(parse_cell_header(data)?),
            SID_FORMULA => {
                let header = parse_cell_header(data)?;
                let value = parse_formula_value(data.get(6..14).ok_or_else(|| {
                    Error::ContainerFormat("truncated Formula record".to_string())
                })?);
                CellRecord::Formula(header, value)
            }
            _ => return Ok(None),
        };
        Ok(Some(record))
    }
}

/// MulRk layout: row, first col, then (xf, rk) pairs, then last col.
fn parse_mul_rk(data: &[u8]) -> Result<Vec<(CellHeader, f64)>> {
    if data.len() < 6 {
        return Err(Error::ContainerFormat("truncated MulRk record".to_string()));
    }
    let row = read_u16(data, 0)?;
    let first_col = read_u16(data, 2)?;
    let pairs = (data.len() - 6) / 6;

    let mut cells = Vec::with_capacity(pairs);
    for i in 0..pairs {
        let offset = 4 + i * 6;
        let xf_index = read_u16(data, offset)?;
        let value = rk_to_f64(read_u32(data, offset + 2)?);
        cells.push((
            CellHeader {
                row,
                col: first_col + i as u16,
                xf_index,
            },
            value,
        ));
    }
    Ok(cells)
}

/// Decode an RK compressed number: bit 0 selects integer vs. truncated
/// double, bit 1 divides by 100.
pub fn rk_to_f64(rk: u32) -> f64 {
    let d100 = rk & 0x02 != 0;
    let value = if rk & 0x01 != 0 {
        ((rk as i32) >> 2) as f64
    } else {
        // The high 30 bits of an IEEE double, low 34 bits zero.
        f64::from_bits(((rk & 0xFFFF_FFFC) as u64) << 32)
    };
    if d100 { value / 100.0 } else { value }
}

/// Decode a formula's 8-byte cached value. The special encodings carry
/// 0xFFFF in the top two bytes and a type code in the first.
pub fn parse_formula_value(data: &[u8]) -> FormulaValue {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&data[..8]);
    if raw[6] == 0xFF && raw[7] == 0xFF {
        match raw[0] {
            0x00 => FormulaValue::PendingString,
            0x01 => FormulaValue::Bool(raw[2] != 0),
            0x02 => FormulaValue::Error(raw[2]),
            _ => FormulaValue::Blank,
        }
    } else {
        FormulaValue::Number(f64::from_le_bytes(raw))
    }
}

/// String record carrying a formula's string result.
pub fn parse_string_record(data: &[u8], biff8: bool, codepage: Option<u16>) -> Result<String> {
    let (text, _) = parse_unicode_string(data, biff8, codepage)?;
    Ok(text)
}

/// Short string: 1-byte length, then (in BIFF8) a flags byte and the chars.
pub fn parse_short_string(data: &[u8], biff8: bool, codepage: Option<u16>) -> Result<String> {
    if data.is_empty() {
        return Ok(String::new());
    }
    let cch = data[0] as usize;
    if biff8 {
        let flags = *data
            .get(1)
            .ok_or_else(|| Error::ContainerFormat("truncated short string".to_string()))?;
        decode_biff_chars(&data[2..], cch, flags & 0x01 != 0, codepage).map(|(s, _)| s)
    } else {
        decode_biff_chars(&data[1..], cch, false, codepage).map(|(s, _)| s)
    }
}

/// XLUnicodeRichExtendedString: 2-byte length, flags, optional rich-text and
/// phonetic blocks, then the characters. Returns the text and bytes consumed.
pub fn parse_unicode_string(
    data: &[u8],
    biff8: bool,
    codepage: Option<u16>,
) -> Result<(String, usize)> {
    let cch = read_u16(data, 0)? as usize;
    if !biff8 {
        let (text, used) = decode_biff_chars(&data[2..], cch, false, codepage)?;
        return Ok((text, 2 + used));
    }

    let flags = *data
        .get(2)
        .ok_or_else(|| Error::ContainerFormat("truncated unicode string".to_string()))?;
    let mut offset = 3;

    let mut trailing = 0usize;
    if flags & 0x08 != 0 {
        let runs = read_u16(data, offset)? as usize;
        offset += 2;
        trailing += runs * 4;
    }
    if flags & 0x04 != 0 {
        let ext = read_u32(data, offset)? as usize;
        offset += 4;
        trailing += ext;
    }

    let rest = data
        .get(offset..)
        .ok_or_else(|| Error::ContainerFormat("truncated unicode string".to_string()))?;
    let (text, used) = decode_biff_chars(rest, cch, flags & 0x01 != 0, codepage)?;
    Ok((text, offset + used + trailing))
}

/// Decode `cch` characters, either UTF-16LE or codepage bytes. Returns the
/// text and the bytes consumed.
fn decode_biff_chars(
    data: &[u8],
    cch: usize,
    high_byte: bool,
    codepage: Option<u16>,
) -> Result<(String, usize)> {
    let byte_len = if high_byte { cch * 2 } else { cch };
    let bytes = data.get(..byte_len).ok_or_else(|| {
        Error::ContainerFormat("string payload runs past end of record".to_string())
    })?;
    let text = if high_byte {
        let units: Vec<u16> = bytes
            .chunks_exact(2)
            .map(|c| u16::from_le_bytes([c[0], c[1]]))
            .collect();
        String::from_utf16_lossy(&units)
    } else {
        decode_bytes(bytes, codepage)
    };
    Ok((text, byte_len))
}

/// Cursor over the SST record's payload pieces (the SST record itself plus
/// each following CONTINUE). Fixed fields never straddle a piece boundary;
/// character data may, in which case the next piece restarts with its own
/// option-flags byte.
struct SstCursor<'a> {
    pieces: &'a [&'a [u8]],
    piece: usize,
    pos: usize,
}

fn sst_truncated() -> Error {
    Error::ContainerFormat("shared-string table truncated".to_string())
}

impl<'a> SstCursor<'a> {
    fn new(pieces: &'a [&'a [u8]]) -> Self {
        Self {
            pieces,
            piece: 0,
            pos: 0,
        }
    }

    /// Step over exhausted pieces so the next fixed-field read lands on
    /// data. Character-data reads manage the boundary themselves.
    fn align(&mut self) {
        while self.piece < self.pieces.len() && self.pos >= self.pieces[self.piece].len() {
            self.piece += 1;
            self.pos = 0;
        }
    }

    fn at_end(&mut self) -> bool {
        self.align();
        self.piece >= self.pieces.len()
    }

    /// Take `n` bytes from the current piece. Fixed fields are never split
    /// by the writer, so running out mid-field is corruption.
    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        self.align();
        let piece = self.pieces.get(self.piece).ok_or_else(sst_truncated)?;
        let end = self.pos + n;
        if end > piece.len() {
            return Err(sst_truncated());
        }
        let out = &piece[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn read_u16(&mut self) -> Result<u16> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn read_u32(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Skip `n` bytes (rich-text runs, phonetic blocks), crossing piece
    /// boundaries freely.
    fn skip(&mut self, mut n: usize) -> Result<()> {
        while n > 0 {
            self.align();
            let piece = self.pieces.get(self.piece).ok_or_else(sst_truncated)?;
            let step = n.min(piece.len() - self.pos);
            self.pos += step;
            n -= step;
        }
        Ok(())
    }

    /// Read `cch` characters. When the data continues into the next piece
    /// the continuation carries a fresh flags byte, which may change the
    /// character width mid-string.
    fn read_chars(&mut self, mut cch: usize, mut wide: bool, codepage: Option<u16>) -> Result<String> {
        let mut text = String::new();
        while cch > 0 {
            let width = if wide { 2 } else { 1 };
            let remaining = self.pieces[self.piece].len() - self.pos;
            let avail = (remaining / width).min(cch);
            if avail > 0 {
                let bytes = self.take(avail * width)?;
                if wide {
                    let units: Vec<u16> = bytes
                        .chunks_exact(2)
                        .map(|c| u16::from_le_bytes([c[0], c[1]]))
                        .collect();
                    text.push_str(&String::from_utf16_lossy(&units));
                } else {
                    text.push_str(&decode_bytes(bytes, codepage));
                }
                cch -= avail;
            }
            if cch == 0 {
                break;
            }
            if self.pos < self.pieces[self.piece].len() {
                return Err(Error::ContainerFormat(
                    "shared string split mid-character".to_string(),
                ));
            }
            self.piece += 1;
            self.pos = 0;
            if self.piece >= self.pieces.len() {
                return Err(sst_truncated());
            }
            wide = self.read_u8()? & 0x01 != 0;
        }
        Ok(text)
    }

    /// One XLUnicodeRichExtendedString entry.
    fn read_string(&mut self, biff8: bool, codepage: Option<u16>) -> Result<String> {
        let cch = self.read_u16()? as usize;
        if !biff8 {
            return self.read_chars(cch, false, codepage);
        }
        let flags = self.read_u8()?;
        let mut trailing = 0usize;
        if flags & 0x08 != 0 {
            trailing += self.read_u16()? as usize * 4;
        }
        if flags & 0x04 != 0 {
            trailing += self.read_u32()? as usize;
        }
        let text = self.read_chars(cch, flags & 0x01 != 0, codepage)?;
        self.skip(trailing)?;
        Ok(text)
    }
}

/// Shared string table, built from the SST record plus its CONTINUE spill.
#[derive(Debug, Default)]
pub struct SharedStringTable {
    strings: Vec<String>,
}

impl SharedStringTable {
    /// Parse the SST payload pieces. `cst_unique` bounds the entry loop; a
    /// short table simply yields fewer strings.
    pub fn parse(pieces: &[&[u8]], biff8: bool, codepage: Option<u16>) -> Result<Self> {
        let mut cursor = SstCursor::new(pieces);
        cursor.read_u32()?; // total references, unused
        let cst_unique = cursor.read_u32()? as usize;
        let mut strings = Vec::with_capacity(cst_unique.min(10_000));
        for _ in 0..cst_unique {
            if cursor.at_end() {
                break;
            }
            strings.push(cursor.read_string(biff8, codepage)?);
        }
        Ok(Self { strings })
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.strings.get(index).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }
}
