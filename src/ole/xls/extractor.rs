//! Single-pass record dispatcher for legacy workbook streams.
//!
//! The workbook globals section (shared strings, styles, sheet directory,
//! codepage, date epoch) precedes the worksheet substreams, so one forward
//! pass sees everything in the order it is needed. Sheet names are emitted
//! as their directory records arrive; cells are gated through the traversal
//! budget and classified as they stream by.

use tracing::debug;

use super::records::*;
use crate::common::datevalue::{StyleTable, is_valid_serial, render_date, render_number};
use crate::common::error::{Error, Result, TableKind};
use crate::common::limits::{ExtractOptions, Flow, TraversalState};
use crate::common::sink::{Extraction, TextSink, Token};

/// Stream names a legacy workbook may live under, in preference order.
/// Very old files use `Book`.
pub const WORKBOOK_STREAM_NAMES: [&str; 2] = ["Workbook", "Book"];

/// What to do with the next String record, which carries the text result of
/// the preceding Formula record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PendingString {
    None,
    /// The preceding formula cell was counted; emit the text.
    Emit,
}

/// Extract bounded text from an in-memory workbook stream.
pub fn extract_workbook_stream(stream: &[u8], options: &ExtractOptions) -> Result<Extraction> {
    let mut records = RecordIter::new(stream).peekable();

    let mut sink = TextSink::new(options);
    let mut state = TraversalState::new();

    let mut biff8 = true;
    let mut codepage: Option<u16> = None;
    let mut date_1904 = false;
    let mut format_ids: Vec<u16> = Vec::new();
    let mut styles = StyleTable::default();
    let mut sst = SharedStringTable::default();

    let mut seen_bof = false;
    let mut in_worksheet = false;
    let mut skipping_sheet = false;
    let mut pending_string = PendingString::None;

    while let Some(record) = records.next() {
        let record = record?;
        match record.sid {
            SID_BOF => {
                let bof = BofRecord::parse(record.data)?;
                if !seen_bof {
                    seen_bof = true;
                    biff8 = bof.version >= 0x0600;
                }
                if bof.is_worksheet() {
                    if !in_worksheet {
                        // Globals are complete once the first sheet starts.
                        styles = StyleTable::new(std::mem::take(&mut format_ids));
                        in_worksheet = true;
                    }
                    pending_string = PendingString::None;
                    match options.admit_sheet(&state) {
                        Flow::Continue => {
                            state.enter_sheet();
                            skipping_sheet = false;
                        }
                        _ => {
                            debug!(
                                sheets = state.sheets_visited,
                                "sheet budget reached, stopping document"
                            );
                            sink.mark_truncated();
                            break;
                        }
                    }
                } else if in_worksheet {
                    // Chart or macro substream: scan past it.
                    skipping_sheet = true;
                }
            }
            SID_CODEPAGE => codepage = Some(parse_codepage(record.data)?),
            SID_DATE_1904 => date_1904 = parse_date_1904(record.data)?,
            SID_XF if !in_worksheet => format_ids.push(parse_xf_format_id(record.data)?),
            SID_BOUND_SHEET => {
                let sheet = BoundSheetRecord::parse(record.data, biff8, codepage)?;
                sink.push_sheet_name(&sheet.name);
            }
            SID_SST => {
                let mut pieces = vec![record.data];
                while let Some(Ok(next)) = records.peek() {
                    if next.sid != SID_CONTINUE {
                        break;
                    }
                    pieces.push(next.data);
                    records.next();
                }
                sst = SharedStringTable::parse(&pieces, biff8, codepage)?;
            }
            SID_STRING => {
                if pending_string == PendingString::Emit {
                    let text = parse_string_record(record.data, biff8, codepage)?;
                    sink.push_cell(Token::FormulaResult(&text));
                }
                pending_string = PendingString::None;
            }
            _ => {
                let Some(cell) = CellRecord::parse(record.sid, record.data, biff8, codepage)?
                else {
                    continue;
                };
                if !in_worksheet || skipping_sheet {
                    continue;
                }
                let cells = match cell {
                    CellRecord::MulRk(cells) => cells
                        .into_iter()
                        .map(|(h, v)| CellRecord::Rk(h, v))
                        .collect(),
                    other => vec![other],
                };
                for cell in cells {
                    match handle_cell(cell, options, &mut state, &mut sink, &styles, &sst, date_1904)? {
                        CellOutcome::Continue(pending) => {
                            if pending != PendingString::None {
                                pending_string = pending;
                            }
                        }
                        CellOutcome::SheetDone => {
                            debug!(
                                sheet = state.sheets_visited,
                                cells = state.cells_in_current_sheet,
                                "per-sheet cell budget reached"
                            );
                            sink.mark_truncated();
                            skipping_sheet = true;
                            break;
                        }
                        CellOutcome::DocumentDone => {
                            debug!(
                                cells = state.cells_total,
                                "document cell budget reached"
                            );
                            sink.mark_truncated();
                            return Ok(sink.finish());
                        }
                    }
                }
            }
        }
    }

    debug!(
        sheets = state.sheets_visited,
        cells = state.cells_total,
        "legacy extraction complete"
    );
    Ok(sink.finish())
}

enum CellOutcome {
    Continue(PendingString),
    SheetDone,
    DocumentDone,
}

/// Admit, count, classify, and emit one cell record.
fn handle_cell(
    cell: CellRecord,
    options: &ExtractOptions,
    state: &mut TraversalState,
    sink: &mut TextSink,
    styles: &StyleTable,
    sst: &SharedStringTable,
    date_1904: bool,
) -> Result<CellOutcome> {
    // Blank cells never participate in the budget; boolean/error cells do
    // only when configured to.
    let participates = match &cell {
        CellRecord::Blank(_) => false,
        CellRecord::BoolErr(_) => options.count_boolean_error_cells,
        CellRecord::Formula(_, FormulaValue::Bool(_) | FormulaValue::Error(_)) => {
            options.count_boolean_error_cells
        }
        CellRecord::Formula(_, FormulaValue::Blank) => false,
        _ => true,
    };
    if !participates {
        return Ok(CellOutcome::Continue(PendingString::None));
    }
    match options.admit_cell(state) {
        Flow::Continue => state.count_cell(),
        Flow::StopSheet => return Ok(CellOutcome::SheetDone),
        Flow::StopDocument => return Ok(CellOutcome::DocumentDone),
    }

    let mut pending = PendingString::None;
    match cell {
        CellRecord::Blank(_) | CellRecord::BoolErr(_) => {}
        CellRecord::Number(header, value) | CellRecord::Rk(header, value) => {
            let rendered = render_numeric(value, header.xf_index, styles, date_1904);
            sink.push_cell(Token::Number(&rendered));
        }
        CellRecord::MulRk(_) => {} // expanded by the caller
        CellRecord::Label(_, text) => sink.push_cell(Token::Text(&text)),
        CellRecord::LabelSst(_, index) => {
            let text = sst.get(index as usize).ok_or(Error::Resolution {
                kind: TableKind::SharedString,
                index: index as usize,
                len: sst.len(),
            })?;
            sink.push_cell(Token::Text(text));
        }
        CellRecord::Formula(header, value) => match value {
            FormulaValue::Number(n) => {
                let rendered = render_numeric(n, header.xf_index, styles, date_1904);
                sink.push_cell(Token::FormulaResult(&rendered));
            }
            FormulaValue::PendingString => pending = PendingString::Emit,
            FormulaValue::Bool(_) | FormulaValue::Error(_) | FormulaValue::Blank => {}
        },
    }
    Ok(CellOutcome::Continue(pending))
}

/// Render a numeric value as a date when its style says so and the serial is
/// plausible; otherwise as a plain decimal. Unknown legacy style ids fall
/// back to plain rendering.
fn render_numeric(value: f64, xf_index: u16, styles: &StyleTable, date_1904: bool) -> String {
    if styles.is_date_or_plain(xf_index as usize) && is_valid_serial(value) {
        if let Some(rendered) = render_date(value, date_1904) {
            return rendered;
        }
    }
    render_number(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(sid: u16, payload: &[u8]) -> Vec<u8> {
        let mut bytes = sid.to_le_bytes().to_vec();
        bytes.extend_from_slice(&(payload.len() as u16).to_le_bytes());
        bytes.extend_from_slice(payload);
        bytes
    }

    fn bof(substream: u16) -> Vec<u8> {
        record(SID_BOF, &[0x00, 0x06, substream as u8, (substream >> 8) as u8])
    }

    fn bound_sheet(name: &str, position: u32) -> Vec<u8> {
        let mut payload = position.to_le_bytes().to_vec();
        payload.push(0);
        payload.push(0);
        payload.push(name.len() as u8);
        payload.push(0);
        payload.extend_from_slice(name.as_bytes());
        record(SID_BOUND_SHEET, &payload)
    }

    fn sst(strings: &[&str]) -> Vec<u8> {
        let mut payload = (strings.len() as u32).to_le_bytes().to_vec();
        payload.extend_from_slice(&(strings.len() as u32).to_le_bytes());
        for s in strings {
            payload.extend_from_slice(&(s.len() as u16).to_le_bytes());
            payload.push(0);
            payload.extend_from_slice(s.as_bytes());
        }
        record(SID_SST, &payload)
    }

    fn label_sst(row: u16, col: u16, index: u32) -> Vec<u8> {
        let mut payload = row.to_le_bytes().to_vec();
        payload.extend_from_slice(&col.to_le_bytes());
        payload.extend_from_slice(&0u16.to_le_bytes());
        payload.extend_from_slice(&index.to_le_bytes());
        record(SID_LABEL_SST, &payload)
    }

    fn number(row: u16, col: u16, xf: u16, value: f64) -> Vec<u8> {
        let mut payload = row.to_le_bytes().to_vec();
        payload.extend_from_slice(&col.to_le_bytes());
        payload.extend_from_slice(&xf.to_le_bytes());
        payload.extend_from_slice(&value.to_le_bytes());
        record(SID_NUMBER, &payload)
    }

    fn xf(format_id: u16) -> Vec<u8> {
        let mut payload = 0u16.to_le_bytes().to_vec();
        payload.extend_from_slice(&format_id.to_le_bytes());
        record(SID_XF, &payload)
    }

    fn workbook(parts: &[Vec<u8>]) -> Vec<u8> {
        parts.concat()
    }

    #[test]
    fn shared_strings_resolve_in_order() {
        let stream = workbook(&[
            bof(0x0005),
            bound_sheet("Sheet1", 0),
            sst(&["Alpha", "Beta", "Gamma"]),
            record(SID_EOF, &[]),
            bof(0x0010),
            label_sst(0, 0, 0),
            label_sst(0, 1, 1),
            label_sst(1, 0, 2),
            record(SID_EOF, &[]),
        ]);
        let out = extract_workbook_stream(&stream, &ExtractOptions::default()).unwrap();
        assert_eq!(out.text, "Sheet1 Alpha Beta Gamma");
        assert!(!out.truncated);
    }

    #[test]
    fn shared_strings_survive_a_continue_split() {
        // "Alpha" breaks across the SST/CONTINUE boundary; the continuation
        // restarts with its own flags byte.
        let mut first = 2u32.to_le_bytes().to_vec();
        first.extend_from_slice(&2u32.to_le_bytes());
        first.extend_from_slice(&5u16.to_le_bytes());
        first.push(0);
        first.extend_from_slice(b"Al");

        let mut second = vec![0u8];
        second.extend_from_slice(b"pha");
        second.extend_from_slice(&4u16.to_le_bytes());
        second.push(0);
        second.extend_from_slice(b"Beta");

        let stream = workbook(&[
            bof(0x0005),
            bound_sheet("Sheet1", 0),
            record(SID_SST, &first),
            record(SID_CONTINUE, &second),
            record(SID_EOF, &[]),
            bof(0x0010),
            label_sst(0, 0, 0),
            label_sst(0, 1, 1),
            record(SID_EOF, &[]),
        ]);
        let out = extract_workbook_stream(&stream, &ExtractOptions::default()).unwrap();
        assert_eq!(out.text, "Sheet1 Alpha Beta");
    }

    #[test]
    fn unresolvable_shared_string_is_an_error() {
        let stream = workbook(&[
            bof(0x0005),
            bound_sheet("Sheet1", 0),
            sst(&["Alpha"]),
            record(SID_EOF, &[]),
            bof(0x0010),
            label_sst(0, 0, 9),
            record(SID_EOF, &[]),
        ]);
        let err = extract_workbook_stream(&stream, &ExtractOptions::default()).unwrap_err();
        assert!(matches!(
            err,
            Error::Resolution {
                kind: TableKind::SharedString,
                index: 9,
                len: 1,
            }
        ));
    }

    #[test]
    fn numbers_render_with_fraction() {
        let stream = workbook(&[
            bof(0x0005),
            bound_sheet("Data", 0),
            xf(0x00),
            record(SID_EOF, &[]),
            bof(0x0010),
            number(0, 0, 0, 15.0),
            record(SID_EOF, &[]),
        ]);
        let out = extract_workbook_stream(&stream, &ExtractOptions::default()).unwrap();
        assert_eq!(out.text, "Data 15.0");
    }

    #[test]
    fn date_styled_numbers_render_as_timestamps() {
        let stream = workbook(&[
            bof(0x0005),
            bound_sheet("Data", 0),
            xf(0x0E), // date format
            record(SID_EOF, &[]),
            bof(0x0010),
            number(0, 0, 0, 42198.0),
            record(SID_EOF, &[]),
        ]);
        let out = extract_workbook_stream(&stream, &ExtractOptions::default()).unwrap();
        assert_eq!(out.text, "Data 2015-07-13 00:00:00.000+0000");
    }

    #[test]
    fn per_sheet_budget_truncates() {
        let mut parts = vec![
            bof(0x0005),
            bound_sheet("S1", 0),
            bound_sheet("S2", 0),
            record(SID_EOF, &[]),
            bof(0x0010),
        ];
        for i in 0..5 {
            parts.push(number(i, 0, 0, i as f64));
        }
        parts.push(record(SID_EOF, &[]));
        parts.push(bof(0x0010));
        parts.push(number(0, 0, 0, 99.0));
        parts.push(record(SID_EOF, &[]));

        let options = ExtractOptions::new().max_cells_per_sheet(2);
        let out = extract_workbook_stream(&workbook(&parts), &options).unwrap();
        // Two cells from the first sheet, then the second sheet's cell.
        assert_eq!(out.text, "S1 S2 0.0 1.0 99.0");
        assert!(out.truncated);
    }

    #[test]
    fn sheet_budget_stops_document() {
        let mut parts = vec![
            bof(0x0005),
            bound_sheet("S1", 0),
            bound_sheet("S2", 0),
            record(SID_EOF, &[]),
        ];
        for v in [1.0f64, 2.0] {
            parts.push(bof(0x0010));
            parts.push(number(0, 0, 0, v));
            parts.push(record(SID_EOF, &[]));
        }
        let options = ExtractOptions::new().max_sheets(1);
        let out = extract_workbook_stream(&workbook(&parts), &options).unwrap();
        // Both names were listed up front, but only one sheet's cells count.
        assert_eq!(out.text, "S1 S2 1.0");
        assert!(out.truncated);
    }

    #[test]
    fn empty_stream_is_empty_text() {
        let out = extract_workbook_stream(&[], &ExtractOptions::default()).unwrap();
        assert_eq!(out.text, "");
        assert!(!out.truncated);
    }
}
