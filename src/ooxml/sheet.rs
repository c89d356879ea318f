//! Worksheet SAX machine (`xl/worksheets/sheetN.xml`).
//!
//! Cells stream by as `<c t="..." s="..."><v>...</v></c>` rows. The machine
//! keeps its state in one explicit frame per cell rather than scattered
//! mutable flags: which region is open, the declared type code, the style
//! index, and the accumulating text. A cell is counted when its value
//! closes, after the budget admits it.

use std::io::BufRead;

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use tracing::debug;

use crate::common::datevalue::{StyleTable, is_valid_serial, render_date, render_number};
use crate::common::error::{Error, Result, TableKind};
use crate::common::limits::{ExtractOptions, Flow, TraversalState};
use crate::common::sink::{TextSink, Token};

/// Lookup context shared by every sheet of one package.
pub struct SheetContext<'a> {
    pub shared_strings: &'a [String],
    pub styles: &'a StyleTable,
    pub date_1904: bool,
}

/// Declared cell type, from the `t` attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CellType {
    Number,
    SharedString,
    InlineString,
    FormulaString,
    Boolean,
    Error,
}

impl CellType {
    fn from_code(code: &[u8]) -> Self {
        match code {
            b"s" => CellType::SharedString,
            b"inlineStr" => CellType::InlineString,
            b"str" => CellType::FormulaString,
            b"b" => CellType::Boolean,
            b"e" => CellType::Error,
            _ => CellType::Number,
        }
    }
}

/// The pending cell.
#[derive(Debug)]
struct CellFrame {
    cell_type: CellType,
    style_index: Option<usize>,
    text: String,
}

impl CellFrame {
    fn new() -> Self {
        Self {
            cell_type: CellType::Number,
            style_index: None,
            text: String::new(),
        }
    }

    fn reset_from(&mut self, tag: &BytesStart<'_>) -> Result<()> {
        self.cell_type = CellType::Number;
        self.style_index = None;
        self.text.clear();
        for attr in tag.attributes() {
            let attr = attr?;
            match attr.key.as_ref() {
                b"t" => self.cell_type = CellType::from_code(attr.value.as_ref()),
                b"s" => {
                    self.style_index = attr.unescape_value()?.parse().ok();
                }
                _ => {}
            }
        }
        Ok(())
    }
}

/// Which element's character data we are inside.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TextRegion {
    None,
    Value,
    InlineText,
    HeaderFooter,
}

/// Drive one worksheet through the budget into the sink. Returns how the
/// sheet ended: completed, cut by its own cell budget, or cut by the
/// document budget.
pub fn parse_worksheet<B: BufRead>(
    reader: &mut Reader<B>,
    context: &SheetContext<'_>,
    options: &ExtractOptions,
    state: &mut TraversalState,
    sink: &mut TextSink,
) -> Result<Flow> {
    let mut buf = Vec::new();
    let mut frame = CellFrame::new();
    let mut region = TextRegion::None;
    let mut in_inline = false;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(ref e) => match e.name().as_ref() {
                b"c" => frame.reset_from(e)?,
                b"v" if region != TextRegion::HeaderFooter => {
                    frame.text.clear();
                    region = TextRegion::Value;
                }
                b"is" => in_inline = true,
                b"t" if in_inline => region = TextRegion::InlineText,
                b"headerFooter" => region = TextRegion::HeaderFooter,
                _ => {}
            },
            Event::Empty(ref e) => {
                if e.name().as_ref() == b"c" {
                    frame.reset_from(e)?;
                }
            }
            Event::Text(e) => match region {
                TextRegion::Value | TextRegion::InlineText => {
                    frame.text.push_str(&e.xml_content()?);
                }
                // Header/footer text is read and dropped.
                TextRegion::HeaderFooter | TextRegion::None => {}
            },
            Event::End(ref e) => match e.name().as_ref() {
                b"v" => {
                    if region == TextRegion::Value {
                        region = TextRegion::None;
                        match emit_cell(&frame, context, options, state, sink)? {
                            Flow::Continue => {}
                            stop => return Ok(stop),
                        }
                    }
                }
                b"t" => {
                    if region == TextRegion::InlineText {
                        region = TextRegion::None;
                    }
                }
                b"is" => in_inline = false,
                b"c" => {
                    if frame.cell_type == CellType::InlineString && !frame.text.is_empty() {
                        match emit_cell(&frame, context, options, state, sink)? {
                            Flow::Continue => {}
                            stop => return Ok(stop),
                        }
                        frame.text.clear();
                    }
                }
                b"headerFooter" => region = TextRegion::None,
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    debug!(cells = state.cells_in_current_sheet, "worksheet complete");
    Ok(Flow::Continue)
}

/// Admit, count, classify, and emit the pending cell.
fn emit_cell(
    frame: &CellFrame,
    context: &SheetContext<'_>,
    options: &ExtractOptions,
    state: &mut TraversalState,
    sink: &mut TextSink,
) -> Result<Flow> {
    let participates = match frame.cell_type {
        CellType::Boolean | CellType::Error => options.count_boolean_error_cells,
        _ => true,
    };
    if !participates {
        return Ok(Flow::Continue);
    }
    match options.admit_cell(state) {
        Flow::Continue => state.count_cell(),
        stop => {
            sink.mark_truncated();
            return Ok(stop);
        }
    }

    match frame.cell_type {
        CellType::SharedString => {
            let index: usize = frame.text.trim().parse().map_err(|_| {
                Error::ContainerFormat(format!(
                    "malformed shared-string reference {:?}",
                    frame.text
                ))
            })?;
            let text = context
                .shared_strings
                .get(index)
                .ok_or(Error::Resolution {
                    kind: TableKind::SharedString,
                    index,
                    len: context.shared_strings.len(),
                })?;
            sink.push_cell(Token::Text(text));
        }
        CellType::InlineString => sink.push_cell(Token::Text(&frame.text)),
        CellType::FormulaString => sink.push_cell(Token::FormulaResult(&frame.text)),
        CellType::Boolean | CellType::Error => {}
        CellType::Number => {
            let rendered = render_numeric(frame, context)?;
            sink.push_cell(Token::Number(&rendered));
        }
    }
    Ok(Flow::Continue)
}

/// Render a typeless cell: date when its style is a date format and the
/// serial is plausible, plain decimal otherwise. A style index outside the
/// loaded table is a resolution fault.
fn render_numeric(frame: &CellFrame, context: &SheetContext<'_>) -> Result<String> {
    let value: f64 = match frame.text.trim().parse() {
        Ok(v) => v,
        // Non-numeric content in an untyped cell passes through verbatim.
        Err(_) => return Ok(frame.text.clone()),
    };
    if let Some(style) = frame.style_index {
        if context.styles.is_date(style)? && is_valid_serial(value) {
            if let Some(rendered) = render_date(value, context.date_1904) {
                return Ok(rendered);
            }
        }
    }
    Ok(render_number(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::sink::Extraction;

    fn run(
        xml: &str,
        shared: &[&str],
        format_ids: Vec<u16>,
        options: &ExtractOptions,
    ) -> Result<(Extraction, Flow)> {
        let shared: Vec<String> = shared.iter().map(|s| s.to_string()).collect();
        let styles = StyleTable::new(format_ids);
        let context = SheetContext {
            shared_strings: &shared,
            styles: &styles,
            date_1904: false,
        };
        let mut state = TraversalState::new();
        state.enter_sheet();
        let mut sink = TextSink::new(options);
        let mut reader = Reader::from_str(xml);
        let flow = parse_worksheet(&mut reader, &context, options, &mut state, &mut sink)?;
        Ok((sink.finish(), flow))
    }

    #[test]
    fn mixed_cell_types() {
        let xml = r#"<worksheet><sheetData><row r="1">
            <c r="A1" t="s"><v>0</v></c>
            <c r="B1"><v>15</v></c>
            <c r="C1" t="inlineStr"><is><t>inline</t></is></c>
            <c r="D1" t="str"><f>CONCAT(A1)</f><v>joined</v></c>
            <c r="E1" t="b"><v>1</v></c>
        </row></sheetData></worksheet>"#;
        let (out, flow) = run(xml, &["Alpha"], vec![0], &ExtractOptions::default()).unwrap();
        assert_eq!(out.text, "Alpha 15.0 inline joined");
        assert_eq!(flow, Flow::Continue);
        assert!(!out.truncated);
    }

    #[test]
    fn date_styled_cell_renders_timestamp() {
        let xml = r#"<worksheet><sheetData><row>
            <c r="A1" s="1"><v>42198</v></c>
            <c r="B1" s="0"><v>42198</v></c>
        </row></sheetData></worksheet>"#;
        let (out, _) = run(xml, &[], vec![0, 0x0E], &ExtractOptions::default()).unwrap();
        assert_eq!(out.text, "2015-07-13 00:00:00.000+0000 42198.0");
    }

    #[test]
    fn out_of_range_shared_string_faults() {
        let xml = r#"<worksheet><sheetData><row>
            <c t="s"><v>5</v></c>
        </row></sheetData></worksheet>"#;
        let err = run(xml, &["only"], vec![], &ExtractOptions::default()).unwrap_err();
        assert!(matches!(
            err,
            Error::Resolution {
                kind: TableKind::SharedString,
                index: 5,
                len: 1,
            }
        ));
    }

    #[test]
    fn out_of_range_style_faults() {
        let xml = r#"<worksheet><sheetData><row>
            <c s="7"><v>1</v></c>
        </row></sheetData></worksheet>"#;
        let err = run(xml, &[], vec![0], &ExtractOptions::default()).unwrap_err();
        assert!(matches!(
            err,
            Error::Resolution {
                kind: TableKind::Style,
                ..
            }
        ));
    }

    #[test]
    fn malformed_shared_string_reference() {
        let xml = r#"<worksheet><sheetData><row>
            <c t="s"><v>abc</v></c>
        </row></sheetData></worksheet>"#;
        let err = run(xml, &["x"], vec![], &ExtractOptions::default()).unwrap_err();
        assert!(matches!(err, Error::ContainerFormat(_)));
    }

    #[test]
    fn per_sheet_budget_returns_stop_sheet() {
        let xml = r#"<worksheet><sheetData><row>
            <c><v>1</v></c><c><v>2</v></c><c><v>3</v></c>
        </row></sheetData></worksheet>"#;
        let options = ExtractOptions::new().max_cells_per_sheet(2);
        let (out, flow) = run(xml, &[], vec![], &options).unwrap();
        assert_eq!(out.text, "1.0 2.0");
        assert_eq!(flow, Flow::StopSheet);
        assert!(out.truncated);
    }

    #[test]
    fn boolean_cells_can_skip_the_budget() {
        let xml = r#"<worksheet><sheetData><row>
            <c t="b"><v>1</v></c><c><v>7</v></c>
        </row></sheetData></worksheet>"#;
        let options = ExtractOptions::new()
            .max_cells_per_sheet(1)
            .count_boolean_error_cells(false);
        let (out, flow) = run(xml, &[], vec![], &options).unwrap();
        assert_eq!(out.text, "7.0");
        assert_eq!(flow, Flow::Continue);
    }

    #[test]
    fn header_footer_text_is_discarded() {
        let xml = r#"<worksheet><sheetData><row>
            <c><v>5</v></c>
        </row></sheetData>
        <headerFooter><oddHeader>CONFIDENTIAL</oddHeader></headerFooter></worksheet>"#;
        let (out, _) = run(xml, &[], vec![], &ExtractOptions::default()).unwrap();
        assert_eq!(out.text, "5.0");
    }
}
