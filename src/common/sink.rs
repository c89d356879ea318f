//! Token sink producing the extracted text.
//!
//! Every qualifying token (sheet names interleaved with cell values) is
//! joined with a single space. The sink is the one place the keep policy is
//! applied, so the two traversal drivers never decide on their own what ends
//! up in the output.

use crate::common::limits::ExtractOptions;

/// A candidate cell token, tagged with the kind the keep policy filters on.
#[derive(Debug)]
pub enum Token<'a> {
    /// A string cell (literal, shared-string, or inline).
    Text(&'a str),
    /// A rendered numeric cell (plain decimal or date).
    Number(&'a str),
    /// A cached formula result.
    FormulaResult(&'a str),
}

/// Accumulates emitted tokens into the final text.
#[derive(Debug)]
pub struct TextSink {
    buf: String,
    truncated: bool,
    min_string_length: usize,
    include_numbers: bool,
    include_formula_results: bool,
}

impl TextSink {
    pub fn new(options: &ExtractOptions) -> Self {
        Self {
            buf: String::new(),
            truncated: false,
            min_string_length: options.min_string_length,
            include_numbers: options.include_numbers,
            include_formula_results: options.include_formula_results,
        }
    }

    /// Sheet names always pass the keep policy.
    pub fn push_sheet_name(&mut self, name: &str) {
        self.append(name);
    }

    /// Offer a cell token to the keep policy.
    pub fn push_cell(&mut self, token: Token<'_>) {
        match token {
            Token::Text(s) => {
                if s.chars().count() >= self.min_string_length {
                    self.append(s);
                }
            }
            Token::Number(s) => {
                if self.include_numbers {
                    self.append(s);
                }
            }
            Token::FormulaResult(s) => {
                if self.include_formula_results {
                    self.append(s);
                }
            }
        }
    }

    /// Record that a bound cut traversal short. The result stays valid.
    pub fn mark_truncated(&mut self) {
        self.truncated = true;
    }

    pub fn finish(self) -> Extraction {
        Extraction {
            text: self.buf,
            truncated: self.truncated,
        }
    }

    fn append(&mut self, token: &str) {
        if token.is_empty() {
            return;
        }
        if !self.buf.is_empty() {
            self.buf.push(' ');
        }
        self.buf.push_str(token);
    }
}

/// Result of a text-extraction run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    /// Sheet names and qualifying cell values, space-joined, in document
    /// order up to the configured bounds.
    pub text: String,
    /// True when a sheet or cell bound cut traversal short.
    pub truncated: bool,
}

impl Extraction {
    pub fn empty() -> Self {
        Self {
            text: String::new(),
            truncated: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_with_single_spaces() {
        let opts = ExtractOptions::default();
        let mut sink = TextSink::new(&opts);
        sink.push_sheet_name("Sheet1");
        sink.push_cell(Token::Text("Alpha"));
        sink.push_cell(Token::Text(""));
        sink.push_cell(Token::Number("15.0"));
        let out = sink.finish();
        assert_eq!(out.text, "Sheet1 Alpha 15.0");
        assert!(!out.truncated);
    }

    #[test]
    fn min_string_length_filters_short_tokens() {
        let opts = ExtractOptions::new().min_string_length(3);
        let mut sink = TextSink::new(&opts);
        sink.push_cell(Token::Text("ab"));
        sink.push_cell(Token::Text("abc"));
        assert_eq!(sink.finish().text, "abc");
    }

    #[test]
    fn number_and_formula_flags() {
        let opts = ExtractOptions::new()
            .include_numbers(false)
            .include_formula_results(false);
        let mut sink = TextSink::new(&opts);
        sink.push_cell(Token::Number("1.0"));
        sink.push_cell(Token::FormulaResult("total"));
        sink.push_cell(Token::Text("kept"));
        assert_eq!(sink.finish().text, "kept");
    }
}
