//! Extraction bounds and the traversal budget.
//!
//! The source system shipped one reader subclass per bound/filter
//! combination; here every variant is an instance of [`ExtractOptions`].
//! Budget decisions are pure functions over the current counters so that the
//! two drivers (record dispatcher and SAX machine) can enforce them in their
//! own style — pre-check or gate-then-count — with the same external
//! contract: no counter ever exceeds its cap.

/// What the traversal should do next.
///
/// Returned from per-event handlers instead of throwing a distinguished
/// "stop parsing" exception: the driver branches on the tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Keep consuming events.
    Continue,
    /// The current sheet's cell budget is spent; move to the next sheet.
    StopSheet,
    /// The document-wide budget is spent; stop consuming events entirely.
    StopDocument,
}

/// Bounds and keep-policy for one extraction run.
#[derive(Debug, Clone)]
pub struct ExtractOptions {
    /// Maximum number of sheets entered.
    pub max_sheets: usize,
    /// Maximum cells counted per sheet.
    pub max_cells_per_sheet: usize,
    /// Maximum cells counted across the whole document.
    pub max_cells_total: usize,
    /// String tokens shorter than this (in chars) are counted but not
    /// emitted.
    pub min_string_length: usize,
    /// Emit numeric cell values (plain or date-rendered).
    pub include_numbers: bool,
    /// Emit cached formula results.
    pub include_formula_results: bool,
    /// Whether boolean/error cells consume cell budget. The source variants
    /// disagreed on this, so it is a knob rather than a fixed rule.
    pub count_boolean_error_cells: bool,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            max_sheets: 5,
            max_cells_per_sheet: 1000,
            max_cells_total: 5000,
            min_string_length: 0,
            include_numbers: true,
            include_formula_results: true,
            count_boolean_error_cells: true,
        }
    }
}

impl ExtractOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_sheets(mut self, n: usize) -> Self {
        self.max_sheets = n;
        self
    }

    pub fn max_cells_per_sheet(mut self, n: usize) -> Self {
        self.max_cells_per_sheet = n;
        self
    }

    pub fn max_cells_total(mut self, n: usize) -> Self {
        self.max_cells_total = n;
        self
    }

    pub fn min_string_length(mut self, n: usize) -> Self {
        self.min_string_length = n;
        self
    }

    pub fn include_numbers(mut self, keep: bool) -> Self {
        self.include_numbers = keep;
        self
    }

    pub fn include_formula_results(mut self, keep: bool) -> Self {
        self.include_formula_results = keep;
        self
    }

    pub fn count_boolean_error_cells(mut self, count: bool) -> Self {
        self.count_boolean_error_cells = count;
        self
    }

    /// Decide whether one more cell may be counted at the current counters.
    pub fn admit_cell(&self, state: &TraversalState) -> Flow {
        if state.cells_total >= self.max_cells_total {
            Flow::StopDocument
        } else if state.cells_in_current_sheet >= self.max_cells_per_sheet {
            Flow::StopSheet
        } else {
            Flow::Continue
        }
    }

    /// Decide whether another sheet may be entered. Checked *before*
    /// [`TraversalState::enter_sheet`] so `sheets_visited` never exceeds the
    /// cap.
    pub fn admit_sheet(&self, state: &TraversalState) -> Flow {
        if state.sheets_visited >= self.max_sheets {
            Flow::StopDocument
        } else {
            Flow::Continue
        }
    }
}

/// Per-run traversal counters. Owned exclusively by the active extraction,
/// reset per document, mutated only as cells and sheet boundaries are
/// observed.
#[derive(Debug, Clone, Copy, Default)]
pub struct TraversalState {
    pub sheets_visited: usize,
    pub cells_in_current_sheet: usize,
    pub cells_total: usize,
}

impl TraversalState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a sheet boundary: bump the sheet count and reset the per-sheet
    /// cell counter.
    pub fn enter_sheet(&mut self) {
        self.sheets_visited += 1;
        self.cells_in_current_sheet = 0;
    }

    /// Record one counted cell. Callers must have gotten `Flow::Continue`
    /// from [`ExtractOptions::admit_cell`] first.
    pub fn count_cell(&mut self) {
        self.cells_in_current_sheet += 1;
        self.cells_total += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn admit_cell_boundaries() {
        let opts = ExtractOptions::new()
            .max_cells_per_sheet(2)
            .max_cells_total(3);
        let mut state = TraversalState::new();
        state.enter_sheet();

        assert_eq!(opts.admit_cell(&state), Flow::Continue);
        state.count_cell();
        assert_eq!(opts.admit_cell(&state), Flow::Continue);
        state.count_cell();
        // Per-sheet cap reached before the total cap.
        assert_eq!(opts.admit_cell(&state), Flow::StopSheet);

        state.enter_sheet();
        assert_eq!(opts.admit_cell(&state), Flow::Continue);
        state.count_cell();
        assert_eq!(opts.admit_cell(&state), Flow::StopDocument);
    }

    #[test]
    fn admit_sheet_boundary() {
        let opts = ExtractOptions::new().max_sheets(1);
        let mut state = TraversalState::new();
        assert_eq!(opts.admit_sheet(&state), Flow::Continue);
        state.enter_sheet();
        assert_eq!(opts.admit_sheet(&state), Flow::StopDocument);
    }

    proptest! {
        /// Driving the budget to exhaustion never lets a counter cross its
        /// cap, for any cap configuration and any sheet/cell mix.
        #[test]
        fn counters_never_exceed_caps(
            max_sheets in 1usize..8,
            max_per_sheet in 1usize..50,
            max_total in 1usize..200,
            sheet_sizes in prop::collection::vec(0usize..80, 1..10),
        ) {
            let opts = ExtractOptions::new()
                .max_sheets(max_sheets)
                .max_cells_per_sheet(max_per_sheet)
                .max_cells_total(max_total);
            let mut state = TraversalState::new();

            'sheets: for cells in sheet_sizes {
                if opts.admit_sheet(&state) == Flow::StopDocument {
                    break;
                }
                state.enter_sheet();
                for _ in 0..cells {
                    match opts.admit_cell(&state) {
                        Flow::Continue => state.count_cell(),
                        Flow::StopSheet => continue 'sheets,
                        Flow::StopDocument => break 'sheets,
                    }
                    prop_assert!(state.cells_in_current_sheet <= max_per_sheet);
                    prop_assert!(state.cells_total <= max_total);
                }
            }
            prop_assert!(state.sheets_visited <= max_sheets);
            prop_assert!(state.cells_total <= max_total);
        }
    }
}
