//! Unwind plans: CFI-style tables mapping code ranges to rules for
//! recovering the prior frame's registers.

mod location;
mod row;

pub use location::RegisterLocation;
pub use row::UnwindRow;

use crate::registers::RegisterKind;

/// An ordered sequence of [`UnwindRow`]s covering one function, plus the
/// numbering scheme its register ids are expressed in and a source tag for
/// diagnostics.
///
/// Rows are kept in non-decreasing `offset` order; a stack-walker applies
/// the last row whose offset is ≤ the query offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnwindPlan {
    register_kind: RegisterKind,
    rows: Vec<UnwindRow>,
    source_name: String,
    valid_at_all_instruction_locations: bool,
}

impl UnwindPlan {
    #[must_use]
    pub fn new(register_kind: RegisterKind) -> Self {
        Self {
            register_kind,
            rows: Vec::new(),
            source_name: String::new(),
            valid_at_all_instruction_locations: false,
        }
    }

    #[must_use]
    pub const fn register_kind(&self) -> RegisterKind {
        self.register_kind
    }

    /// Append a row. Rows must arrive in non-decreasing offset order.
    pub fn append_row(&mut self, row: UnwindRow) {
        debug_assert!(
            self.rows.last().is_none_or(|last| last.offset() <= row.offset()),
            "unwind rows must be appended in non-decreasing offset order"
        );
        self.rows.push(row);
    }

    #[must_use]
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn last_row(&self) -> Option<&UnwindRow> {
        self.rows.last()
    }

    #[must_use]
    pub fn row_at_index(&self, idx: usize) -> Option<&UnwindRow> {
        self.rows.get(idx)
    }

    /// The row in effect at `offset` bytes into the function: the last row
    /// whose own offset is ≤ the query.
    #[must_use]
    pub fn row_for_offset(&self, offset: u64) -> Option<&UnwindRow> {
        self.rows.iter().rev().find(|row| row.offset() <= offset)
    }

    pub fn rows(&self) -> impl Iterator<Item = &UnwindRow> {
        self.rows.iter()
    }

    #[must_use]
    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    pub fn set_source_name(&mut self, name: impl Into<String>) {
        self.source_name = name.into();
    }

    /// True only for plans derived by instruction emulation; coarse
    /// fallback plans are trustworthy at call sites only.
    #[must_use]
    pub const fn is_valid_at_all_instruction_locations(&self) -> bool {
        self.valid_at_all_instruction_locations
    }

    pub const fn set_valid_at_all_instruction_locations(&mut self, valid: bool) {
        self.valid_at_all_instruction_locations = valid;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row_at(offset: u64) -> UnwindRow {
        let mut row = UnwindRow::new(13, 0);
        row.set_offset(offset);
        row
    }

    #[test]
    fn test_row_for_offset_picks_last_applicable() {
        let mut plan = UnwindPlan::new(RegisterKind::Dwarf);
        plan.append_row(row_at(0));
        plan.append_row(row_at(4));
        plan.append_row(row_at(12));

        assert_eq!(plan.row_for_offset(0).unwrap().offset(), 0);
        assert_eq!(plan.row_for_offset(3).unwrap().offset(), 0);
        assert_eq!(plan.row_for_offset(4).unwrap().offset(), 4);
        assert_eq!(plan.row_for_offset(11).unwrap().offset(), 4);
        assert_eq!(plan.row_for_offset(100).unwrap().offset(), 12);
    }

    #[test]
    fn test_empty_plan_has_no_rows() {
        let plan = UnwindPlan::new(RegisterKind::Dwarf);
        assert_eq!(plan.row_count(), 0);
        assert!(plan.row_for_offset(0).is_none());
        assert!(!plan.is_valid_at_all_instruction_locations());
    }

    #[test]
    fn test_equal_offsets_allowed() {
        let mut plan = UnwindPlan::new(RegisterKind::Dwarf);
        plan.append_row(row_at(0));
        plan.append_row(row_at(0));
        assert_eq!(plan.row_count(), 2);
    }
}
