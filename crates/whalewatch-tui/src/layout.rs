//! Screen geometry and column widths.
//!
//! A [`Layout`] is derived from the terminal size and the immutable
//! [`BASE_COLUMNS`] table. Nothing here is mutated after construction; a
//! resize simply computes a new layout.
//!
//! ```text
//! row 1        title banner
//! row 3        column header
//! row 4        separator
//! row 5..      data rows (max(1, H - 8) of them)
//! row H - 3    status line
//! row H - 2    connection / status message
//! row H - 1    error line
//! ```
//!
//! Rows above are 1-based as the terminal numbers them; the accessors below
//! return 0-based rows for `crossterm::cursor::MoveTo`.

use crate::format::Align;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Column {
    Time,
    Side,
    Symbol,
    Price,
    Quantity,
    Value,
    Type,
    Category,
    Info,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnSpec {
    pub column: Column,
    pub title: &'static str,
    pub width: u16,
    /// Narrowest width a flexible column may shrink to. `None` means fixed.
    pub min_width: Option<u16>,
    pub align: Align,
}

const fn fixed(column: Column, title: &'static str, width: u16, align: Align) -> ColumnSpec {
    ColumnSpec {
        column,
        title,
        width,
        min_width: None,
        align,
    }
}

const fn flexible(column: Column, title: &'static str, width: u16, min: u16) -> ColumnSpec {
    ColumnSpec {
        column,
        title,
        width,
        min_width: Some(min),
        align: Align::Left,
    }
}

pub const BASE_COLUMNS: [ColumnSpec; 9] = [
    fixed(Column::Time, "TIME", 8, Align::Left),
    fixed(Column::Side, "SIDE", 4, Align::Left),
    fixed(Column::Symbol, "SYMBOL", 8, Align::Left),
    fixed(Column::Price, "PRICE", 12, Align::Right),
    fixed(Column::Quantity, "QUANTITY", 12, Align::Right),
    fixed(Column::Value, "VALUE", 14, Align::Right),
    flexible(Column::Type, "TYPE", 11, 6),
    flexible(Column::Category, "CATEGORY", 11, 6),
    flexible(Column::Info, "INFO", 18, 8),
];

/// Flexible columns, in the order they give up width.
const SHRINK_ORDER: [Column; 3] = [Column::Info, Column::Category, Column::Type];

const COLUMN_GAP: u16 = 1;

/// Non-data rows: title, blank, header, separator, blank, three footer lines.
const CHROME_ROWS: u16 = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    width: u16,
    height: u16,
    columns: Vec<ColumnSpec>,
}

impl Layout {
    pub fn compute(width: u16, height: u16) -> Self {
        Self {
            width,
            height,
            columns: fit_columns(width),
        }
    }

    pub fn width(&self) -> u16 {
        self.width
    }

    pub fn height(&self) -> u16 {
        self.height
    }

    /// Visible columns with their effective widths.
    pub fn columns(&self) -> &[ColumnSpec] {
        &self.columns
    }

    pub fn size(&self) -> (u16, u16) {
        (self.width, self.height)
    }

    /// Number of data rows the screen can hold.
    pub fn capacity(&self) -> usize {
        usize::from(self.height.saturating_sub(CHROME_ROWS).max(1))
    }

    pub fn title_row(&self) -> u16 {
        0
    }

    pub fn header_row(&self) -> u16 {
        2
    }

    pub fn separator_row(&self) -> u16 {
        3
    }

    pub fn first_data_row(&self) -> u16 {
        4
    }

    /// Row `H - 4` (0-based). Terminals shorter than the chrome still keep
    /// the footer below the single data row, even if it runs off screen.
    pub fn status_row(&self) -> u16 {
        let below_data = u16::try_from(self.capacity()).unwrap_or(u16::MAX);
        self.first_data_row().saturating_add(below_data)
    }

    pub fn message_row(&self) -> u16 {
        self.status_row().saturating_add(1)
    }

    pub fn error_row(&self) -> u16 {
        self.status_row().saturating_add(2)
    }

    /// Total width of the visible columns including gaps.
    pub fn table_width(&self) -> u16 {
        total_width(&self.columns)
    }
}

fn total_width(columns: &[ColumnSpec]) -> u16 {
    let widths: u16 = columns.iter().map(|c| c.width).sum();
    let gaps = u16::try_from(columns.len().saturating_sub(1)).unwrap_or(u16::MAX);
    widths.saturating_add(gaps.saturating_mul(COLUMN_GAP))
}

/// Shrinks flexible columns, then drops columns from the right, until the
/// table fits in `width`. At least one column is always kept.
fn fit_columns(width: u16) -> Vec<ColumnSpec> {
    let mut columns = BASE_COLUMNS.to_vec();
    let mut excess = total_width(&columns).saturating_sub(width);

    for target in SHRINK_ORDER {
        if excess == 0 {
            break;
        }
        if let Some(spec) = columns.iter_mut().find(|c| c.column == target)
            && let Some(min) = spec.min_width
        {
            let reduction = excess.min(spec.width.saturating_sub(min));
            spec.width -= reduction;
            excess -= reduction;
        }
    }

    while columns.len() > 1 && total_width(&columns) > width {
        columns.pop();
    }
    columns
}

#[cfg(test)]
mod tests {
    use super::*;

    fn widths(layout: &Layout) -> Vec<u16> {
        layout.columns().iter().map(|c| c.width).collect()
    }

    #[test]
    fn test_wide_terminal_keeps_base_widths() {
        let layout = Layout::compute(120, 30);
        assert_eq!(widths(&layout), [8, 4, 8, 12, 12, 14, 11, 11, 18]);
        assert_eq!(layout.table_width(), 106);
    }

    #[test]
    fn test_shrinks_info_first() {
        let layout = Layout::compute(100, 30);
        assert_eq!(widths(&layout), [8, 4, 8, 12, 12, 14, 11, 11, 12]);
        assert_eq!(layout.table_width(), 100);
    }

    #[test]
    fn test_shrinks_flexible_columns_in_order_to_minimums() {
        // 106 - 10 (info) - 5 (category) - 3 (type) = 88
        let layout = Layout::compute(88, 30);
        assert_eq!(widths(&layout), [8, 4, 8, 12, 12, 14, 8, 6, 8]);

        // All minimums reached at 86; one column short means INFO goes.
        let layout = Layout::compute(85, 30);
        assert_eq!(widths(&layout), [8, 4, 8, 12, 12, 14, 6, 6]);
    }

    #[test]
    fn test_numeric_columns_never_shrink() {
        let layout = Layout::compute(60, 30);
        for spec in layout.columns() {
            if spec.min_width.is_none() {
                let base = BASE_COLUMNS.iter().find(|b| b.column == spec.column).unwrap();
                assert_eq!(spec.width, base.width);
            }
        }
        assert!(layout.table_width() <= 60);
        assert_eq!(layout.columns().last().unwrap().column, Column::Quantity);
    }

    #[test]
    fn test_tiny_terminal_keeps_one_column() {
        let layout = Layout::compute(3, 5);
        assert_eq!(layout.columns().len(), 1);
        assert_eq!(layout.capacity(), 1);
    }

    #[test]
    fn test_row_positions() {
        let layout = Layout::compute(120, 30);
        assert_eq!(layout.capacity(), 22);
        assert_eq!(layout.first_data_row(), 4);
        // 1-based rows 27, 28, 29.
        assert_eq!(layout.status_row(), 26);
        assert_eq!(layout.message_row(), 27);
        assert_eq!(layout.error_row(), 28);
        // Last data row stays above the status line.
        let last_data = layout.first_data_row() + u16::try_from(layout.capacity()).unwrap() - 1;
        assert!(last_data < layout.status_row());
    }

    #[test]
    fn test_short_terminal_keeps_footer_below_data() {
        for height in [1, 5, 8, 9] {
            let layout = Layout::compute(120, height);
            assert_eq!(layout.capacity(), 1);
            assert_eq!(layout.status_row(), 5, "height {height}");
            assert_eq!(layout.error_row(), 7);
        }
    }
}
