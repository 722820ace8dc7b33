//! Number/text column classification.

use std::collections::HashMap;

use crate::sheet_codec::{parse_number, CellValue, Sheet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnType {
    Number,
    Text,
}

/// Classify a column from its first non-missing value.
///
/// This is first-match-wins, not a majority vote: a single numeric value at the
/// top of an otherwise textual column makes the whole column `Number`.
/// Columns with no values (or unknown names) default to `Text`.
pub fn classify(sheet: &Sheet, column: &str) -> ColumnType {
    let Some(idx) = sheet.column_index(column) else {
        return ColumnType::Text;
    };

    sheet
        .rows
        .iter()
        .map(|row| row.get(idx))
        .find(|cell| !cell.is_missing())
        .map(|cell| match cell {
            CellValue::Number(_) => ColumnType::Number,
            CellValue::Text(s) if parse_number(s).is_some() => ColumnType::Number,
            _ => ColumnType::Text,
        })
        .unwrap_or(ColumnType::Text)
}

/// Per-request memo of column types.
#[derive(Debug, Default)]
pub struct ColumnTypeCache {
    types: HashMap<String, ColumnType>,
}

impl ColumnTypeCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_classify(&mut self, sheet: &Sheet, column: &str) -> ColumnType {
        if let Some(t) = self.types.get(column) {
            return *t;
        }
        let t = classify(sheet, column);
        self.types.insert(column.to_string(), t);
        t
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sheet(values: Vec<CellValue>) -> Sheet {
        Sheet::new(
            "t",
            vec!["col".to_string()],
            values.into_iter().map(|v| vec![v]).collect(),
        )
    }

    #[test]
    fn test_first_non_empty_number_wins() {
        let s = sheet(vec![
            CellValue::Empty,
            CellValue::Number(3.0),
            CellValue::Text("three".into()),
            CellValue::Text("four".into()),
        ]);
        assert_eq!(classify(&s, "col"), ColumnType::Number);
    }

    #[test]
    fn test_first_non_empty_text_wins() {
        let s = sheet(vec![CellValue::Text("x".into()), CellValue::Number(1.0)]);
        assert_eq!(classify(&s, "col"), ColumnType::Text);
    }

    #[test]
    fn test_numeric_text_is_number() {
        let s = sheet(vec![CellValue::Text(String::new()), CellValue::Text("12.5".into())]);
        assert_eq!(classify(&s, "col"), ColumnType::Number);
    }

    #[test]
    fn test_zero_counts_as_a_value() {
        let s = sheet(vec![CellValue::Number(0.0), CellValue::Text("a".into())]);
        assert_eq!(classify(&s, "col"), ColumnType::Number);
    }

    #[test]
    fn test_all_missing_defaults_to_text() {
        let s = sheet(vec![CellValue::Empty, CellValue::Empty]);
        assert_eq!(classify(&s, "col"), ColumnType::Text);
        assert_eq!(classify(&s, "nope"), ColumnType::Text);
    }

    #[test]
    fn test_cache_returns_first_result() {
        let mut s = sheet(vec![CellValue::Number(1.0)]);
        let mut cache = ColumnTypeCache::new();
        assert_eq!(cache.get_or_classify(&s, "col"), ColumnType::Number);

        s.rows[0].cells[0] = CellValue::Text("changed".into());
        assert_eq!(cache.get_or_classify(&s, "col"), ColumnType::Number);
    }
}
