//! Per-cell question rendered from a row's populated fields.

use crate::sheet_codec::Row;

/// Render the question for `missing_column`, conditioned on every populated
/// field of `row` in column order.
pub fn build_prompt(columns: &[String], row: &Row, missing_column: &str) -> String {
    let conditions = columns
        .iter()
        .zip(row.cells.iter())
        .filter(|(_, value)| !value.is_missing())
        .map(|(key, value)| format!("{} = {}", key, value))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "If {}, then tell me what will be the value for {}?. Tell me the real-world value.",
        conditions, missing_column
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sheet_codec::CellValue;

    fn columns(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_prompt_uses_populated_fields_in_order() {
        let row = Row::new(vec![
            CellValue::Text("Paris".into()),
            CellValue::Empty,
            CellValue::Number(2.0),
            CellValue::Number(0.0),
        ]);
        let prompt = build_prompt(&columns(&["city", "population", "rank", "debt"]), &row, "population");
        assert_eq!(
            prompt,
            "If city = Paris, rank = 2, debt = 0, then tell me what will be the value for population?. Tell me the real-world value."
        );
    }

    #[test]
    fn test_prompt_with_no_populated_fields() {
        let row = Row::new(vec![CellValue::Empty, CellValue::Text(String::new())]);
        let prompt = build_prompt(&columns(&["a", "b"]), &row, "a");
        assert_eq!(
            prompt,
            "If , then tell me what will be the value for a?. Tell me the real-world value."
        );
    }

    #[test]
    fn test_prompt_renders_fractional_numbers() {
        let row = Row::new(vec![CellValue::Number(1.75), CellValue::Empty]);
        let prompt = build_prompt(&columns(&["height", "weight"]), &row, "weight");
        assert!(prompt.starts_with("If height = 1.75, then"));
    }
}
