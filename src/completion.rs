//! Sheet completion pipeline: fills missing cells one model call at a time.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info};

use crate::classifier::{ColumnType, ColumnTypeCache};
use crate::extract::{ColumnPatterns, NumericFallback, ValueExtractor};
use crate::inference::{InferenceBackend, InferenceError};
use crate::prompt::build_prompt;
use crate::sheet_codec::{CellValue, Sheet};

/// Ordered log of raw model answers, one line per filled cell.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompletionTranscript {
    lines: Vec<String>,
}

impl CompletionTranscript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `Row <row_number> - <column>: <raw_text>`. `row_number` is 1-based.
    pub fn record(&mut self, row_number: usize, column: &str, raw_text: &str) {
        self.lines
            .push(format!("Row {} - {}: {}", row_number, column, raw_text));
    }

    #[cfg(test)]
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }
}

impl fmt::Display for CompletionTranscript {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.lines.join("\n"))
    }
}

/// One missing cell to fill.
#[derive(Debug, Clone)]
struct MissingCellTask<'a> {
    row: usize,
    col: usize,
    column: &'a str,
    column_type: ColumnType,
}

/// Completion pipeline orchestrator.
pub struct SheetCompleter {
    backend: Arc<dyn InferenceBackend>,
    extractor: Arc<ValueExtractor>,
    fallback: NumericFallback,
}

impl SheetCompleter {
    pub fn new(
        backend: Arc<dyn InferenceBackend>,
        extractor: Arc<ValueExtractor>,
        fallback: NumericFallback,
    ) -> Self {
        Self {
            backend,
            extractor,
            fallback,
        }
    }

    /// Fill every missing cell of `sheet`, row-major in column order.
    ///
    /// Prompts and column types read the sheet as decoded, so a filled cell
    /// never feeds a later prompt. The first backend failure aborts the run.
    pub async fn complete(
        &self,
        sheet: &Sheet,
        instruction: Option<&str>,
    ) -> Result<(Sheet, CompletionTranscript), InferenceError> {
        let missing: usize = sheet
            .rows
            .iter()
            .map(|r| r.cells.iter().filter(|c| c.is_missing()).count())
            .sum();
        info!(
            "Starting completion for sheet '{}' ({} rows, {} columns, {} missing cells, backend={}, strategy={:?})",
            sheet.name,
            sheet.rows.len(),
            sheet.columns.len(),
            missing,
            self.backend.name(),
            self.extractor.strategy()
        );

        let mut completed = sheet.clone();
        let mut transcript = CompletionTranscript::new();
        let mut types = ColumnTypeCache::new();
        let mut patterns = ColumnPatterns::new();

        for (r, row) in sheet.rows.iter().enumerate() {
            for (c, column) in sheet.columns.iter().enumerate() {
                if !row.get(c).is_missing() {
                    continue;
                }

                let task = MissingCellTask {
                    row: r,
                    col: c,
                    column,
                    column_type: types.get_or_classify(sheet, column),
                };
                let (value, raw) = self.fill(sheet, &task, instruction, &mut patterns).await?;

                completed.rows[task.row].cells[task.col] = value;
                transcript.record(task.row + 1, task.column, &raw);
            }
        }

        info!(
            "Completion finished for sheet '{}': {} cells filled",
            sheet.name,
            transcript.len()
        );
        Ok((completed, transcript))
    }

    async fn fill(
        &self,
        sheet: &Sheet,
        task: &MissingCellTask<'_>,
        instruction: Option<&str>,
        patterns: &mut ColumnPatterns,
    ) -> Result<(CellValue, String), InferenceError> {
        let prompt = build_prompt(&sheet.columns, &sheet.rows[task.row], task.column);
        debug!("Row {} - {} ({:?}): {}", task.row + 1, task.column, task.column_type, prompt);

        let raw = self.backend.infer_with_instruction(&prompt, instruction).await?;

        let value = self
            .extractor
            .extract_with(&raw, task.column, task.column_type, patterns)
            .map(|v| v.into_cell(task.column_type, self.fallback))
            .unwrap_or(CellValue::Empty);
        debug!("Row {} - {} filled with {:?}", task.row + 1, task.column, value);

        Ok((value, raw))
    }
}
