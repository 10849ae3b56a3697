//! Cross-file summary of the `IntDen` / `RawIntDen` columns.
//!
//! Built in two passes: the first finds the longest table, the second builds
//! fixed-length columns where missing rows are `None`. `None` is written as
//! an empty CSV field; `Some(0.0)` is a real measurement.

use crate::data::model::FileTable;

/// One named column of the compiled table.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub header: String,
    pub cells: Vec<Option<f64>>,
}

/// Column-major compiled table. All columns have `row_count` cells.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AggregateTable {
    columns: Vec<Column>,
    headers: Vec<String>,
    row_count: usize,
}

impl AggregateTable {
    #[cfg(test)]
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    #[cfg(test)]
    pub fn column(&self, header: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.header == header)
    }

    /// Rows in order, each with one cell per column.
    pub fn rows(&self) -> impl Iterator<Item = Vec<Option<f64>>> + '_ {
        (0..self.row_count).map(move |r| self.columns.iter().map(|c| c.cells[r]).collect())
    }
}

/// Build the compiled table from per-file tables in processing order.
///
/// Column order: every `IntDen_<name>` first, then every `RawIntDen_<name>`,
/// both following the order of `tables`.
pub fn aggregate(tables: &[FileTable]) -> AggregateTable {
    let row_count = tables.iter().map(FileTable::len).max().unwrap_or(0);

    let pad = |values: Vec<f64>| -> Vec<Option<f64>> {
        let mut cells: Vec<Option<f64>> = values.into_iter().map(Some).collect();
        cells.resize(row_count, None);
        cells
    };

    let int_den = tables.iter().map(|t| Column {
        header: format!("IntDen_{}", t.name),
        cells: pad(t.measurements.iter().map(|m| m.integrated_density).collect()),
    });
    let raw_int_den = tables.iter().map(|t| Column {
        header: format!("RawIntDen_{}", t.name),
        cells: pad(t.measurements.iter().map(|m| m.raw_integrated_density).collect()),
    });

    let columns: Vec<Column> = int_den.chain(raw_int_den).collect();
    let headers = columns.iter().map(|c| c.header.clone()).collect();

    AggregateTable {
        columns,
        headers,
        row_count,
    }
}
