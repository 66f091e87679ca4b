//! Column-wise training data.
//!
//! The growers scan one feature at a time, in feature-value order, so the
//! matrix is stored as sorted CSC: one `Vec<ColEntry>` per feature, sorted
//! ascending by value (ties by row). Missing values are simply absent from a
//! column, which is what drives the default-direction machinery — a column's
//! density is the fraction of rows that carry a value for it.

use thiserror::Error;

/// One observed value in a column.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColEntry {
    /// Row the value belongs to.
    pub index: u32,
    /// Observed feature value.
    pub fvalue: f32,
}

impl ColEntry {
    #[inline]
    pub fn new(index: u32, fvalue: f32) -> Self {
        Self { index, fvalue }
    }
}

#[derive(Debug, Clone, Error)]
pub enum DataError {
    #[error("expected {expected} values for {num_row} rows x {num_col} cols, got {got}")]
    ShapeMismatch {
        expected: usize,
        got: usize,
        num_row: usize,
        num_col: usize,
    },
    #[error("column {col} references row {row}, but the matrix has {num_row} rows")]
    RowOutOfRange { col: usize, row: u32, num_row: usize },
    #[error("root_index has {got} entries for {num_row} rows")]
    RootIndexLength { got: usize, num_row: usize },
}

/// Sorted column-major matrix with an optional multi-root assignment.
#[derive(Debug, Clone)]
pub struct ColMatrix {
    num_row: usize,
    columns: Vec<Vec<ColEntry>>,
    rowset: Vec<u32>,
    root_index: Vec<u32>,
}

impl ColMatrix {
    /// Build from row-major dense values; NaN entries are treated as missing.
    pub fn from_dense(values: &[f32], num_row: usize, num_col: usize) -> Result<Self, DataError> {
        let expected = num_row * num_col;
        if values.len() != expected {
            return Err(DataError::ShapeMismatch {
                expected,
                got: values.len(),
                num_row,
                num_col,
            });
        }

        let mut columns = vec![Vec::new(); num_col];
        for row in 0..num_row {
            for (col, column) in columns.iter_mut().enumerate() {
                let v = values[row * num_col + col];
                if !v.is_nan() {
                    column.push(ColEntry::new(row as u32, v));
                }
            }
        }
        Ok(Self::from_sorted(num_row, columns))
    }

    /// Build from explicit per-column entry lists. Columns are re-sorted;
    /// workers in a column-partitioned setup pass empty lists for the
    /// features they do not own.
    pub fn from_columns(num_row: usize, columns: Vec<Vec<ColEntry>>) -> Result<Self, DataError> {
        for (col, column) in columns.iter().enumerate() {
            for entry in column {
                if entry.index as usize >= num_row {
                    return Err(DataError::RowOutOfRange {
                        col,
                        row: entry.index,
                        num_row,
                    });
                }
            }
        }
        Ok(Self::from_sorted(num_row, columns))
    }

    fn from_sorted(num_row: usize, mut columns: Vec<Vec<ColEntry>>) -> Self {
        for column in &mut columns {
            column.sort_unstable_by(|a, b| {
                a.fvalue
                    .total_cmp(&b.fvalue)
                    .then_with(|| a.index.cmp(&b.index))
            });
        }
        Self {
            num_row,
            columns,
            rowset: (0..num_row as u32).collect(),
            root_index: Vec::new(),
        }
    }

    /// Assign every row to a root for multi-root trees.
    pub fn set_root_index(&mut self, root_index: Vec<u32>) -> Result<(), DataError> {
        if root_index.len() != self.num_row {
            return Err(DataError::RootIndexLength {
                got: root_index.len(),
                num_row: self.num_row,
            });
        }
        self.root_index = root_index;
        Ok(())
    }

    #[inline]
    pub fn num_row(&self) -> usize {
        self.num_row
    }

    #[inline]
    pub fn num_col(&self) -> usize {
        self.columns.len()
    }

    /// Entries of one column, ascending by value.
    #[inline]
    pub fn col(&self, fid: u32) -> &[ColEntry] {
        &self.columns[fid as usize]
    }

    #[inline]
    pub fn col_size(&self, fid: u32) -> usize {
        self.columns[fid as usize].len()
    }

    /// Fraction of rows that carry a value for `fid`.
    #[inline]
    pub fn col_density(&self, fid: u32) -> f32 {
        if self.num_row == 0 {
            0.0
        } else {
            self.col_size(fid) as f32 / self.num_row as f32
        }
    }

    /// Rows participating in training.
    #[inline]
    pub fn buffered_rowset(&self) -> &[u32] {
        &self.rowset
    }

    /// Per-row root assignment; empty when the tree has a single root.
    #[inline]
    pub fn root_index(&self) -> &[u32] {
        &self.root_index
    }
}
