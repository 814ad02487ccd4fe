//! Dense column-major matrix used for bulk exchange with the host
//! (joint trajectories, point and vertex tables, IK solution sets).

use std::fmt;

use crate::error::{LinkError, LinkResult};
use crate::joints::Joints;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl Matrix {
    /// A `rows x cols` matrix filled with zeros.
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        }
    }

    /// The 0x0 matrix the host uses for "no data".
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build from column-major storage.
    pub fn from_column_major(rows: usize, cols: usize, data: Vec<f64>) -> LinkResult<Self> {
        if rows * cols != data.len() {
            return Err(LinkError::type_error(format!(
                "{rows}x{cols} matrix needs {} values, got {}",
                rows * cols,
                data.len()
            )));
        }
        Ok(Self { rows, cols, data })
    }

    /// Build from a list of rows; all rows must have the same length.
    pub fn from_rows<R: AsRef<[f64]>>(rows: &[R]) -> LinkResult<Self> {
        let nrows = rows.len();
        let ncols = rows.first().map(|row| row.as_ref().len()).unwrap_or(0);
        let mut matrix = Self::zeros(nrows, ncols);
        for (i, row) in rows.iter().enumerate() {
            let row = row.as_ref();
            if row.len() != ncols {
                return Err(LinkError::type_error(format!(
                    "row {i} has {} values, expected {ncols}",
                    row.len()
                )));
            }
            for (j, value) in row.iter().enumerate() {
                matrix.data[j * nrows + i] = *value;
            }
        }
        Ok(matrix)
    }

    /// Build from a list of columns; all columns must have the same length.
    pub fn from_columns<C: AsRef<[f64]>>(columns: &[C]) -> LinkResult<Self> {
        let nrows = columns.first().map(|col| col.as_ref().len()).unwrap_or(0);
        let mut data = Vec::with_capacity(nrows * columns.len());
        for (j, column) in columns.iter().enumerate() {
            let column = column.as_ref();
            if column.len() != nrows {
                return Err(LinkError::type_error(format!(
                    "column {j} has {} values, expected {nrows}",
                    column.len()
                )));
            }
            data.extend_from_slice(column);
        }
        Ok(Self {
            rows: nrows,
            cols: columns.len(),
            data,
        })
    }

    /// A single-column matrix holding `values`.
    pub fn column_vector(values: &[f64]) -> Self {
        Self {
            rows: values.len(),
            cols: 1,
            data: values.to_vec(),
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Raw column-major storage, the order used on the wire.
    pub fn as_column_major(&self) -> &[f64] {
        &self.data
    }

    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        if row < self.rows && col < self.cols {
            Some(self.data[col * self.rows + row])
        } else {
            None
        }
    }

    pub fn set(&mut self, row: usize, col: usize, value: f64) -> LinkResult<()> {
        if row >= self.rows || col >= self.cols {
            return Err(LinkError::type_error(format!(
                "index ({row}, {col}) out of bounds for {}x{} matrix",
                self.rows, self.cols
            )));
        }
        self.data[col * self.rows + row] = value;
        Ok(())
    }

    /// Borrow column `col` as a contiguous slice.
    pub fn column(&self, col: usize) -> Option<&[f64]> {
        if col < self.cols {
            Some(&self.data[col * self.rows..(col + 1) * self.rows])
        } else {
            None
        }
    }

    pub fn row(&self, row: usize) -> Option<Vec<f64>> {
        if row < self.rows {
            Some((0..self.cols).map(|j| self.data[j * self.rows + row]).collect())
        } else {
            None
        }
    }

    pub fn columns(&self) -> impl Iterator<Item = &[f64]> + '_ {
        (0..self.cols).map(move |j| &self.data[j * self.rows..(j + 1) * self.rows])
    }

    pub fn to_rows(&self) -> Vec<Vec<f64>> {
        (0..self.rows)
            .map(|i| (0..self.cols).map(|j| self.data[j * self.rows + i]).collect())
            .collect()
    }

    pub fn to_columns(&self) -> Vec<Vec<f64>> {
        self.columns().map(<[f64]>::to_vec).collect()
    }

    /// Interpret every column as a joint vector, keeping the first `njoints` rows.
    ///
    /// Solution matrices append configuration rows after the joints; this
    /// strips them.
    pub fn columns_as_joints(&self, njoints: usize) -> Vec<Joints> {
        let keep = njoints.min(self.rows);
        self.columns()
            .map(|column| Joints::from(&column[..keep]))
            .collect()
    }

    pub fn transpose(&self) -> Self {
        let mut out = Self::zeros(self.cols, self.rows);
        for i in 0..self.rows {
            for j in 0..self.cols {
                out.data[i * self.cols + j] = self.data[j * self.rows + i];
            }
        }
        out
    }

    /// Horizontal concatenation: `[self other]`.
    pub fn hcat(&self, other: &Matrix) -> LinkResult<Self> {
        if self.is_empty() {
            return Ok(other.clone());
        }
        if other.is_empty() {
            return Ok(self.clone());
        }
        if self.rows != other.rows {
            return Err(LinkError::type_error(format!(
                "cannot place {}x{} beside {}x{}",
                self.rows, self.cols, other.rows, other.cols
            )));
        }
        let mut data = self.data.clone();
        data.extend_from_slice(&other.data);
        Ok(Self {
            rows: self.rows,
            cols: self.cols + other.cols,
            data,
        })
    }

    /// Vertical concatenation: `[self; other]`.
    pub fn vcat(&self, other: &Matrix) -> LinkResult<Self> {
        if self.is_empty() {
            return Ok(other.clone());
        }
        if other.is_empty() {
            return Ok(self.clone());
        }
        if self.cols != other.cols {
            return Err(LinkError::type_error(format!(
                "cannot stack {}x{} over {}x{}",
                self.rows, self.cols, other.rows, other.cols
            )));
        }
        let rows = self.rows + other.rows;
        let mut data = Vec::with_capacity(rows * self.cols);
        for j in 0..self.cols {
            data.extend_from_slice(&self.data[j * self.rows..(j + 1) * self.rows]);
            data.extend_from_slice(&other.data[j * other.rows..(j + 1) * other.rows]);
        }
        Ok(Self {
            rows,
            cols: self.cols,
            data,
        })
    }
}

impl fmt::Display for Matrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Matrix: ({}, {})", self.rows, self.cols)?;
        for row in self.to_rows() {
            let cells: Vec<String> = row.iter().map(|v| format!("{v:.3}")).collect();
            writeln!(f, "[{}]", cells.join(", "))?;
        }
        Ok(())
    }
}

impl From<&Joints> for Matrix {
    fn from(joints: &Joints) -> Self {
        Matrix::column_vector(joints.as_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_and_columns_agree_on_layout() {
        let m = Matrix::from_rows(&[[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]).unwrap();
        assert_eq!(m.shape(), (2, 3));
        assert_eq!(m.as_column_major(), &[1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);
        assert_eq!(m.get(1, 2), Some(6.0));
        assert_eq!(m.column(1), Some(&[2.0, 5.0][..]));
        assert_eq!(m.row(0), Some(vec![1.0, 2.0, 3.0]));
        assert_eq!(m.get(2, 0), None);

        let same = Matrix::from_columns(&[[1.0, 4.0], [2.0, 5.0], [3.0, 6.0]]).unwrap();
        assert_eq!(m, same);
    }

    #[test]
    fn ragged_rows_are_rejected() {
        let err = Matrix::from_rows(&[vec![1.0, 2.0], vec![3.0]]).unwrap_err();
        assert!(matches!(err, LinkError::Type(_)));
    }

    #[test]
    fn transpose_swaps_indices() {
        let m = Matrix::from_rows(&[[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]).unwrap();
        let t = m.transpose();
        assert_eq!(t.shape(), (3, 2));
        for i in 0..2 {
            for j in 0..3 {
                assert_eq!(m.get(i, j), t.get(j, i));
            }
        }
        assert_eq!(t.transpose(), m);
    }

    #[test]
    fn concatenation_checks_shapes() {
        let a = Matrix::from_rows(&[[1.0], [2.0]]).unwrap();
        let b = Matrix::from_rows(&[[3.0], [4.0]]).unwrap();
        let h = a.hcat(&b).unwrap();
        assert_eq!(h.to_rows(), vec![vec![1.0, 3.0], vec![2.0, 4.0]]);

        let v = a.vcat(&b).unwrap();
        assert_eq!(v.to_columns(), vec![vec![1.0, 2.0, 3.0, 4.0]]);

        let wide = Matrix::from_rows(&[[1.0, 2.0]]).unwrap();
        assert!(a.hcat(&wide).is_err());
        assert!(a.vcat(&wide).is_err());
        assert_eq!(Matrix::empty().hcat(&a).unwrap(), a);
    }

    #[test]
    fn solution_columns_drop_configuration_rows() {
        let m = Matrix::from_columns(&[[1.0, 2.0, 9.0], [3.0, 4.0, 9.0]]).unwrap();
        let joints = m.columns_as_joints(2);
        assert_eq!(joints.len(), 2);
        assert_eq!(joints[1].as_slice(), &[3.0, 4.0]);
    }
}
