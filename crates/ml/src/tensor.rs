use serde::{Deserialize, Serialize};

/// A dense row-major `f32` tensor.
///
/// Networks work on 2-D `[rows, cols]` batches; biases are 1-D.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Tensor {
    pub data: Vec<f32>,
    pub shape: Vec<usize>,
}

impl Tensor {
    /// # Panics
    ///
    /// Panics if `data` does not hold exactly `shape.product()` elements.
    #[must_use]
    pub fn from_vec(shape: Vec<usize>, data: Vec<f32>) -> Self {
        assert_eq!(shape.iter().product::<usize>(), data.len(), "shape {shape:?}");
        Self { data, shape }
    }

    #[must_use]
    pub fn zeros(shape: Vec<usize>) -> Self {
        let len = shape.iter().product();
        Self { data: vec![0.0; len], shape }
    }

    #[must_use]
    pub fn scalar(value: f32) -> Self {
        Self { data: vec![value], shape: vec![1, 1] }
    }

    /// A `[1, n]` batch holding a single row.
    #[must_use]
    pub fn row(values: &[f32]) -> Self {
        Self { data: values.to_vec(), shape: vec![1, values.len()] }
    }

    /// Stacks equally long rows into a `[rows.len(), width]` batch.
    ///
    /// # Panics
    ///
    /// Panics if the rows differ in length.
    #[must_use]
    pub fn stack<R: AsRef<[f32]>>(rows: &[R], width: usize) -> Self {
        let mut data = Vec::with_capacity(rows.len() * width);
        for row in rows {
            let row = row.as_ref();
            assert_eq!(row.len(), width, "ragged rows");
            data.extend_from_slice(row);
        }
        Self { data, shape: vec![rows.len(), width] }
    }

    /// A `[n, 1]` column.
    #[must_use]
    pub fn column(values: Vec<f32>) -> Self {
        let n = values.len();
        Self { data: values, shape: vec![n, 1] }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// `(rows, cols)`; a 1-D tensor is a single row.
    #[must_use]
    pub fn dims(&self) -> (usize, usize) {
        match self.shape.as_slice() {
            [] => (1, 1),
            [n] => (1, *n),
            [rows, rest @ ..] => (*rows, rest.iter().product()),
        }
    }

    #[must_use]
    pub fn row_slice(&self, i: usize) -> &[f32] {
        let (_, cols) = self.dims();
        &self.data[i * cols..(i + 1) * cols]
    }
}
