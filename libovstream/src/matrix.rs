use ndarray::{ArrayD, ArrayViewD, IxDyn};

use super::error::MatrixError;

/// Matrix is the n-dimensional numeric payload shared by most stream types.
///
/// The buffer is flat and row-major: the last dimension varies fastest. For a signal
/// `[channels, samples]` the value of channel c at sample s lives at `c * samples + s`.
/// Each index of each dimension may carry a label (empty when unset).
///
/// The buffer length always equals the product of the dimension sizes. Changing a dimension
/// size reallocates the buffer to zeros; no data is preserved.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Matrix {
    dimension_sizes: Vec<usize>,
    labels: Vec<Vec<String>>,
    buffer: Vec<f64>,
}

impl Matrix {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a zeroed matrix with the given dimension sizes and empty labels
    pub fn with_dimensions(sizes: &[usize]) -> Self {
        let mut matrix = Self::default();
        matrix.resize(sizes);
        matrix
    }

    /// Set all dimension sizes at once, reallocating buffer and labels
    pub fn resize(&mut self, sizes: &[usize]) {
        self.dimension_sizes = sizes.to_vec();
        self.labels = sizes.iter().map(|s| vec![String::new(); *s]).collect();
        self.reallocate();
    }

    /// Set the number of dimensions. Every dimension starts with size 0.
    pub fn set_dimension_count(&mut self, count: usize) {
        self.resize(&vec![0; count]);
    }

    pub fn set_dimension_size(&mut self, dimension: usize, size: usize) -> Result<(), MatrixError> {
        self.check_dimension(dimension)?;
        self.dimension_sizes[dimension] = size;
        self.labels[dimension] = vec![String::new(); size];
        self.reallocate();
        Ok(())
    }

    fn reallocate(&mut self) {
        self.buffer = vec![0.0; self.element_count()];
    }

    fn check_dimension(&self, dimension: usize) -> Result<(), MatrixError> {
        if dimension >= self.dimension_sizes.len() {
            Err(MatrixError::BadDimension {
                dimension,
                count: self.dimension_sizes.len(),
            })
        } else {
            Ok(())
        }
    }

    fn check_index(&self, dimension: usize, index: usize) -> Result<(), MatrixError> {
        self.check_dimension(dimension)?;
        let size = self.dimension_sizes[dimension];
        if index >= size {
            Err(MatrixError::BadIndex {
                dimension,
                index,
                size,
            })
        } else {
            Ok(())
        }
    }

    pub fn dimension_count(&self) -> usize {
        self.dimension_sizes.len()
    }

    pub fn dimension_size(&self, dimension: usize) -> Option<usize> {
        self.dimension_sizes.get(dimension).copied()
    }

    pub fn dimension_sizes(&self) -> &[usize] {
        &self.dimension_sizes
    }

    /// Product of the dimension sizes; 0 for a matrix without dimensions
    pub fn element_count(&self) -> usize {
        if self.dimension_sizes.is_empty() {
            0
        } else {
            self.dimension_sizes.iter().product()
        }
    }

    pub fn dimension_label(&self, dimension: usize, index: usize) -> Option<&str> {
        self.labels
            .get(dimension)
            .and_then(|l| l.get(index))
            .map(|s| s.as_str())
    }

    pub fn dimension_labels(&self, dimension: usize) -> Option<&[String]> {
        self.labels.get(dimension).map(|l| l.as_slice())
    }

    pub fn set_dimension_label(
        &mut self,
        dimension: usize,
        index: usize,
        label: &str,
    ) -> Result<(), MatrixError> {
        self.check_index(dimension, index)?;
        self.labels[dimension][index] = label.to_string();
        Ok(())
    }

    /// Set every label of a dimension from a slice of the dimension's size
    pub fn set_dimension_labels(
        &mut self,
        dimension: usize,
        labels: &[String],
    ) -> Result<(), MatrixError> {
        self.check_dimension(dimension)?;
        let size = self.dimension_sizes[dimension];
        if labels.len() != size {
            return Err(MatrixError::BadIndex {
                dimension,
                index: labels.len(),
                size,
            });
        }
        self.labels[dimension] = labels.to_vec();
        Ok(())
    }

    /// True if at least one label of the dimension is not empty
    pub fn has_labels(&self, dimension: usize) -> bool {
        self.labels
            .get(dimension)
            .map(|l| l.iter().any(|s| !s.is_empty()))
            .unwrap_or(false)
    }

    pub fn buffer(&self) -> &[f64] {
        &self.buffer
    }

    pub fn buffer_mut(&mut self) -> &mut [f64] {
        &mut self.buffer
    }

    /// Replace the buffer content. The new buffer must match the element count.
    pub fn set_buffer(&mut self, values: &[f64]) -> Result<(), MatrixError> {
        if values.len() != self.buffer.len() {
            return Err(MatrixError::BufferSize {
                expected: self.buffer.len(),
                found: values.len(),
            });
        }
        self.buffer.copy_from_slice(values);
        Ok(())
    }

    /// Copy dimensions and labels of another matrix; the buffer is zeroed
    pub fn copy_description_from(&mut self, other: &Matrix) {
        self.dimension_sizes = other.dimension_sizes.clone();
        self.labels = other.labels.clone();
        self.reallocate();
    }

    /// Copy dimensions, labels and content of another matrix
    pub fn copy_from(&mut self, other: &Matrix) {
        self.clone_from(other);
    }

    /// View the buffer as an n-dimensional array
    pub fn as_array(&self) -> Result<ArrayViewD<'_, f64>, MatrixError> {
        ArrayViewD::from_shape(IxDyn(&self.dimension_sizes), &self.buffer).map_err(|_| {
            MatrixError::BufferSize {
                expected: self.element_count(),
                found: self.buffer.len(),
            }
        })
    }

    /// Build an unlabelled matrix from an n-dimensional array
    pub fn from_array(array: &ArrayD<f64>) -> Self {
        let mut matrix = Self::with_dimensions(array.shape());
        matrix.buffer = array.iter().copied().collect();
        matrix
    }
}
