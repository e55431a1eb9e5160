//! Density maps and the count reduction.

/// A 2D grid of non-negative crowd-density estimates.
///
/// One cell per output spatial position of the model; the grid keeps the
/// aspect ratio of the model input, downsampled by the model stride. The sum
/// over all cells approximates the number of people in the image.
#[derive(Debug, Clone, PartialEq)]
pub struct DensityMap {
    width: usize,
    height: usize,
    cells: Vec<f32>,
}

impl DensityMap {
    /// Build a density map from raw model output.
    ///
    /// Stray negative activations are clamped to zero so cell values are
    /// never negative. Returns `None` when the buffer does not match the
    /// given dimensions.
    pub fn from_raw(width: usize, height: usize, mut cells: Vec<f32>) -> Option<Self> {
        if width == 0 || height == 0 || cells.len() != width * height {
            return None;
        }
        for value in &mut cells {
            if !value.is_finite() || *value < 0.0 {
                *value = 0.0;
            }
        }
        Some(Self {
            width,
            height,
            cells,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Cell values in row-major order.
    pub fn cells(&self) -> &[f32] {
        &self.cells
    }

    pub fn get(&self, x: usize, y: usize) -> f32 {
        self.cells[y * self.width + x]
    }

    /// The exact sum of all cells. This is the crowd-count estimate; no
    /// clamping or capping is applied, the reduction does not second-guess
    /// the model.
    pub fn sum(&self) -> f64 {
        self.cells.iter().map(|&v| v as f64).sum()
    }

    /// The count rounded to the nearest integer for display.
    pub fn rounded_count(&self) -> u64 {
        self.sum().round().max(0.0) as u64
    }

    /// Minimum and maximum cell values, used for per-image color scaling.
    pub fn value_range(&self) -> (f32, f32) {
        let mut min = f32::INFINITY;
        let mut max = f32::NEG_INFINITY;
        for &value in &self.cells {
            min = min.min(value);
            max = max.max(value);
        }
        (min, max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sum_equals_exact_cell_total() {
        let cells = vec![0.25f32; 12];
        let map = DensityMap::from_raw(4, 3, cells).expect("valid map");
        assert_eq!(map.sum(), 3.0);
        assert_eq!(map.rounded_count(), 3);
    }

    #[test]
    fn sum_is_independent_of_dimensions() {
        let cells: Vec<f32> = (0..24).map(|i| i as f32 * 0.5).collect();
        let wide = DensityMap::from_raw(24, 1, cells.clone()).expect("wide");
        let tall = DensityMap::from_raw(1, 24, cells.clone()).expect("tall");
        let grid = DensityMap::from_raw(6, 4, cells).expect("grid");
        assert_eq!(wide.sum(), grid.sum());
        assert_eq!(tall.sum(), grid.sum());
    }

    #[test]
    fn negative_and_non_finite_cells_are_clamped() {
        let map = DensityMap::from_raw(2, 2, vec![-1.0, 0.5, f32::NAN, 2.0]).expect("valid map");
        assert_eq!(map.get(0, 0), 0.0);
        assert_eq!(map.get(0, 1), 0.0);
        assert!(map.cells().iter().all(|&v| v >= 0.0));
        assert_eq!(map.sum(), 2.5);
    }

    #[test]
    fn rounding_goes_to_nearest_integer() {
        let map = DensityMap::from_raw(2, 1, vec![1.2, 0.35]).expect("valid map");
        assert_eq!(map.rounded_count(), 2);
    }

    #[test]
    fn mismatched_buffer_is_rejected() {
        assert!(DensityMap::from_raw(3, 3, vec![0.0; 8]).is_none());
        assert!(DensityMap::from_raw(0, 3, vec![]).is_none());
    }

    #[test]
    fn value_range_spans_min_and_max() {
        let map = DensityMap::from_raw(2, 2, vec![0.1, 0.9, 0.4, 0.2]).expect("valid map");
        let (min, max) = map.value_range();
        assert_eq!(min, 0.1);
        assert_eq!(max, 0.9);
    }
}
