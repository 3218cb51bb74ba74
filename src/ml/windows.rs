use ndarray::{Array1, Array2};

/// Supervised pairs cut from a series with a stride-1 sliding window:
/// row `i` of `inputs` is `series[i..i + window]` and `targets[i]` is
/// `series[i + window]`.
#[derive(Debug, Clone)]
pub struct WindowSet {
    pub inputs: Array2<f64>,
    pub targets: Array1<f64>,
}

impl WindowSet {
    pub fn build(series: &[f64], window: usize) -> Self {
        let n = series.len().saturating_sub(window);
        let inputs = Array2::from_shape_fn((n, window), |(i, j)| series[i + j]);
        let targets = Array1::from_iter((0..n).map(|i| series[i + window]));
        Self { inputs, targets }
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn window(&self) -> usize {
        self.inputs.ncols()
    }
}
