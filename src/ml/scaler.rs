use serde::Serialize;

/// Linear rescaling into [0, 1] from the observed min and max. A constant
/// series has no spread; it maps to 0 and inverts back to the constant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MinMaxScaler {
    min: f64,
    max: f64,
}

impl MinMaxScaler {
    /// `None` for an empty series or one containing non-finite values.
    pub fn fit(values: &[f64]) -> Option<Self> {
        if values.is_empty() || values.iter().any(|v| !v.is_finite()) {
            return None;
        }
        let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
        let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        Some(Self { min, max })
    }

    fn scale(&self) -> f64 {
        let range = self.max - self.min;
        if range == 0.0 {
            1.0
        } else {
            range
        }
    }

    pub fn transform(&self, value: f64) -> f64 {
        (value - self.min) / self.scale()
    }

    pub fn inverse_transform(&self, value: f64) -> f64 {
        value * self.scale() + self.min
    }

    pub fn transform_all(&self, values: &[f64]) -> Vec<f64> {
        values.iter().map(|v| self.transform(*v)).collect()
    }

    pub fn inverse_transform_all(&self, values: &[f64]) -> Vec<f64> {
        values.iter().map(|v| self.inverse_transform(*v)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scaled_values_span_unit_interval() {
        let prices = vec![150.0, 120.0, 180.0, 165.5];
        let scaler = MinMaxScaler::fit(&prices).unwrap();
        let scaled = scaler.transform_all(&prices);

        assert_eq!(scaled[1], 0.0);
        assert_eq!(scaled[2], 1.0);
        assert!(scaled.iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn test_round_trip() {
        let prices = vec![189.95, 190.12, 187.33, 201.78, 199.01, 188.0];
        let scaler = MinMaxScaler::fit(&prices).unwrap();
        let back = scaler.inverse_transform_all(&scaler.transform_all(&prices));

        for (a, b) in prices.iter().zip(back.iter()) {
            assert!((a - b).abs() < 1e-9, "{} != {}", a, b);
        }
    }

    #[test]
    fn test_constant_series() {
        let scaler = MinMaxScaler::fit(&[42.0, 42.0]).unwrap();
        assert_eq!(scaler.transform(42.0), 0.0);
        assert_eq!(scaler.inverse_transform(0.0), 42.0);
    }

    #[test]
    fn test_fit_rejects_empty_and_nan() {
        assert!(MinMaxScaler::fit(&[]).is_none());
        assert!(MinMaxScaler::fit(&[1.0, f64::NAN]).is_none());
    }
}
