use rust_decimal::Decimal;
use std::collections::VecDeque;

/// Simple moving average over the trailing `period` values.
#[derive(Debug, Clone)]
pub struct SMA {
    period: usize,
    window: VecDeque<Decimal>,
    sum: Decimal,
}

impl SMA {
    pub fn new(period: usize) -> Self {
        Self {
            period,
            window: VecDeque::with_capacity(period),
            sum: Decimal::ZERO,
        }
    }

    /// Returns `None` until `period` values have been seen.
    pub fn update(&mut self, price: Decimal) -> Option<Decimal> {
        self.window.push_back(price);
        self.sum += price;
        if self.window.len() > self.period {
            if let Some(oldest) = self.window.pop_front() {
                self.sum -= oldest;
            }
        }
        self.value()
    }

    fn value(&self) -> Option<Decimal> {
        if self.period == 0 || self.window.len() < self.period {
            return None;
        }
        Some(self.sum / Decimal::from(self.period as u64))
    }
}

/// SMA over a whole series; same length as the input, the first
/// `period - 1` entries are `None`.
pub fn sma(prices: &[Decimal], period: usize) -> Vec<Option<Decimal>> {
    let mut sma = SMA::new(period);
    prices.iter().map(|p| sma.update(*p)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_sma_prefix_is_undefined() {
        let prices: Vec<Decimal> = (1..=10).map(Decimal::from).collect();
        let out = sma(&prices, 4);

        assert_eq!(out.len(), prices.len());
        assert!(out[..3].iter().all(|v| v.is_none()));
        for i in 3..prices.len() {
            let trailing: Decimal = prices[i - 3..=i].iter().sum();
            assert_eq!(out[i], Some(trailing / dec!(4)));
        }
    }

    #[test]
    fn test_sma_short_series() {
        let out = sma(&[dec!(1), dec!(2)], 20);
        assert_eq!(out, vec![None, None]);
    }

    #[test]
    fn test_sma_period_one_is_identity() {
        let prices = vec![dec!(3.5), dec!(4.25)];
        let out = sma(&prices, 1);
        assert_eq!(out, vec![Some(dec!(3.5)), Some(dec!(4.25))]);
    }
}
