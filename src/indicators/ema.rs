use rust_decimal::Decimal;

/// Exponential moving average in its recursive (unadjusted) form:
/// `ema_0 = x_0`, `ema_t = alpha * x_t + (1 - alpha) * ema_{t-1}` with
/// `alpha = 2 / (span + 1)`.
#[derive(Debug, Clone)]
pub struct EMA {
    alpha: Decimal,
    value: Option<Decimal>,
}

impl EMA {
    pub fn new(span: usize) -> Self {
        let alpha = Decimal::from(2) / Decimal::from(span as u64 + 1);
        Self {
            alpha,
            value: None,
        }
    }

    pub fn update(&mut self, price: Decimal) -> Option<Decimal> {
        let next = match self.value {
            None => price,
            Some(prev) => (price - prev) * self.alpha + prev,
        };
        self.value = Some(next);
        self.value
    }
}

/// EMA over a whole series; same length as the input.
pub fn ema(prices: &[Decimal], span: usize) -> Vec<Option<Decimal>> {
    let mut ema = EMA::new(span);
    prices.iter().map(|p| ema.update(*p)).collect()
}
