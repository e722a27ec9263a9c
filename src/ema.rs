//! Exponentially weighted moving average over a smoothing window.

/// Calculates an exponential moving average of a scalar signal, decayed by
/// elapsed wall-clock time rather than by sample count.
///
/// ```text
/// +--------+------------------+-------------------------------+
/// | Symbol |    Identifier    |          Explanation           |
/// +--------+------------------+-------------------------------+
/// | W      | window           | smoothing window, in seconds   |
/// | d      | ts - last_ts     | elapsed time since last update  |
/// | w      | exp(-d / W)      | decay weight, in [0, 1]         |
/// | x      | sample           | new sample at time ts           |
/// +--------+------------------+-------------------------------+
/// ```
/// `value' = x * (1 - w) + value * w`
///
/// `W = 0` degenerates to "always use the latest sample" (`w` is forced to
/// `0` rather than computed, to dodge a division by zero).
#[derive(Debug, Clone)]
pub struct Ema {
    window: f64,
    last_ts: Option<f64>,
    value: f64,
}

impl Ema {
    /// Creates a new EMA with the given smoothing window, in seconds.
    pub fn new(window: f64) -> Self {
        Ema {
            window,
            last_ts: None,
            value: 0.0,
        }
    }

    /// Feeds a new `(timestamp, sample)` pair into the average and returns
    /// the updated value.
    pub fn update(&mut self, ts: f64, sample: f64) -> f64 {
        match self.last_ts {
            None => {
                self.last_ts = Some(ts);
                self.value = sample;
            }
            Some(last_ts) => {
                let delta = ts - last_ts;
                let w = if self.window > 0.0 {
                    (-delta / self.window).exp()
                } else {
                    0.0
                };
                self.value = sample * (1.0 - w) + self.value * w;
                self.last_ts = Some(ts);
            }
        }
        self.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_update_returns_sample_unchanged() {
        let mut ema = Ema::new(5.0);
        assert_eq!(ema.update(0.0, 3.0), 3.0);
    }

    #[test]
    fn zero_delta_leaves_value_unchanged() {
        let mut ema = Ema::new(5.0);
        ema.update(0.0, 10.0);
        let v = ema.update(0.0, 0.0);
        assert_eq!(v, 10.0);
    }

    #[test]
    fn large_delta_converges_to_latest_sample() {
        let mut ema = Ema::new(5.0);
        ema.update(0.0, 10.0);
        let v = ema.update(1_000_000.0, 0.0);
        assert!(v.abs() < 1e-6);
    }

    #[test]
    fn zero_window_always_uses_latest_sample() {
        let mut ema = Ema::new(0.0);
        ema.update(0.0, 10.0);
        let v = ema.update(1.0, 2.0);
        assert_eq!(v, 2.0);
    }
}
