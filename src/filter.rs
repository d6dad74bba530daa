/// Exponential moving average, one instance per physical channel.
///
/// The first sample is taken as-is; afterwards
/// `y = alpha * x + (1 - alpha) * y_prev`.
#[derive(Debug, Clone, Copy)]
pub struct Ema {
    alpha: f32,
    last_output: f32,
    initialized: bool,
}

impl Ema {
    /// `alpha` is clamped into (0, 1]; 1.0 disables smoothing.
    pub fn new(alpha: f32) -> Self {
        Self {
            alpha: alpha.clamp(f32::EPSILON, 1.0),
            last_output: 0.0,
            initialized: false,
        }
    }

    pub fn update(&mut self, input: f32) -> f32 {
        if !self.initialized {
            self.last_output = input;
            self.initialized = true;
        } else {
            self.last_output = self.alpha * input + (1.0 - self.alpha) * self.last_output;
        }
        self.last_output
    }

    pub fn output(&self) -> Option<f32> {
        self.initialized.then_some(self.last_output)
    }

    pub fn alpha(&self) -> f32 {
        self.alpha
    }

    pub fn reset(&mut self) {
        self.initialized = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-5
    }

    #[test]
    fn first_sample_passes_through_then_smooths() {
        let mut f = Ema::new(0.2);
        for _ in 0..4 {
            assert_eq!(f.update(1.0), 1.0);
        }
        let expected = [1.2, 1.36, 1.488, 1.5904];
        for want in expected {
            let got = f.update(2.0);
            assert!(close(got, want), "got {got}, want {want}");
        }
    }

    #[test]
    fn alpha_one_is_identity() {
        let mut f = Ema::new(1.0);
        for x in [3.0, -7.5, 0.25, 100.0] {
            assert_eq!(f.update(x), x);
        }
    }

    #[test]
    fn alpha_is_clamped_into_range() {
        assert_eq!(Ema::new(4.0).alpha(), 1.0);
        assert!(Ema::new(0.0).alpha() > 0.0);
        assert!(Ema::new(-1.0).alpha() > 0.0);
    }

    #[test]
    fn reset_takes_next_sample_as_is() {
        let mut f = Ema::new(0.05);
        f.update(10.0);
        f.update(20.0);
        f.reset();
        assert_eq!(f.output(), None);
        assert_eq!(f.update(-3.0), -3.0);
    }

    proptest! {
        #[test]
        fn first_output_equals_first_input(alpha in 0.001f32..=1.0, x in -1.0e6f32..1.0e6) {
            let mut f = Ema::new(alpha);
            prop_assert_eq!(f.update(x), x);
        }

        #[test]
        fn output_stays_within_seen_range(
            alpha in 0.001f32..=1.0,
            xs in proptest::collection::vec(-1000.0f32..1000.0, 1..64),
        ) {
            let mut f = Ema::new(alpha);
            let mut lo = f32::INFINITY;
            let mut hi = f32::NEG_INFINITY;
            for x in xs {
                lo = lo.min(x);
                hi = hi.max(x);
                let y = f.update(x);
                prop_assert!(y >= lo - 1e-3 && y <= hi + 1e-3);
            }
        }

        #[test]
        fn constant_input_converges_monotonically(alpha in 0.01f32..=1.0, c in -100.0f32..100.0) {
            let mut f = Ema::new(alpha);
            f.update(0.0);
            let mut last_err = c.abs();
            for _ in 0..50 {
                let err = (c - f.update(c)).abs();
                prop_assert!(err <= last_err + 1e-4);
                last_err = err;
            }
        }
    }
}
