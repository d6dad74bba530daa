//! Per-channel bias estimation by averaging a stationary window of readings.
//!
//! A channel's calibrated value is `uncalibrated - bias`, where
//! `bias = mean(uncalibrated) - reference` over one calibration pass.

use embedded_hal::blocking::delay::DelayMs;

/// Outcome of one calibration pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CalibrationReport {
    pub requested: u32,
    pub accepted: u32,
}

impl CalibrationReport {
    /// True when at least one sample made it into the bias.
    pub fn applied(&self) -> bool {
        self.accepted > 0
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Calibration<const N: usize> {
    bias: [f32; N],
}

impl<const N: usize> Default for Calibration<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> Calibration<N> {
    pub const fn new() -> Self {
        Self { bias: [0.0; N] }
    }

    pub fn bias(&self) -> [f32; N] {
        self.bias
    }

    pub fn apply(&self, uncalibrated: [f32; N]) -> [f32; N] {
        let mut out = uncalibrated;
        for (v, b) in out.iter_mut().zip(self.bias.iter()) {
            *v -= *b;
        }
        out
    }

    /// Draw `samples` readings from `provider`, waiting `settle_ms` after each
    /// draw, and overwrite the bias with `mean - reference`. The provider gets
    /// the same delay for any conversion wait of its own.
    ///
    /// Failed draws are skipped. When nothing was read (`samples == 0` or every
    /// draw failed) the previous bias is kept.
    pub fn calibrate<D, F>(
        &mut self,
        samples: u32,
        reference: [f32; N],
        delay: &mut D,
        settle_ms: u32,
        mut provider: F,
    ) -> CalibrationReport
    where
        D: DelayMs<u32>,
        F: FnMut(&mut D) -> Option<[f32; N]>,
    {
        let mut report = CalibrationReport {
            requested: samples,
            accepted: 0,
        };
        // f64 keeps long passes from losing the low bits of small offsets.
        let mut sum = [0.0f64; N];

        for _ in 0..samples {
            if let Some(reading) = provider(&mut *delay) {
                for (acc, v) in sum.iter_mut().zip(reading.iter()) {
                    *acc += *v as f64;
                }
                report.accepted += 1;
            }
            delay.delay_ms(settle_ms);
        }

        if report.accepted == 0 {
            if samples > 0 {
                warn!("calibration: all {} samples failed, bias kept", samples);
            }
            return report;
        }

        let n = report.accepted as f64;
        for ((b, acc), r) in self.bias.iter_mut().zip(sum.iter()).zip(reference.iter()) {
            *b = (*acc / n) as f32 - *r;
        }
        debug!(
            "calibration: {}/{} samples accepted",
            report.accepted, report.requested
        );
        report
    }
}
