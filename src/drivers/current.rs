//! AC current through a current transformer sampled by the ADC.
//!
//! One reading is the RMS of a window of instantaneous samples, taken around
//! the window's own mean so the transformer's DC bias point drops out.

use embedded_hal::blocking::delay::{DelayMs, DelayUs};

use super::{Sensor, SensorError};
use crate::calibration::{Calibration, CalibrationReport};
use crate::config::{
    ADC_FULL_SCALE_MV, ADC_MAX_COUNT, ADC_RMS_SAMPLES, ADC_SAMPLE_SPACING_US,
    CURRENT_FILTER_ALPHA, CURRENT_SETTLE_MS,
};
use crate::filter::Ema;
use crate::link::ThreePhaseCurrentPacket;

/// One analog input, already scaled to millivolts.
pub trait AdcChannel {
    fn read_millivolts(&mut self) -> Result<u16, SensorError>;
}

/// 12-bit conversion result to millivolts at the configured reference.
pub fn counts_to_millivolts(counts: u16) -> u16 {
    let counts = (counts as u32).min(ADC_MAX_COUNT);
    (counts * ADC_FULL_SCALE_MV / ADC_MAX_COUNT) as u16
}

/// Running mean and sum of squared deviations (Welford).
#[derive(Debug, Clone, Copy, Default)]
struct Welford {
    count: u32,
    mean: f32,
    m2: f32,
}

impl Welford {
    fn push(&mut self, x: f32) {
        self.count += 1;
        let delta = x - self.mean;
        self.mean += delta / self.count as f32;
        self.m2 += delta * (x - self.mean);
    }

    /// Population RMS deviation.
    fn rms(&self) -> f32 {
        if self.count == 0 {
            return 0.0;
        }
        libm::sqrtf(self.m2 / self.count as f32)
    }
}

pub struct CurrentChannel<A, D> {
    adc: A,
    delay: D,
    volts_per_amp: f32,
    window: u16,
    calibration: Calibration<1>,
    filter: Ema,
}

impl<A, D> CurrentChannel<A, D>
where
    A: AdcChannel,
    D: DelayUs<u32> + DelayMs<u32>,
{
    pub fn new(adc: A, delay: D, volts_per_amp: f32) -> Self {
        Self::with_window(adc, delay, volts_per_amp, ADC_RMS_SAMPLES)
    }

    /// `window` is clamped to at least one sample.
    pub fn with_window(adc: A, delay: D, volts_per_amp: f32, window: u16) -> Self {
        Self {
            adc,
            delay,
            volts_per_amp,
            window: window.max(1),
            calibration: Calibration::new(),
            filter: Ema::new(CURRENT_FILTER_ALPHA),
        }
    }

    /// Noise floor in amperes subtracted from every reading.
    pub fn noise_floor(&self) -> f32 {
        self.calibration.bias()[0]
    }

    pub fn release(self) -> (A, D) {
        (self.adc, self.delay)
    }

    /// RMS of one sample window in millivolts. Any failed conversion fails the
    /// whole window.
    fn window_rms_mv(adc: &mut A, delay: &mut D, window: u16) -> Result<f32, SensorError> {
        let mut stats = Welford::default();
        for _ in 0..window {
            let mv = adc.read_millivolts()?;
            stats.push(mv as f32);
            delay.delay_us(ADC_SAMPLE_SPACING_US);
        }
        Ok(stats.rms())
    }

    fn read_uncalibrated(
        adc: &mut A,
        delay: &mut D,
        window: u16,
        volts_per_amp: f32,
    ) -> Result<f32, SensorError> {
        let volts = Self::window_rms_mv(adc, delay, window)? / 1000.0;
        Ok(volts / volts_per_amp)
    }

    /// Calibrated amperes, before smoothing.
    fn measure(&mut self) -> Result<f32, SensorError> {
        let amps = Self::read_uncalibrated(
            &mut self.adc,
            &mut self.delay,
            self.window,
            self.volts_per_amp,
        )?;
        let [above_floor] = self.calibration.apply([amps]);
        Ok(above_floor.max(0.0))
    }
}

impl<A, D> Sensor for CurrentChannel<A, D>
where
    A: AdcChannel,
    D: DelayUs<u32> + DelayMs<u32>,
{
    type Reading = f32;

    fn initialize(&mut self) -> Result<(), SensorError> {
        self.adc.read_millivolts().map_err(|_| SensorError::Init)?;
        Ok(())
    }

    fn read_calibrated(&mut self) -> Result<f32, SensorError> {
        let amps = self.measure()?;
        Ok(self.filter.update(amps))
    }

    /// Measures the noise floor; run with no load on the conductor.
    fn calibrate(&mut self, samples: u32) -> CalibrationReport {
        let adc = &mut self.adc;
        let window = self.window;
        let vpa = self.volts_per_amp;
        let report = self.calibration.calibrate(
            samples,
            [0.0],
            &mut self.delay,
            CURRENT_SETTLE_MS,
            |delay| {
                Self::read_uncalibrated(adc, delay, window, vpa)
                    .ok()
                    .map(|a| [a])
            },
        );
        if report.applied() {
            self.filter.reset();
        }
        report
    }
}

/// Three current channels read as one packet.
pub struct ThreePhaseMeter<A, D> {
    phases: [CurrentChannel<A, D>; 3],
}

impl<A, D> ThreePhaseMeter<A, D>
where
    A: AdcChannel,
    D: DelayUs<u32> + DelayMs<u32>,
{
    pub fn new(phases: [CurrentChannel<A, D>; 3]) -> Self {
        Self { phases }
    }

    pub fn phases(&self) -> &[CurrentChannel<A, D>; 3] {
        &self.phases
    }
}

impl<A, D> Sensor for ThreePhaseMeter<A, D>
where
    A: AdcChannel,
    D: DelayUs<u32> + DelayMs<u32>,
{
    type Reading = ThreePhaseCurrentPacket;

    fn initialize(&mut self) -> Result<(), SensorError> {
        for phase in self.phases.iter_mut() {
            phase.initialize()?;
        }
        info!("three-phase meter initialized");
        Ok(())
    }

    /// All three windows are measured before any filter moves, so a failure
    /// on one phase leaves every phase untouched.
    fn read_calibrated(&mut self) -> Result<ThreePhaseCurrentPacket, SensorError> {
        let mut amps = [0.0f32; 3];
        for (out, phase) in amps.iter_mut().zip(self.phases.iter_mut()) {
            *out = phase.measure()?;
        }
        let [ia, ib, ic] = amps;
        Ok(ThreePhaseCurrentPacket {
            ia: self.phases[0].filter.update(ia),
            ib: self.phases[1].filter.update(ib),
            ic: self.phases[2].filter.update(ic),
        })
    }

    fn calibrate(&mut self, samples: u32) -> CalibrationReport {
        let mut total = CalibrationReport::default();
        for phase in self.phases.iter_mut() {
            let report = phase.calibrate(samples);
            total.requested += report.requested;
            total.accepted += report.accepted;
        }
        let floor = [
            self.phases[0].noise_floor(),
            self.phases[1].noise_floor(),
            self.phases[2].noise_floor(),
        ];
        info!(
            "current noise floor: {} {} {} A ({}/{})",
            floor[0], floor[1], floor[2], total.accepted, total.requested
        );
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoDelay;

    impl DelayUs<u32> for NoDelay {
        fn delay_us(&mut self, _us: u32) {}
    }

    impl DelayMs<u32> for NoDelay {
        fn delay_ms(&mut self, _ms: u32) {}
    }

    /// Replays `pattern` cyclically; fails on call number `fail_at` if set.
    struct Pattern {
        pattern: &'static [u16],
        calls: usize,
        fail_at: Option<usize>,
    }

    impl Pattern {
        fn new(pattern: &'static [u16]) -> Self {
            Self {
                pattern,
                calls: 0,
                fail_at: None,
            }
        }
    }

    impl AdcChannel for Pattern {
        fn read_millivolts(&mut self) -> Result<u16, SensorError> {
            let n = self.calls;
            self.calls += 1;
            if self.fail_at == Some(n) {
                return Err(SensorError::Transaction);
            }
            Ok(self.pattern[n % self.pattern.len()])
        }
    }

    /// Adds up every microsecond the driver asks to wait.
    #[derive(Clone, Default)]
    struct Stopwatch(std::rc::Rc<core::cell::Cell<u64>>);

    impl DelayUs<u32> for Stopwatch {
        fn delay_us(&mut self, us: u32) {
            self.0.set(self.0.get() + us as u64);
        }
    }

    impl DelayMs<u32> for Stopwatch {
        fn delay_ms(&mut self, ms: u32) {
            self.0.set(self.0.get() + ms as u64 * 1000);
        }
    }

    #[test]
    fn three_phase_read_fits_in_the_node_period() {
        use crate::config::CURRENT_NODE_PERIOD_MS;

        let clock = Stopwatch::default();
        let mut meter = ThreePhaseMeter::new([
            CurrentChannel::new(Pattern::new(&[1750, 1550]), clock.clone(), 0.1),
            CurrentChannel::new(Pattern::new(&[1750, 1550]), clock.clone(), 0.1),
            CurrentChannel::new(Pattern::new(&[1750, 1550]), clock.clone(), 0.1),
        ]);
        meter.read_calibrated().unwrap();

        let expected = 3 * ADC_RMS_SAMPLES as u64 * ADC_SAMPLE_SPACING_US as u64;
        assert_eq!(clock.0.get(), expected);
        assert!(clock.0.get() < CURRENT_NODE_PERIOD_MS * 1000);
    }

    #[test]
    fn constant_window_has_zero_rms() {
        let mut adc = Pattern::new(&[1650]);
        let rms = CurrentChannel::<Pattern, NoDelay>::window_rms_mv(&mut adc, &mut NoDelay, 256)
            .unwrap();
        assert_eq!(rms, 0.0);
    }

    #[test]
    fn alternating_window_rms_is_the_magnitude() {
        let mut adc = Pattern::new(&[1750, 1550]);
        let rms = CurrentChannel::<Pattern, NoDelay>::window_rms_mv(&mut adc, &mut NoDelay, 256)
            .unwrap();
        assert!((rms - 100.0).abs() < 1e-2, "{rms}");
    }

    #[test]
    fn millivolts_convert_to_amperes() {
        // 100 mV RMS through 0.1 V/A is 1 A
        let mut ch = CurrentChannel::with_window(Pattern::new(&[1750, 1550]), NoDelay, 0.1, 64);
        let amps = ch.read_calibrated().unwrap();
        assert!((amps - 1.0).abs() < 1e-3, "{amps}");
    }

    #[test]
    fn failed_sample_fails_the_window() {
        let mut adc = Pattern::new(&[1750, 1550]);
        adc.fail_at = Some(10);
        let mut ch = CurrentChannel::with_window(adc, NoDelay, 0.1, 64);
        assert_eq!(ch.read_calibrated(), Err(SensorError::Transaction));
        assert_eq!(ch.filter.output(), None);
    }

    #[test]
    fn noise_floor_is_removed_and_clamped() {
        // 5 mV of idle noise is 0.05 A
        let mut ch = CurrentChannel::with_window(Pattern::new(&[1655, 1645]), NoDelay, 0.1, 32);
        let report = ch.calibrate(4);
        assert_eq!(report.accepted, 4);
        assert!((ch.noise_floor() - 0.05).abs() < 1e-4);

        let amps = ch.read_calibrated().unwrap();
        assert!(amps.abs() < 1e-4);
        assert!(amps >= 0.0);
    }

    #[test]
    fn counts_scale_to_full_scale() {
        assert_eq!(counts_to_millivolts(0), 0);
        assert_eq!(counts_to_millivolts(4095), 3300);
        assert_eq!(counts_to_millivolts(u16::MAX), 3300);
    }

    #[test]
    fn one_bad_phase_fails_the_packet_and_moves_no_filter() {
        let a = CurrentChannel::with_window(Pattern::new(&[1750, 1550]), NoDelay, 0.1, 16);
        let b = CurrentChannel::with_window(Pattern::new(&[1700, 1600]), NoDelay, 0.1, 16);
        let mut bad = Pattern::new(&[1650]);
        bad.fail_at = Some(3);
        let c = CurrentChannel::with_window(bad, NoDelay, 0.1, 16);
        let mut meter = ThreePhaseMeter::new([a, b, c]);

        assert_eq!(meter.read_calibrated(), Err(SensorError::Transaction));
        assert!(meter.phases().iter().all(|p| p.filter.output().is_none()));

        let packet = meter.read_calibrated().unwrap();
        assert!((packet.ia - 1.0).abs() < 1e-3);
        assert!((packet.ib - 0.5).abs() < 1e-3);
        assert!(packet.ic.abs() < 1e-6);
    }
}
