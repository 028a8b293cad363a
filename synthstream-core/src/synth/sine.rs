//! Phase-continuous sine tone, identical on every channel.

use std::f64::consts::TAU;

use super::SynthSource;

/// A sine oscillator that keeps its phase across `render` calls.
#[derive(Debug, Clone)]
pub struct SineSource {
    frequency: f64,
    amplitude: f32,
    sample_rate: u32,
    /// Current phase in radians, kept in `[0, TAU)`.
    phase: f64,
}

impl SineSource {
    /// # Parameters
    /// - `frequency`: tone frequency in Hz.
    /// - `amplitude`: peak level, clamped to `[0.0, 1.0]`.
    /// - `sample_rate`: stream sample rate in Hz.
    pub fn new(frequency: f64, amplitude: f32, sample_rate: u32) -> Self {
        Self {
            frequency,
            amplitude: amplitude.clamp(0.0, 1.0),
            sample_rate: sample_rate.max(1),
            phase: 0.0,
        }
    }

    /// 440 Hz at amplitude 0.2.
    pub fn a440(sample_rate: u32) -> Self {
        Self::new(440.0, 0.2, sample_rate)
    }

    pub fn frequency(&self) -> f64 {
        self.frequency
    }

    pub fn amplitude(&self) -> f32 {
        self.amplitude
    }

    fn phase_step(&self) -> f64 {
        TAU * self.frequency / self.sample_rate as f64
    }
}

impl SynthSource for SineSource {
    fn render(&mut self, buffer: &mut [f32], _frames: usize, channels: u16) {
        let channels = channels.max(1) as usize;
        let step = self.phase_step();

        for frame in buffer.chunks_mut(channels) {
            let sample = (self.phase.sin() as f32) * self.amplitude;
            frame.fill(sample);
            self.phase += step;
            if self.phase >= TAU {
                self.phase -= TAU;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn channels_carry_the_same_sample() {
        let mut sine = SineSource::a440(48_000);
        let mut buffer = vec![0.0f32; 256 * 2];
        sine.render(&mut buffer, 256, 2);
        for frame in buffer.chunks(2) {
            assert_eq!(frame[0], frame[1]);
        }
    }

    #[test]
    fn stays_within_amplitude() {
        let mut sine = SineSource::new(1_000.0, 0.5, 48_000);
        let mut buffer = vec![0.0f32; 4_800];
        sine.render(&mut buffer, 4_800, 1);
        let peak = buffer.iter().fold(0.0f32, |acc, s| acc.max(s.abs()));
        assert!(peak <= 0.5 + 1e-6);
        assert_abs_diff_eq!(peak, 0.5, epsilon = 1e-3);
    }

    #[test]
    fn phase_is_continuous_across_calls() {
        let mut split = SineSource::new(440.0, 1.0, 48_000);
        let mut whole = split.clone();

        let mut first = vec![0.0f32; 100];
        let mut second = vec![0.0f32; 100];
        split.render(&mut first, 100, 1);
        split.render(&mut second, 100, 1);

        let mut joined = vec![0.0f32; 200];
        whole.render(&mut joined, 200, 1);

        for (a, b) in first.iter().chain(second.iter()).zip(joined.iter()) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-6);
        }
    }

    #[test]
    fn one_second_has_expected_zero_crossings() {
        let mut sine = SineSource::new(440.0, 1.0, 48_000);
        let mut buffer = vec![0.0f32; 48_000];
        sine.render(&mut buffer, 48_000, 1);

        let rising = buffer
            .windows(2)
            .filter(|w| w[0] < 0.0 && w[1] >= 0.0)
            .count();
        assert!((439..=441).contains(&rising), "rising crossings = {rising}");
    }

    #[test]
    fn amplitude_is_clamped() {
        assert_eq!(SineSource::new(440.0, 3.0, 48_000).amplitude(), 1.0);
        assert_eq!(SineSource::new(440.0, -1.0, 48_000).amplitude(), 0.0);
    }
}
