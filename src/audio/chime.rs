use rodio::Source;
use std::f32::consts::PI;
use std::time::Duration;

/// Short decaying two-tone chime.
/// Plays `high_freq` for the first half and `low_freq` for the second, like a doorbell "ding".
pub struct Chime {
    high_freq: f32,
    low_freq: f32,
    sample_rate: u32,
    num_sample: usize,
    total_samples: usize,
}

impl Chime {
    pub fn new(high_freq: f32, low_freq: f32, duration: Duration) -> Self {
        let sample_rate = 44100;
        Self {
            high_freq,
            low_freq,
            sample_rate,
            num_sample: 0,
            total_samples: (duration.as_secs_f32() * sample_rate as f32) as usize,
        }
    }

    /// The probe cue.
    pub fn cue() -> Self {
        Self::new(1318.5, 1046.5, Duration::from_millis(700))
    }

    /// Short blip confirming a response key press.
    pub fn confirm() -> Self {
        Self::new(880.0, 880.0, Duration::from_millis(120))
    }
}

impl Iterator for Chime {
    type Item = f32;

    fn next(&mut self) -> Option<Self::Item> {
        if self.num_sample >= self.total_samples {
            return None;
        }
        self.num_sample += 1;

        let t = self.num_sample as f32 / self.sample_rate as f32;
        let progress = self.num_sample as f32 / self.total_samples as f32;
        let freq = if progress < 0.5 {
            self.high_freq
        } else {
            self.low_freq
        };

        // Exponential decay keeps the tail from clicking
        let envelope = (-4.0 * progress).exp();
        Some((2.0 * PI * freq * t).sin() * envelope * 0.3)
    }
}

impl Source for Chime {
    fn current_frame_len(&self) -> Option<usize> {
        Some(self.total_samples.saturating_sub(self.num_sample))
    }

    fn channels(&self) -> u16 {
        1
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn total_duration(&self) -> Option<Duration> {
        Some(Duration::from_secs_f32(
            self.total_samples as f32 / self.sample_rate as f32,
        ))
    }
}
