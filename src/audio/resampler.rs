/*!
Linear-interpolation resampler for decoded mono segments.

Each segment is resampled on its own, from the rate declared in its header to
the output device rate:

```ignore
use crate::audio::resampler::LinearResampler;

let rs = LinearResampler::new(24_000, 48_000);
let output = rs.process(&segment_samples);
```

Output sample `i` is read from source position `i / (to_rate / from_rate)`;
the two neighbouring source samples are blended by the fractional part, and
positions at or past the last source sample take the last sample.
*/

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearResampler {
    from_rate: u32,
    to_rate: u32,
    // output samples per source sample (to/from)
    ratio: f64,
}

impl LinearResampler {
    pub fn new(from_rate: u32, to_rate: u32) -> Self {
        let ratio = if from_rate == 0 { 0.0 } else { to_rate as f64 / from_rate as f64 };
        Self {
            from_rate,
            to_rate,
            ratio,
        }
    }

    /// Get current configuration.
    pub fn rates(&self) -> (u32, u32) {
        (self.from_rate, self.to_rate)
    }

    /// True when input and output rates match and samples pass through untouched
    pub fn is_passthrough(&self) -> bool {
        self.from_rate == self.to_rate
    }

    /// Number of samples `process` produces for `input_len` source samples
    pub fn output_len(&self, input_len: usize) -> usize {
        if self.is_passthrough() {
            return input_len;
        }
        (input_len as f64 * self.ratio).round() as usize
    }

    pub fn process(&self, input: &[f32]) -> Vec<f32> {
        if self.is_passthrough() {
            return input.to_vec();
        }
        if input.is_empty() || self.from_rate == 0 || self.to_rate == 0 {
            return Vec::new();
        }

        let last = input.len() - 1;
        let out_len = self.output_len(input.len());

        (0..out_len)
            .map(|i| {
                let pos = i as f64 / self.ratio;
                let idx = pos.floor() as usize;
                if idx >= last {
                    return input[last];
                }
                let frac = (pos - idx as f64) as f32;
                let s0 = input[idx];
                let s1 = input[idx + 1];
                s0 + (s1 - s0) * frac
            })
            .collect()
    }
}

/// Resample `input` from `from_rate` to `to_rate`
pub fn resample(input: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    LinearResampler::new(from_rate, to_rate).process(input)
}
