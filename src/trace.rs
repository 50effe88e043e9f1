use crate::types::{Timewindow, TraceError};
use ndarray::{Array1, ArrayView1};

/// Sampled waveform: a time axis and the amplitude at each time
///
/// A trace always holds at least one sample and both axes have equal length.
/// Operations return new traces; a trace is never modified in place.
#[derive(Debug, Clone, PartialEq)]
pub struct Trace {
    x: Array1<f64>,
    y: Array1<f64>,
}

impl Trace {
    /// Create a trace from paired time and amplitude samples
    pub fn new(x: Array1<f64>, y: Array1<f64>) -> Result<Self, TraceError> {
        if x.len() != y.len() {
            return Err(TraceError::LengthMismatch {
                times: x.len(),
                amplitudes: y.len(),
            });
        }
        if x.is_empty() {
            return Err(TraceError::Empty);
        }
        Ok(Self { x, y })
    }

    pub fn from_vecs(x: Vec<f64>, y: Vec<f64>) -> Result<Self, TraceError> {
        Self::new(Array1::from(x), Array1::from(y))
    }

    /// Create an evenly sampled trace starting at `start` with interval `delta`
    pub fn sampled(start: f64, delta: f64, y: Vec<f64>) -> Result<Self, TraceError> {
        let x = (0..y.len()).map(|i| start + i as f64 * delta).collect::<Vec<_>>();
        Self::from_vecs(x, y)
    }

    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    pub fn times(&self) -> ArrayView1<'_, f64> {
        self.x.view()
    }

    pub fn amplitudes(&self) -> ArrayView1<'_, f64> {
        self.y.view()
    }

    pub fn time_at(&self, index: usize) -> f64 {
        self.x[index]
    }

    pub fn start_time(&self) -> f64 {
        self.x[0]
    }

    pub fn end_time(&self) -> f64 {
        self.x[self.x.len() - 1]
    }

    /// Mean sample interval, (end - start) / (n - 1)
    pub fn sample_interval(&self) -> Result<f64, TraceError> {
        let n = self.len();
        if n < 2 {
            return Err(TraceError::TooFewSamples { needed: 2, found: n });
        }
        Ok((self.end_time() - self.start_time()) / (n - 1) as f64)
    }

    /// Samples with `start <= t <= end`
    pub fn cut_window(&self, start: f64, end: f64) -> Result<Trace, TraceError> {
        let (x, y): (Vec<f64>, Vec<f64>) = self
            .x
            .iter()
            .zip(self.y.iter())
            .filter(|(t, _)| start <= **t && **t <= end)
            .map(|(t, v)| (*t, *v))
            .unzip();
        if x.is_empty() {
            return Err(TraceError::EmptyWindow { start, end });
        }
        Trace::from_vecs(x, y)
    }

    pub fn cut(&self, window: &Timewindow) -> Result<Trace, TraceError> {
        self.cut_window(window.start, window.end)
    }

    /// (time, value) of the first sample holding the maximum amplitude
    pub fn argmax(&self) -> (f64, f64) {
        let index = self.extremum_index(|candidate, best| candidate > best);
        (self.x[index], self.y[index])
    }

    /// (time, value) of the first sample holding the minimum amplitude
    pub fn argmin(&self) -> (f64, f64) {
        let index = self.extremum_index(|candidate, best| candidate < best);
        (self.x[index], self.y[index])
    }

    pub fn max_value(&self) -> f64 {
        self.argmax().1
    }

    pub fn min_value(&self) -> f64 {
        self.argmin().1
    }

    /// Same amplitudes on a time axis moved by `delta` seconds
    pub fn shift_time(&self, delta: f64) -> Trace {
        Trace {
            x: self.x.mapv(|t| t + delta),
            y: self.y.clone(),
        }
    }

    fn extremum_index(&self, better: impl Fn(f64, f64) -> bool) -> usize {
        let mut best = 0;
        for (i, &value) in self.y.iter().enumerate().skip(1) {
            if better(value, self.y[best]) {
                best = i;
            }
        }
        best
    }
}
