use crate::trace::Trace;
use crate::types::{AlignError, AlignmentKey, Timewindow, TraceError};
use approx::relative_eq;
use ndarray::{s, ArrayView1};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

/// Parameters for correlation alignment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlignerParams {
    /// Largest lag, in samples, tried in either direction
    pub max_lag: usize,
    /// Relative tolerance for two sample intervals to count as equal
    pub sampling_tolerance: f64,
}

impl Default for AlignerParams {
    fn default() -> Self {
        Self {
            max_lag: 200,
            sampling_tolerance: 1e-9,
        }
    }
}

/// Best lag found by [`find_best_shift`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShiftEstimate {
    /// Samples by which the candidate lags the reference
    pub lag: isize,
    /// Overlap dot product over the product of both full norms
    pub correlation: f64,
}

/// Search the lag in `[-max_lag, max_lag]` at which `candidate` correlates
/// best with `reference`.
///
/// With lag `s`, candidate sample `j` is compared with reference sample
/// `offset + j - s`. Lags are visited as 0, 1, -1, 2, -2, ... and only a
/// strictly better score replaces the current best, so ties resolve to the
/// smallest magnitude and then to the positive lag. Lags without overlap are
/// skipped; `None` means no lag in range overlaps at all.
pub fn find_best_shift(
    reference: ArrayView1<'_, f64>,
    candidate: ArrayView1<'_, f64>,
    offset: isize,
    max_lag: usize,
) -> Option<ShiftEstimate> {
    let n = reference.len() as isize;
    let m = candidate.len() as isize;
    if n == 0 || m == 0 {
        return None;
    }

    // overlap needs -m < offset - lag < n
    let low = offset.checked_sub(n - 1)?;
    let high = offset.checked_add(m - 1)?;
    let max_lag = max_lag.min(isize::MAX as usize) as isize;
    if high < -max_lag || low > max_lag {
        return None;
    }

    let norm = reference.dot(&reference).sqrt() * candidate.dot(&candidate).sqrt();
    let reach = max_lag.min(low.unsigned_abs().max(high.unsigned_abs()).min(isize::MAX as usize) as isize);

    let mut best: Option<ShiftEstimate> = None;
    let lags = std::iter::once(0).chain((1..=reach).flat_map(|l| [l, -l]));
    for lag in lags {
        if lag < low || lag > high {
            continue;
        }
        let base = offset - lag;
        // candidate j overlaps reference base + j
        let j_start = (-base).max(0);
        let j_end = m.min(n - base);
        let part = reference.slice(s![(base + j_start)..(base + j_end)]);
        let dot = part.dot(&candidate.slice(s![j_start..j_end]));
        let correlation = if norm > 0.0 { dot / norm } else { 0.0 };
        if best.map_or(true, |b| correlation > b.correlation) {
            best = Some(ShiftEstimate { lag, correlation });
        }
    }
    best
}

type ShiftSlot = Arc<Mutex<Option<isize>>>;

/// Aligns traces to a reference waveform by cross-correlation
///
/// The lag found for a key is computed once and reused for every later call
/// with that key, whichever thread makes it.
pub struct CorrelationAligner {
    params: AlignerParams,
    reference: Trace,
    reference_interval: f64,
    shifts: Mutex<HashMap<AlignmentKey, ShiftSlot>>,
}

impl CorrelationAligner {
    /// Use the part of `trace` inside `window` as the reference
    pub fn new(trace: &Trace, window: Timewindow) -> Result<Self, AlignError> {
        Self::with_params(trace, window, AlignerParams::default())
    }

    pub fn with_params(trace: &Trace, window: Timewindow, params: AlignerParams) -> Result<Self, AlignError> {
        check_within(trace, &window)?;
        let reference = trace.cut(&window)?;
        let reference_interval = reference.sample_interval()?;

        log::info!(
            "Correlation reference: {} samples in [{}, {}], max lag {} samples",
            reference.len(),
            window.start,
            window.end,
            params.max_lag
        );

        Ok(Self {
            params,
            reference,
            reference_interval,
            shifts: Mutex::new(HashMap::new()),
        })
    }

    /// Record lag 0 for the key the reference trace belongs to
    pub fn with_reference_key(self, key: AlignmentKey) -> Self {
        self.slot(&key)
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_or_insert(0);
        self
    }

    pub fn params(&self) -> &AlignerParams {
        &self.params
    }

    pub fn reference(&self) -> &Trace {
        &self.reference
    }

    /// Lag stored for `key`, if one has been computed
    pub fn cached_shift(&self, key: &AlignmentKey) -> Option<isize> {
        let slot = self.lock_shifts().get(key).cloned()?;
        let lag = *slot.lock().unwrap_or_else(PoisonError::into_inner);
        lag
    }

    /// Number of keys with a stored lag
    pub fn cache_len(&self) -> usize {
        self.lock_shifts()
            .values()
            .filter(|slot| slot.lock().unwrap_or_else(PoisonError::into_inner).is_some())
            .count()
    }

    /// Lag for `key`, computing it from `trace` cut to `window` on first use
    pub fn shift_for(&self, key: &AlignmentKey, trace: &Trace, window: &Timewindow) -> Result<isize, AlignError> {
        self.resolve(key, trace, window).map(|(lag, _)| lag)
    }

    /// Copy of `trace` whose time axis is moved so that its window lines up
    /// with the reference. Amplitudes are not changed.
    pub fn align(&self, key: &AlignmentKey, trace: &Trace, window: &Timewindow) -> Result<Trace, AlignError> {
        let (lag, candidate_start) = self.resolve(key, trace, window)?;
        let reference_index = self
            .sample_offset_at(candidate_start, window)?
            .checked_sub(lag)
            .ok_or_else(|| self.no_overlap(window))?;
        let reference_time = self.reference.start_time() + reference_index as f64 * self.reference_interval;
        Ok(trace.shift_time(reference_time - candidate_start))
    }

    /// Lag for `key` and the time of the first sample of `trace` in `window`
    fn resolve(&self, key: &AlignmentKey, trace: &Trace, window: &Timewindow) -> Result<(isize, f64), AlignError> {
        self.check_candidate(trace, window)?;

        let slot = self.slot(key);
        let mut guard = slot.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(lag) = *guard {
            return Ok((lag, first_time_in(trace, window)?));
        }

        let candidate = trace.cut(window)?;
        if candidate.len() > self.reference.len() {
            return Err(AlignError::ReferenceTooShort {
                reference: self.reference.len(),
                candidate: candidate.len(),
            });
        }

        let offset = self.sample_offset_at(candidate.start_time(), window)?;
        let estimate = find_best_shift(
            self.reference.amplitudes(),
            candidate.amplitudes(),
            offset,
            self.params.max_lag,
        )
        .ok_or_else(|| self.no_overlap(window))?;
        log::debug!(
            "{}: lag {} samples (correlation {:.4})",
            key,
            estimate.lag,
            estimate.correlation
        );

        *guard = Some(estimate.lag);
        Ok((estimate.lag, candidate.start_time()))
    }

    fn check_candidate(&self, trace: &Trace, window: &Timewindow) -> Result<(), AlignError> {
        check_within(trace, window)?;
        let interval = trace.sample_interval()?;
        if !relative_eq!(
            interval,
            self.reference_interval,
            epsilon = 0.0,
            max_relative = self.params.sampling_tolerance
        ) {
            return Err(AlignError::SamplingMismatch {
                reference: self.reference_interval,
                candidate: interval,
            });
        }
        Ok(())
    }

    /// Reference index at `time`, the zero lag for a candidate starting there
    fn sample_offset_at(&self, time: f64, window: &Timewindow) -> Result<isize, AlignError> {
        let offset = ((time - self.reference.start_time()) / self.reference_interval).round();
        // beyond this range no lag can reach the reference
        let limit = (isize::MAX / 4) as f64;
        if !offset.is_finite() || offset.abs() > limit {
            return Err(self.no_overlap(window));
        }
        Ok(offset as isize)
    }

    fn no_overlap(&self, window: &Timewindow) -> AlignError {
        AlignError::NoOverlap {
            start: window.start,
            end: window.end,
            max_lag: self.params.max_lag,
        }
    }

    fn slot(&self, key: &AlignmentKey) -> ShiftSlot {
        self.lock_shifts().entry(key.clone()).or_default().clone()
    }

    fn lock_shifts(&self) -> std::sync::MutexGuard<'_, HashMap<AlignmentKey, ShiftSlot>> {
        self.shifts.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn first_time_in(trace: &Trace, window: &Timewindow) -> Result<f64, AlignError> {
    trace
        .times()
        .iter()
        .copied()
        .find(|t| window.start <= *t && *t <= window.end)
        .ok_or(AlignError::Trace(TraceError::EmptyWindow {
            start: window.start,
            end: window.end,
        }))
}

fn check_within(trace: &Trace, window: &Timewindow) -> Result<(), AlignError> {
    if window.start < trace.start_time() || trace.end_time() < window.end {
        return Err(AlignError::WindowOutOfBounds {
            start: window.start,
            end: window.end,
            trace_start: trace.start_time(),
            trace_end: trace.end_time(),
        });
    }
    Ok(())
}
