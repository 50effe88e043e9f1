//! Static corrections from up-and-down peak pairs
//!
//! Inside the registered window of each path, the time of a waveform is the
//! mean of the times of its maximum and minimum samples, and its amplitude is
//! half the peak-to-peak value. The correction compares these between the
//! observed and the synthetic waveform.

use crate::core::timewindow::TimewindowCatalog;
use crate::io::static_correction_file::{default_output_name, StaticCorrectionFile};
use crate::trace::Trace;
use crate::types::{
    AlignmentKey, Component, EstimationError, EventId, StaticCorrection, StaticsResult, Station,
    TimewindowInformation,
};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

/// Parameters for a batch of peak corrections
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeakCorrectionParams {
    /// Components to compute corrections for
    pub components: Vec<Component>,
    /// Synthetics are convolved with a source time function
    pub convolved: bool,
}

impl Default for PeakCorrectionParams {
    fn default() -> Self {
        Self {
            components: Component::ALL.to_vec(),
            convolved: false,
        }
    }
}

/// Representative time and amplitude of a windowed waveform
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeakMeasurement {
    /// Mean of the times of the maximum and the minimum
    pub time: f64,
    /// Half of (maximum - minimum)
    pub half_amplitude: f64,
}

impl PeakMeasurement {
    pub fn of(trace: &Trace) -> Self {
        let (max_time, max_value) = trace.argmax();
        let (min_time, min_value) = trace.argmin();
        Self {
            time: (max_time + min_time) / 2.0,
            half_amplitude: (max_value - min_value) / 2.0,
        }
    }
}

/// Estimate the static correction of one observed/synthetic pair.
///
/// Both traces are cut to `window`. The correction carries the window start
/// as its synthetic start time, so it depends only on the window catalog and
/// not on where the peaks fall.
pub fn estimate(
    observed: &Trace,
    synthetic: &Trace,
    window: &TimewindowInformation,
) -> Result<StaticCorrection, EstimationError> {
    let observed_peak = PeakMeasurement::of(&observed.cut(&window.window)?);
    let synthetic_peak = PeakMeasurement::of(&synthetic.cut(&window.window)?);

    if synthetic_peak.half_amplitude == 0.0 {
        return Err(EstimationError::DegenerateAmplitude(window.key()));
    }

    let time_shift = synthetic_peak.time - observed_peak.time;
    let amplitude_ratio = observed_peak.half_amplitude / synthetic_peak.half_amplitude;

    Ok(StaticCorrection::new(
        window.station.clone(),
        window.event.clone(),
        window.component,
        window.window.start,
        time_shift,
        amplitude_ratio,
    )
    .with_phases(window.phases.clone()))
}

/// Observed waveform with the identity of its recording
#[derive(Debug, Clone)]
pub struct ObservedWaveform {
    pub station: Station,
    pub event: EventId,
    pub component: Component,
    pub trace: Trace,
}

impl ObservedWaveform {
    pub fn key(&self) -> AlignmentKey {
        AlignmentKey::new(&self.station.name, self.event.clone(), self.component)
    }

    /// Name of the synthetic counterpart: STATION.EVENT.{C}s, or {C}sc when
    /// the synthetics are convolved
    pub fn synthetic_name(&self, convolved: bool) -> String {
        let suffix = if convolved { "sc" } else { "s" };
        format!("{}.{}.{}{}", self.station.name, self.event, self.component, suffix)
    }
}

/// Synthetic traces addressed by their file-style names
#[derive(Debug, Clone, Default)]
pub struct SyntheticLibrary {
    traces: HashMap<String, Trace>,
}

impl SyntheticLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &str, trace: Trace) {
        self.traces.insert(name.to_string(), trace);
    }

    pub fn get(&self, name: &str) -> Option<&Trace> {
        self.traces.get(name)
    }

    pub fn len(&self) -> usize {
        self.traces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.traces.is_empty()
    }
}

/// Result set shared by estimation workers
///
/// Each key holds at most one correction. Inserting an equal correction again
/// is a no-op; inserting a different one for a recorded key is rejected and
/// leaves the recorded value untouched.
#[derive(Debug, Default)]
pub struct CorrectionCollector {
    inner: Mutex<HashMap<(Station, EventId, Component), StaticCorrection>>,
}

impl CorrectionCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, correction: StaticCorrection) -> Result<(), EstimationError> {
        let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let key = (
            correction.station.clone(),
            correction.event.clone(),
            correction.component,
        );
        match map.get(&key) {
            Some(existing) if *existing == correction => Ok(()),
            Some(_) => Err(EstimationError::DuplicateKey(correction.key())),
            None => {
                map.insert(key, correction);
                Ok(())
            }
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_set(self) -> HashSet<StaticCorrection> {
        self.inner
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
            .into_values()
            .collect()
    }
}

/// Outcome of a batch run
#[derive(Debug, Default)]
pub struct CorrectionReport {
    pub corrections: HashSet<StaticCorrection>,
    /// Pairs that were skipped, with the reason
    pub failures: Vec<(AlignmentKey, EstimationError)>,
    /// Observed waveforms whose component was not requested
    pub filtered: usize,
}

/// Runs [`estimate`] over a set of observed waveforms
pub struct PeakCorrectionRunner<'a> {
    params: PeakCorrectionParams,
    catalog: &'a TimewindowCatalog,
}

impl<'a> PeakCorrectionRunner<'a> {
    pub fn new(params: PeakCorrectionParams, catalog: &'a TimewindowCatalog) -> Self {
        Self { params, catalog }
    }

    pub fn standard(catalog: &'a TimewindowCatalog) -> Self {
        Self::new(PeakCorrectionParams::default(), catalog)
    }

    /// Estimate corrections for every observed waveform of a requested
    /// component. Failing pairs are logged and reported, never fatal.
    pub fn run(&self, observed: &[ObservedWaveform], synthetics: &SyntheticLibrary) -> CorrectionReport {
        let selected: Vec<&ObservedWaveform> = observed
            .iter()
            .filter(|waveform| self.params.components.contains(&waveform.component))
            .collect();
        let filtered = observed.len() - selected.len();

        log::info!(
            "Estimating static corrections for {} pairs ({} filtered by component)",
            selected.len(),
            filtered
        );

        let collector = CorrectionCollector::new();
        let failures = self.dispatch(&selected, synthetics, &collector);

        for (key, error) in &failures {
            log::warn!("Skipping {}: {}", key, error);
        }

        let corrections = collector.into_set();
        log::info!(
            "{} static corrections computed, {} pairs skipped",
            corrections.len(),
            failures.len()
        );

        CorrectionReport {
            corrections,
            failures,
            filtered,
        }
    }

    /// [`run`](Self::run), then write the corrections to `path`
    pub fn run_to_file<P: AsRef<Path>>(
        &self,
        observed: &[ObservedWaveform],
        synthetics: &SyntheticLibrary,
        path: P,
    ) -> StaticsResult<CorrectionReport> {
        let report = self.run(observed, synthetics);
        StaticCorrectionFile::write(&report.corrections, path)?;
        Ok(report)
    }

    /// [`run`](Self::run), then write the corrections to a time-stamped file
    /// in `dir`
    pub fn run_to_dir<P: AsRef<Path>>(
        &self,
        observed: &[ObservedWaveform],
        synthetics: &SyntheticLibrary,
        dir: P,
    ) -> StaticsResult<(PathBuf, CorrectionReport)> {
        let path = dir.as_ref().join(default_output_name("peakCorrection"));
        let report = self.run_to_file(observed, synthetics, &path)?;
        Ok((path, report))
    }

    #[cfg(feature = "parallel")]
    fn dispatch(
        &self,
        selected: &[&ObservedWaveform],
        synthetics: &SyntheticLibrary,
        collector: &CorrectionCollector,
    ) -> Vec<(AlignmentKey, EstimationError)> {
        use rayon::prelude::*;

        selected
            .par_iter()
            .filter_map(|waveform| {
                self.compare(waveform, synthetics, collector)
                    .err()
                    .map(|error| (waveform.key(), error))
            })
            .collect()
    }

    #[cfg(not(feature = "parallel"))]
    fn dispatch(
        &self,
        selected: &[&ObservedWaveform],
        synthetics: &SyntheticLibrary,
        collector: &CorrectionCollector,
    ) -> Vec<(AlignmentKey, EstimationError)> {
        selected
            .iter()
            .filter_map(|waveform| {
                self.compare(waveform, synthetics, collector)
                    .err()
                    .map(|error| (waveform.key(), error))
            })
            .collect()
    }

    fn compare(
        &self,
        observed: &ObservedWaveform,
        synthetics: &SyntheticLibrary,
        collector: &CorrectionCollector,
    ) -> Result<(), EstimationError> {
        let key = observed.key();
        let window = self.catalog.lookup(&key)?;

        let name = observed.synthetic_name(self.params.convolved);
        let synthetic = synthetics.get(&name).ok_or_else(|| EstimationError::PairNotFound {
            key: key.clone(),
            expected: name.clone(),
        })?;

        let mut correction = estimate(&observed.trace, synthetic, window)?;
        correction.station = observed.station.clone();
        log::debug!(
            "{}: time shift {:.3} s, amplitude ratio {:.3}",
            key,
            correction.time_shift,
            correction.amplitude_ratio
        );
        collector.insert(correction)
    }
}
