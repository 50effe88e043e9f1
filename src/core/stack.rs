use crate::core::correlation_stack::{AlignerParams, CorrelationAligner};
use crate::core::peak_correction::PeakMeasurement;
use crate::core::timewindow::TimewindowCatalog;
use crate::trace::Trace;
use crate::types::{AlignError, AlignmentKey, Timewindow};
use serde::{Deserialize, Serialize};

/// How traces are lined up before stacking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StackMethod {
    /// Traces are used as they are
    Simple,
    /// The registered window start is moved to t = 0
    BaseTime,
    /// The midpoint of the max/min times inside the window is moved to t = 0
    Peak,
    /// Traces are aligned to a reference waveform by cross-correlation
    Correlation,
}

/// Closed set of alignment strategies sharing [`Stacker::align_or_stack`]
pub enum Stacker<'a> {
    Simple,
    BaseTime(&'a TimewindowCatalog),
    Peak(&'a TimewindowCatalog),
    Correlation {
        aligner: CorrelationAligner,
        catalog: &'a TimewindowCatalog,
    },
}

impl<'a> Stacker<'a> {
    /// Build the stacker selected by `method`.
    ///
    /// `reference` (trace and reference window) is required by
    /// [`StackMethod::Correlation`] and ignored otherwise.
    pub fn build(
        method: StackMethod,
        catalog: &'a TimewindowCatalog,
        reference: Option<(&Trace, Timewindow)>,
        params: AlignerParams,
    ) -> Result<Self, AlignError> {
        log::debug!("Building {:?} stacker", method);
        match method {
            StackMethod::Simple => Ok(Stacker::Simple),
            StackMethod::BaseTime => Ok(Stacker::BaseTime(catalog)),
            StackMethod::Peak => Ok(Stacker::Peak(catalog)),
            StackMethod::Correlation => {
                let (trace, window) = reference.ok_or(AlignError::MissingReference)?;
                Ok(Stacker::Correlation {
                    aligner: CorrelationAligner::with_params(trace, window, params)?,
                    catalog,
                })
            }
        }
    }

    pub fn method(&self) -> StackMethod {
        match self {
            Stacker::Simple => StackMethod::Simple,
            Stacker::BaseTime(_) => StackMethod::BaseTime,
            Stacker::Peak(_) => StackMethod::Peak,
            Stacker::Correlation { .. } => StackMethod::Correlation,
        }
    }

    /// Trace for `key`, moved in time according to the strategy
    pub fn align_or_stack(&self, key: &AlignmentKey, trace: &Trace) -> Result<Trace, AlignError> {
        match self {
            Stacker::Simple => Ok(trace.clone()),
            Stacker::BaseTime(catalog) => {
                let window = catalog.lookup(key)?.window;
                Ok(trace.shift_time(-window.start))
            }
            Stacker::Peak(catalog) => {
                let window = catalog.lookup(key)?.window;
                let peak = PeakMeasurement::of(&trace.cut(&window)?);
                Ok(trace.shift_time(-peak.time))
            }
            Stacker::Correlation { aligner, catalog } => {
                let window = catalog.lookup(key)?.window;
                aligner.align(key, trace, &window)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Component, EventId, Station, TimewindowInformation};
    use approx::assert_abs_diff_eq;

    fn catalog() -> TimewindowCatalog {
        TimewindowCatalog::new(vec![TimewindowInformation::new(
            Station::new("PFO", "II", 33.61, -116.46),
            EventId::new("201104170158A"),
            Component::Z,
            Timewindow::new(2.0, 4.0),
        )])
    }

    fn key() -> AlignmentKey {
        AlignmentKey::new("PFO", EventId::new("201104170158A"), Component::Z)
    }

    fn trace() -> Trace {
        let y = (0..100).map(|i| if i == 30 { 2.0 } else if i == 34 { -2.0 } else { 0.0 }).collect();
        Trace::sampled(0.0, 0.1, y).unwrap()
    }

    #[test]
    fn test_simple_and_base_time() {
        let catalog = catalog();
        let simple = Stacker::build(StackMethod::Simple, &catalog, None, AlignerParams::default()).unwrap();
        assert_eq!(simple.align_or_stack(&key(), &trace()).unwrap(), trace());

        let base = Stacker::build(StackMethod::BaseTime, &catalog, None, AlignerParams::default()).unwrap();
        let moved = base.align_or_stack(&key(), &trace()).unwrap();
        assert_abs_diff_eq!(moved.start_time(), -2.0, epsilon = 1e-12);
        assert_eq!(moved.amplitudes(), trace().amplitudes());
    }

    #[test]
    fn test_peak_moves_midpoint_to_zero() {
        let catalog = catalog();
        let peak = Stacker::build(StackMethod::Peak, &catalog, None, AlignerParams::default()).unwrap();
        let moved = peak.align_or_stack(&key(), &trace()).unwrap();
        // peaks at 3.0 s and 3.4 s
        assert_abs_diff_eq!(moved.time_at(32), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_correlation_requires_reference() {
        let catalog = catalog();
        assert!(matches!(
            Stacker::build(StackMethod::Correlation, &catalog, None, AlignerParams::default()),
            Err(AlignError::MissingReference)
        ));

        let reference = trace();
        let stacker = Stacker::build(
            StackMethod::Correlation,
            &catalog,
            Some((&reference, Timewindow::new(1.0, 5.0))),
            AlignerParams::default(),
        )
        .unwrap();
        assert_eq!(stacker.method(), StackMethod::Correlation);
        let aligned = stacker.align_or_stack(&key(), &reference).unwrap();
        assert_eq!(aligned.amplitudes(), reference.amplitudes());

        let unknown = AlignmentKey::new("XXX", EventId::new("201104170158A"), Component::Z);
        assert!(matches!(
            stacker.align_or_stack(&unknown, &reference),
            Err(AlignError::AmbiguousWindow(_))
        ));
    }
}
