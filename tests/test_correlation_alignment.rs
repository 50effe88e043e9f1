use approx::assert_abs_diff_eq;
use rayon::prelude::*;
use seistatics::{AlignerParams, AlignmentKey, Component, CorrelationAligner, EventId, Timewindow, Trace};

const DELTA: f64 = 0.05;

/// Tapered sinusoid centred on sample `center`
fn wavelet(n: usize, center: f64) -> Vec<f64> {
    (0..n)
        .map(|i| {
            let t = (i as f64 - center) * DELTA;
            (-(t * t) / 2.0).exp() * (2.0 * std::f64::consts::PI * 0.8 * t).sin()
        })
        .collect()
}

fn key(station: &str) -> AlignmentKey {
    AlignmentKey::new(station, EventId::new("200608250044A"), Component::T)
}

#[test]
fn test_zero_shift_identity() {
    let trace = Trace::sampled(100.0, DELTA, wavelet(1200, 600.0)).unwrap();
    let window = Timewindow::new(115.0, 145.0);
    let aligner = CorrelationAligner::new(&trace, window).unwrap();

    let aligned = aligner.align(&key("ANMO"), &trace, &window).unwrap();
    assert_eq!(aligner.cached_shift(&key("ANMO")), Some(0));
    assert_eq!(aligned.amplitudes(), trace.amplitudes());
    for (a, b) in aligned.times().iter().zip(trace.times().iter()) {
        assert_abs_diff_eq!(a, b, epsilon = 1e-9);
    }
}

#[test]
fn test_known_shift_recovery() {
    let reference = Trace::sampled(100.0, DELTA, wavelet(1200, 600.0)).unwrap();
    let window = Timewindow::new(115.0, 145.0);
    let aligner = CorrelationAligner::new(&reference, window).unwrap();

    for k in [-40isize, -3, 1, 17, 55] {
        let delayed = Trace::sampled(100.0, DELTA, wavelet(1200, 600.0 + k as f64)).unwrap();
        let station = format!("K{}", k);
        let aligned = aligner.align(&key(&station), &delayed, &window).unwrap();

        assert_eq!(aligner.cached_shift(&key(&station)), Some(k));
        assert_abs_diff_eq!(
            aligned.start_time() - delayed.start_time(),
            -(k as f64) * DELTA,
            epsilon = 1e-9
        );
        // the delayed peak now sits where the reference peak is
        assert_abs_diff_eq!(aligned.argmax().0, reference.argmax().0, epsilon = 1e-9);
        assert_eq!(aligned.amplitudes(), delayed.amplitudes());
    }
}

#[test]
fn test_shift_beyond_search_range_is_not_found() {
    let reference = Trace::sampled(0.0, DELTA, wavelet(1200, 600.0)).unwrap();
    let window = Timewindow::new(10.0, 50.0);
    let params = AlignerParams {
        max_lag: 10,
        ..AlignerParams::default()
    };
    let aligner = CorrelationAligner::with_params(&reference, window, params).unwrap();

    let delayed = Trace::sampled(0.0, DELTA, wavelet(1200, 640.0)).unwrap();
    let lag = aligner.shift_for(&key("FAR"), &delayed, &window).unwrap();
    assert!(lag.abs() <= 10);
    assert_ne!(lag, 40);
}

#[test]
fn test_short_candidate_window_inside_long_reference() {
    let reference = Trace::sampled(0.0, DELTA, wavelet(2000, 1000.0)).unwrap();
    let aligner = CorrelationAligner::new(&reference, Timewindow::new(20.0, 80.0)).unwrap();

    // candidate arrives 1 s (20 samples) late and is compared in a narrower window
    let delayed = Trace::sampled(0.0, DELTA, wavelet(2000, 1020.0)).unwrap();
    let window = Timewindow::new(45.0, 57.0);
    let aligned = aligner.align(&key("NARROW"), &delayed, &window).unwrap();

    assert_eq!(aligner.cached_shift(&key("NARROW")), Some(20));
    assert_abs_diff_eq!(aligned.start_time(), -1.0, epsilon = 1e-9);
}

#[test]
fn test_concurrent_alignment_publishes_one_shift() {
    let reference = Trace::sampled(0.0, DELTA, wavelet(1200, 600.0)).unwrap();
    let window = Timewindow::new(10.0, 50.0);
    let delayed = Trace::sampled(0.0, DELTA, wavelet(1200, 607.0)).unwrap();

    let sequential = CorrelationAligner::new(&reference, window).unwrap();
    let expected = sequential.align(&key("PAR"), &delayed, &window).unwrap();

    let shared = CorrelationAligner::new(&reference, window).unwrap();
    let results: Vec<Trace> = (0..64)
        .into_par_iter()
        .map(|_| shared.align(&key("PAR"), &delayed, &window).unwrap())
        .collect();

    assert_eq!(shared.cache_len(), 1);
    assert_eq!(shared.cached_shift(&key("PAR")), sequential.cached_shift(&key("PAR")));
    assert_eq!(shared.cached_shift(&key("PAR")), Some(7));
    for trace in &results {
        assert_eq!(trace, &expected);
    }
}

#[test]
fn test_cached_shift_is_reused_for_any_trace() {
    let reference = Trace::sampled(0.0, DELTA, wavelet(1200, 600.0)).unwrap();
    let window = Timewindow::new(10.0, 50.0);
    let aligner = CorrelationAligner::new(&reference, window)
        .unwrap()
        .with_reference_key(key("REF"));

    // a delayed trace under the reference key keeps lag 0
    let delayed = Trace::sampled(0.0, DELTA, wavelet(1200, 612.0)).unwrap();
    let aligned = aligner.align(&key("REF"), &delayed, &window).unwrap();
    assert_eq!(aligned.times(), delayed.times());

    let first = aligner.shift_for(&key("B"), &delayed, &window).unwrap();
    let again = aligner.shift_for(&key("B"), &reference, &window).unwrap();
    assert_eq!(first, 12);
    assert_eq!(again, first);
    assert_eq!(aligner.cache_len(), 2);
}

#[test]
fn test_window_beyond_lag_range_is_rejected() {
    let reference = Trace::sampled(0.0, DELTA, wavelet(2400, 400.0)).unwrap();
    let aligner = CorrelationAligner::new(&reference, Timewindow::new(10.0, 30.0)).unwrap();

    // a later phase 85 s after the reference window, far outside 200 samples of lag
    let late = Trace::sampled(0.0, DELTA, wavelet(2400, 2000.0)).unwrap();
    let window = Timewindow::new(95.0, 105.0);
    assert!(matches!(
        aligner.align(&key("LATE"), &late, &window),
        Err(seistatics::AlignError::NoOverlap { .. })
    ));
    assert!(aligner.shift_for(&key("LATE"), &late, &window).is_err());
    assert_eq!(aligner.cached_shift(&key("LATE")), None);
    assert_eq!(aligner.cache_len(), 0);
}
