use regex::Regex;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use std::sync::OnceLock;

/// Fixed width of a station name in correction files
pub const STATION_NAME_WIDTH: usize = 8;

/// Fixed width of a network code in correction files
pub const NETWORK_WIDTH: usize = 8;

/// Fixed width of an event identifier in correction files
pub const EVENT_ID_WIDTH: usize = 15;

/// Waveform component of a three-component seismogram
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Component {
    /// Vertical
    Z,
    /// Radial
    R,
    /// Transverse
    T,
}

impl Component {
    /// All components in tag order
    pub const ALL: [Component; 3] = [Component::Z, Component::R, Component::T];

    /// One-byte tag used in binary files (SAC numbering)
    pub fn tag(self) -> u8 {
        match self {
            Component::Z => 1,
            Component::R => 2,
            Component::T => 3,
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(Component::Z),
            2 => Some(Component::R),
            3 => Some(Component::T),
            _ => None,
        }
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Component::Z => write!(f, "Z"),
            Component::R => write!(f, "R"),
            Component::T => write!(f, "T"),
        }
    }
}

impl FromStr for Component {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "Z" => Ok(Component::Z),
            "R" => Ok(Component::R),
            "T" => Ok(Component::T),
            other => Err(format!("Invalid component: {}", other)),
        }
    }
}

/// Geographic position of a station in degrees
///
/// Equality, hashing and ordering work on the exact bit pattern of the
/// coordinates so positions can key hash maps and sorted tables.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct HorizontalPosition {
    pub latitude: f64,
    pub longitude: f64,
}

impl HorizontalPosition {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }
}

impl PartialEq for HorizontalPosition {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HorizontalPosition {}

impl Hash for HorizontalPosition {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.latitude.to_bits().hash(state);
        self.longitude.to_bits().hash(state);
    }
}

impl PartialOrd for HorizontalPosition {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HorizontalPosition {
    fn cmp(&self, other: &Self) -> Ordering {
        self.latitude
            .total_cmp(&other.latitude)
            .then_with(|| self.longitude.total_cmp(&other.longitude))
    }
}

impl fmt::Display for HorizontalPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.latitude, self.longitude)
    }
}

/// Seismic station: name, network and position
///
/// Ordered by name, then network, then position.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Station {
    pub name: String,
    pub network: String,
    pub position: HorizontalPosition,
}

impl Station {
    pub fn new(name: &str, network: &str, latitude: f64, longitude: f64) -> Self {
        Self {
            name: name.trim().to_string(),
            network: network.trim().to_string(),
            position: HorizontalPosition::new(latitude, longitude),
        }
    }
}

impl fmt::Display for Station {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.name, self.network, self.position)
    }
}

/// Seismic event identifier (Global CMT ID)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventId(String);

impl EventId {
    pub fn new(id: &str) -> Self {
        Self(id.trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether `id` has the shape of a recent (yyyyMMddhhmm + letter) or a
    /// previous Harvard (MMddyy + letter) Global CMT ID
    pub fn is_global_cmt(id: &str) -> bool {
        static PATTERNS: OnceLock<(Regex, Regex)> = OnceLock::new();
        let (recent, previous) = PATTERNS.get_or_init(|| {
            (
                Regex::new(r"^20[0-9]{2}(0[1-9]|1[0-2])(0[1-9]|[12][0-9]|3[01])([01][0-9]|2[0-3])[0-5][0-9][A-Za-z]$")
                    .expect("static pattern"),
                Regex::new(r"^(0[1-9]|1[0-2])(0[1-9]|[12][0-9]|3[01])[0789][0-9][A-Za-z]$")
                    .expect("static pattern"),
            )
        });
        recent.is_match(id) || previous.is_match(id)
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// (station name, event, component) identifying one observed/synthetic pair
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AlignmentKey {
    pub station: String,
    pub event: EventId,
    pub component: Component,
}

impl AlignmentKey {
    pub fn new(station: &str, event: EventId, component: Component) -> Self {
        Self {
            station: station.to_string(),
            event,
            component,
        }
    }
}

impl fmt::Display for AlignmentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.station, self.event, self.component)
    }
}

/// Time shift and amplitude ratio between an observed waveform and its
/// synthetic.
///
/// For a synthetic window [t1, t2] the matching observed window is
/// [t1 - time_shift, t2 - time_shift]; observed amplitudes are divided by
/// `amplitude_ratio` (observed / synthetic).
///
/// Phases are an annotation only: they take no part in equality, hashing or
/// ordering and are not stored in correction files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaticCorrection {
    pub station: Station,
    pub event: EventId,
    pub component: Component,
    /// Start time of the synthetic window, used for identification
    pub synthetic_start_time: f64,
    /// Synthetic pick time minus observed pick time [s]
    pub time_shift: f64,
    pub amplitude_ratio: f64,
    pub phases: Vec<String>,
}

impl StaticCorrection {
    pub fn new(
        station: Station,
        event: EventId,
        component: Component,
        synthetic_start_time: f64,
        time_shift: f64,
        amplitude_ratio: f64,
    ) -> Self {
        Self {
            station,
            event,
            component,
            synthetic_start_time,
            time_shift,
            amplitude_ratio,
            phases: Vec::new(),
        }
    }

    pub fn with_phases(mut self, phases: Vec<String>) -> Self {
        self.phases = phases;
        self
    }

    pub fn key(&self) -> AlignmentKey {
        AlignmentKey::new(&self.station.name, self.event.clone(), self.component)
    }

    fn values(&self) -> [f64; 3] {
        [self.synthetic_start_time, self.time_shift, self.amplitude_ratio]
    }
}

impl PartialEq for StaticCorrection {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for StaticCorrection {}

impl Hash for StaticCorrection {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.station.hash(state);
        self.event.hash(state);
        self.component.hash(state);
        for value in self.values() {
            value.to_bits().hash(state);
        }
    }
}

impl PartialOrd for StaticCorrection {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for StaticCorrection {
    fn cmp(&self, other: &Self) -> Ordering {
        self.station
            .cmp(&other.station)
            .then_with(|| self.event.cmp(&other.event))
            .then_with(|| self.component.cmp(&other.component))
            .then_with(|| {
                self.values()
                    .iter()
                    .zip(other.values().iter())
                    .map(|(a, b)| a.total_cmp(b))
                    .find(|ord| *ord != Ordering::Equal)
                    .unwrap_or(Ordering::Equal)
            })
    }
}

impl fmt::Display for StaticCorrection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {} {} {} {}",
            self.station,
            self.event,
            self.component,
            self.synthetic_start_time,
            self.time_shift,
            self.amplitude_ratio,
            self.phases.join(",")
        )
    }
}

/// Closed time interval [start, end] in seconds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Timewindow {
    pub start: f64,
    pub end: f64,
}

impl Timewindow {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    pub fn length(&self) -> f64 {
        self.end - self.start
    }

    pub fn contains(&self, time: f64) -> bool {
        self.start <= time && time <= self.end
    }
}

/// Time window registered for one (station, event, component)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimewindowInformation {
    pub station: Station,
    pub event: EventId,
    pub component: Component,
    pub window: Timewindow,
    pub phases: Vec<String>,
}

impl TimewindowInformation {
    pub fn new(station: Station, event: EventId, component: Component, window: Timewindow) -> Self {
        Self {
            station,
            event,
            component,
            window,
            phases: Vec::new(),
        }
    }

    pub fn key(&self) -> AlignmentKey {
        AlignmentKey::new(&self.station.name, self.event.clone(), self.component)
    }
}

/// Errors raised by trace operations
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TraceError {
    #[error("Trace has no samples")]
    Empty,

    #[error("Time axis has {times} samples but amplitude has {amplitudes}")]
    LengthMismatch { times: usize, amplitudes: usize },

    #[error("No data in [{start}, {end}]")]
    EmptyWindow { start: f64, end: f64 },

    #[error("Trace needs at least {needed} samples, found {found}")]
    TooFewSamples { needed: usize, found: usize },
}

/// Window catalog lookup that did not yield exactly one window
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("Expected exactly one time window for {key}, found {found}")]
pub struct AmbiguousWindow {
    pub key: AlignmentKey,
    pub found: usize,
}

/// Errors raised while estimating one static correction
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EstimationError {
    #[error(transparent)]
    AmbiguousWindow(#[from] AmbiguousWindow),

    #[error("No synthetic counterpart {expected} for {key}")]
    PairNotFound { key: AlignmentKey, expected: String },

    #[error("Synthetic half-amplitude is zero for {0}")]
    DegenerateAmplitude(AlignmentKey),

    #[error("A different correction is already recorded for {0}")]
    DuplicateKey(AlignmentKey),

    #[error("Trace error: {0}")]
    Trace(#[from] TraceError),
}

/// Errors raised by correlation alignment
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AlignError {
    #[error("Sample interval {candidate} differs from the reference interval {reference}")]
    SamplingMismatch { reference: f64, candidate: f64 },

    #[error("Reference window has {reference} samples but the candidate window has {candidate}")]
    ReferenceTooShort { reference: usize, candidate: usize },

    #[error("Window [{start}, {end}] is not within the trace [{trace_start}, {trace_end}]")]
    WindowOutOfBounds {
        start: f64,
        end: f64,
        trace_start: f64,
        trace_end: f64,
    },

    #[error(transparent)]
    AmbiguousWindow(#[from] AmbiguousWindow),

    #[error("Window [{start}, {end}] does not overlap the reference within {max_lag} samples of lag")]
    NoOverlap { start: f64, end: f64, max_lag: usize },

    #[error("Correlation stacking needs a reference trace")]
    MissingReference,

    #[error("Trace error: {0}")]
    Trace(#[from] TraceError),
}

/// Errors raised by the static correction file codec
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("Corrupt static correction file: {0}")]
    CorruptFile(String),

    #[error("{table} index {index} is out of range for a table of {len}")]
    IndexOutOfRange {
        table: &'static str,
        index: usize,
        len: usize,
    },

    #[error("{count} distinct {table} exceed the 16-bit index range")]
    TableOverflow { table: &'static str, count: usize },

    #[error("{field} '{value}' is longer than {width} bytes")]
    FieldTooLong {
        field: &'static str,
        value: String,
        width: usize,
    },

    #[error("{field} '{value}' starts or ends with padding")]
    PaddedField { field: &'static str, value: String },

    #[error("Unknown component tag {0}")]
    UnknownComponent(u8),

    #[error("Divergent corrections share the key {0}")]
    DuplicateKey(AlignmentKey),
}

/// Top-level error for path-level and batch operations
#[derive(Debug, thiserror::Error)]
pub enum StaticsError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Estimation error: {0}")]
    Estimation(#[from] EstimationError),

    #[error("Alignment error: {0}")]
    Align(#[from] AlignError),
}

/// Result type for path-level and batch operations
pub type StaticsResult<T> = Result<T, StaticsError>;
