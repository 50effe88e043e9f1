//! Binary static correction file
//!
//! All numbers are big-endian.
//!
//! ```text
//! u16 station count, u16 event count
//! per station (24 bytes): name[8] network[8] f32 latitude f32 longitude
//! per event (15 bytes):   id[15]
//! per correction (17 bytes):
//!     u16 station index, u16 event index, u8 component tag,
//!     f32 synthetic start time, f32 time shift, f32 amplitude ratio
//! ```
//!
//! Strings are right-padded with spaces and trimmed on read, so strings
//! that start or end with padding are refused on write. Values survive a
//! write/read cycle only to single precision.

use crate::types::{
    AlignmentKey, CodecError, Component, EventId, StaticCorrection, StaticsResult, Station,
    EVENT_ID_WIDTH, NETWORK_WIDTH, STATION_NAME_WIDTH,
};
use chrono::Utc;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::io::Write;
use std::path::Path;

/// Bytes of the two table counts
pub const COUNTS_BYTES: usize = 4;

/// Bytes of one station entry
pub const STATION_BYTES: usize = STATION_NAME_WIDTH + NETWORK_WIDTH + 4 * 2;

/// Bytes of one event entry
pub const EVENT_BYTES: usize = EVENT_ID_WIDTH;

/// Bytes of one correction entry
pub const ONE_CORRECTION_BYTES: usize = 17;

const PADDING: u8 = b' ';

/// File name `{prefix}{yyyyMMddHHmmss}.dat` stamped with the current UTC time
pub fn default_output_name(prefix: &str) -> String {
    format!("{}{}.dat", prefix, Utc::now().format("%Y%m%d%H%M%S"))
}

/// Header length for the given table sizes
pub fn header_len(stations: usize, events: usize) -> usize {
    COUNTS_BYTES + STATION_BYTES * stations + EVENT_BYTES * events
}

/// Serialize `corrections` into the binary layout.
///
/// Nothing is produced unless every correction fits: tables are limited to
/// 65535 entries, strings to their field widths, and two different
/// corrections may not share a (station, event, component) key.
pub fn encode<'a, I>(corrections: I) -> Result<Vec<u8>, CodecError>
where
    I: IntoIterator<Item = &'a StaticCorrection>,
{
    let corrections: Vec<&StaticCorrection> = corrections.into_iter().collect();

    let mut seen: HashMap<(&Station, &EventId, Component), &StaticCorrection> = HashMap::new();
    for &correction in &corrections {
        let key = (&correction.station, &correction.event, correction.component);
        if let Some(previous) = seen.insert(key, correction) {
            if previous != correction {
                return Err(CodecError::DuplicateKey(correction.key()));
            }
        }
    }

    let stations: BTreeSet<&Station> = corrections.iter().map(|c| &c.station).collect();
    let events: BTreeSet<&EventId> = corrections.iter().map(|c| &c.event).collect();
    let station_count = table_count("stations", stations.len())?;
    let event_count = table_count("events", events.len())?;

    for station in &stations {
        check_width("station name", &station.name, STATION_NAME_WIDTH)?;
        check_width("network", &station.network, NETWORK_WIDTH)?;
    }
    for event in &events {
        check_width("event id", event.as_str(), EVENT_ID_WIDTH)?;
    }

    let station_index: HashMap<&Station, u16> = stations
        .iter()
        .enumerate()
        .map(|(i, station)| (*station, i as u16))
        .collect();
    let event_index: HashMap<&EventId, u16> = events
        .iter()
        .enumerate()
        .map(|(i, event)| (*event, i as u16))
        .collect();

    let mut bytes = Vec::with_capacity(
        header_len(stations.len(), events.len()) + ONE_CORRECTION_BYTES * seen.len(),
    );
    bytes.extend_from_slice(&station_count.to_be_bytes());
    bytes.extend_from_slice(&event_count.to_be_bytes());

    for station in &stations {
        put_padded(&mut bytes, &station.name, STATION_NAME_WIDTH);
        put_padded(&mut bytes, &station.network, NETWORK_WIDTH);
        bytes.extend_from_slice(&(station.position.latitude as f32).to_be_bytes());
        bytes.extend_from_slice(&(station.position.longitude as f32).to_be_bytes());
    }
    for event in &events {
        put_padded(&mut bytes, event.as_str(), EVENT_ID_WIDTH);
    }

    let mut written = HashSet::new();
    for &correction in &corrections {
        if !written.insert((&correction.station, &correction.event, correction.component)) {
            continue;
        }
        bytes.extend_from_slice(&station_index[&correction.station].to_be_bytes());
        bytes.extend_from_slice(&event_index[&correction.event].to_be_bytes());
        bytes.push(correction.component.tag());
        bytes.extend_from_slice(&(correction.synthetic_start_time as f32).to_be_bytes());
        bytes.extend_from_slice(&(correction.time_shift as f32).to_be_bytes());
        bytes.extend_from_slice(&(correction.amplitude_ratio as f32).to_be_bytes());
    }

    Ok(bytes)
}

/// Parse the binary layout back into a set of corrections.
///
/// The whole buffer is validated; a malformed buffer never yields a partial
/// set.
pub fn decode(bytes: &[u8]) -> Result<HashSet<StaticCorrection>, CodecError> {
    if bytes.len() < COUNTS_BYTES {
        return Err(CodecError::CorruptFile(format!(
            "{} bytes cannot hold the table counts",
            bytes.len()
        )));
    }
    let station_count = read_u16(bytes, 0) as usize;
    let event_count = read_u16(bytes, 2) as usize;
    let header = header_len(station_count, event_count);

    if bytes.len() < header {
        return Err(CodecError::CorruptFile(format!(
            "header of {} stations and {} events needs {} bytes, found {}",
            station_count,
            event_count,
            header,
            bytes.len()
        )));
    }
    let body = &bytes[header..];
    if body.len() % ONE_CORRECTION_BYTES != 0 {
        return Err(CodecError::CorruptFile(format!(
            "{} bytes after the header are not a multiple of {}",
            body.len(),
            ONE_CORRECTION_BYTES
        )));
    }

    let stations: Vec<Station> = bytes[COUNTS_BYTES..COUNTS_BYTES + STATION_BYTES * station_count]
        .chunks_exact(STATION_BYTES)
        .map(read_station)
        .collect();
    let events: Vec<EventId> = bytes[COUNTS_BYTES + STATION_BYTES * station_count..header]
        .chunks_exact(EVENT_BYTES)
        .map(|chunk| EventId::new(&read_padded(chunk)))
        .collect();

    let corrections = parse_corrections(body, &stations, &events)?;
    log::debug!(
        "Decoded {} static corrections ({} stations, {} events)",
        corrections.len(),
        stations.len(),
        events.len()
    );
    Ok(corrections)
}

#[cfg(feature = "parallel")]
fn parse_corrections(
    body: &[u8],
    stations: &[Station],
    events: &[EventId],
) -> Result<HashSet<StaticCorrection>, CodecError> {
    use rayon::prelude::*;

    body.par_chunks_exact(ONE_CORRECTION_BYTES)
        .map(|chunk| read_correction(chunk, stations, events))
        .collect()
}

#[cfg(not(feature = "parallel"))]
fn parse_corrections(
    body: &[u8],
    stations: &[Station],
    events: &[EventId],
) -> Result<HashSet<StaticCorrection>, CodecError> {
    body.chunks_exact(ONE_CORRECTION_BYTES)
        .map(|chunk| read_correction(chunk, stations, events))
        .collect()
}

fn read_correction(chunk: &[u8], stations: &[Station], events: &[EventId]) -> Result<StaticCorrection, CodecError> {
    let station_index = read_u16(chunk, 0) as usize;
    let event_index = read_u16(chunk, 2) as usize;
    let station = stations.get(station_index).ok_or(CodecError::IndexOutOfRange {
        table: "station",
        index: station_index,
        len: stations.len(),
    })?;
    let event = events.get(event_index).ok_or(CodecError::IndexOutOfRange {
        table: "event",
        index: event_index,
        len: events.len(),
    })?;
    let component = Component::from_tag(chunk[4]).ok_or(CodecError::UnknownComponent(chunk[4]))?;

    Ok(StaticCorrection::new(
        station.clone(),
        event.clone(),
        component,
        read_f32(chunk, 5) as f64,
        read_f32(chunk, 9) as f64,
        read_f32(chunk, 13) as f64,
    ))
}

fn read_station(chunk: &[u8]) -> Station {
    let name = read_padded(&chunk[..STATION_NAME_WIDTH]);
    let network = read_padded(&chunk[STATION_NAME_WIDTH..STATION_NAME_WIDTH + NETWORK_WIDTH]);
    let position = STATION_NAME_WIDTH + NETWORK_WIDTH;
    Station::new(
        &name,
        &network,
        read_f32(chunk, position) as f64,
        read_f32(chunk, position + 4) as f64,
    )
}

fn read_u16(bytes: &[u8], at: usize) -> u16 {
    u16::from_be_bytes([bytes[at], bytes[at + 1]])
}

fn read_f32(bytes: &[u8], at: usize) -> f32 {
    f32::from_be_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

fn is_padding(c: char) -> bool {
    c == ' ' || c == '\0'
}

fn read_padded(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).trim_matches(is_padding).to_string()
}

fn put_padded(bytes: &mut Vec<u8>, value: &str, width: usize) {
    bytes.extend_from_slice(value.as_bytes());
    bytes.extend(std::iter::repeat(PADDING).take(width - value.len()));
}

fn table_count(table: &'static str, count: usize) -> Result<u16, CodecError> {
    u16::try_from(count).map_err(|_| CodecError::TableOverflow { table, count })
}

fn check_width(field: &'static str, value: &str, width: usize) -> Result<(), CodecError> {
    if value.len() > width {
        return Err(CodecError::FieldTooLong {
            field,
            value: value.to_string(),
            width,
        });
    }
    // padding would be trimmed away on read
    if value.trim_matches(is_padding) != value {
        return Err(CodecError::PaddedField {
            field,
            value: value.to_string(),
        });
    }
    Ok(())
}

/// Path-level access to static correction files
pub struct StaticCorrectionFile;

impl StaticCorrectionFile {
    /// Read every correction in `path`
    pub fn read<P: AsRef<Path>>(path: P) -> StaticsResult<HashSet<StaticCorrection>> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        let corrections = decode(&bytes)?;
        log::info!("{} static corrections are read from {}", corrections.len(), path.display());
        Ok(corrections)
    }

    /// Write `corrections` to `path`.
    ///
    /// The file is encoded in memory and written to a temporary file next to
    /// `path`, which then replaces `path`. On any error `path` is untouched.
    pub fn write<'a, I, P>(corrections: I, path: P) -> StaticsResult<()>
    where
        I: IntoIterator<Item = &'a StaticCorrection>,
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        let bytes = encode(corrections)?;

        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut file = tempfile::NamedTempFile::new_in(dir)?;
        file.write_all(&bytes)?;
        file.as_file().sync_all()?;
        file.persist(path).map_err(|e| e.error)?;

        log::info!("{} bytes of static corrections are written to {}", bytes.len(), path.display());
        Ok(())
    }

    /// Corrections in display order: station, event, component, values
    pub fn sorted(corrections: &HashSet<StaticCorrection>) -> Vec<StaticCorrection> {
        let mut sorted: Vec<StaticCorrection> = corrections.iter().cloned().collect();
        sorted.sort();
        sorted
    }

    /// Key of every correction, for quick membership checks
    pub fn keys(corrections: &HashSet<StaticCorrection>) -> HashSet<AlignmentKey> {
        corrections.iter().map(StaticCorrection::key).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn correction(station: &str, event: &str, component: Component, shift: f64) -> StaticCorrection {
        StaticCorrection::new(
            Station::new(station, "IU", 35.5, -120.25),
            EventId::new(event),
            component,
            120.0,
            shift,
            1.5,
        )
    }

    #[test]
    fn test_layout() {
        let corrections = vec![
            correction("MAJO", "201104170158A", Component::T, 0.5),
            correction("ANMO", "201104170158A", Component::R, -1.25),
        ];
        let bytes = encode(&corrections).unwrap();
        assert_eq!(bytes.len(), header_len(2, 1) + 2 * ONE_CORRECTION_BYTES);
        assert_eq!(&bytes[..4], &[0, 2, 0, 1]);
        // stations are sorted: ANMO first
        assert_eq!(&bytes[4..12], b"ANMO    ");
        assert_eq!(&bytes[12..20], b"IU      ");
        assert_eq!(&bytes[20..24], &35.5f32.to_be_bytes());
        assert_eq!(&bytes[52..67], b"201104170158A  ");

        // MAJO is written first and refers to station index 1
        let first = &bytes[67..84];
        assert_eq!(&first[..5], &[0, 1, 0, 0, 3]);
        assert_eq!(&first[9..13], &0.5f32.to_be_bytes());
    }

    #[test]
    fn test_decode_rejects_bad_index() {
        let mut bytes = encode(&[correction("ANMO", "201104170158A", Component::Z, 0.0)]).unwrap();
        let entry = header_len(1, 1);
        bytes[entry + 2..entry + 4].copy_from_slice(&7u16.to_be_bytes());
        assert!(matches!(
            decode(&bytes),
            Err(CodecError::IndexOutOfRange { table: "event", index: 7, len: 1 })
        ));
    }

    #[test]
    fn test_decode_rejects_bad_station_index() {
        let mut bytes = encode(&[correction("ANMO", "201104170158A", Component::Z, 0.0)]).unwrap();
        let entry = header_len(1, 1);
        bytes[entry..entry + 2].copy_from_slice(&1u16.to_be_bytes());
        assert!(matches!(
            decode(&bytes),
            Err(CodecError::IndexOutOfRange { table: "station", index: 1, len: 1 })
        ));
    }

    #[test]
    fn test_encode_rejects_padded_fields() {
        let mut padded = correction("ANMO", "201104170158A", Component::Z, 0.0);
        padded.station.name = "AB ".to_string();
        assert!(matches!(
            encode(&[padded]),
            Err(CodecError::PaddedField { field: "station name", .. })
        ));

        let mut nul = correction("ANMO", "201104170158A", Component::Z, 0.0);
        nul.station.network = "\0IU".to_string();
        assert!(matches!(encode(&[nul]), Err(CodecError::PaddedField { field: "network", .. })));
    }

    #[test]
    fn test_decode_rejects_unknown_component() {
        let mut bytes = encode(&[correction("ANMO", "201104170158A", Component::Z, 0.0)]).unwrap();
        let entry = header_len(1, 1);
        bytes[entry + 4] = 9;
        assert!(matches!(decode(&bytes), Err(CodecError::UnknownComponent(9))));
    }

    #[test]
    fn test_decode_rejects_short_header() {
        assert!(matches!(decode(&[0, 1]), Err(CodecError::CorruptFile(_))));
        assert!(matches!(decode(&[0, 1, 0, 1, 0, 0]), Err(CodecError::CorruptFile(_))));
    }

    #[test]
    fn test_encode_rejects_long_fields() {
        let long_name = correction("TOOLONGNAME", "201104170158A", Component::Z, 0.0);
        assert!(matches!(
            encode(&[long_name]),
            Err(CodecError::FieldTooLong { field: "station name", width: 8, .. })
        ));
        let long_event = correction("ANMO", "2011041701580000A", Component::Z, 0.0);
        assert!(matches!(
            encode(&[long_event]),
            Err(CodecError::FieldTooLong { field: "event id", width: 15, .. })
        ));
    }

    #[test]
    fn test_encode_rejects_divergent_duplicates() {
        let a = correction("ANMO", "201104170158A", Component::Z, 0.0);
        let b = correction("ANMO", "201104170158A", Component::Z, 1.0);
        assert!(matches!(encode(&[a.clone(), b]), Err(CodecError::DuplicateKey(_))));

        let bytes = encode(&[a.clone(), a]).unwrap();
        assert_eq!(bytes.len(), header_len(1, 1) + ONE_CORRECTION_BYTES);
    }

    #[test]
    fn test_default_output_name() {
        let name = default_output_name("peakCorrection");
        assert!(name.starts_with("peakCorrection"));
        assert!(name.ends_with(".dat"));
        assert_eq!(name.len(), "peakCorrection".len() + 14 + 4);
    }

    #[test]
    fn test_empty_set() {
        let bytes = encode(&Vec::<StaticCorrection>::new()).unwrap();
        assert_eq!(bytes, vec![0, 0, 0, 0]);
        assert!(decode(&bytes).unwrap().is_empty());
    }
}
