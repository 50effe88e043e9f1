use crate::types::{AlignmentKey, AmbiguousWindow, TimewindowInformation};
use std::collections::HashMap;

/// Read-only set of time windows indexed by (station, event, component)
///
/// Built once by the caller and passed by reference to estimators and
/// stackers.
#[derive(Debug, Clone, Default)]
pub struct TimewindowCatalog {
    windows: Vec<TimewindowInformation>,
    index: HashMap<AlignmentKey, Vec<usize>>,
}

impl TimewindowCatalog {
    pub fn new(windows: Vec<TimewindowInformation>) -> Self {
        let mut index: HashMap<AlignmentKey, Vec<usize>> = HashMap::new();
        for (i, info) in windows.iter().enumerate() {
            index.entry(info.key()).or_default().push(i);
        }
        log::debug!(
            "Time window catalog: {} windows for {} keys",
            windows.len(),
            index.len()
        );
        Self { windows, index }
    }

    /// The single window registered for `key`
    pub fn lookup(&self, key: &AlignmentKey) -> Result<&TimewindowInformation, AmbiguousWindow> {
        match self.index.get(key).map(Vec::as_slice) {
            Some([only]) => Ok(&self.windows[*only]),
            found => Err(AmbiguousWindow {
                key: key.clone(),
                found: found.map_or(0, <[usize]>::len),
            }),
        }
    }

    pub fn contains(&self, key: &AlignmentKey) -> bool {
        self.index.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TimewindowInformation> {
        self.windows.iter()
    }
}

impl FromIterator<TimewindowInformation> for TimewindowCatalog {
    fn from_iter<I: IntoIterator<Item = TimewindowInformation>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
