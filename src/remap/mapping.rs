//! Status mapping: trigger code → replacement code.

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::observability::metrics;

/// Immutable lookup table from trigger code to replacement code.
///
/// Codes are not range checked; a replacement the transport cannot send fails
/// at commit time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusMapping {
    codes: HashMap<u16, u16>,
}

impl StatusMapping {
    /// Build a mapping from string pairs.
    ///
    /// Pairs whose key or value is not an integer status code are logged and
    /// skipped. A later pair replaces an earlier one with the same key.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut codes = HashMap::new();
        for (key, value) in pairs {
            let (key, value) = (key.as_ref(), value.as_ref());
            match (key.trim().parse::<u16>(), value.trim().parse::<u16>()) {
                (Ok(from), Ok(to)) => {
                    codes.insert(from, to);
                }
                _ => {
                    tracing::warn!(key = %key, value = %value, "Invalid HTTP status code mapping '{}'->'{}'", key, value);
                    metrics::record_invalid_pair();
                }
            }
        }
        Self { codes }
    }

    pub fn get(&self, code: u16) -> Option<u16> {
        self.codes.get(&code).copied()
    }

    pub fn contains(&self, code: u16) -> bool {
        self.codes.contains_key(&code)
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    /// Entries sorted by trigger code, for logging.
    pub fn entries(&self) -> Vec<(u16, u16)> {
        let mut entries: Vec<_> = self.codes.iter().map(|(k, v)| (*k, *v)).collect();
        entries.sort_unstable();
        entries
    }
}

impl FromIterator<(u16, u16)> for StatusMapping {
    fn from_iter<I: IntoIterator<Item = (u16, u16)>>(iter: I) -> Self {
        Self {
            codes: iter.into_iter().collect(),
        }
    }
}

/// Mapping shared by every request and replaced wholesale on reload.
///
/// Requests take one snapshot at entry; a swap never affects a request that
/// already started.
#[derive(Debug, Clone)]
pub struct SharedMapping {
    current: Arc<ArcSwap<StatusMapping>>,
}

impl SharedMapping {
    pub fn new(mapping: StatusMapping) -> Self {
        Self {
            current: Arc::new(ArcSwap::from_pointee(mapping)),
        }
    }

    pub fn load(&self) -> Arc<StatusMapping> {
        self.current.load_full()
    }

    pub fn store(&self, mapping: StatusMapping) {
        tracing::info!(entries = mapping.len(), "Status mapping replaced");
        self.current.store(Arc::new(mapping));
    }
}

impl Default for SharedMapping {
    fn default() -> Self {
        Self::new(StatusMapping::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malformed_pairs_are_skipped() {
        let mapping =
            StatusMapping::from_pairs([("404", "410"), ("abc", "500"), ("405", "xyz")]);

        assert_eq!(mapping.len(), 1);
        assert_eq!(mapping.get(404), Some(410));
        assert!(!mapping.contains(405));
    }

    #[test]
    fn test_out_of_range_codes_are_kept() {
        let mapping = StatusMapping::from_pairs([("404", "42"), ("999", "200")]);
        assert_eq!(mapping.get(404), Some(42));
        assert_eq!(mapping.get(999), Some(200));
    }

    #[test]
    fn test_values_wider_than_u16_are_malformed() {
        let mapping = StatusMapping::from_pairs([("404", "70000"), ("-1", "200")]);
        assert!(mapping.is_empty());
    }

    #[test]
    fn test_later_pair_wins() {
        let mapping = StatusMapping::from_pairs(vec![
            ("404".to_string(), "410".to_string()),
            ("404".to_string(), "451".to_string()),
        ]);
        assert_eq!(mapping.entries(), vec![(404, 451)]);
    }

    #[test]
    fn test_shared_mapping_swap() {
        let shared = SharedMapping::new([(404, 410)].into_iter().collect());
        let before = shared.load();

        shared.store(StatusMapping::from_pairs([("500", "503")]));

        assert_eq!(before.get(404), Some(410));
        assert_eq!(shared.load().get(404), None);
        assert_eq!(shared.load().get(500), Some(503));
    }
}
