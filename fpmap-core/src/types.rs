//! Core types for fpmap

use crate::config::MAX_MAPPED_FP;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;
const LABEL_SEPARATOR: u8 = 0xff;

/// 64-bit series identifier derived from a metric's label set
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Fingerprint(pub u64);

impl Fingerprint {
    /// Whether the fingerprint lies in the band reserved for mapped fingerprints
    pub fn is_reserved(self) -> bool {
        self.0 >= 1 && self.0 <= MAX_MAPPED_FP
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl FromStr for Fingerprint {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.trim();
        let s = s.strip_prefix("0x").unwrap_or(s);
        u64::from_str_radix(s, 16)
            .map(Fingerprint)
            .map_err(|e| format!("Invalid fingerprint {:?}: {}", s, e))
    }
}

/// An immutable label set identifying a series.
///
/// Labels are kept sorted by name, so equality, hashing and serialization do
/// not depend on the order labels were added in.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Metric(BTreeMap<String, String>);

impl Metric {
    /// Create an empty metric
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Add a label to the metric
    pub fn with_label(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }

    /// Get a label value
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    /// Number of labels
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over labels in name order
    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.0.iter()
    }

    /// Default fingerprint: FNV-1a over every label name and value, each
    /// followed by a 0xff separator.
    pub fn fingerprint(&self) -> Fingerprint {
        let mut hash = FNV_OFFSET_BASIS;
        for (name, value) in &self.0 {
            hash = fnv1a(hash, name.as_bytes());
            hash = fnv1a(hash, &[LABEL_SEPARATOR]);
            hash = fnv1a(hash, value.as_bytes());
            hash = fnv1a(hash, &[LABEL_SEPARATOR]);
        }
        Fingerprint(hash)
    }
}

fn fnv1a(mut hash: u64, bytes: &[u8]) -> u64 {
    for b in bytes {
        hash ^= *b as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Metric {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (k, v)) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}={:?}", k, v)?;
        }
        write!(f, "}}")
    }
}

/// Parses `name=value` pairs separated by commas, e.g. `job=api,instance=a:80`.
impl FromStr for Metric {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let mut metric = Metric::new();
        for pair in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (name, value) = pair
                .split_once('=')
                .ok_or_else(|| format!("Invalid label pair: {}", pair))?;
            let name = name.trim();
            if name.is_empty() {
                return Err(format!("Empty label name in: {}", pair));
            }
            if metric.0.contains_key(name) {
                return Err(format!("Duplicate label name: {}", name));
            }
            metric = metric.with_label(name, value.trim().trim_matches('"'));
        }
        Ok(metric)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_equality_ignores_label_order() {
        let a = Metric::new().with_label("foo", "bar").with_label("dings", "bumms");
        let b = Metric::new().with_label("dings", "bumms").with_label("foo", "bar");
        assert_eq!(a, b);
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_ne!(a, Metric::new().with_label("foo", "bar"));
    }

    #[test]
    fn test_fingerprint_fnv() {
        assert_eq!(Metric::new().fingerprint(), Fingerprint(FNV_OFFSET_BASIS));

        let a = Metric::new().with_label("foo", "bar");
        let b = Metric::new().with_label("foo", "baz");
        assert_ne!(a.fingerprint(), b.fingerprint());

        // The separator keeps label boundaries significant.
        let c = Metric::new().with_label("ab", "c");
        let d = Metric::new().with_label("a", "bc");
        assert_ne!(c.fingerprint(), d.fingerprint());
    }

    #[test]
    fn test_fingerprint_display_and_parse() {
        let fp = Fingerprint(0xdead_beef);
        assert_eq!(fp.to_string(), "00000000deadbeef");
        assert_eq!("00000000deadbeef".parse::<Fingerprint>().unwrap(), fp);
        assert_eq!("0xdeadbeef".parse::<Fingerprint>().unwrap(), fp);
        assert!("xyz".parse::<Fingerprint>().is_err());
    }

    #[test]
    fn test_reserved_band() {
        assert!(!Fingerprint(0).is_reserved());
        assert!(Fingerprint(1).is_reserved());
        assert!(Fingerprint(MAX_MAPPED_FP).is_reserved());
        assert!(!Fingerprint(MAX_MAPPED_FP + 1).is_reserved());
    }

    #[test]
    fn test_metric_parse() {
        let m: Metric = "job=api, instance=\"a:80\"".parse().unwrap();
        assert_eq!(m.get("job"), Some("api"));
        assert_eq!(m.get("instance"), Some("a:80"));
        assert_eq!(m.to_string(), "{instance=\"a:80\", job=\"api\"}");

        assert!("job".parse::<Metric>().is_err());
        assert!("=x".parse::<Metric>().is_err());
        assert!("a=1,a=2".parse::<Metric>().is_err());
        assert!("".parse::<Metric>().unwrap().is_empty());
    }
}
