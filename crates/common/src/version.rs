//! Appliance product versions

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Dotted numeric product version such as `5.9.2.4`
///
/// Missing trailing components compare as zero, so `5.9 == 5.9.0`.
/// The special value `master` sorts above every numbered release.
#[derive(Debug, Clone)]
pub struct Version {
    parts: Vec<u32>,
    latest: bool,
}

impl Version {
    pub fn new(parts: &[u32]) -> Self {
        Self {
            parts: parts.to_vec(),
            latest: false,
        }
    }

    /// The upstream development stream
    pub fn latest() -> Self {
        Self {
            parts: Vec::new(),
            latest: true,
        }
    }

    pub fn is_latest(&self) -> bool {
        self.latest
    }

    pub fn parts(&self) -> &[u32] {
        &self.parts
    }

    fn component(&self, idx: usize) -> u32 {
        self.parts.get(idx).copied().unwrap_or(0)
    }
}

impl FromStr for Version {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("master") || s.eq_ignore_ascii_case("latest") {
            return Ok(Self::latest());
        }
        if s.is_empty() {
            return Err(Error::InvalidVersion(s.to_string()));
        }

        let parts = s
            .split(['.', '-'])
            .map(|p| p.parse::<u32>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| Error::InvalidVersion(s.to_string()))?;

        Ok(Self {
            parts,
            latest: false,
        })
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.latest, other.latest) {
            (true, true) => return Ordering::Equal,
            (true, false) => return Ordering::Greater,
            (false, true) => return Ordering::Less,
            (false, false) => {}
        }

        let len = self.parts.len().max(other.parts.len());
        (0..len)
            .map(|i| self.component(i).cmp(&other.component(i)))
            .find(|o| *o != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.latest {
            return write!(f, "master");
        }
        let rendered: Vec<String> = self.parts.iter().map(|p| p.to_string()).collect();
        write!(f, "{}", rendered.join("."))
    }
}

impl Serialize for Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn v(s: &str) -> Version {
        s.parse().unwrap()
    }

    #[test_case("5.6.2", "5.6.3" ; "patch level")]
    #[test_case("5.5", "5.6.3" ; "shorter is padded")]
    #[test_case("5.9.10", "5.10" ; "numeric not lexical")]
    #[test_case("5.11.0.1", "master" ; "master is newest")]
    fn test_ordering(lower: &str, higher: &str) {
        assert!(v(lower) < v(higher));
        assert!(v(higher) > v(lower));
    }

    #[test]
    fn test_trailing_zero_is_equal() {
        assert_eq!(v("5.9"), v("5.9.0"));
        assert_eq!(v("5.9.0").to_string(), "5.9.0");
    }

    #[test]
    fn test_rejects_garbage() {
        assert!("".parse::<Version>().is_err());
        assert!("5.x".parse::<Version>().is_err());
    }

    #[test]
    fn test_serde_round_trip_as_string() {
        let json = serde_json::to_string(&v("5.8.1")).unwrap();
        assert_eq!(json, "\"5.8.1\"");
        let back: Version = serde_json::from_str(&json).unwrap();
        assert_eq!(back, v("5.8.1"));
    }
}
