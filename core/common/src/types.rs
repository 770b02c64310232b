//! Common types used throughout VaultSync.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// A normalized, slash-separated path relative to a replica root.
///
/// The same logical path addresses a file on both replicas; remote
/// locations are obtained by joining it onto the configured remote root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SyncPath {
    components: Vec<String>,
}

impl SyncPath {
    /// Create a root path.
    pub fn root() -> Self {
        Self {
            components: Vec::new(),
        }
    }

    /// Create a path from string components.
    ///
    /// # Errors
    /// - Returns error if any component is empty, contains a separator,
    ///   or is a `.`/`..` traversal
    pub fn from_components(components: Vec<String>) -> crate::Result<Self> {
        for comp in &components {
            if comp.is_empty() {
                return Err(crate::Error::InvalidInput(
                    "Path component cannot be empty".to_string(),
                ));
            }
            if comp.contains('/') || comp.contains('\\') {
                return Err(crate::Error::InvalidInput(
                    "Path component cannot contain separators".to_string(),
                ));
            }
            if comp == "." || comp == ".." {
                return Err(crate::Error::InvalidInput(format!(
                    "Path component cannot be '{}'",
                    comp
                )));
            }
        }
        Ok(Self { components })
    }

    /// Parse a path string into a SyncPath.
    ///
    /// Uses '/' as separator. Leading and trailing separators are stripped,
    /// so `/notes/a.md` and `notes/a.md` name the same path.
    pub fn parse(path: &str) -> crate::Result<Self> {
        let path = path.trim_start_matches('/').trim_end_matches('/');
        if path.is_empty() {
            return Ok(Self::root());
        }

        let components: Vec<String> = path.split('/').map(String::from).collect();
        Self::from_components(components)
    }

    /// Check if this is the root path.
    pub fn is_root(&self) -> bool {
        self.components.is_empty()
    }

    /// Get the parent path, if any.
    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            None
        } else {
            let mut components = self.components.clone();
            components.pop();
            Some(Self { components })
        }
    }

    /// Get the file/directory name (last component).
    pub fn name(&self) -> Option<&str> {
        self.components.last().map(|s| s.as_str())
    }

    /// Join this path with a child component.
    pub fn join(&self, child: &str) -> crate::Result<Self> {
        let mut components = self.components.clone();
        components.push(child.to_string());
        Self::from_components(components)
    }

    /// Append every component of `other` to this path.
    pub fn join_path(&self, other: &SyncPath) -> Self {
        let mut components = self.components.clone();
        components.extend(other.components.iter().cloned());
        Self { components }
    }

    /// Get the path components.
    pub fn components(&self) -> &[String] {
        &self.components
    }

    /// Convert to the slash-separated relative form.
    pub fn as_relative(&self) -> String {
        self.components.join("/")
    }
}

impl fmt::Display for SyncPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_relative())
    }
}

impl TryFrom<String> for SyncPath {
    type Error = crate::Error;

    fn try_from(value: String) -> crate::Result<Self> {
        Self::parse(&value)
    }
}

impl From<SyncPath> for String {
    fn from(path: SyncPath) -> Self {
        path.as_relative()
    }
}

/// A modification time in milliseconds since the Unix epoch.
///
/// Replica mtimes and last-synced values are compared with exact equality,
/// so the type carries no sub-millisecond precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    /// Create a timestamp from milliseconds since the epoch.
    pub const fn from_millis(millis: i64) -> Self {
        Self(millis)
    }

    /// Milliseconds since the epoch.
    pub const fn as_millis(&self) -> i64 {
        self.0
    }

    /// The current wall-clock time.
    pub fn now() -> Self {
        Self(Utc::now().timestamp_millis())
    }

    /// Convert from a filesystem time, truncating to milliseconds.
    pub fn from_system_time(time: SystemTime) -> Self {
        match time.duration_since(UNIX_EPOCH) {
            Ok(after) => Self(after.as_millis() as i64),
            Err(before) => Self(-(before.duration().as_millis() as i64)),
        }
    }

    /// Convert to a filesystem time.
    pub fn to_system_time(&self) -> SystemTime {
        if self.0 >= 0 {
            UNIX_EPOCH + Duration::from_millis(self.0 as u64)
        } else {
            UNIX_EPOCH - Duration::from_millis(self.0.unsigned_abs())
        }
    }

    /// Convert to a chrono UTC datetime, if representable.
    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.0).single()
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(value: DateTime<Utc>) -> Self {
        Self(value.timestamp_millis())
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_datetime() {
            Some(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S%.3f UTC")),
            None => write!(f, "{}ms", self.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_sync_path_root() {
        let path = SyncPath::root();
        assert!(path.is_root());
        assert_eq!(path.to_string(), "");
        assert_eq!(SyncPath::parse("/").unwrap(), path);
    }

    #[test]
    fn test_sync_path_parse() {
        let path = SyncPath::parse("/notes/daily/2024.md").unwrap();
        assert_eq!(path.components(), &["notes", "daily", "2024.md"]);
        assert_eq!(path.to_string(), "notes/daily/2024.md");
    }

    #[test]
    fn test_sync_path_leading_separator_is_stripped() {
        assert_eq!(
            SyncPath::parse("/a.md").unwrap(),
            SyncPath::parse("a.md").unwrap()
        );
    }

    #[test]
    fn test_sync_path_rejects_traversal() {
        assert!(SyncPath::parse("notes/../secret").is_err());
        assert!(SyncPath::parse("./a.md").is_err());
        assert!(SyncPath::parse("a//b").is_err());
    }

    #[test]
    fn test_sync_path_join() {
        let path = SyncPath::root().join("foo").unwrap().join("bar").unwrap();
        assert_eq!(path.to_string(), "foo/bar");
        assert!(path.join("a/b").is_err());
    }

    #[test]
    fn test_sync_path_join_path() {
        let root = SyncPath::parse("Obsidian Vault").unwrap();
        let rel = SyncPath::parse("notes/a.md").unwrap();
        assert_eq!(root.join_path(&rel).to_string(), "Obsidian Vault/notes/a.md");
        assert_eq!(SyncPath::root().join_path(&rel), rel);
    }

    #[test]
    fn test_sync_path_parent_and_name() {
        let path = SyncPath::parse("foo/bar").unwrap();
        assert_eq!(path.parent().unwrap().to_string(), "foo");
        assert_eq!(path.name(), Some("bar"));
        assert!(SyncPath::root().parent().is_none());
    }

    #[test]
    fn test_sync_path_serializes_as_string() {
        let path = SyncPath::parse("a/b.md").unwrap();
        let json = serde_json::to_string(&path).unwrap();
        assert_eq!(json, "\"a/b.md\"");
        let back: SyncPath = serde_json::from_str(&json).unwrap();
        assert_eq!(back, path);
    }

    #[test]
    fn test_timestamp_serializes_as_integer() {
        let ts = Timestamp::from_millis(1_700_000_000_123);
        assert_eq!(serde_json::to_string(&ts).unwrap(), "1700000000123");
    }

    #[test]
    fn test_timestamp_display() {
        let ts = Timestamp::from_millis(0);
        assert_eq!(ts.to_string(), "1970-01-01 00:00:00.000 UTC");
    }

    proptest! {
        #[test]
        fn prop_timestamp_system_time_round_trip(millis in -10_000_000_000_000i64..10_000_000_000_000i64) {
            let ts = Timestamp::from_millis(millis);
            prop_assert_eq!(Timestamp::from_system_time(ts.to_system_time()), ts);
        }
    }
}
