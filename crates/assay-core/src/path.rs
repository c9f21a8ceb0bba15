//! Dotted tag paths
//!
//! `Plant A.Pump-01.pressure` names the `pressure` attribute of asset
//! `Pump-01`, a child of root asset `Plant A`. Empty segments are ignored, so
//! `Plant A..Pump-01.pressure.` is the same path.

use crate::{Error, Result};
use std::fmt;

/// Split a dotted path into its non-empty segments
pub fn segments(path: &str) -> Vec<String> {
    path.split('.')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// A tag path: at least one asset segment followed by an attribute name
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TagPath {
    segments: Vec<String>,
}

impl TagPath {
    /// Parse a tag path, requiring at least two segments
    pub fn parse(path: &str) -> Result<Self> {
        let segments = segments(path);
        if segments.len() < 2 {
            return Err(Error::PathNotFound(path.to_string()));
        }
        Ok(Self { segments })
    }

    /// Segments naming the asset, root first
    pub fn asset_segments(&self) -> &[String] {
        &self.segments[..self.segments.len() - 1]
    }

    /// The trailing segment: the template item name
    pub fn attribute_name(&self) -> &str {
        &self.segments[self.segments.len() - 1]
    }

    /// The asset part joined back with dots
    pub fn asset_path(&self) -> String {
        self.asset_segments().join(".")
    }
}

impl fmt::Display for TagPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join("."))
    }
}

/// The trailing segment of any dotted path, used as a column name
pub fn trailing_segment(path: &str) -> &str {
    path.rsplit('.').find(|s| !s.is_empty()).unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ignores_empty_segments() {
        let path = TagPath::parse(".Plant A..Pump-01.pressure.").unwrap();
        assert_eq!(path.asset_segments(), ["Plant A", "Pump-01"]);
        assert_eq!(path.attribute_name(), "pressure");
        assert_eq!(path.to_string(), "Plant A.Pump-01.pressure");
        assert_eq!(path.asset_path(), "Plant A.Pump-01");
    }

    #[test]
    fn test_parse_requires_two_segments() {
        assert!(matches!(TagPath::parse("pressure"), Err(Error::PathNotFound(_))));
        assert!(matches!(TagPath::parse(".."), Err(Error::PathNotFound(_))));
    }

    #[test]
    fn test_trailing_segment() {
        assert_eq!(trailing_segment("Plant A.Pump-01.speed"), "speed");
        assert_eq!(trailing_segment("speed."), "speed");
        assert_eq!(trailing_segment("speed"), "speed");
    }
}
