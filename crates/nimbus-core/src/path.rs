// ── Patch paths ──
//
// Event `data` keys address leaves of the state document with a mix of
// dotted keys and bracketed indices, e.g.
// `RemoteZoneInfo[2].TemperatureSetpoint_Cool_oC`. A key is split on `.`,
// `[` and `]`; empty pieces are dropped and all-digit pieces become
// sequence indices.

use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// One step into the document tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathSegment {
    /// Mapping key.
    Key(String),
    /// Sequence position. All-digit segments are always indices, so a
    /// mapping whose keys are numeric strings cannot be addressed.
    Index(usize),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Key(key) => f.write_str(key),
            Self::Index(index) => write!(f, "[{index}]"),
        }
    }
}

/// A parsed patch path. Keeps the raw key for change reporting.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PatchPath {
    raw: String,
    segments: Vec<PathSegment>,
}

impl PatchPath {
    pub fn parse(raw: &str) -> Result<Self, CoreError> {
        let segments = raw
            .split(['.', '[', ']'])
            .filter(|part| !part.is_empty())
            .map(|part| parse_segment(raw, part))
            .collect::<Result<Vec<_>, _>>()?;

        if segments.is_empty() {
            return Err(CoreError::InvalidPath {
                path: raw.to_owned(),
                reason: "no segments".into(),
            });
        }

        Ok(Self {
            raw: raw.to_owned(),
            segments,
        })
    }

    /// The key exactly as it appeared in the event.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }
}

fn parse_segment(raw: &str, part: &str) -> Result<PathSegment, CoreError> {
    if part.bytes().all(|b| b.is_ascii_digit()) {
        part.parse()
            .map(PathSegment::Index)
            .map_err(|e| CoreError::InvalidPath {
                path: raw.to_owned(),
                reason: format!("index '{part}' out of range: {e}"),
            })
    } else {
        Ok(PathSegment::Key(part.to_owned()))
    }
}

impl FromStr for PatchPath {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for PatchPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
