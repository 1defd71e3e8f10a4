//! Resource paths: where a value lives inside a backing resource's JSON.
//!
//! Two annotation forms are accepted:
//! - an array of literal segments, `["metadata", "labels", "app.kubernetes.io/name"]`;
//!   strings are keys taken verbatim, integers are array indices;
//! - a dotted string with an optional single `[index]` per segment, `spec.containers[0].image`.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Key(k) => f.write_str(k),
            PathSegment::Index(i) => write!(f, "[{}]", i),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawPath", into = "RawPath")]
pub struct ResourcePath(Vec<PathSegment>);

impl ResourcePath {
    pub fn new(segments: Vec<PathSegment>) -> Self { Self(segments) }

    /// Literal key segments; no dot splitting.
    pub fn keys<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(keys.into_iter().map(|k| PathSegment::Key(k.into())).collect())
    }

    pub fn segments(&self) -> &[PathSegment] { &self.0 }
    pub fn is_empty(&self) -> bool { self.0.is_empty() }
    pub fn len(&self) -> usize { self.0.len() }

    /// Parse the dotted form. Filters and wildcards are rejected.
    pub fn parse_dotted(raw: &str) -> Result<Self, String> {
        let s = raw.strip_prefix('.').unwrap_or(raw);
        if s.is_empty() {
            return Ok(Self::default());
        }
        if s.contains('?') || s.contains('*') {
            return Err(format!("unsupported path expression: {}", raw));
        }
        let mut out = Vec::new();
        for seg in s.split('.') {
            if seg.is_empty() {
                return Err(format!("empty segment in path: {}", raw));
            }
            match seg.find('[') {
                None => {
                    if seg.contains(']') {
                        return Err(format!("unbalanced ']' in path: {}", raw));
                    }
                    out.push(PathSegment::Key(seg.to_string()));
                }
                Some(open) => {
                    let close = seg.len() - 1;
                    if !seg.ends_with(']') || open + 1 >= close {
                        return Err(format!("malformed index in path: {}", raw));
                    }
                    let idx: usize = seg[open + 1..close]
                        .parse()
                        .map_err(|_| format!("non-numeric index in path: {}", raw))?;
                    let key = &seg[..open];
                    if key.contains('[') || key.contains(']') {
                        return Err(format!("multiple indices in segment: {}", raw));
                    }
                    if !key.is_empty() {
                        out.push(PathSegment::Key(key.to_string()));
                    }
                    out.push(PathSegment::Index(idx));
                }
            }
        }
        Ok(Self(out))
    }
}

impl fmt::Display for ResourcePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, seg) in self.0.iter().enumerate() {
            match seg {
                PathSegment::Key(k) if i > 0 => write!(f, ".{}", k)?,
                other => write!(f, "{}", other)?,
            }
        }
        Ok(())
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum RawSegment {
    Index(usize),
    Key(String),
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum RawPath {
    Segments(Vec<RawSegment>),
    Dotted(String),
}

impl TryFrom<RawPath> for ResourcePath {
    type Error = String;

    fn try_from(raw: RawPath) -> Result<Self, Self::Error> {
        match raw {
            RawPath::Dotted(s) => ResourcePath::parse_dotted(&s),
            RawPath::Segments(segs) => Ok(ResourcePath(
                segs.into_iter()
                    .map(|s| match s {
                        RawSegment::Index(i) => PathSegment::Index(i),
                        RawSegment::Key(k) => PathSegment::Key(k),
                    })
                    .collect(),
            )),
        }
    }
}

impl From<ResourcePath> for RawPath {
    fn from(p: ResourcePath) -> Self {
        RawPath::Segments(
            p.0.into_iter()
                .map(|s| match s {
                    PathSegment::Index(i) => RawSegment::Index(i),
                    PathSegment::Key(k) => RawSegment::Key(k),
                })
                .collect(),
        )
    }
}
