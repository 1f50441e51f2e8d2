use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque identifier of one terminal session, stable for its lifetime
pub type SessionId = Uuid;

// ==================== Geometry ====================

/// Character-grid size of a terminal surface
///
/// Both dimensions are at least 1; constructors and deserialization clamp
/// zero to one.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(from = "GeometryFields")]
pub struct Geometry {
    pub cols: u16,
    pub rows: u16,
}

/// Unchecked wire form of [`Geometry`]
#[derive(Deserialize)]
struct GeometryFields {
    cols: u16,
    rows: u16,
}

impl From<GeometryFields> for Geometry {
    fn from(fields: GeometryFields) -> Self {
        Self::new(fields.cols, fields.rows)
    }
}

impl Geometry {
    /// Create a geometry, clamping each dimension to at least 1
    pub fn new(cols: u16, rows: u16) -> Self {
        Self {
            cols: cols.max(1),
            rows: rows.max(1),
        }
    }
}

impl Default for Geometry {
    fn default() -> Self {
        Self { cols: 80, rows: 24 }
    }
}

impl std::fmt::Display for Geometry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.cols, self.rows)
    }
}

// ==================== Output ====================

/// A chunk of pty output for one session
///
/// Chunks of one session must be applied in arrival order. There is no
/// ordering relation between chunks of different sessions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OutputChunk {
    pub session_id: SessionId,
    pub data: Vec<u8>,
}

impl OutputChunk {
    pub fn new(session_id: SessionId, data: impl Into<Vec<u8>>) -> Self {
        Self {
            session_id,
            data: data.into(),
        }
    }
}
