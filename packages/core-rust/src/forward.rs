//! Forward-once marker for cache misses across redundant instances.
//!
//! Instances do not share their read caches. A point lookup that misses the
//! local cache is answered with a 404 that carries [`FORWARD_HEADER`], which the
//! balancer in front of the fleet uses to retry the request once (normally on
//! another instance). The retried request arrives marked, and a marked miss is
//! resolved against storage, so a lookup takes at most two hops.

/// Header carrying the marker, both on the 404 response and on the retry.
pub const FORWARD_HEADER: &str = "x-forwarded";

/// Value written into [`FORWARD_HEADER`] when setting the marker.
pub const FORWARD_HEADER_VALUE: &str = "true";

/// Whether a read request has already been redirected once.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ForwardMarker {
    /// First hop: nobody has answered this request yet.
    #[default]
    Unmarked,
    /// The request is a retry of a marker-setting 404.
    Forwarded,
}

impl ForwardMarker {
    /// Reads the marker from the raw header value.
    ///
    /// Any non-empty value marks the request. Absent or empty means unmarked.
    #[must_use]
    pub fn from_header(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some(v) if !v.is_empty() => Self::Forwarded,
            _ => Self::Unmarked,
        }
    }

    #[must_use]
    pub fn is_forwarded(&self) -> bool {
        matches!(self, Self::Forwarded)
    }

    /// What to do after the local cache missed.
    #[must_use]
    pub fn on_cache_miss(&self) -> MissAction {
        match self {
            Self::Unmarked => MissAction::Forward,
            Self::Forwarded => MissAction::ConsultStorage,
        }
    }
}

/// Resolution of a local cache miss.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissAction {
    /// Reply "not found" with the marker set; do not touch storage.
    Forward,
    /// Final hop: the storage answer is authoritative.
    ConsultStorage,
}
