use crate::forward::ForwardMarker;

/// Per-request context handed to read-path operations by value.
/// Carries the request's trace identity and its forward-once marker.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    /// Value of the `x-request-id` header, if the transport assigned one.
    pub request_id: Option<String>,
    /// Whether a peer instance has already answered this lookup with a miss.
    pub forward: ForwardMarker,
}

impl RequestContext {
    #[must_use]
    pub fn new(request_id: Option<String>, forward: ForwardMarker) -> Self {
        Self {
            request_id,
            forward,
        }
    }
}
