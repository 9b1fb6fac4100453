//! `recordline` core: records, boundary validation, batch accumulation, and
//! the forward-once marker used on the read path.

pub mod batch;
pub mod context;
pub mod forward;
pub mod record;
pub mod validation;

pub use batch::{Accumulator, Batch, FlushTrigger};
pub use context::RequestContext;
pub use forward::{ForwardMarker, MissAction, FORWARD_HEADER, FORWARD_HEADER_VALUE};
pub use record::{Record, RecordId};
pub use validation::{NewRecord, ValidationLimits, ValidationResult};
