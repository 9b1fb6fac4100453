//! In-memory read path: the per-instance read cache and the forward-once
//! point lookup built on top of it.

pub mod lookup;
pub mod read_cache;

pub use lookup::{LookupOutcome, RecordLookup};
pub use read_cache::ReadCache;
