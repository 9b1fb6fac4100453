//! Batch accumulation.
//!
//! An [`Accumulator`] is the private, mutable buffer of one batcher. Sealing it
//! produces an immutable [`Batch`] that is moved (never shared) to the next
//! pipeline stage, and leaves the accumulator empty with its capacity intact.

use serde::Serialize;

use crate::record::{Record, RecordId};

/// Why a batch was sealed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FlushTrigger {
    /// The accumulator reached its capacity.
    Size,
    /// The flush interval elapsed.
    Deadline,
    /// The ingress queue was closed and the remainder was flushed on the way out.
    Drain,
}

impl FlushTrigger {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Size => "size",
            Self::Deadline => "deadline",
            Self::Drain => "drain",
        }
    }
}

/// A sealed, ordered group of records. Immutable after sealing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    records: Vec<Record>,
    trigger: FlushTrigger,
}

impl Batch {
    /// Builds a sealed batch directly from already-ordered records.
    #[must_use]
    pub fn new(records: Vec<Record>, trigger: FlushTrigger) -> Self {
        Self { records, trigger }
    }

    #[must_use]
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    #[must_use]
    pub fn into_records(self) -> Vec<Record> {
        self.records
    }

    #[must_use]
    pub fn trigger(&self) -> FlushTrigger {
        self.trigger
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = RecordId> + '_ {
        self.records.iter().map(|r| r.id)
    }
}

/// Bounded, append-only record buffer owned by a single batcher.
#[derive(Debug)]
pub struct Accumulator {
    records: Vec<Record>,
    capacity: usize,
}

impl Accumulator {
    /// Creates an empty accumulator holding at most `capacity` records.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "accumulator capacity must be non-zero");
        Self {
            records: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends a record in arrival order.
    ///
    /// Returns `true` when the accumulator is now full and must be sealed
    /// before the next push.
    pub fn push(&mut self, record: Record) -> bool {
        debug_assert!(!self.is_full(), "push into a full accumulator");
        self.records.push(record);
        self.is_full()
    }

    /// Seals the current contents into a [`Batch`] and resets the buffer.
    pub fn seal(&mut self, trigger: FlushTrigger) -> Batch {
        let records = std::mem::replace(&mut self.records, Vec::with_capacity(self.capacity));
        Batch { records, trigger }
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        self.records.len() >= self.capacity
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
