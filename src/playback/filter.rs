// src/playback/filter.rs
//! Drop filters applied to records before they are scheduled

use crate::codec::DecodedRecord;

/// Returns true for records that should be dropped from playback
pub trait RecordFilter: Send + Sync {
    fn filter(&self, record: &DecodedRecord) -> bool;
}

/// Filter backed by a closure
pub struct PredicateFilter<F> {
    predicate: F,
}

impl<F> PredicateFilter<F>
where
    F: Fn(&DecodedRecord) -> bool + Send + Sync,
{
    pub fn new(predicate: F) -> Self {
        Self { predicate }
    }
}

impl<F> RecordFilter for PredicateFilter<F>
where
    F: Fn(&DecodedRecord) -> bool + Send + Sync,
{
    fn filter(&self, record: &DecodedRecord) -> bool {
        (self.predicate)(record)
    }
}
