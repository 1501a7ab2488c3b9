//! Expiry bucket selection over a set of contracts
//!
//! The candidates are expected to share underlying, strike and right.
//! Weekly buckets index the full expiry-sorted sequence; monthly buckets
//! index the per-month last expiries.

use chrono::{Datelike, NaiveDate};

use super::types::{ExpiryBucket, InstrumentRecord};

/// Candidates with an expiry, sorted ascending. Ties keep input order.
pub fn sorted_by_expiry<'a, I>(candidates: I) -> Vec<(NaiveDate, &'a InstrumentRecord)>
where
    I: IntoIterator<Item = &'a InstrumentRecord>,
{
    let mut dated: Vec<_> = candidates
        .into_iter()
        .filter_map(|r| r.expiry_date.map(|d| (d, r)))
        .collect();
    dated.sort_by_key(|(expiry, _)| *expiry);
    dated
}

/// Keep the latest expiry of each calendar month, ascending.
/// Input must be sorted by expiry.
pub fn monthly_series<'a>(
    sorted: &[(NaiveDate, &'a InstrumentRecord)],
) -> Vec<(NaiveDate, &'a InstrumentRecord)> {
    let mut monthly: Vec<(NaiveDate, &'a InstrumentRecord)> = Vec::new();

    for &(expiry, record) in sorted {
        match monthly.last_mut() {
            Some(last) if (last.0.year(), last.0.month()) == (expiry.year(), expiry.month()) => {
                // First record wins among equal expiries
                if expiry > last.0 {
                    *last = (expiry, record);
                }
            }
            _ => monthly.push((expiry, record)),
        }
    }

    monthly
}

/// Pick the contract for `bucket`, or `None` when the sequence is too short
pub fn select_expiry<'a, I>(candidates: I, bucket: ExpiryBucket) -> Option<&'a InstrumentRecord>
where
    I: IntoIterator<Item = &'a InstrumentRecord>,
{
    let sorted = sorted_by_expiry(candidates);

    let series = if bucket.is_monthly() {
        monthly_series(&sorted)
    } else {
        sorted
    };

    series.get(bucket.position()).map(|&(_, record)| record)
}
