//! Member-list range planning for lazy requests.

use serde::{Serialize, Serializer};

use super::constants::{RANGE_SIZE, RANGES_PER_REQUEST};

/// Closed interval `[low, high]` of member-list positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MemberRange {
    pub low: u64,
    pub high: u64,
}

impl MemberRange {
    #[must_use]
    pub const fn new(low: u64, high: u64) -> Self {
        Self { low, high }
    }
}

impl Serialize for MemberRange {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        [self.low, self.high].serialize(serializer)
    }
}

/// Ranges submitted together in one request.
pub type RangeGroup = [MemberRange; RANGES_PER_REQUEST];

/// Plans the range groups needed to cover positions `0..=max_count`.
///
/// Groups keep being emitted while the upper bound covered so far is still
/// `<= max_count`, so the result always holds `max_count / 300 + 1` groups and
/// never fewer than one.
#[must_use]
pub fn plan_ranges(max_count: u64) -> Vec<RangeGroup> {
    let mut groups = Vec::new();
    let mut covered = 0;

    while covered <= max_count {
        let base = covered;
        let group: RangeGroup = std::array::from_fn(|slot| {
            let low = base + slot as u64 * RANGE_SIZE;
            MemberRange::new(low, low + RANGE_SIZE - 1)
        });

        covered = group[RANGES_PER_REQUEST - 1].high + 1;
        groups.push(group);
    }

    groups
}
