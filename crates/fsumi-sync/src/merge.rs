use std::collections::HashSet;

use fsumi_core::NewsRecord;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeResult {
    pub merged: Vec<NewsRecord>,
    pub new_count: usize,
}

/// Prepends fetched records whose title is not already known.
///
/// `known` is kept as-is and in order. Within `fetched` the first record with a
/// given title wins, so the merged collection never gains a duplicate title.
pub fn merge(known: Vec<NewsRecord>, fetched: Vec<NewsRecord>) -> MergeResult {
    let mut seen: HashSet<String> = known.iter().map(|r| r.title.clone()).collect();
    let mut merged: Vec<NewsRecord> = fetched
        .into_iter()
        .filter(|record| seen.insert(record.title.clone()))
        .collect();
    let new_count = merged.len();
    merged.extend(known);
    MergeResult { merged, new_count }
}
