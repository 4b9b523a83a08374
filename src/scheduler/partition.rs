//! Partitioning of scheduled groups into worker buckets

use std::collections::BTreeMap;
use tracing::debug;

use super::graph::{connected_components, group_tests, order_component};
use super::{regroup, ScheduledGroup};
use crate::config::Concurrency;
use crate::suite::TestRef;

/// Tests one worker runs, in order
#[derive(Clone, Debug, Default)]
pub struct Bucket {
    pub groups: Vec<ScheduledGroup>,
}

impl Bucket {
    pub fn test_ids(&self) -> Vec<String> {
        self.groups.iter().flat_map(|g| g.test_ids()).collect()
    }

    pub fn len(&self) -> usize {
        self.groups.iter().map(|g| g.tests.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Split `tests` into independently runnable buckets. Empty buckets are
/// dropped.
pub fn partition(tests: &[TestRef], concurrency: Concurrency) -> Vec<Bucket> {
    let buckets = match concurrency {
        Concurrency::Auto => partition_by_weight(tests),
        Concurrency::Fixed(n) => partition_round_robin(tests, n.max(1)),
    };
    let buckets: Vec<Bucket> = buckets.into_iter().filter(|b| !b.is_empty()).collect();
    debug!(
        "Partitioned {} tests into {} buckets ({})",
        tests.len(),
        buckets.len(),
        concurrency
    );
    buckets
}

/// Ordered resource groups dealt round-robin over `n` buckets, then the
/// resource-free tests dealt one at a time, continuing where the groups
/// stopped
fn partition_round_robin(tests: &[TestRef], n: usize) -> Vec<Bucket> {
    let (groups, empty) = group_tests(tests);
    let ordered: Vec<ScheduledGroup> = connected_components(groups)
        .into_iter()
        .flat_map(order_component)
        .collect();

    let mut buckets = vec![Bucket::default(); n];
    let start = ordered.len() % n;
    for (i, group) in ordered.into_iter().enumerate() {
        buckets[i % n].groups.push(group);
    }

    if let Some(empty) = empty {
        let mut free: Vec<ScheduledGroup> = (0..n).map(|_| ScheduledGroup::new(empty.resources.clone())).collect();
        for (i, test) in empty.tests.into_iter().enumerate() {
            free[(start + i) % n].tests.push(test);
        }
        for (bucket, group) in buckets.iter_mut().zip(free) {
            if !group.tests.is_empty() {
                bucket.groups.push(group);
            }
        }
    }

    buckets
}

/// One bucket per declared weight, heaviest first. Tests keep their
/// declaration order inside a bucket; only consecutive tests with the same
/// resource set share a group.
fn partition_by_weight(tests: &[TestRef]) -> Vec<Bucket> {
    let mut by_weight: BTreeMap<u32, Vec<TestRef>> = BTreeMap::new();
    for test in tests {
        by_weight.entry(test.concurrency()).or_default().push(test.clone());
    }

    by_weight
        .into_values()
        .rev()
        .map(|tests| Bucket {
            groups: regroup(&tests),
        })
        .collect()
}
