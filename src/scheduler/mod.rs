//! Test scheduling
//!
//! Tests are coalesced into groups by the transitive set of resource
//! managers they need, groups sharing managers are kept adjacent, and each
//! such component is ordered greedily so consecutive groups reuse as many
//! live fixtures as possible. For parallel runs the ordered groups are dealt
//! into worker buckets.
//!
//! The ordering is a heuristic: it keeps transitions cheap but does not
//! search for the global optimum.

mod graph;
mod partition;

pub use graph::{connected_components, group_tests, order_component, sort_tests};
pub use partition::{partition, Bucket};

use crate::resource::ResourceSet;
use crate::suite::TestRef;

/// Tests sharing one resource set, run back to back
#[derive(Clone, Debug)]
pub struct ScheduledGroup {
    pub resources: ResourceSet,
    pub tests: Vec<TestRef>,
}

impl ScheduledGroup {
    pub fn new(resources: ResourceSet) -> Self {
        Self {
            resources,
            tests: Vec::new(),
        }
    }

    pub fn test_ids(&self) -> Vec<String> {
        self.tests.iter().map(|t| t.id().to_string()).collect()
    }
}

/// Group an already ordered test list: consecutive tests with the same
/// resource set share a group, and the order is kept as is
pub fn regroup(tests: &[TestRef]) -> Vec<ScheduledGroup> {
    let mut groups: Vec<ScheduledGroup> = Vec::new();
    for test in tests {
        let resources = ResourceSet::for_declared(test.resources());
        match groups.last_mut() {
            Some(group) if group.resources == resources => group.tests.push(test.clone()),
            _ => {
                let mut group = ScheduledGroup::new(resources);
                group.tests.push(test.clone());
                groups.push(group);
            }
        }
    }
    groups
}
