//! Grouping and ordering of tests by resource set

use std::collections::{BTreeMap, HashMap};
use tracing::debug;

use super::ScheduledGroup;
use crate::resource::{ManagerId, ResourceSet};
use crate::suite::TestRef;

/// Coalesce tests with identical resource sets, in order of first
/// appearance. The group needing no resources, if any, is returned apart.
pub fn group_tests(tests: &[TestRef]) -> (Vec<ScheduledGroup>, Option<ScheduledGroup>) {
    let mut groups: Vec<ScheduledGroup> = Vec::new();
    let mut index: HashMap<Vec<ManagerId>, usize> = HashMap::new();
    let mut empty: Option<ScheduledGroup> = None;

    for test in tests {
        let resources = ResourceSet::for_declared(test.resources());
        if resources.is_empty() {
            empty
                .get_or_insert_with(|| ScheduledGroup::new(ResourceSet::new()))
                .tests
                .push(test.clone());
            continue;
        }

        let key = resources.key();
        match index.get(&key) {
            Some(&i) => groups[i].tests.push(test.clone()),
            None => {
                index.insert(key, groups.len());
                let mut group = ScheduledGroup::new(resources);
                group.tests.push(test.clone());
                groups.push(group);
            }
        }
    }

    (groups, empty)
}

/// Split groups into connected components over shared managers.
///
/// Components are returned in order of their first group; groups keep their
/// relative order inside a component.
pub fn connected_components(groups: Vec<ScheduledGroup>) -> Vec<Vec<ScheduledGroup>> {
    let mut parent: Vec<usize> = (0..groups.len()).collect();
    let mut owner: BTreeMap<ManagerId, usize> = BTreeMap::new();

    for (i, group) in groups.iter().enumerate() {
        for id in group.resources.key() {
            match owner.get(&id) {
                Some(&j) => union(&mut parent, i, j),
                None => {
                    owner.insert(id, i);
                }
            }
        }
    }

    let mut slot_of_root: HashMap<usize, usize> = HashMap::new();
    let mut components: Vec<Vec<ScheduledGroup>> = Vec::new();
    for (i, group) in groups.into_iter().enumerate() {
        let root = find(&mut parent, i);
        let slot = *slot_of_root.entry(root).or_insert_with(|| {
            components.push(Vec::new());
            components.len() - 1
        });
        components[slot].push(group);
    }
    components
}

fn find(parent: &mut [usize], mut i: usize) -> usize {
    while parent[i] != i {
        parent[i] = parent[parent[i]];
        i = parent[i];
    }
    i
}

fn union(parent: &mut [usize], a: usize, b: usize) {
    let (ra, rb) = (find(parent, a), find(parent, b));
    if ra != rb {
        // the earlier group stays the root
        let (low, high) = if ra < rb { (ra, rb) } else { (rb, ra) };
        parent[high] = low;
    }
}

/// Greedy ordering inside one component.
///
/// Starts with the group needing the most managers (ties: higher setup
/// cost, then the lexicographically smaller id list). Each next group is the
/// one sharing the most managers with the current one (ties: cheaper
/// transition, then the lexicographically smaller id list).
pub fn order_component(mut component: Vec<ScheduledGroup>) -> Vec<ScheduledGroup> {
    let mut ordered = Vec::with_capacity(component.len());
    let Some(first) = pick(&component, |g| {
        (g.resources.len(), g.resources.setup_cost())
    }) else {
        return ordered;
    };
    ordered.push(component.remove(first));

    while !component.is_empty() {
        let Some(current) = ordered.last().map(|g: &ScheduledGroup| g.resources.clone()) else {
            break;
        };
        let Some(next) = pick(&component, |g| {
            (
                g.resources.intersection_len(&current),
                u64::MAX - g.resources.transition_cost(&current),
            )
        }) else {
            break;
        };
        ordered.push(component.remove(next));
    }

    ordered
}

/// Index of the group with the highest score; equal scores go to the smaller
/// manager id list
fn pick<S: Ord>(groups: &[ScheduledGroup], score: impl Fn(&ScheduledGroup) -> S) -> Option<usize> {
    let mut best: Option<(usize, S, Vec<ManagerId>)> = None;
    for (i, group) in groups.iter().enumerate() {
        let s = score(group);
        let key = group.resources.key();
        let better = match &best {
            None => true,
            Some((_, best_score, best_key)) => {
                s > *best_score || (s == *best_score && key < *best_key)
            }
        };
        if better {
            best = Some((i, s, key));
        }
    }
    best.map(|(i, _, _)| i)
}

/// Full sequential ordering: components in order of first appearance, each
/// ordered greedily, then the resource-free group
pub fn sort_tests(tests: &[TestRef]) -> Vec<ScheduledGroup> {
    let (groups, empty) = group_tests(tests);
    let group_count = groups.len();

    let mut ordered: Vec<ScheduledGroup> = connected_components(groups)
        .into_iter()
        .flat_map(order_component)
        .collect();
    debug!(
        "Sorted {} tests into {} groups",
        tests.len(),
        group_count + usize::from(empty.is_some())
    );

    if let Some(empty) = empty {
        ordered.push(empty);
    }
    ordered
}
