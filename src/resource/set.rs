//! Sets of resource managers keyed by identity

use std::collections::BTreeMap;
use std::sync::Arc;

use super::manager::{ManagerId, ResourceManager};

/// The full transitive closure of managers a test needs.
///
/// Iteration is in ascending [`ManagerId`] order, which places every manager
/// after its dependencies.
#[derive(Clone, Debug, Default)]
pub struct ResourceSet {
    managers: BTreeMap<ManagerId, Arc<ResourceManager>>,
}

impl ResourceSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Closure of the managers a test declares
    pub fn for_declared(declared: &[(String, Arc<ResourceManager>)]) -> Self {
        let mut set = Self::new();
        for (_, manager) in declared {
            for needed in manager.needed_resources() {
                set.insert(needed);
            }
        }
        set
    }

    pub fn insert(&mut self, manager: Arc<ResourceManager>) {
        self.managers.insert(manager.id(), manager);
    }

    pub fn remove(&mut self, id: ManagerId) -> Option<Arc<ResourceManager>> {
        self.managers.remove(&id)
    }

    pub fn contains(&self, id: ManagerId) -> bool {
        self.managers.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.managers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.managers.is_empty()
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Arc<ResourceManager>> {
        self.managers.values()
    }

    /// Sorted manager ids, usable as a grouping key
    pub fn key(&self) -> Vec<ManagerId> {
        self.managers.keys().copied().collect()
    }

    /// Managers in `self` but not in `other`
    pub fn difference(&self, other: &ResourceSet) -> ResourceSet {
        let managers = self
            .managers
            .iter()
            .filter(|(id, _)| !other.contains(**id))
            .map(|(id, m)| (*id, m.clone()))
            .collect();
        ResourceSet { managers }
    }

    pub fn intersection_len(&self, other: &ResourceSet) -> usize {
        self.managers.keys().filter(|id| other.contains(**id)).count()
    }

    /// Cost of building every manager in the set from nothing
    pub fn setup_cost(&self) -> u64 {
        self.iter().map(|m| u64::from(m.setup_cost())).sum()
    }

    /// Cost of moving from `from` to `self`: tear down what is no longer
    /// needed and build what is missing
    pub fn transition_cost(&self, from: &ResourceSet) -> u64 {
        let teardown: u64 = from
            .difference(self)
            .iter()
            .map(|m| u64::from(m.teardown_cost()))
            .sum();
        teardown + self.difference(from).setup_cost()
    }

    pub fn names(&self) -> Vec<&str> {
        self.iter().map(|m| m.name()).collect()
    }
}

impl PartialEq for ResourceSet {
    fn eq(&self, other: &Self) -> bool {
        self.managers.len() == other.managers.len()
            && self.managers.keys().all(|id| other.contains(*id))
    }
}

impl Eq for ResourceSet {}

impl FromIterator<Arc<ResourceManager>> for ResourceSet {
    fn from_iter<I: IntoIterator<Item = Arc<ResourceManager>>>(iter: I) -> Self {
        let mut set = Self::new();
        for manager in iter {
            set.insert(manager);
        }
        set
    }
}
