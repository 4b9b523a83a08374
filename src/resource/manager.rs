//! Resource manager: lazy construction, sharing, reset and teardown of one
//! fixture

use anyhow::Result;
use parking_lot::Mutex;
use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::collector::{DetailCollector, FixtureOp};
use super::FixtureError;
use crate::result::ResultSink;

static NEXT_MANAGER_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a manager.
///
/// Ids grow in creation order. A manager can only depend on managers that
/// already exist, so ascending id order is also a valid dependency order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ManagerId(u64);

impl ManagerId {
    fn next() -> Self {
        ManagerId(NEXT_MANAGER_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

/// Opaque fixture value
pub type Handle = Arc<dyn Any + Send + Sync>;

/// Dependency resources by alias
pub type Dependencies = BTreeMap<String, Resource>;

/// A built fixture together with the dependency resources it was built from
#[derive(Clone)]
pub struct Resource {
    handle: Handle,
    dependencies: Dependencies,
}

impl Resource {
    pub fn new(handle: Handle) -> Self {
        Self {
            handle,
            dependencies: Dependencies::new(),
        }
    }

    pub fn from_value<T: Any + Send + Sync>(value: T) -> Self {
        Self::new(Arc::new(value))
    }

    fn with_dependencies(handle: Handle, dependencies: Dependencies) -> Self {
        Self {
            handle,
            dependencies,
        }
    }

    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.handle.downcast_ref::<T>()
    }

    pub fn dependency(&self, alias: &str) -> Option<&Resource> {
        self.dependencies.get(alias)
    }

    pub fn dependencies(&self) -> &Dependencies {
        &self.dependencies
    }

    /// Same underlying fixture instance
    pub fn same_as(&self, other: &Resource) -> bool {
        std::ptr::eq(
            Arc::as_ptr(&self.handle) as *const (),
            Arc::as_ptr(&other.handle) as *const (),
        )
    }
}

impl fmt::Debug for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resource")
            .field("handle", &Arc::as_ptr(&self.handle))
            .field("dependencies", &self.dependencies.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Construction, teardown and reset callbacks of a fixture
pub trait Fixture: Send + Sync {
    fn make(&self, dependencies: &Dependencies) -> Result<Handle>;

    fn clean(&self, _resource: &Resource) -> Result<()> {
        Ok(())
    }

    /// Bring a dirty resource back to a clean state; defaults to clean + make
    fn reset(&self, old: &Resource, dependencies: &Dependencies) -> Result<Handle> {
        self.clean(old)?;
        self.make(dependencies)
    }
}

type MakeFn = dyn Fn(&Dependencies) -> Result<Handle> + Send + Sync;
type CleanFn = dyn Fn(&Resource) -> Result<()> + Send + Sync;

/// Closure-backed fixture
pub struct FnFixture {
    make: Box<MakeFn>,
    clean: Option<Box<CleanFn>>,
}

impl FnFixture {
    pub fn new(make: impl Fn(&Dependencies) -> Result<Handle> + Send + Sync + 'static) -> Self {
        Self {
            make: Box::new(make),
            clean: None,
        }
    }

    pub fn on_clean(mut self, clean: impl Fn(&Resource) -> Result<()> + Send + Sync + 'static) -> Self {
        self.clean = Some(Box::new(clean));
        self
    }
}

impl Fixture for FnFixture {
    fn make(&self, dependencies: &Dependencies) -> Result<Handle> {
        (self.make)(dependencies)
    }

    fn clean(&self, resource: &Resource) -> Result<()> {
        match &self.clean {
            Some(clean) => clean(resource),
            None => Ok(()),
        }
    }
}

#[derive(Default)]
struct ManagerState {
    current: Option<Resource>,
    uses: usize,
    dirty: bool,
    /// `current` went through a failed reset: its handle is no longer usable
    /// and must not be cleaned again, but its dependencies are still held
    discarded: bool,
}

/// Owner of one fixture's lifecycle.
///
/// Managers are compared by identity and are meant to be shared as
/// `Arc<ResourceManager>` between every test that declares them. All state
/// sits behind one mutex which is held for the whole of an acquire or
/// release, so concurrent holders never build or tear down twice. Locks are
/// only ever taken from a manager towards its dependencies.
pub struct ResourceManager {
    id: ManagerId,
    name: String,
    setup_cost: u32,
    teardown_cost: u32,
    dependencies: Vec<(String, Arc<ResourceManager>)>,
    fixture: Box<dyn Fixture>,
    state: Mutex<ManagerState>,
}

/// Builder for [`ResourceManager`]
pub struct ManagerBuilder {
    name: String,
    setup_cost: u32,
    teardown_cost: u32,
    dependencies: Vec<(String, Arc<ResourceManager>)>,
    fixture: Box<dyn Fixture>,
}

impl ManagerBuilder {
    pub fn setup_cost(mut self, cost: u32) -> Self {
        self.setup_cost = cost;
        self
    }

    pub fn teardown_cost(mut self, cost: u32) -> Self {
        self.teardown_cost = cost;
        self
    }

    /// Declare a dependency, made available to `make` under `alias`
    pub fn depends_on(mut self, alias: impl Into<String>, manager: &Arc<ResourceManager>) -> Self {
        self.dependencies.push((alias.into(), manager.clone()));
        self
    }

    pub fn build(self) -> Arc<ResourceManager> {
        Arc::new(ResourceManager {
            id: ManagerId::next(),
            name: self.name,
            setup_cost: self.setup_cost,
            teardown_cost: self.teardown_cost,
            dependencies: self.dependencies,
            fixture: self.fixture,
            state: Mutex::new(ManagerState::default()),
        })
    }
}

impl ResourceManager {
    pub fn builder(name: impl Into<String>, fixture: impl Fixture + 'static) -> ManagerBuilder {
        ManagerBuilder {
            name: name.into(),
            setup_cost: 1,
            teardown_cost: 1,
            dependencies: Vec::new(),
            fixture: Box::new(fixture),
        }
    }

    pub fn id(&self) -> ManagerId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn setup_cost(&self) -> u32 {
        self.setup_cost
    }

    pub fn teardown_cost(&self) -> u32 {
        self.teardown_cost
    }

    pub fn dependencies(&self) -> &[(String, Arc<ResourceManager>)] {
        &self.dependencies
    }

    /// This manager and everything it transitively depends on, dependencies
    /// first, without duplicates
    pub fn needed_resources(self: &Arc<Self>) -> Vec<Arc<ResourceManager>> {
        let mut needed: Vec<Arc<ResourceManager>> = Vec::new();
        for (_, dependency) in &self.dependencies {
            for manager in dependency.needed_resources() {
                if !needed.iter().any(|m| m.id == manager.id) {
                    needed.push(manager);
                }
            }
        }
        needed.push(self.clone());
        needed
    }

    /// Number of current holders
    pub fn uses(&self) -> usize {
        self.state.lock().uses
    }

    /// The cached resource, if held
    pub fn current(&self) -> Option<Resource> {
        self.state.lock().current.clone()
    }

    /// Flag the cached resource as needing a reset before its next use
    pub fn mark_dirty(&self) {
        self.state.lock().dirty = true;
    }

    /// Whether the cached resource must be reset before reuse.
    ///
    /// True when marked dirty, when a dependency is dirty, or when a
    /// dependency's current resource is no longer the one this resource was
    /// built from.
    pub fn is_dirty(&self) -> bool {
        let state = self.state.lock();
        self.is_dirty_locked(&state)
    }

    /// Get the resource, building it (and its dependencies) on first use and
    /// resetting it if dirty. Every successful call must be paired with a
    /// [`release`](Self::release).
    pub fn acquire(&self, sink: &dyn ResultSink) -> Result<Resource, FixtureError> {
        let mut state = self.state.lock();

        let resource = match state.current.clone() {
            Some(current) if state.uses > 0 => {
                if self.is_dirty_locked(&state) {
                    self.reset_locked(&mut state, &current, sink)?
                } else {
                    current
                }
            }
            _ => self.make_all(sink)?,
        };

        state.current = Some(resource.clone());
        state.dirty = false;
        state.uses += 1;
        debug!("Acquired {} (uses: {})", self.name, state.uses);
        Ok(resource)
    }

    /// Drop one use; the last release tears the fixture down and then
    /// releases its dependencies. Teardown failures are reported to the sink
    /// only.
    pub fn release(&self, sink: &dyn ResultSink) {
        let mut state = self.state.lock();
        if state.uses == 0 {
            warn!("Release of {} without a matching acquire", self.name);
            return;
        }

        state.uses -= 1;
        debug!("Released {} (uses: {})", self.name, state.uses);
        if state.uses > 0 {
            return;
        }

        state.dirty = false;
        let discarded = std::mem::take(&mut state.discarded);
        if let Some(resource) = state.current.take() {
            if discarded {
                debug!("{} was discarded by a failed reset, not destroying it again", self.name);
                self.release_dependencies(resource.dependencies(), sink);
            } else {
                self.clean_all(&resource, sink);
            }
        }
    }

    /// Reset `old` if this manager or any dependency is dirty, otherwise
    /// return it unchanged
    pub fn reset(&self, old: &Resource, sink: &dyn ResultSink) -> Result<Resource, FixtureError> {
        let mut state = self.state.lock();
        if !self.is_dirty_locked(&state) {
            return Ok(old.clone());
        }

        if state.uses == 0 {
            return self.reset_from(old, sink);
        }
        let resource = self.reset_locked(&mut state, old, sink)?;
        state.current = Some(resource.clone());
        state.dirty = false;
        Ok(resource)
    }

    fn is_dirty_locked(&self, state: &ManagerState) -> bool {
        if state.dirty || state.discarded {
            return true;
        }
        let Some(current) = &state.current else {
            return false;
        };
        self.dependencies.iter().any(|(alias, manager)| {
            if manager.is_dirty() {
                return true;
            }
            match (current.dependency(alias), manager.current()) {
                (Some(ours), Some(theirs)) => !ours.same_as(&theirs),
                _ => true,
            }
        })
    }

    /// Current resource of a held dependency, reset first if dirty
    fn refreshed(&self, sink: &dyn ResultSink) -> Result<Resource, FixtureError> {
        let mut state = self.state.lock();
        let Some(current) = state.current.clone() else {
            return Err(FixtureError::NotHeld {
                manager: self.name.clone(),
            });
        };
        if !self.is_dirty_locked(&state) {
            return Ok(current);
        }

        let resource = self.reset_locked(&mut state, &current, sink)?;
        state.current = Some(resource.clone());
        state.dirty = false;
        Ok(resource)
    }

    /// Reset the held resource, or rebuild it if a previous reset discarded
    /// it. A failed fixture reset discards `old`.
    fn reset_locked(
        &self,
        state: &mut ManagerState,
        old: &Resource,
        sink: &dyn ResultSink,
    ) -> Result<Resource, FixtureError> {
        let outcome = if state.discarded {
            self.rebuild(sink)
        } else {
            self.reset_from(old, sink)
        };
        match outcome {
            Ok(resource) => {
                state.discarded = false;
                Ok(resource)
            }
            Err(err) => {
                if matches!(err, FixtureError::Reset { .. }) {
                    state.discarded = true;
                }
                Err(err)
            }
        }
    }

    fn make_all(&self, sink: &dyn ResultSink) -> Result<Resource, FixtureError> {
        let mut dependencies = Dependencies::new();
        for (alias, manager) in &self.dependencies {
            match manager.acquire(sink) {
                Ok(resource) => {
                    dependencies.insert(alias.clone(), resource);
                }
                Err(source) => {
                    self.release_dependencies(&dependencies, sink);
                    return Err(FixtureError::Dependency {
                        manager: self.name.clone(),
                        alias: alias.clone(),
                        source: Box::new(source),
                    });
                }
            }
        }

        info!("Creating {}", self.name);
        let made = DetailCollector::new(&self.name, FixtureOp::Creating, sink)
            .run(|| self.fixture.make(&dependencies));

        match made {
            Ok(handle) => Ok(Resource::with_dependencies(handle, dependencies)),
            Err(err) => {
                self.release_dependencies(&dependencies, sink);
                Err(FixtureError::Construction {
                    manager: self.name.clone(),
                    reason: err.to_string(),
                })
            }
        }
    }

    /// Current resources of the held dependencies, each reset if dirty
    fn refresh_dependencies(&self, sink: &dyn ResultSink) -> Result<Dependencies, FixtureError> {
        let mut dependencies = Dependencies::new();
        for (alias, manager) in &self.dependencies {
            let resource = manager
                .refreshed(sink)
                .map_err(|source| FixtureError::Dependency {
                    manager: self.name.clone(),
                    alias: alias.clone(),
                    source: Box::new(source),
                })?;
            dependencies.insert(alias.clone(), resource);
        }
        Ok(dependencies)
    }

    /// Build a fresh resource on top of dependencies that are already held
    fn rebuild(&self, sink: &dyn ResultSink) -> Result<Resource, FixtureError> {
        let dependencies = self.refresh_dependencies(sink)?;

        info!("Creating {}", self.name);
        let handle = DetailCollector::new(&self.name, FixtureOp::Creating, sink)
            .run(|| self.fixture.make(&dependencies))
            .map_err(|err| FixtureError::Construction {
                manager: self.name.clone(),
                reason: err.to_string(),
            })?;

        Ok(Resource::with_dependencies(handle, dependencies))
    }

    fn reset_from(&self, old: &Resource, sink: &dyn ResultSink) -> Result<Resource, FixtureError> {
        let dependencies = self.refresh_dependencies(sink)?;

        info!("Resetting {}", self.name);
        let handle = DetailCollector::new(&self.name, FixtureOp::Resetting, sink)
            .run(|| self.fixture.reset(old, &dependencies))
            .map_err(|err| FixtureError::Reset {
                manager: self.name.clone(),
                reason: err.to_string(),
            })?;

        Ok(Resource::with_dependencies(handle, dependencies))
    }

    fn clean_all(&self, resource: &Resource, sink: &dyn ResultSink) {
        info!("Destroying {}", self.name);
        let cleaned = DetailCollector::new(&self.name, FixtureOp::Destroying, sink)
            .run(|| self.fixture.clean(resource));
        if let Err(err) = cleaned {
            debug!("Teardown of {} failed, releasing dependencies anyway: {err}", self.name);
        }
        self.release_dependencies(resource.dependencies(), sink);
    }

    fn release_dependencies(&self, held: &Dependencies, sink: &dyn ResultSink) {
        for (alias, manager) in &self.dependencies {
            if held.contains_key(alias) {
                manager.release(sink);
            }
        }
    }
}

impl PartialEq for ResourceManager {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ResourceManager {}

impl Hash for ResourceManager {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for ResourceManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceManager")
            .field("id", &self.id.0)
            .field("name", &self.name)
            .field(
                "dependencies",
                &self.dependencies.iter().map(|(a, _)| a).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl fmt::Display for ResourceManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}
