//! Shared test resources
//!
//! A [`ResourceManager`] owns the lifecycle of one expensive fixture: it
//! builds the fixture on first use, shares it between every holder, resets it
//! when it has gone dirty and tears it down when the last holder lets go.
//! Every lifecycle operation runs inside a [`DetailCollector`] so the result
//! sink always sees a paired start/stop and a warning or info for it.
//!
//! ## Failure policy
//!
//! - Construction and reset failures are reported as fixture warnings and
//!   returned as [`FixtureError`] so the caller can fail the affected tests.
//! - Teardown failures are reported as fixture warnings and swallowed; the
//!   dependencies of a fixture are released even when its own teardown fails.

mod collector;
mod manager;
mod set;

pub use collector::{DetailCollector, FixtureOp, FixtureRef};
pub use manager::{
    Dependencies, Fixture, FnFixture, Handle, ManagerBuilder, ManagerId, Resource,
    ResourceManager,
};
pub use set::ResourceSet;

pub(crate) use collector::panic_message;

use thiserror::Error;

/// Fixture lifecycle errors surfaced to the caller of `acquire`/`reset`
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FixtureError {
    #[error("failed to create {manager}: {reason}")]
    Construction { manager: String, reason: String },

    #[error("failed to reset {manager}: {reason}")]
    Reset { manager: String, reason: String },

    #[error("dependency '{alias}' of {manager} failed: {source}")]
    Dependency {
        manager: String,
        alias: String,
        source: Box<FixtureError>,
    },

    #[error("{manager} is not currently held")]
    NotHeld { manager: String },
}

impl FixtureError {
    /// Name of the manager whose own callback failed
    pub fn root_manager(&self) -> &str {
        match self {
            FixtureError::Dependency { source, .. } => source.root_manager(),
            FixtureError::Construction { manager, .. }
            | FixtureError::Reset { manager, .. }
            | FixtureError::NotHeld { manager } => manager,
        }
    }
}
