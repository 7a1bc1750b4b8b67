//! GPU-aware notebook launch orchestration.
//!
//! A launch runs these stages in order, each in its own module:
//! 1. [`capacity`]: free GPU units per healthy node
//! 2. [`selector`]: first node with a free GPU
//! 3. [`workload`]: submit the notebook pod and wait for it to run
//! 4. [`exposer`]: publish it through a NodePort service
//! 5. [`credential`]: discover the notebook token
//! 6. [`mapping`]: record the route for the reverse proxy
//!
//! [`LaunchCoordinator`] sequences them and is the only place stage results
//! are turned into a [`LaunchOutcome`].

pub mod capacity;
pub mod coordinator;
pub mod credential;
pub mod exposer;
pub mod mapping;
pub mod poll;
pub mod selector;
pub mod types;
pub mod workload;

pub use coordinator::LaunchCoordinator;
pub use coordinator::LaunchReport;
pub use mapping::MappingStore;
pub use types::LaunchFailure;
pub use types::LaunchOutcome;
pub use types::LaunchSettings;
pub use types::PendingWorkload;
pub use types::Placement;
