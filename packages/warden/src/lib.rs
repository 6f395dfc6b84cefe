//! EpochMesh Warden
//!
//! External-process supervisor for mesh workers. Four detection layers feed
//! a sliding-window restart budget; exhausting the budget quarantines the
//! worker and ends automatic recovery. All supervisor state is externalised
//! to a pid file, a line-oriented log, and a JSON status document.

pub mod policy;
pub mod state_files;
pub mod supervisor;

pub use policy::{BudgetDecision, Detection, RestartBudget, WardenPolicy, WorkerState};
pub use state_files::{StatePaths, StateWriter, StatusDocument};
pub use supervisor::{Warden, WardenConfig};
