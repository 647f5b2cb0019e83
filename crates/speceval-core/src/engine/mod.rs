pub mod runner;
pub mod state;

pub use runner::{RunPolicy, Runner, SuiteReport};
pub use state::{AttemptState, CaseMachine};
