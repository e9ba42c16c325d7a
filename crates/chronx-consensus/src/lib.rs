pub mod driver;
pub mod state_machine;
pub mod vote_manager;

pub use driver::PbftDriver;
pub use state_machine::{two_f_plus_one, PbftStateMachine, RoundState};
pub use vote_manager::VoteManager;
