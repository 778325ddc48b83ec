//! Units of work and their lifecycle.

mod state;
mod unit;

pub use state::UnitOfWorkState;
pub use unit::{DisposeOutcome, UnitOfWork};
