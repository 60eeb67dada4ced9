mod provider;
mod types;

pub use provider::TzktProvider;
pub use types::{AccountRef, OperationStep, StepParameter};
