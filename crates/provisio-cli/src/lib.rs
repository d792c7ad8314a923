pub mod fetch;
pub mod state;
pub mod steps;
pub mod workflow;

pub use state::{Adapters, StepContext};
pub use workflow::{Provisioner, Step, StepOutcome, StepRecord, StepStatus};
