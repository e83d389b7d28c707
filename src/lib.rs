pub mod clock;
pub mod collaborators;
pub mod config;
pub mod crv;
pub mod effort;
pub mod error;
pub mod executor;
pub mod idempotency;
pub mod policy;
pub mod reflexion;
pub mod reliability;
pub mod telemetry;
pub mod test_harness;
pub mod tool;
pub mod types;

pub use config::KernelConfig;
pub use error::KernelError;
pub use executor::{IntegratedExecutor, IntegratedRequest, IntegratedResult};
pub use test_harness::{run_simulator, SimulatorConfig};
pub use types::*;
