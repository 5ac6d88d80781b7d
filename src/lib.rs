mod control;
mod diff;
mod error;
mod logger;
mod session;
mod transport;
mod types;

pub mod dialect;
pub mod energy;
pub mod flat;
pub mod resolver;
pub mod store;
pub mod tree;

pub use dialect::Dialect;
pub use energy::{EnergyEstimator, Margin, PowerEstimate};
pub use error::{Error, Result};
pub use logger::MessageLogMode;
pub use resolver::{Discovery, Resolver, ResolverBuilder};
pub use session::{ChangeCallback, DeviceSession};
pub use store::ValueStore;
pub use transport::RetryPolicy;
pub use types::*;
