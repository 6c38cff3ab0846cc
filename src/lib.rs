//! Actor execution kernel: supervised lifecycle, publish/subscribe bus,
//! channel-topic flow control, and transparent remote links over a
//! configuration-assembled actor graph.

pub mod actor;
pub mod builtin;
pub mod bus;
pub mod clock;
pub mod config;
pub mod driver;
pub mod error;
pub mod master;
pub mod remote;
pub mod scheduler;
pub mod topic;
pub mod universe;

pub mod testkit;

pub use actor::{Actor, ActorContext, ActorHandle, ActorState};
pub use bus::{Bus, BusEvent};
pub use clock::Clock;
pub use config::Configuration;
pub use error::KernelError;
pub use master::Master;
pub use universe::Universe;
