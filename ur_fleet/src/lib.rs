//! Connection supervision and virtual robot provisioning for Universal Robots
//! controllers.
//!
//! A [`Fleet`] owns one instance of every service:
//!
//! * [`slots::SlotAllocator`] hands out numeric slots that fix each virtual
//!   robot's host ports.
//! * [`gate::AdmissionGate`] bounds how many virtual robots may run at once.
//! * [`provisioner::Provisioner`] starts and removes simulator containers
//!   through a [`runtime::ContainerRuntime`].
//! * [`drivers::ConnectionManager`] keeps a TCP session open to every robot,
//!   splits realtime frames from text and publishes [`events::FleetEvent`]s.

pub mod config;
pub mod drivers;
pub mod errors;
pub mod events;
pub mod fleet;
pub mod gate;
pub mod provisioner;
pub mod realtime;
pub mod runtime;
pub mod slots;

pub use config::FleetConfig;
pub use errors::*;
pub use events::{EventBus, FleetEvent};
pub use fleet::Fleet;
