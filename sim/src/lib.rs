// Library exports for the UR controller simulator

pub mod controller;
pub mod motion;

pub use controller::{SimulatedController, DEFAULT_RATE_HZ};
pub use motion::{parse_movej, JointMotion};
