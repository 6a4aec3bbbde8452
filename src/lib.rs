pub mod service;

pub use service::{ControlCommand, PoseService};
