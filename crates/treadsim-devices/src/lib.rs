//! Device/actuator bus and the lock-step link to external controllers.

pub mod bus;
pub mod link;
pub mod wire;

pub use bus::{AppliedCommand, DeviceBus, DeviceKind, DeviceSpec};
pub use link::{Controller, ControllerLink, DeviceCommand, Exchange, SensorFrame};

use thiserror::Error;
use treadsim_core::TrackId;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum DeviceError {
    #[error("{track} has no device named `{name}`")]
    UnknownDevice { track: TrackId, name: String },
    #[error("{track} declares device `{name}` twice")]
    DuplicateDevice { track: TrackId, name: String },
    #[error("wire: {0}")]
    Wire(String),
}
