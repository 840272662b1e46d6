//! Belt (track) kinematics: the closed path around an ordered set of wheels,
//! arclength sampling, and the run state driven by a velocity command.
//!
//! Belt geometry lives in a 2D plane. For a Track node that plane is the
//! node's local X–Z plane; [`to_belt_plane`] and [`from_belt_plane`] convert.

pub mod path;
pub mod state;

pub use path::{BeltPath, BeltPiece, BeltPose, Wheel};
pub use state::{BeltDrive, TrackAnimation, TrackState};

use thiserror::Error;
use treadsim_core::{vec3, Vec2, Vec3};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum TrackError {
    #[error("invalid wheel {index}: {reason}")]
    InvalidWheel { index: usize, reason: String },
    #[error("degenerate track: {0}")]
    DegenerateTrack(String),
    #[error("unclosable track: {0}")]
    UnclosableTrack(String),
}

/// Track-local point to belt-plane coordinates (x, z).
#[inline] pub fn to_belt_plane(p: Vec3) -> Vec2 { Vec2::new(p.x, p.z) }

/// Belt-plane point or direction back to track-local space (y = 0).
#[inline] pub fn from_belt_plane(p: Vec2) -> Vec3 { vec3(p.x, 0.0, p.y) }
