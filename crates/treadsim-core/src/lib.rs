pub mod scalar;
pub mod ids;
pub mod types;
pub mod hash;
pub mod time;
pub mod rng;
pub mod step_ctx;
pub mod config;

pub use scalar::Scalar;
pub use ids::{BodyId, TrackId};
pub use types::{Vec3, Mat3, Isometry, Velocity, vec3};
pub use hash::{StepHasher, hash_vec3, hash_quat, digest_u64};
pub use time::StepStats;
pub use rng::XorShift64;
pub use step_ctx::StepCtx;
pub use config::{SimConfig, ContactDefaults, ConfigError};
pub use glam::{Quat, Vec2};
