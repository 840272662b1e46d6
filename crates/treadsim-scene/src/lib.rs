//! Scene document model: a lossless tree of typed nodes read from the
//! `#VRML_SIM` text format, stored in an arena with `DEF`/`USE` aliases as
//! back-references by index.

mod lexer;
pub mod error;
pub mod doc;
pub mod parser;
pub mod writer;
pub mod assets;

pub use assets::{asset_refs, check_assets, AssetRef};
pub use doc::{Atom, DeviceKind, FieldValue, GeometryKind, ListItem, NodeData, NodeId, NodeKind, NodeRef, SceneDoc};
pub use error::SceneError;
pub use parser::{load, MAX_DEPTH};
pub use writer::write;

