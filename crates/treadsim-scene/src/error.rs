use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SceneError {
    #[error("parse error at {line}:{col}: {msg}")]
    Parse { line: u32, col: u32, msg: String },
    #[error("unresolved reference `{name}`{}", .at.map(|(l, c)| format!(" at {l}:{c}")).unwrap_or_default())]
    UnresolvedReference { name: String, at: Option<(u32, u32)> },
}
