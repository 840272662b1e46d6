use std::path::{Path, PathBuf};

use log::warn;

use crate::doc::{NodeId, SceneDoc};

/// A `url` reference found in the document.
#[derive(Clone, Debug, PartialEq)]
pub struct AssetRef {
    pub node: NodeId,
    pub url: String,
}

/// Every string in a `url` field (textures, meshes, sounds), document order.
pub fn asset_refs(doc: &SceneDoc) -> Vec<AssetRef> {
    let mut out = Vec::new();
    for i in 0..doc.nodes.len() {
        let id = NodeId(i as u32);
        for url in doc.strings(id, "url") {
            out.push(AssetRef { node: id, url: url.to_string() });
        }
    }
    out
}

fn is_remote(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://") || url.starts_with("webots://")
}

/// Check local asset files relative to `base_dir`. Missing ones are returned as
/// warnings; they never fail a load.
pub fn check_assets(doc: &SceneDoc, base_dir: &Path) -> Vec<String> {
    let mut warnings = Vec::new();
    for a in asset_refs(doc) {
        if is_remote(&a.url) { continue; }
        let p: PathBuf = base_dir.join(&a.url);
        if !p.exists() {
            let msg = format!("missing asset `{}` referenced by {} ({})", a.url, doc.node(a.node).type_name, a.node);
            warn!("{msg}");
            warnings.push(msg);
        }
    }
    warnings
}
