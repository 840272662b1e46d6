use std::fmt::Write as _;

use crate::doc::{Atom, FieldValue, ListItem, NodeId, NodeRef, SceneDoc};

const INDENT: &str = "  ";

/// Re-emit a document in canonical layout. Parsing the output yields the same
/// header, protos, tree, DEF/USE structure and field values.
pub fn write(doc: &SceneDoc) -> String {
    let mut out = String::new();
    if let Some(h) = &doc.header {
        out.push_str(h);
        out.push('\n');
    }
    for url in &doc.externprotos {
        let _ = writeln!(out, "EXTERNPROTO {}", quote(url));
    }
    for r in &doc.roots {
        write_ref(doc, *r, 0, &mut out);
        out.push('\n');
    }
    out
}

fn write_ref(doc: &SceneDoc, r: NodeRef, depth: usize, out: &mut String) {
    match r {
        NodeRef::Null => out.push_str("NULL"),
        NodeRef::Use(id) => {
            let name = doc.node(id).def_name.as_deref().unwrap_or_default();
            let _ = write!(out, "USE {name}");
        }
        NodeRef::Owned(id) => write_node(doc, id, depth, out),
    }
}

fn write_node(doc: &SceneDoc, id: NodeId, depth: usize, out: &mut String) {
    let n = doc.node(id);
    if let Some(def) = &n.def_name {
        let _ = write!(out, "DEF {def} ");
    }
    if n.fields.is_empty() {
        let _ = write!(out, "{} {{\n{}}}", n.type_name, INDENT.repeat(depth));
        return;
    }
    let _ = writeln!(out, "{} {{", n.type_name);
    for (name, value) in &n.fields {
        out.push_str(&INDENT.repeat(depth + 1));
        out.push_str(name);
        out.push(' ');
        write_value(doc, value, depth + 1, out);
        out.push('\n');
    }
    out.push_str(&INDENT.repeat(depth));
    out.push('}');
}

fn write_value(doc: &SceneDoc, v: &FieldValue, depth: usize, out: &mut String) {
    match v {
        FieldValue::Atoms(atoms) => {
            let parts: Vec<String> = atoms.iter().map(atom_text).collect();
            out.push_str(&parts.join(" "));
        }
        FieldValue::Node(r) => write_ref(doc, *r, depth, out),
        FieldValue::List(items) if items.iter().all(|i| matches!(i, ListItem::Atom(_))) => {
            out.push('[');
            for it in items {
                if let ListItem::Atom(a) = it {
                    out.push(' ');
                    out.push_str(&atom_text(a));
                }
            }
            out.push_str(" ]");
        }
        FieldValue::List(items) => {
            out.push_str("[\n");
            for it in items {
                out.push_str(&INDENT.repeat(depth + 1));
                match it {
                    ListItem::Node(r) => write_ref(doc, *r, depth + 1, out),
                    ListItem::Atom(a) => out.push_str(&atom_text(a)),
                }
                out.push('\n');
            }
            out.push_str(&INDENT.repeat(depth));
            out.push(']');
        }
    }
}

fn atom_text(a: &Atom) -> String {
    match a {
        // f64 Display is the shortest text that parses back to the same value
        Atom::Num(v) => format!("{v}"),
        Atom::Bool(true) => "TRUE".into(),
        Atom::Bool(false) => "FALSE".into(),
        Atom::Str(s) => quote(s),
    }
}

fn quote(s: &str) -> String {
    let mut q = String::with_capacity(s.len() + 2);
    q.push('"');
    for c in s.chars() {
        if c == '"' || c == '\\' { q.push('\\'); }
        q.push(c);
    }
    q.push('"');
    q
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc::NodeKind;
    use crate::load;

    const SCENE: &str = r#"#VRML_SIM R2023b utf8
EXTERNPROTO "protos/Arena.proto"
WorldInfo {
  basicTimeStep 4
  contactProperties [
    ContactProperties { material1 "belt" material2 "debris" coulombFriction [ 0.8 ] bounce 0.1 }
  ]
}
DEF BOT Robot {
  name "bot \"one\""
  controller "belt_ctrl"
  children [
    Track {
      translation 0.1 -0.2 3e-2
      children [
        TrackWheel { position -0.1 0.05 radius 0.05 inner FALSE }
        TrackWheel { position 0.1 0.05 radius 0.05 }
      ]
      device [ LinearMotor { name "test_motor" maxVelocity 2 } ]
      boundingObject DEF TRACK_BO Group { children [ Box { size 0.3 0.1 0.02 } ] }
      physics NULL
    }
  ]
  boundingObject USE TRACK_BO
}
"#;

    fn same_tree(a: &SceneDoc, b: &SceneDoc) {
        assert_eq!(a.header, b.header);
        assert_eq!(a.externprotos, b.externprotos);
        assert_eq!(a.roots, b.roots);
        assert_eq!(a.nodes.len(), b.nodes.len());
        for (x, y) in a.nodes.iter().zip(&b.nodes) {
            assert_eq!(x.type_name, y.type_name);
            assert_eq!(x.def_name, y.def_name);
            assert_eq!(x.parent, y.parent);
            assert_eq!(x.fields, y.fields);
        }
    }

    #[test]
    fn round_trip_preserves_fields_and_aliases() {
        let first = load(SCENE).unwrap();
        let text = write(&first);
        let second = load(&text).unwrap();
        same_tree(&first, &second);
        // stable after one pass
        assert_eq!(write(&second), text);

        let track = second.nodes_of_kind(NodeKind::Track)[0];
        assert_eq!(second.translation(track).z, 0.03);
        let robot = second.resolve("BOT").unwrap();
        assert_eq!(second.str(robot, "name"), Some("bot \"one\""));
    }

    #[test]
    fn empty_node_and_empty_list() {
        let doc = load("Group { children [ ] } Box { }").unwrap();
        let again = load(&write(&doc)).unwrap();
        same_tree(&doc, &again);
    }
}
