use log::debug;

use crate::doc::{Atom, FieldValue, ListItem, NodeData, NodeId, NodeKind, NodeRef, SceneDoc};
use crate::error::SceneError;
use crate::lexer::{tokenize, Tok, Token};

/// Deepest node nesting accepted before the parse is refused.
pub const MAX_DEPTH: usize = 256;

/// Parse a whole scene. Either the complete document comes back or an error;
/// nothing half-built escapes.
pub fn load(source: &str) -> Result<SceneDoc, SceneError> {
    let lexed = tokenize(source)?;
    let mut p = Parser { toks: lexed.tokens, pos: 0, depth: 0, doc: SceneDoc::default() };
    p.doc.header = lexed.header;
    p.document()?;
    debug!("scene: {} nodes, {} roots, {} DEFs", p.doc.nodes.len(), p.doc.roots.len(), p.doc.defs.len());
    Ok(p.doc)
}

struct Parser {
    toks: Vec<Token>,
    pos: usize,
    depth: usize,
    doc: SceneDoc,
}

impl Parser {
    fn peek(&self) -> &Tok { &self.toks[self.pos].tok }

    fn peek2(&self) -> &Tok {
        let i = (self.pos + 1).min(self.toks.len() - 1);
        &self.toks[i].tok
    }

    fn here(&self) -> (u32, u32) {
        let t = &self.toks[self.pos];
        (t.line, t.col)
    }

    fn next(&mut self) -> Token {
        let t = self.toks[self.pos].clone();
        if self.pos + 1 < self.toks.len() { self.pos += 1; }
        t
    }

    fn err<T>(&self, msg: impl Into<String>) -> Result<T, SceneError> {
        let (line, col) = self.here();
        Err(SceneError::Parse { line, col, msg: msg.into() })
    }

    fn expect_ident(&mut self, what: &str) -> Result<String, SceneError> {
        match self.peek().clone() {
            Tok::Ident(s) => { self.next(); Ok(s) }
            other => self.err(format!("expected {what}, found {}", describe(&other))),
        }
    }

    fn document(&mut self) -> Result<(), SceneError> {
        loop {
            match self.peek().clone() {
                Tok::Eof => return Ok(()),
                Tok::Ident(kw) if kw == "IMPORTABLE" => {
                    self.next();
                    if !matches!(self.peek(), Tok::Ident(k) if k == "EXTERNPROTO") {
                        return self.err("expected EXTERNPROTO after IMPORTABLE");
                    }
                }
                Tok::Ident(kw) if kw == "EXTERNPROTO" => {
                    self.next();
                    match self.next().tok {
                        Tok::Str(url) => self.doc.externprotos.push(url),
                        other => return self.err(format!("expected url string, found {}", describe(&other))),
                    }
                }
                _ => {
                    let r = self.node_ref(None)?;
                    self.doc.roots.push(r);
                }
            }
        }
    }

    fn starts_node(&self) -> bool {
        match self.peek() {
            Tok::Ident(s) if s == "DEF" || s == "USE" || s == "NULL" => true,
            Tok::Ident(s) if s != "TRUE" && s != "FALSE" => matches!(self.peek2(), Tok::LBrace),
            _ => false,
        }
    }

    fn node_ref(&mut self, parent: Option<NodeId>) -> Result<NodeRef, SceneError> {
        let (line, col) = self.here();
        let head = self.expect_ident("node")?;
        match head.as_str() {
            "NULL" => Ok(NodeRef::Null),
            "USE" => {
                let (l, c) = self.here();
                let name = self.expect_ident("DEF name after USE")?;
                match self.doc.defs.get(&name) {
                    Some(id) => Ok(NodeRef::Use(*id)),
                    None => Err(SceneError::UnresolvedReference { name, at: Some((l, c)) }),
                }
            }
            "DEF" => {
                let name = self.expect_ident("DEF name")?;
                let (line, _) = self.here();
                let type_name = self.expect_ident("node type after DEF name")?;
                let id = self.node_body(type_name, Some(name.clone()), parent, line)?;
                // bound after the body so a node cannot USE itself
                self.doc.defs.insert(name, id);
                Ok(NodeRef::Owned(id))
            }
            _ => {
                if !matches!(self.peek(), Tok::LBrace) {
                    return Err(SceneError::Parse { line, col, msg: format!("expected `{{` after node type `{head}`") });
                }
                let id = self.node_body(head, None, parent, line)?;
                Ok(NodeRef::Owned(id))
            }
        }
    }

    fn node_body(&mut self, type_name: String, def_name: Option<String>, parent: Option<NodeId>, line: u32)
        -> Result<NodeId, SceneError>
    {
        if !matches!(self.next().tok, Tok::LBrace) {
            return self.err(format!("expected `{{` after `{type_name}`"));
        }
        if self.depth >= MAX_DEPTH {
            return self.err(format!("nodes nested deeper than {MAX_DEPTH} levels"));
        }
        let id = NodeId(self.doc.nodes.len() as u32);
        let kind = NodeKind::from_type_name(&type_name);
        self.doc.nodes.push(NodeData { type_name, kind, def_name, fields: Vec::new(), parent, line });

        self.depth += 1;
        let body = self.fields(id);
        self.depth -= 1;
        body.map(|()| id)
    }

    fn fields(&mut self, id: NodeId) -> Result<(), SceneError> {
        loop {
            match self.peek().clone() {
                Tok::RBrace => { self.next(); break; }
                Tok::Ident(field) => {
                    self.next();
                    let value = self.value(id, &field)?;
                    self.doc.nodes[id.0 as usize].fields.push((field, value));
                }
                Tok::Eof => return self.err("unexpected end of input inside node"),
                other => return self.err(format!("expected field name or `}}`, found {}", describe(&other))),
            }
        }
        Ok(())
    }

    fn atom(&mut self) -> Option<Atom> {
        let a = match self.peek() {
            Tok::Number(v) => Atom::Num(*v),
            Tok::Str(s) => Atom::Str(s.clone()),
            Tok::Ident(s) if s == "TRUE" => Atom::Bool(true),
            Tok::Ident(s) if s == "FALSE" => Atom::Bool(false),
            _ => return None,
        };
        self.next();
        Some(a)
    }

    fn value(&mut self, owner: NodeId, field: &str) -> Result<FieldValue, SceneError> {
        if matches!(self.peek(), Tok::LBracket) {
            self.next();
            let mut items = Vec::new();
            loop {
                if matches!(self.peek(), Tok::RBracket) { self.next(); break; }
                if self.starts_node() {
                    items.push(ListItem::Node(self.node_ref(Some(owner))?));
                } else if let Some(a) = self.atom() {
                    items.push(ListItem::Atom(a));
                } else {
                    let found = describe(self.peek());
                    return self.err(format!("unexpected {found} in list `{field}`"));
                }
            }
            return Ok(FieldValue::List(items));
        }
        if self.starts_node() {
            return Ok(FieldValue::Node(self.node_ref(Some(owner))?));
        }
        let mut atoms = Vec::new();
        while let Some(a) = self.atom() {
            atoms.push(a);
        }
        if atoms.is_empty() {
            let found = describe(self.peek());
            return self.err(format!("expected value for field `{field}`, found {found}"));
        }
        Ok(FieldValue::Atoms(atoms))
    }
}

fn describe(t: &Tok) -> String {
    match t {
        Tok::Ident(s) => format!("`{s}`"),
        Tok::Number(v) => format!("number {v}"),
        Tok::Str(s) => format!("string {s:?}"),
        Tok::LBrace => "`{`".into(),
        Tok::RBrace => "`}`".into(),
        Tok::LBracket => "`[`".into(),
        Tok::RBracket => "`]`".into(),
        Tok::Eof => "end of input".into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCENE: &str = r#"#VRML_SIM R2023b utf8
EXTERNPROTO "https://example.org/protos/RectangleArena.proto"
WorldInfo { basicTimeStep 4 }
DEF BODY Solid {
  translation 0 0 0.5
  children [
    DEF GEOM Shape { geometry Box { size 1 1 1 } }
  ]
  boundingObject USE GEOM
  physics Physics { density -1 mass 0.25 }
}
"#;

    #[test]
    fn parses_header_protos_and_tree() {
        let doc = load(SCENE).unwrap();
        assert_eq!(doc.header.as_deref(), Some("#VRML_SIM R2023b utf8"));
        assert_eq!(doc.externprotos.len(), 1);
        assert_eq!(doc.roots.len(), 2);
        let body = doc.resolve("BODY").unwrap();
        assert_eq!(doc.kind(body), NodeKind::Solid);
        let geom = doc.resolve("GEOM").unwrap();
        assert_eq!(doc.node_field(body, "boundingObject"), Some(geom));
        assert_eq!(doc.node(geom).parent, Some(body));
        let phys = doc.node_field(body, "physics").unwrap();
        assert_eq!(doc.float(phys, "density"), Some(-1.0));
        assert_eq!(doc.float(phys, "mass"), Some(0.25));
    }

    #[test]
    fn use_before_def_fails_whole_load() {
        let err = load("Solid { boundingObject USE NOPE }\nDEF NOPE Box { }").unwrap_err();
        assert!(matches!(err, SceneError::UnresolvedReference { ref name, .. } if name == "NOPE"));
    }

    #[test]
    fn node_cannot_use_itself() {
        assert!(load("DEF A Group { children [ USE A ] }").is_err());
    }

    #[test]
    fn repeated_def_rebinds() {
        let doc = load("DEF A Box { } DEF A Sphere { } Shape { geometry USE A }").unwrap();
        let shape = doc.root_nodes().last().unwrap();
        let g = doc.node_field(shape, "geometry").unwrap();
        assert_eq!(doc.node(g).type_name, "Sphere");
    }

    #[test]
    fn mixed_scalars_and_lists() {
        let doc = load(r#"TrackWheel { position -0.1 0.05 inner FALSE name "w" url [ "a.png" "b.png" ] }"#).unwrap();
        let w = doc.root_nodes().next().unwrap();
        assert_eq!(doc.floats(w, "position"), Some(vec![-0.1, 0.05]));
        assert_eq!(doc.bool(w, "inner"), Some(false));
        assert_eq!(doc.str(w, "name"), Some("w"));
        assert_eq!(doc.strings(w, "url"), vec!["a.png", "b.png"]);
    }

    #[test]
    fn missing_brace_is_a_parse_error() {
        let err = load("Solid {\n  translation 1 2 3\n").unwrap_err();
        assert!(matches!(err, SceneError::Parse { .. }));
    }

    #[test]
    fn runaway_nesting_is_a_parse_error() {
        let err = load(&"Group { children [ ".repeat(50_000)).unwrap_err();
        assert!(matches!(err, SceneError::Parse { ref msg, .. } if msg.contains("nested")), "{err}");
    }

    #[test]
    fn nesting_up_to_the_limit_loads_and_walks_in_order() {
        let n = MAX_DEPTH;
        let src = format!("{}{}", "Group { children [ ".repeat(n), "] } ".repeat(n));
        let doc = load(&src).unwrap();
        let root = doc.root_nodes().next().unwrap();
        let mut seen = Vec::new();
        doc.walk(root, &mut |id| seen.push(id.0));
        assert_eq!(seen, (0..n as u32).collect::<Vec<_>>());
    }
}
