use std::collections::HashMap;
use std::fmt;

use treadsim_core::types::{Isometry, Vec3};
use treadsim_core::{vec3, Vec2};

use crate::error::SceneError;

/// Index of a node in [`SceneDoc::nodes`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "#{}", self.0) }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DeviceKind { LinearMotor, RotationalMotor, PositionSensor }

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum GeometryKind { Box, Cylinder, Sphere, Capsule, Plane, Other }

/// Closed set of node types the engine understands; everything else is `Other`
/// and only takes part in the tree (its fields are kept for round-trip).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum NodeKind {
    Shape,
    Transform,
    Group,
    Solid,
    Robot,
    Track,
    TrackWheel,
    Fluid,
    Physics,
    Device(DeviceKind),
    Geometry(GeometryKind),
    WorldInfo,
    ContactProperties,
    Arena,
    Other,
}

impl NodeKind {
    pub fn from_type_name(name: &str) -> Self {
        use NodeKind::*;
        match name {
            "Shape" => Shape,
            "Transform" | "Pose" => Transform,
            "Group" => Group,
            "Solid" => Solid,
            "Robot" => Robot,
            "Track" => Track,
            "TrackWheel" => TrackWheel,
            "Fluid" => Fluid,
            "Physics" => Physics,
            "LinearMotor" => Device(DeviceKind::LinearMotor),
            "RotationalMotor" => Device(DeviceKind::RotationalMotor),
            "PositionSensor" => Device(DeviceKind::PositionSensor),
            "Box" => Geometry(GeometryKind::Box),
            "Cylinder" => Geometry(GeometryKind::Cylinder),
            "Sphere" => Geometry(GeometryKind::Sphere),
            "Capsule" => Geometry(GeometryKind::Capsule),
            "Plane" => Geometry(GeometryKind::Plane),
            "Mesh" | "IndexedFaceSet" | "ElevationGrid" | "Cone" => Geometry(GeometryKind::Other),
            "WorldInfo" => WorldInfo,
            "ContactProperties" => ContactProperties,
            "RectangleArena" => Arena,
            _ => Other,
        }
    }

    /// Nodes that own a rigid body when not nested inside another one.
    pub fn is_solid_like(self) -> bool {
        matches!(self, NodeKind::Solid | NodeKind::Robot | NodeKind::Track | NodeKind::Arena)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Atom {
    Num(f64),
    Bool(bool),
    Str(String),
}

impl Atom {
    pub fn as_f64(&self) -> Option<f64> {
        match self { Atom::Num(v) => Some(*v), _ => None }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum NodeRef {
    /// Node defined in place; this field is its owner.
    Owned(NodeId),
    /// `USE name`: non-owning alias of an earlier `DEF`.
    Use(NodeId),
    Null,
}

impl NodeRef {
    /// Target node, whether owned or aliased.
    pub fn target(self) -> Option<NodeId> {
        match self { NodeRef::Owned(id) | NodeRef::Use(id) => Some(id), NodeRef::Null => None }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ListItem {
    Node(NodeRef),
    Atom(Atom),
}

#[derive(Clone, Debug, PartialEq)]
pub enum FieldValue {
    /// One or more scalars on a line: `translation 0 1 0`, `name "x"`, `inner FALSE`.
    Atoms(Vec<Atom>),
    Node(NodeRef),
    List(Vec<ListItem>),
}

#[derive(Clone, Debug)]
pub struct NodeData {
    pub type_name: String,
    pub kind: NodeKind,
    pub def_name: Option<String>,
    pub fields: Vec<(String, FieldValue)>,
    pub parent: Option<NodeId>,
    /// Source line of the type name.
    pub line: u32,
}

#[derive(Clone, Debug, Default)]
pub struct SceneDoc {
    pub header: Option<String>,
    pub externprotos: Vec<String>,
    pub nodes: Vec<NodeData>,
    pub roots: Vec<NodeRef>,
    /// Latest binding of each DEF name.
    pub defs: HashMap<String, NodeId>,
}

impl SceneDoc {
    #[inline] pub fn node(&self, id: NodeId) -> &NodeData { &self.nodes[id.0 as usize] }
    #[inline] pub fn kind(&self, id: NodeId) -> NodeKind { self.node(id).kind }
    #[inline] pub fn len(&self) -> usize { self.nodes.len() }
    #[inline] pub fn is_empty(&self) -> bool { self.nodes.is_empty() }

    pub fn resolve(&self, alias: &str) -> Result<NodeId, SceneError> {
        self.defs.get(alias).copied()
            .ok_or_else(|| SceneError::UnresolvedReference { name: alias.to_string(), at: None })
    }

    /// Owned top-level nodes in document order.
    pub fn root_nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.roots.iter().filter_map(|r| match r { NodeRef::Owned(id) => Some(*id), _ => None })
    }

    pub fn field(&self, id: NodeId, name: &str) -> Option<&FieldValue> {
        self.node(id).fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn has_field(&self, id: NodeId, name: &str) -> bool { self.field(id, name).is_some() }

    // -------- scalar accessors --------

    pub fn floats(&self, id: NodeId, name: &str) -> Option<Vec<f64>> {
        let atoms: Vec<&Atom> = match self.field(id, name)? {
            FieldValue::Atoms(a) => a.iter().collect(),
            FieldValue::List(items) => items.iter()
                .filter_map(|i| match i { ListItem::Atom(a) => Some(a), _ => None })
                .collect(),
            FieldValue::Node(_) => return None,
        };
        atoms.into_iter().map(Atom::as_f64).collect()
    }

    pub fn float(&self, id: NodeId, name: &str) -> Option<f64> {
        match self.field(id, name)? {
            FieldValue::Atoms(a) if a.len() == 1 => a[0].as_f64(),
            _ => None,
        }
    }

    pub fn bool(&self, id: NodeId, name: &str) -> Option<bool> {
        match self.field(id, name)? {
            FieldValue::Atoms(a) => match a.as_slice() { [Atom::Bool(b)] => Some(*b), _ => None },
            _ => None,
        }
    }

    pub fn str(&self, id: NodeId, name: &str) -> Option<&str> {
        match self.field(id, name)? {
            FieldValue::Atoms(a) => match a.as_slice() { [Atom::Str(s)] => Some(s.as_str()), _ => None },
            _ => None,
        }
    }

    /// String list field (`url [ "a.png" "b.png" ]`); a bare single string also counts.
    pub fn strings(&self, id: NodeId, name: &str) -> Vec<&str> {
        match self.field(id, name) {
            Some(FieldValue::List(items)) => items.iter()
                .filter_map(|i| match i { ListItem::Atom(Atom::Str(s)) => Some(s.as_str()), _ => None })
                .collect(),
            Some(FieldValue::Atoms(a)) => a.iter()
                .filter_map(|x| match x { Atom::Str(s) => Some(s.as_str()), _ => None })
                .collect(),
            _ => Vec::new(),
        }
    }

    pub fn vec2(&self, id: NodeId, name: &str) -> Option<Vec2> {
        match self.floats(id, name)?.as_slice() {
            [x, y] => Some(Vec2::new(*x as f32, *y as f32)),
            _ => None,
        }
    }

    pub fn vec3(&self, id: NodeId, name: &str) -> Option<Vec3> {
        match self.floats(id, name)?.as_slice() {
            [x, y, z] => Some(vec3(*x as f32, *y as f32, *z as f32)),
            _ => None,
        }
    }

    // -------- transform accessors --------

    pub fn translation(&self, id: NodeId) -> Vec3 { self.vec3(id, "translation").unwrap_or(Vec3::ZERO) }

    /// Axis-angle `[x, y, z, angle]`, default `0 0 1 0`.
    pub fn rotation(&self, id: NodeId) -> [f32; 4] {
        match self.floats(id, "rotation").as_deref() {
            Some([x, y, z, a]) => [*x as f32, *y as f32, *z as f32, *a as f32],
            _ => [0.0, 0.0, 1.0, 0.0],
        }
    }

    pub fn scale(&self, id: NodeId) -> Vec3 { self.vec3(id, "scale").unwrap_or(Vec3::ONE) }

    /// Rigid local transform (scale is not part of it).
    pub fn local_transform(&self, id: NodeId) -> Isometry {
        let t = self.translation(id);
        Isometry::from_translation_axis_angle([t.x, t.y, t.z], self.rotation(id))
    }

    // -------- node accessors --------

    /// SFNode field, resolving `USE` to its target.
    pub fn node_field(&self, id: NodeId, name: &str) -> Option<NodeId> {
        match self.field(id, name)? {
            FieldValue::Node(r) => r.target(),
            _ => None,
        }
    }

    /// MFNode field, resolving `USE`; `NULL` entries are skipped.
    pub fn node_list(&self, id: NodeId, name: &str) -> Vec<NodeId> {
        match self.field(id, name) {
            Some(FieldValue::List(items)) => items.iter()
                .filter_map(|i| match i { ListItem::Node(r) => r.target(), _ => None })
                .collect(),
            Some(FieldValue::Node(r)) => r.target().into_iter().collect(),
            _ => Vec::new(),
        }
    }

    pub fn children(&self, id: NodeId) -> Vec<NodeId> { self.node_list(id, "children") }

    /// Nodes directly owned by `id` (through any field), in field order.
    pub fn owned_children(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        for (_, v) in &self.node(id).fields {
            match v {
                FieldValue::Node(NodeRef::Owned(c)) => out.push(*c),
                FieldValue::List(items) => {
                    for it in items {
                        if let ListItem::Node(NodeRef::Owned(c)) = it { out.push(*c); }
                    }
                }
                _ => {}
            }
        }
        out
    }

    /// Depth-first pre-order over the owned tree rooted at `id`.
    pub fn walk(&self, id: NodeId, f: &mut dyn FnMut(NodeId)) {
        let mut stack = vec![id];
        while let Some(n) = stack.pop() {
            f(n);
            stack.extend(self.owned_children(n).into_iter().rev());
        }
    }

    /// Every owned node of the given kind, document order.
    pub fn nodes_of_kind(&self, kind: NodeKind) -> Vec<NodeId> {
        let mut out = Vec::new();
        for root in self.root_nodes() {
            self.walk(root, &mut |n| if self.kind(n) == kind { out.push(n) });
        }
        out
    }

    /// Nearest ancestor satisfying `pred`, following owning parents.
    pub fn ancestor_where(&self, id: NodeId, pred: impl Fn(NodeKind) -> bool) -> Option<NodeId> {
        let mut cur = self.node(id).parent;
        while let Some(p) = cur {
            if pred(self.kind(p)) { return Some(p); }
            cur = self.node(p).parent;
        }
        None
    }
}
