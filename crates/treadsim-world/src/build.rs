//! Scene document → engine state. Everything is assembled into a fresh
//! [`World`]; the first error drops it, so no partial world escapes.

use std::collections::BTreeMap;
use std::path::Path;

use log::{debug, info, warn};
use treadsim_core::{vec3, BodyId, Isometry, Scalar, SimConfig, TrackId, Vec2, Vec3};
use treadsim_devices::{DeviceBus, DeviceKind as BusDeviceKind, DeviceSpec};
use treadsim_dynamics::Bodies;
use treadsim_fluid::FluidVolume;
use treadsim_geom::{aabb_of, compute_mass, Aabb, BoundingGeom, MassProps, Shape};
use treadsim_materials::{ContactTable, PairProps, DEFAULT_MATERIAL};
use treadsim_scene::{check_assets, DeviceKind, FieldValue, GeometryKind, ListItem, NodeId, NodeKind, NodeRef, SceneDoc};
use treadsim_track::{BeltDrive, BeltPath, TrackAnimation, Wheel};

use crate::{BodyName, ControllerSlot, LoadReport, MountedTrack, World, WorldError};

const DEFAULT_GRAVITY: Scalar = 9.81;
// Half thickness given to infinite planes.
const PLANE_HALF_THICKNESS: Scalar = 0.001;

/// Human-readable label for errors and logs: DEF name, else `name`, else type.
pub(crate) fn node_label(doc: &SceneDoc, id: NodeId) -> String {
    let n = doc.node(id);
    if let Some(def) = &n.def_name { return def.clone(); }
    match doc.str(id, "name") {
        Some(name) => format!("{} \"{name}\"", n.type_name),
        None => format!("{} {id} (line {})", n.type_name, n.line),
    }
}

/// Nodes defined in place in an MFNode/SFNode field. `USE` aliases are left
/// out: they share geometry, never simulation identity.
fn owned_in(doc: &SceneDoc, id: NodeId, field: &str) -> Vec<NodeId> {
    match doc.field(id, field) {
        Some(FieldValue::List(items)) => items.iter()
            .filter_map(|i| match i { ListItem::Node(NodeRef::Owned(c)) => Some(*c), _ => None })
            .collect(),
        Some(FieldValue::Node(NodeRef::Owned(c))) => vec![*c],
        _ => Vec::new(),
    }
}

fn f32_or(doc: &SceneDoc, id: NodeId, field: &str, default: Scalar) -> Scalar {
    doc.float(id, field).map(|v| v as Scalar).unwrap_or(default)
}

/// Nodes that get a rigid body: Solid, Robot, Track, and anything carrying
/// `boundingObject` or `physics`. Fluids are volumes, not bodies.
fn is_body_node(doc: &SceneDoc, id: NodeId) -> bool {
    match doc.kind(id) {
        NodeKind::Fluid | NodeKind::Arena => false,
        k if k.is_solid_like() => true,
        NodeKind::Other => doc.has_field(id, "boundingObject") || doc.has_field(id, "physics"),
        _ => false,
    }
}

fn is_joint(doc: &SceneDoc, id: NodeId) -> bool {
    doc.kind(id) == NodeKind::Other && doc.node(id).type_name.ends_with("Joint")
}

/// Convert a `boundingObject` subtree. Unsupported geometry is skipped with a
/// warning; `Ok(None)` means nothing usable was found.
pub(crate) fn bounding_geom(doc: &SceneDoc, id: NodeId, warnings: &mut Vec<String>) -> Result<Option<BoundingGeom>, WorldError> {
    let invalid = |reason: String| WorldError::InvalidGeometry { node: node_label(doc, id), reason };
    let leaf = |s: Shape| -> Result<Option<BoundingGeom>, WorldError> {
        if s.is_valid() { Ok(Some(BoundingGeom::Leaf(s))) } else { Err(invalid(format!("{s:?}"))) }
    };
    match doc.kind(id) {
        NodeKind::Geometry(GeometryKind::Box) => {
            let size = doc.vec3(id, "size").unwrap_or(Vec3::splat(0.1));
            leaf(Shape::Box { hx: size.x * 0.5, hy: size.y * 0.5, hz: size.z * 0.5 })
        }
        NodeKind::Geometry(GeometryKind::Sphere) => leaf(Shape::Sphere { r: f32_or(doc, id, "radius", 0.1) }),
        NodeKind::Geometry(GeometryKind::Cylinder) => leaf(Shape::Cylinder {
            r: f32_or(doc, id, "radius", 0.05),
            hh: f32_or(doc, id, "height", 0.1) * 0.5,
        }),
        NodeKind::Geometry(GeometryKind::Capsule) => leaf(Shape::Capsule {
            r: f32_or(doc, id, "radius", 0.05),
            hh: f32_or(doc, id, "height", 0.1) * 0.5,
        }),
        NodeKind::Geometry(GeometryKind::Plane) => {
            let size = doc.vec2(id, "size").unwrap_or(Vec2::ONE);
            leaf(Shape::Box { hx: size.x * 0.5, hy: size.y * 0.5, hz: PLANE_HALF_THICKNESS })
        }
        NodeKind::Shape => match doc.node_field(id, "geometry") {
            Some(g) => bounding_geom(doc, g, warnings),
            None => Ok(None),
        },
        NodeKind::Transform | NodeKind::Group => {
            if doc.kind(id) == NodeKind::Transform && doc.scale(id) != Vec3::ONE {
                warnings.push(format!("{}: scale is ignored in bounding objects", node_label(doc, id)));
            }
            let local = doc.local_transform(id);
            let mut parts = Vec::new();
            for c in doc.children(id) {
                if let Some(g) = bounding_geom(doc, c, warnings)? {
                    parts.push((Isometry::IDENTITY, g));
                }
            }
            if parts.is_empty() { return Ok(None); }
            Ok(Some(BoundingGeom::Group(vec![(local, BoundingGeom::Group(parts))])))
        }
        _ => {
            warnings.push(format!("{}: unsupported bounding geometry `{}` skipped",
                node_label(doc, id), doc.node(id).type_name));
            Ok(None)
        }
    }
}

/// A solid-like node fused into a body, with its pose in the body frame.
struct Part {
    node: NodeId,
    local: Isometry,
}

pub(crate) struct Builder<'a> {
    doc: &'a SceneDoc,
    world: World,
    report: LoadReport,
    // controller name -> tracks, filled while walking
    controller_tracks: BTreeMap<String, Vec<TrackId>>,
}

impl<'a> Builder<'a> {
    pub(crate) fn new(doc: &'a SceneDoc, cfg: &SimConfig) -> Self {
        let defaults = PairProps::new(cfg.contact.friction, cfg.contact.bounce);
        let world = World {
            bodies: Bodies::default(),
            body_names: Vec::new(),
            colliders: Vec::new(),
            materials: ContactTable::new(defaults),
            tracks: Vec::new(),
            bus: DeviceBus::new(),
            controllers: BTreeMap::new(),
            fluids: Vec::new(),
            gravity: vec3(0.0, 0.0, -DEFAULT_GRAVITY),
            up: Vec3::Z,
            dt: cfg.default_time_step_ms / 1000.0,
            tick: 0,
            cfg: cfg.clone(),
        };
        Self { doc, world, report: LoadReport::default(), controller_tracks: BTreeMap::new() }
    }

    pub(crate) fn build(mut self, base_dir: &Path) -> Result<(World, LoadReport), WorldError> {
        self.world_info();
        for w in check_assets(self.doc, base_dir) {
            self.report.warnings.push(w);
        }
        let roots: Vec<NodeId> = self.doc.root_nodes().collect();
        for r in roots {
            self.visit(r, Isometry::IDENTITY, None)?;
        }
        for (name, tracks) in std::mem::take(&mut self.controller_tracks) {
            self.report.controllers.push(name.clone());
            self.world.controllers.insert(name, ControllerSlot { tracks, link: None });
        }
        for c in self.world.colliders.iter_mut() {
            c.refresh_aabb(&self.world.bodies);
        }

        let w = &self.world;
        self.report.bodies = w.bodies.len();
        self.report.colliders = w.colliders.len();
        self.report.tracks = w.tracks.len();
        self.report.devices = (0..w.tracks.len()).map(|t| w.bus.specs(TrackId(t as u32)).count()).sum();
        self.report.fluids = w.fluids.len();
        self.report.time_step_ms = w.dt * 1000.0;
        self.report.gravity = [w.gravity.x, w.gravity.y, w.gravity.z];
        info!(
            "world: {} bodies, {} colliders, {} tracks, {} devices, {} fluids, dt {} ms, {} warning(s)",
            self.report.bodies, self.report.colliders, self.report.tracks, self.report.devices,
            self.report.fluids, self.report.time_step_ms, self.report.warnings.len()
        );
        Ok((self.world, self.report))
    }

    fn warn(&mut self, msg: String) {
        warn!("{msg}");
        self.report.warnings.push(msg);
    }

    /// Time step, gravity and contact properties from the first WorldInfo.
    fn world_info(&mut self) {
        let doc = self.doc;
        let cfg = self.world.cfg.clone();
        let info_node = doc.root_nodes().find(|&n| doc.kind(n) == NodeKind::WorldInfo);

        let mut step_ms = info_node
            .and_then(|n| doc.float(n, "basicTimeStep"))
            .map(|v| v as Scalar)
            .unwrap_or(cfg.default_time_step_ms);
        if !(step_ms.is_finite() && step_ms > 0.0) {
            self.warn(format!("basicTimeStep {step_ms} is not usable, using {} ms", cfg.default_time_step_ms));
            step_ms = cfg.default_time_step_ms;
        }
        if let Some(ms) = cfg.time_step_ms { step_ms = ms; }
        self.world.dt = step_ms / 1000.0;

        let up = match info_node.and_then(|n| doc.str(n, "coordinateSystem")) {
            Some("NUE") => Vec3::Y,
            _ => Vec3::Z,
        };
        let g = info_node.map(|n| f32_or(doc, n, "gravity", DEFAULT_GRAVITY)).unwrap_or(DEFAULT_GRAVITY);
        self.world.up = up;
        self.world.gravity = match cfg.gravity {
            Some([x, y, z]) => vec3(x, y, z),
            None => -up * g,
        };

        let Some(info_node) = info_node else { return };
        for cp in doc.node_list(info_node, "contactProperties") {
            if doc.kind(cp) != NodeKind::ContactProperties { continue; }
            let m1 = doc.str(cp, "material1").unwrap_or(DEFAULT_MATERIAL);
            let m2 = doc.str(cp, "material2").unwrap_or(DEFAULT_MATERIAL);
            let friction = doc.floats(cp, "coulombFriction")
                .and_then(|v| v.first().copied())
                .map(|v| v as Scalar)
                .unwrap_or(cfg.contact.friction);
            let mut props = PairProps::new(friction, f32_or(doc, cp, "bounce", cfg.contact.bounce));
            props.bounce_velocity = f32_or(doc, cp, "bounceVelocity", props.bounce_velocity);
            debug!("contact properties ({m1}, {m2}): {props:?}");
            self.world.materials.insert(m1, m2, props);
        }
    }

    /// Depth-first walk. `owner` is the body that solid-like descendants fuse into.
    fn visit(&mut self, id: NodeId, parent: Isometry, owner: Option<(BodyId, Isometry)>) -> Result<(), WorldError> {
        let doc = self.doc;
        match doc.kind(id) {
            NodeKind::WorldInfo | NodeKind::ContactProperties | NodeKind::Physics | NodeKind::TrackWheel
            | NodeKind::Shape | NodeKind::Geometry(_) | NodeKind::Device(_) => Ok(()),
            NodeKind::Fluid => self.add_fluid(id, parent.compose(&doc.local_transform(id))),
            NodeKind::Arena => {
                self.add_arena(id, parent.compose(&doc.local_transform(id)));
                Ok(())
            }
            _ if is_body_node(doc, id) => {
                let pose = parent.compose(&doc.local_transform(id));
                match owner {
                    Some((body, body_pose)) => {
                        let local = body_pose.inverse().compose(&pose);
                        self.attach_part(body, Part { node: id, local })?;
                        self.visit_children(id, pose, owner)
                    }
                    None => {
                        let body = self.register_body(id, pose)?;
                        self.visit_children(id, pose, Some((body, pose)))
                    }
                }
            }
            _ if is_joint(doc, id) => {
                // the end point of a joint moves on its own
                for end in owned_in(doc, id, "endPoint") {
                    self.visit(end, parent, None)?;
                }
                Ok(())
            }
            _ => {
                let pose = parent.compose(&doc.local_transform(id));
                self.visit_children(id, pose, owner)
            }
        }
    }

    fn visit_children(&mut self, id: NodeId, pose: Isometry, owner: Option<(BodyId, Isometry)>) -> Result<(), WorldError> {
        for c in owned_in(self.doc, id, "children") {
            self.visit(c, pose, owner)?;
        }
        Ok(())
    }

    /// Create the body for a top-level solid-like node and attach its own
    /// geometry, mass and (for tracks) belt.
    pub(crate) fn register_body(&mut self, id: NodeId, pose: Isometry) -> Result<BodyId, WorldError> {
        let doc = self.doc;
        let dynamic = doc.node_field(id, "physics").map_or(false, |p| doc.kind(p) == NodeKind::Physics);
        let name = BodyName {
            def: doc.node(id).def_name.clone(),
            name: doc.str(id, "name").unwrap_or(match doc.kind(id) {
                NodeKind::Robot => "robot",
                NodeKind::Track => "track",
                _ => "solid",
            }).to_string(),
        };
        let body = self.world.insert_body(pose, MassProps::infinite(), dynamic, name);
        self.attach_part(body, Part { node: id, local: Isometry::IDENTITY })?;
        if dynamic && self.world.bodies.inv_mass_of(body.0) == 0.0 {
            return Err(WorldError::Mass {
                node: node_label(doc, id),
                source: treadsim_geom::MassError::InvalidMass("physics node resolved to no mass".into()),
            });
        }
        debug!("body {body} <- {} (mass {})", node_label(doc, id), self.world.bodies.mass_of(body.0));
        Ok(body)
    }

    /// Add one node's colliders, mass and track to `body`.
    fn attach_part(&mut self, body: BodyId, part: Part) -> Result<(), WorldError> {
        let doc = self.doc;
        let id = part.node;
        let label = node_label(doc, id);
        let material = doc.str(id, "contactMaterial").unwrap_or(DEFAULT_MATERIAL).to_string();

        let mut warnings = Vec::new();
        let geom = match doc.node_field(id, "boundingObject") {
            Some(b) => bounding_geom(doc, b, &mut warnings)?,
            None => None,
        };
        for w in warnings { self.warn(w); }

        let track = if doc.kind(id) == NodeKind::Track {
            Some(self.add_track(id, body, part.local)?)
        } else {
            None
        };

        if let Some(g) = &geom {
            for (local, shape) in g.leaves(&part.local) {
                self.world.colliders.push(crate::contact::Collider {
                    body, shape, local, aabb: Aabb::empty(), material: material.clone(), track,
                });
            }
        }

        if let Some(phys) = doc.node_field(id, "physics").filter(|p| doc.kind(*p) == NodeKind::Physics) {
            let density = f32_or(doc, phys, "density", 1000.0);
            let explicit = doc.float(phys, "mass").map(|m| m as Scalar).filter(|m| *m != -1.0);
            let m = compute_mass(geom.as_ref(), density, explicit)
                .map_err(|source| WorldError::Mass { node: label.clone(), source })?;
            if self.world.bodies.is_dynamic(body.0) {
                let total = MassProps::from_mass(self.world.bodies.mass_of(body.0)).combine(&MassProps::from_mass(m));
                self.world.bodies.set_inv_mass(body.0, total.inv_mass);
            } else {
                debug!("{label}: physics on a part of a static body is ignored");
            }
        }
        Ok(())
    }

    fn add_track(&mut self, id: NodeId, body: BodyId, local: Isometry) -> Result<TrackId, WorldError> {
        let doc = self.doc;
        let label = node_label(doc, id);

        let wheels: Vec<Wheel> = doc.children(id).into_iter()
            .filter(|&c| doc.kind(c) == NodeKind::TrackWheel)
            .map(|w| {
                let p = doc.vec2(w, "position").unwrap_or(Vec2::ZERO);
                Wheel {
                    center: p,
                    radius: f32_or(doc, w, "radius", 0.1),
                    inner: doc.bool(w, "inner").unwrap_or(true),
                }
            })
            .collect();
        let path = BeltPath::solve(&wheels).map_err(|source| WorldError::Track { track: label.clone(), source })?;

        let mut devices = Vec::new();
        for d in doc.node_list(id, "device") {
            let kind = match doc.kind(d) {
                NodeKind::Device(DeviceKind::LinearMotor) => BusDeviceKind::LinearMotor,
                NodeKind::Device(DeviceKind::RotationalMotor) => BusDeviceKind::RotationalMotor,
                NodeKind::Device(DeviceKind::PositionSensor) => {
                    debug!("{label}: position sensor `{}` is not driven", doc.str(d, "name").unwrap_or(""));
                    continue;
                }
                _ => {
                    self.warn(format!("{label}: device `{}` is not a motor, skipped", doc.node(d).type_name));
                    continue;
                }
            };
            let default_name = match kind {
                BusDeviceKind::LinearMotor => "linear motor",
                BusDeviceKind::RotationalMotor => "rotational motor",
            };
            devices.push(DeviceSpec {
                name: doc.str(d, "name").unwrap_or(default_name).to_string(),
                kind,
                max_velocity: f32_or(doc, d, "maxVelocity", DeviceSpec::DEFAULT_MAX_VELOCITY),
            });
        }
        let tid = self.world.bus.add_track(devices)?;

        let plates = if doc.has_field(id, "animatedGeometry") {
            doc.float(id, "geometriesCount").map(|n| n.max(0.0) as usize).unwrap_or(10)
        } else {
            0
        };
        let anim = TrackAnimation::new(plates, doc.vec2(id, "textureAnimation").unwrap_or(Vec2::ZERO));

        let controller = doc.ancestor_where(id, |k| k == NodeKind::Robot)
            .and_then(|r| doc.str(r, "controller"))
            .filter(|c| !c.is_empty() && *c != "<none>")
            .map(str::to_string);
        if let Some(c) = &controller {
            self.controller_tracks.entry(c.clone()).or_default().push(tid);
        }

        info!("track {tid} `{label}`: {} wheels, belt length {:.4} m", wheels.len(), path.length());
        self.world.tracks.push(MountedTrack {
            name: doc.str(id, "name").unwrap_or("track").to_string(),
            def: doc.node(id).def_name.clone(),
            body,
            local,
            wheel0_radius: wheels[0].radius,
            path,
            drive: BeltDrive::default(),
            anim,
            uv: Vec2::ZERO,
            controller,
        });
        Ok(tid)
    }

    fn add_fluid(&mut self, id: NodeId, pose: Isometry) -> Result<(), WorldError> {
        let doc = self.doc;
        let mut warnings = Vec::new();
        let geom = match doc.node_field(id, "boundingObject") {
            Some(b) => bounding_geom(doc, b, &mut warnings)?,
            None => None,
        };
        for w in warnings { self.warn(w); }
        let Some(geom) = geom else {
            self.warn(format!("{}: fluid without boundingObject has no effect", node_label(doc, id)));
            return Ok(());
        };
        let bounds = geom.leaves(&pose).iter()
            .fold(Aabb::empty(), |acc, (xf, s)| acc.union(&aabb_of(s, xf)));
        let stream = doc.vec3(id, "streamVelocity").unwrap_or(Vec3::ZERO);
        let mut fluid = FluidVolume::new(bounds, stream);
        fluid.density = f32_or(doc, id, "density", FluidVolume::DEFAULT_DENSITY);
        debug!("fluid {}: {bounds:?}, stream {stream:?}", node_label(doc, id));
        self.world.fluids.push(fluid);
        Ok(())
    }

    /// Floor plus four walls, static.
    fn add_arena(&mut self, id: NodeId, pose: Isometry) {
        let doc = self.doc;
        let floor = doc.vec2(id, "floorSize").unwrap_or(Vec2::ONE);
        let h = f32_or(doc, id, "wallHeight", 0.1);
        let t = f32_or(doc, id, "wallThickness", 0.01);
        let material = doc.str(id, "contactMaterial").unwrap_or(DEFAULT_MATERIAL).to_string();
        let name = BodyName {
            def: doc.node(id).def_name.clone(),
            name: doc.str(id, "name").unwrap_or("rectangle arena").to_string(),
        };
        let body = self.world.insert_body(pose, MassProps::infinite(), false, name);
        let (fx, fy) = (floor.x * 0.5, floor.y * 0.5);
        let at = |x: Scalar, y: Scalar, z: Scalar| Isometry::from_translation_axis_angle([x, y, z], [0.0, 0.0, 1.0, 0.0]);
        let parts = [
            (at(0.0, 0.0, -PLANE_HALF_THICKNESS), Shape::Box { hx: fx, hy: fy, hz: PLANE_HALF_THICKNESS }),
            (at(0.0, fy + t * 0.5, h * 0.5), Shape::Box { hx: fx + t, hy: t * 0.5, hz: h * 0.5 }),
            (at(0.0, -fy - t * 0.5, h * 0.5), Shape::Box { hx: fx + t, hy: t * 0.5, hz: h * 0.5 }),
            (at(fx + t * 0.5, 0.0, h * 0.5), Shape::Box { hx: t * 0.5, hy: fy, hz: h * 0.5 }),
            (at(-fx - t * 0.5, 0.0, h * 0.5), Shape::Box { hx: t * 0.5, hy: fy, hz: h * 0.5 }),
        ];
        for (local, shape) in parts {
            self.world.colliders.push(crate::contact::Collider {
                body, shape, local, aabb: Aabb::empty(), material: material.clone(), track: None,
            });
        }
        debug!("arena {}: floor {} x {}, walls {h} m", node_label(doc, id), floor.x, floor.y);
    }
}
