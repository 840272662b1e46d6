//! Scene-driven world: builds bodies, belts, devices and fluids from a scene
//! document, then advances them in fixed ticks with controllers in lock-step.

mod build;
pub mod contact;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use log::{debug, warn};
use serde::Serialize;
use thiserror::Error;

use treadsim_collision::pairs_sap_grouped;
use treadsim_core::{
    hash_quat, hash_vec3, BodyId, ConfigError, Isometry, Scalar, SimConfig, StepCtx, StepHasher, StepStats,
    TrackId, Vec2, Vec3, Velocity,
};
use treadsim_debris::DebrisPiece;
use treadsim_devices::{Controller, ControllerLink, DeviceBus, DeviceError, DeviceKind, Exchange, SensorFrame};
use treadsim_dynamics::{Bodies, BodyDesc};
use treadsim_fluid::{apply_drag, Buoyancy, FluidModel, FluidQuery, FluidVolume};
use treadsim_geom::{Aabb, MassError, MassProps, Shape};
use treadsim_materials::ContactTable;
use treadsim_scene::{SceneDoc, SceneError};
use treadsim_track::{from_belt_plane, to_belt_plane, BeltDrive, BeltPath, BeltPose, TrackAnimation, TrackError, TrackState};

pub use contact::{Collider, Contact};

/// Contact material given to spawned debris.
pub const DEBRIS_MATERIAL: &str = "debris";
// Penetration tolerated before positional correction kicks in.
const CONTACT_SLOP: Scalar = 0.005;

#[derive(Debug, Error)]
pub enum WorldError {
    #[error(transparent)]
    Scene(#[from] SceneError),
    #[error("{node}: {source}")]
    Mass { node: String, #[source] source: MassError },
    #[error("track {track}: {source}")]
    Track { track: String, #[source] source: TrackError },
    #[error(transparent)]
    Device(#[from] DeviceError),
    #[error("cannot read scene {path}: {source}")]
    Io { path: PathBuf, #[source] source: std::io::Error },
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("no robot in the scene uses controller `{0}`")]
    UnknownController(String),
    #[error("{node}: invalid geometry {reason}")]
    InvalidGeometry { node: String, reason: String },
}

/// Summary of a successful load.
#[derive(Clone, Debug, Default, Serialize)]
pub struct LoadReport {
    pub bodies: usize,
    pub colliders: usize,
    pub tracks: usize,
    pub devices: usize,
    pub fluids: usize,
    pub controllers: Vec<String>,
    pub warnings: Vec<String>,
    pub time_step_ms: Scalar,
    pub gravity: [Scalar; 3],
}

#[derive(Clone, Debug)]
struct BodyName {
    def: Option<String>,
    name: String,
}

/// A solved belt riding on a body.
#[derive(Clone, Debug)]
struct MountedTrack {
    name: String,
    def: Option<String>,
    body: BodyId,
    /// Track frame relative to the body.
    local: Isometry,
    wheel0_radius: Scalar,
    path: BeltPath,
    drive: BeltDrive,
    anim: TrackAnimation,
    uv: Vec2,
    controller: Option<String>,
}

impl MountedTrack {
    /// Belt surface speed for a motor command.
    fn belt_speed(&self, kind: DeviceKind, value: Scalar) -> Scalar {
        match kind {
            DeviceKind::LinearMotor => value,
            // rad/s on the first wheel
            DeviceKind::RotationalMotor => value * self.wheel0_radius,
        }
    }
}

struct ControllerSlot {
    tracks: Vec<TrackId>,
    link: Option<ControllerLink>,
}

pub struct World {
    bodies: Bodies,
    body_names: Vec<BodyName>,
    colliders: Vec<Collider>,
    materials: ContactTable,
    tracks: Vec<MountedTrack>,
    bus: DeviceBus,
    controllers: BTreeMap<String, ControllerSlot>,
    fluids: Vec<FluidVolume>,
    gravity: Vec3,
    up: Vec3,
    dt: Scalar,
    tick: u64,
    cfg: SimConfig,
}

impl World {
    /// Build from a parsed scene. Asset paths resolve against `base_dir`.
    pub fn from_doc(doc: &SceneDoc, cfg: &SimConfig, base_dir: &Path) -> Result<(World, LoadReport), WorldError> {
        cfg.validate()?;
        build::Builder::new(doc, cfg).build(base_dir)
    }

    pub fn from_source(source: &str, cfg: &SimConfig, base_dir: &Path) -> Result<(World, LoadReport), WorldError> {
        let doc = treadsim_scene::load(source)?;
        Self::from_doc(&doc, cfg, base_dir)
    }

    pub fn load_file(path: &Path, cfg: &SimConfig) -> Result<(World, LoadReport), WorldError> {
        let text = std::fs::read_to_string(path)
            .map_err(|source| WorldError::Io { path: path.to_path_buf(), source })?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        Self::from_source(&text, cfg, base)
    }

    fn insert_body(&mut self, pose: Isometry, mass: MassProps, dynamic: bool, name: BodyName) -> BodyId {
        let id = self.bodies.add(BodyDesc { pose, vel: Velocity::default(), inv_mass: mass.inv_mass, dynamic });
        self.body_names.push(name);
        BodyId(id)
    }

    /* ---------- Devices & controllers ---------- */

    /// Queue a velocity for the next tick.
    pub fn set_velocity(&mut self, track: TrackId, device: &str, value: Scalar) -> Result<(), DeviceError> {
        self.bus.set_velocity(track, device, value)
    }

    pub fn read_feedback(&self, track: TrackId, device: &str) -> Result<Scalar, DeviceError> {
        self.bus.read_feedback(track, device)
    }

    /// Queue a command by controller and device name, as a controller would.
    pub fn drive(&mut self, controller: &str, device: &str, value: Scalar) -> Result<(), WorldError> {
        let tracks = self.tracks_of_controller(controller)
            .ok_or_else(|| WorldError::UnknownController(controller.to_string()))?;
        match self.bus.owner_of(&tracks, device) {
            Some(t) => Ok(self.bus.set_velocity(t, device, value)?),
            None => Err(WorldError::Device(DeviceError::UnknownDevice {
                track: tracks.first().copied().unwrap_or(TrackId(0)),
                name: device.to_string(),
            })),
        }
    }

    /// Controller names declared by robots in the scene, sorted.
    pub fn controller_names(&self) -> impl Iterator<Item = &str> {
        self.controllers.keys().map(String::as_str)
    }

    pub fn tracks_of_controller(&self, controller: &str) -> Option<Vec<TrackId>> {
        self.controllers.get(controller).map(|c| c.tracks.clone())
    }

    /// Run `controller` on its own thread for the robot(s) naming it.
    /// Replaces a previously attached one.
    pub fn attach_controller<C: Controller>(&mut self, name: &str, controller: C) -> Result<(), WorldError> {
        let timeout = self.cfg.controller_timeout();
        let slot = self.controllers.get_mut(name)
            .ok_or_else(|| WorldError::UnknownController(name.to_string()))?;
        if let Some(old) = slot.link.take() { old.shutdown(); }
        slot.link = Some(ControllerLink::spawn(name, controller, timeout));
        debug!("controller `{name}` attached ({} track(s))", slot.tracks.len());
        Ok(())
    }

    /// Publish device state to every attached controller and queue what comes
    /// back for the next tick.
    fn exchange_controllers(&mut self, tick: u64, stats: &mut StepStats) {
        for (name, slot) in self.controllers.iter_mut() {
            let Some(link) = slot.link.as_mut() else { continue };
            let readings = slot.tracks.iter().flat_map(|t| self.bus.readings(*t)).collect();
            match link.exchange(&SensorFrame { tick, readings }) {
                Exchange::Commands(cmds) => {
                    for c in cmds {
                        let routed = self.bus.owner_of(&slot.tracks, &c.device)
                            .map(|t| self.bus.set_velocity(t, &c.device, c.value));
                        match routed {
                            Some(Ok(())) => {}
                            Some(Err(e)) => {
                                warn!("controller `{name}`: {e}");
                                stats.commands_dropped += 1;
                            }
                            None => {
                                warn!("controller `{name}`: no device `{}`, command dropped", c.device);
                                stats.commands_dropped += 1;
                            }
                        }
                    }
                }
                Exchange::TimedOut => stats.controller_timeouts += 1,
                Exchange::Disconnected => {}
            }
        }
    }

    /* ---------- Stepping ---------- */

    pub fn step(&mut self) -> StepStats {
        let ctx = StepCtx { dt: self.dt, tick: self.tick + 1 };
        let mut stats = StepStats { tick: ctx.tick, ..Default::default() };

        // 1) queued commands land
        let applied = self.bus.begin_tick();
        stats.commands_applied = applied.len() as u32;
        for cmd in &applied {
            let t = &mut self.tracks[cmd.track.0 as usize];
            let v = t.belt_speed(cmd.kind, cmd.value);
            t.drive.command(v);
            debug!("track {} `{}`: {:?}", cmd.track, t.name, t.drive.state);
        }

        // 2) lock-step exchange
        self.exchange_controllers(ctx.tick, &mut stats);

        // 3) belts
        for t in &mut self.tracks {
            t.drive.advance(ctx.dt);
            t.uv = t.anim.uv_offset(t.drive.displacement);
        }

        // 4) environment
        self.refresh_aabbs();
        stats.bodies_in_fluid = self.apply_fluid_forces(ctx.dt);

        // 5) integrate, collide, solve
        self.bodies.integrate_all(self.gravity, ctx.dt);
        self.refresh_aabbs();
        let aabbs: Vec<Aabb> = self.colliders.iter().map(|c| c.aabb).collect();
        let owner: Vec<u32> = self.colliders.iter().map(|c| c.body.0).collect();
        let pairs = pairs_sap_grouped(&aabbs, &owner);
        stats.pairs_tested = pairs.len() as u32;
        let contacts = contact::find_contacts(&self.bodies, &self.colliders, &pairs);
        stats.contacts = contacts.len() as u32;
        let targets: Vec<Vec3> = contacts.iter()
            .map(|c| self.surface_velocity(c.a, c.point) - self.surface_velocity(c.b, c.point))
            .collect();
        let params = contact::SolverParams {
            iterations: self.cfg.solver_iterations,
            position_correction: self.cfg.position_correction,
            slop: CONTACT_SLOP,
        };
        contact::solve_contacts(&mut self.bodies, &self.colliders, &contacts, &targets, &self.materials, params);

        // 6)
        self.tick = ctx.tick;
        stats
    }

    fn refresh_aabbs(&mut self) {
        for c in self.colliders.iter_mut() {
            c.refresh_aabb(&self.bodies);
        }
    }

    /// World AABB of each body's colliders; `None` for bodies without any.
    fn body_aabbs(&self) -> Vec<Option<Aabb>> {
        let mut out: Vec<Option<Aabb>> = vec![None; self.bodies.len()];
        for c in &self.colliders {
            let slot = &mut out[c.body.0 as usize];
            *slot = Some(slot.map_or(c.aabb, |a| a.union(&c.aabb)));
        }
        out
    }

    /// Stream drag as an impulse, buoyancy as a force for the integrator.
    /// Returns how many bodies touch a fluid.
    fn apply_fluid_forces(&mut self, dt: Scalar) -> u32 {
        if self.fluids.is_empty() { return 0; }
        let k = self.cfg.fluid_drag_k;
        let mut wet = 0;
        for (i, aabb) in self.body_aabbs().into_iter().enumerate() {
            let id = i as u32;
            let Some(aabb) = aabb else { continue };
            if self.bodies.inv_mass_of(id) == 0.0 { continue; }
            let mut touched = false;
            for fluid in &self.fluids {
                if fluid.submerged_fraction(&aabb) == 0.0 { continue; }
                touched = true;
                apply_drag(&mut self.bodies, id, &aabb, fluid, k, dt);
                if self.cfg.buoyancy {
                    let q = FluidQuery { aabb, vel: self.bodies.vel(id).lin, gravity: self.gravity };
                    self.bodies.add_force(id, Buoyancy.force(fluid, &q));
                }
            }
            if touched { wet += 1; }
        }
        wet
    }

    /// Belt surface velocity of a collider at a world point; zero unless the
    /// collider belongs to a running track.
    fn surface_velocity(&self, collider: usize, point: Vec3) -> Vec3 {
        let Some(tid) = self.colliders[collider].track else { return Vec3::ZERO };
        let t = &self.tracks[tid.0 as usize];
        let speed = t.drive.state.speed();
        if speed == 0.0 { return Vec3::ZERO; }
        let frame = self.bodies.pose(t.body.0).compose(&t.local);
        let local = frame.inverse().transform_point(point);
        let (s, _) = t.path.closest(to_belt_plane(local));
        let dir = from_belt_plane(t.path.sample(s).direction);
        frame.transform_vector(dir) * speed
    }

    /// Digest of tick, body state and belt displacement.
    pub fn step_hash(&self) -> [u8; 32] {
        let mut h = StepHasher::new();
        h.update_u64(self.tick);
        for i in self.bodies.indices() {
            let pose = self.bodies.pose(i);
            let vel = self.bodies.vel(i);
            h.update_bytes(&i.to_le_bytes());
            hash_vec3(&mut h, &pose.pos);
            hash_quat(&mut h, &pose.rot);
            hash_vec3(&mut h, &vel.lin);
            hash_vec3(&mut h, &vel.ang);
        }
        for t in &self.tracks {
            h.update_f32(t.drive.displacement);
        }
        h.finalize()
    }

    /* ---------- Debris ---------- */

    /// Add each piece as a dynamic cube with its explicit mass, centred at
    /// height `surface` above the horizontal plane. Pieces without a positive
    /// finite mass and size are skipped and get no id.
    pub fn spawn_debris(&mut self, pieces: &[DebrisPiece], surface: Scalar) -> Vec<BodyId> {
        let mut out = Vec::with_capacity(pieces.len());
        for (i, p) in pieces.iter().enumerate() {
            let (mass, size) = (p.mass as Scalar, p.size as Scalar);
            if !(mass.is_finite() && mass > 0.0 && size.is_finite() && size > 0.0) {
                warn!("debris piece {i}: mass {} size {} is not usable, skipped", p.mass, p.size);
                continue;
            }
            let (x, y) = (p.x as Scalar, p.y as Scalar);
            let pos = if self.up == Vec3::Y { Vec3::new(x, surface, y) } else { Vec3::new(x, y, surface) };
            let he = size * 0.5;
            let name = BodyName { def: None, name: format!("debris {i}") };
            let body = self.insert_body(
                Isometry { pos, ..Isometry::IDENTITY },
                MassProps::from_mass(mass),
                true,
                name,
            );
            let mut c = Collider {
                body,
                shape: Shape::Box { hx: he, hy: he, hz: he },
                local: Isometry::IDENTITY,
                aabb: Aabb::empty(),
                material: DEBRIS_MATERIAL.to_string(),
                track: None,
            };
            c.refresh_aabb(&self.bodies);
            self.colliders.push(c);
            out.push(body);
        }
        debug!("spawned {} debris bodies", out.len());
        out
    }

    /* ---------- Accessors ---------- */

    #[inline] pub fn tick(&self) -> u64 { self.tick }
    #[inline] pub fn dt(&self) -> Scalar { self.dt }
    #[inline] pub fn gravity(&self) -> Vec3 { self.gravity }
    #[inline] pub fn num_bodies(&self) -> u32 { self.bodies.len() as u32 }
    #[inline] pub fn num_tracks(&self) -> u32 { self.tracks.len() as u32 }
    pub fn colliders(&self) -> &[Collider] { &self.colliders }
    pub fn fluids(&self) -> &[FluidVolume] { &self.fluids }
    pub fn materials(&self) -> &ContactTable { &self.materials }

    pub fn body_pose(&self, id: BodyId) -> Isometry { self.bodies.pose(id.0) }
    pub fn body_vel(&self, id: BodyId) -> Velocity { self.bodies.vel(id.0) }
    pub fn body_mass(&self, id: BodyId) -> Scalar { self.bodies.mass_of(id.0) }
    pub fn body_is_dynamic(&self, id: BodyId) -> bool { self.bodies.is_dynamic(id.0) }

    /// First body whose DEF name or `name` field matches.
    pub fn body_by_name(&self, name: &str) -> Option<BodyId> {
        self.body_names.iter()
            .position(|n| n.def.as_deref() == Some(name) || n.name == name)
            .map(|i| BodyId(i as u32))
    }

    pub fn track_by_name(&self, name: &str) -> Option<TrackId> {
        self.tracks.iter()
            .position(|t| t.def.as_deref() == Some(name) || t.name == name)
            .map(|i| TrackId(i as u32))
    }

    fn track(&self, id: TrackId) -> Option<&MountedTrack> { self.tracks.get(id.0 as usize) }

    pub fn track_state(&self, id: TrackId) -> Option<TrackState> { self.track(id).map(|t| t.drive.state) }
    pub fn track_displacement(&self, id: TrackId) -> Option<Scalar> { self.track(id).map(|t| t.drive.displacement) }
    pub fn track_path(&self, id: TrackId) -> Option<&BeltPath> { self.track(id).map(|t| &t.path) }
    pub fn track_body(&self, id: TrackId) -> Option<BodyId> { self.track(id).map(|t| t.body) }
    pub fn track_controller(&self, id: TrackId) -> Option<&str> { self.track(id)?.controller.as_deref() }
    pub fn track_uv_offset(&self, id: TrackId) -> Option<Vec2> { self.track(id).map(|t| t.uv) }

    /// Tread plate poses in the belt plane at the current displacement.
    pub fn track_plates(&self, id: TrackId) -> Option<Vec<BeltPose>> {
        self.track(id).map(|t| t.anim.plate_poses(&t.path, t.drive.displacement))
    }

    /// Close every controller link and wait for the threads.
    pub fn shutdown(&mut self) {
        for slot in self.controllers.values_mut() {
            if let Some(link) = slot.link.take() { link.shutdown(); }
        }
    }
}
