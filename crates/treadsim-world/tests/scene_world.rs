use std::f32::consts::PI;
use std::path::Path;

use treadsim_core::{SimConfig, TrackId, XorShift64};
use treadsim_debris::{generate, DebrisParams, DebrisPiece, Material, PlasticType, SizeClass};
use treadsim_devices::{DeviceCommand, DeviceError, SensorFrame};
use treadsim_geom::MassError;
use treadsim_scene::SceneError;
use treadsim_track::{TrackError, TrackState};
use treadsim_world::{World, WorldError};

const SCENE: &str = r#"#VRML_SIM R2023b utf8

EXTERNPROTO "https://raw.githubusercontent.com/cyberbotics/webots/R2023b/projects/objects/floors/protos/RectangleArena.proto"

WorldInfo {
  basicTimeStep 4
  contactProperties [
    ContactProperties {
      material1 "belt"
      material2 "cargo"
      coulombFriction [ 2 ]
      bounce 0
    }
  ]
}
Fluid {
  translation 0 0 -5
  streamVelocity -0.05 0 0
  boundingObject Box { size 10 10 1 }
}
DEF TRACK_ROBOT Robot {
  translation 0 2 0
  controller "track_controller"
  children [
    Track {
      name "belt"
      contactMaterial "belt"
      boundingObject Pose {
        translation 0.5 0 0
        children [ Box { size 1.1 0.2 0.12 } ]
      }
      device [ LinearMotor { name "test_motor" } ]
      children [
        TrackWheel { position 0 0 radius 0.05 }
        TrackWheel { position 1 0 radius 0.05 }
      ]
      animatedGeometry DEF PLATE Shape { geometry Box { size 0.02 0.2 0.005 } }
      geometriesCount 20
      textureAnimation 0.5 0
    }
  ]
}
DEF CARGO Solid {
  translation 0.5 2 0.11
  name "cargo"
  contactMaterial "cargo"
  boundingObject DEF CARGO_BOX Box { size 0.1 0.1 0.1 }
  physics Physics { density -1 mass 1 }
}
DEF FLOATER Solid {
  translation 0 0 -5
  name "floater"
  boundingObject Box { size 0.1 0.1 0.1 }
  physics Physics { density -1 mass 1 }
}
DEF HEAVY Solid {
  translation 3 3 10
  name "heavy"
  boundingObject Box { size 1 1 1 }
  physics Physics { density 2 }
}
"#;

fn load() -> World {
    World::from_source(SCENE, &SimConfig::default(), Path::new(".")).unwrap().0
}

fn belt(w: &World) -> TrackId {
    w.track_by_name("belt").unwrap()
}

#[test]
fn scene_loads_everything() {
    let (w, report) = World::from_source(SCENE, &SimConfig::default(), Path::new(".")).unwrap();
    assert_eq!(report.bodies, 4);
    assert_eq!(report.tracks, 1);
    assert_eq!(report.devices, 1);
    assert_eq!(report.fluids, 1);
    assert_eq!(report.controllers, vec!["track_controller".to_string()]);
    assert!((report.time_step_ms - 4.0).abs() < 1e-6);
    assert!((report.gravity[2] + 9.81).abs() < 1e-6);
    assert!((w.dt() - 0.004).abs() < 1e-9);
}

#[test]
fn mass_from_density_and_from_sentinel() {
    let w = load();
    let heavy = w.body_by_name("heavy").unwrap();
    assert!((w.body_mass(heavy) - 2.0).abs() < 1e-5);
    let cargo = w.body_by_name("CARGO").unwrap();
    assert!((w.body_mass(cargo) - 1.0).abs() < 1e-6);
}

#[test]
fn sentinel_density_without_mass_fails_load() {
    let src = "Solid { boundingObject Box { size 1 1 1 } physics Physics { density -1 } }";
    let err = World::from_source(src, &SimConfig::default(), Path::new(".")).err().unwrap();
    assert!(matches!(err, WorldError::Mass { source: MassError::InvalidMass(_), .. }), "{err}");

    let src = "Solid { boundingObject Box { size 1 1 1 } physics Physics { density -1 mass 0.25 } }";
    let (w, _) = World::from_source(src, &SimConfig::default(), Path::new(".")).unwrap();
    assert!((w.body_mass(treadsim_core::BodyId(0)) - 0.25).abs() < 1e-6);
}

#[test]
fn belt_length_matches_two_wheel_formula() {
    let w = load();
    let len = w.track_path(belt(&w)).unwrap().length();
    assert!((len - (2.0 + 0.1 * PI)).abs() < 1e-4, "{len}");
    assert_eq!(w.track_plates(belt(&w)).unwrap().len(), 20);
}

#[test]
fn coincident_wheels_fail_the_whole_load() {
    let src = r#"Track { children [
        TrackWheel { position 0 0 radius 0.05 }
        TrackWheel { position 0 0 radius 0.05 }
    ] }"#;
    let err = World::from_source(src, &SimConfig::default(), Path::new(".")).err().unwrap();
    assert!(matches!(err, WorldError::Track { source: TrackError::DegenerateTrack(_), .. }), "{err}");
}

#[test]
fn undefined_use_fails_with_unresolved_reference() {
    let src = "Solid { boundingObject USE MISSING }";
    let err = World::from_source(src, &SimConfig::default(), Path::new(".")).err().unwrap();
    assert!(matches!(err, WorldError::Scene(SceneError::UnresolvedReference { ref name, .. }) if name == "MISSING"));
}

#[test]
fn feedback_changes_on_the_next_tick() {
    let mut w = load();
    let t = belt(&w);
    w.set_velocity(t, "test_motor", 3.0).unwrap();
    assert_eq!(w.read_feedback(t, "test_motor").unwrap(), 0.0);
    assert_eq!(w.track_state(t), Some(TrackState::Stopped));
    let stats = w.step();
    assert_eq!(stats.commands_applied, 1);
    assert_eq!(w.read_feedback(t, "test_motor").unwrap(), 3.0);
    assert_eq!(w.track_state(t), Some(TrackState::Running(3.0)));
    assert!((w.track_displacement(t).unwrap() - 0.012).abs() < 1e-6);
    // uv scrolls by textureAnimation * displacement
    assert!((w.track_uv_offset(t).unwrap().x - 0.006).abs() < 1e-6);
}

#[test]
fn unknown_device_is_rejected_and_world_keeps_running() {
    let mut w = load();
    let t = belt(&w);
    let err = w.set_velocity(t, "ghost", 1.0).unwrap_err();
    assert!(matches!(err, DeviceError::UnknownDevice { .. }));
    let before = w.tick();
    w.step();
    assert_eq!(w.tick(), before + 1);
}

#[test]
fn resting_body_in_stream_drifts_downstream() {
    let mut w = load();
    let floater = w.body_by_name("floater").unwrap();
    let stats = w.step();
    assert_eq!(stats.bodies_in_fluid, 1);
    let v = w.body_vel(floater).lin;
    assert!(v.x < 0.0, "{v:?}");
    assert_eq!(v.y, 0.0);
}

#[test]
fn running_belt_carries_cargo() {
    let mut w = load();
    let t = belt(&w);
    let cargo = w.body_by_name("cargo").unwrap();
    let x0 = w.body_pose(cargo).pos.x;
    w.set_velocity(t, "test_motor", 0.2).unwrap();
    for _ in 0..250 { w.step(); }
    let p = w.body_pose(cargo).pos;
    // the upper run of a counter-clockwise belt travels towards -x
    assert!(p.x < x0 - 0.05, "{p:?}");
    assert!(p.z > 0.05, "{p:?}");
}

#[test]
fn attached_controller_commands_apply_one_tick_later() {
    let cfg = SimConfig { controller_timeout_ms: 2_000, ..Default::default() };
    let mut w = World::from_source(SCENE, &cfg, Path::new(".")).unwrap().0;
    let t = belt(&w);
    w.attach_controller("track_controller", |f: &SensorFrame| {
        assert_eq!(f.readings.len(), 1);
        vec![DeviceCommand::new("test_motor", 2.0), DeviceCommand::new("no_such_motor", 1.0)]
    }).unwrap();
    let s1 = w.step();
    assert_eq!(s1.commands_dropped, 1);
    assert_eq!(w.read_feedback(t, "test_motor").unwrap(), 0.0);
    let s2 = w.step();
    assert_eq!(s2.commands_applied, 1);
    assert_eq!(w.read_feedback(t, "test_motor").unwrap(), 2.0);
    w.shutdown();
}

#[test]
fn unknown_controller_cannot_be_attached() {
    let mut w = load();
    let err = w.attach_controller("physics_test_controller", |_: &SensorFrame| Vec::<DeviceCommand>::new()).unwrap_err();
    assert!(matches!(err, WorldError::UnknownController(_)));
}

#[test]
fn same_scene_same_hashes() {
    let mut a = load();
    let mut b = load();
    a.set_velocity(belt(&a), "test_motor", 0.5).unwrap();
    b.set_velocity(belt(&b), "test_motor", 0.5).unwrap();
    let h0 = a.step_hash();
    for _ in 0..100 {
        a.step();
        b.step();
        assert_eq!(a.step_hash(), b.step_hash());
    }
    assert_ne!(a.step_hash(), h0);
}

#[test]
fn debris_spawns_as_dynamic_cubes() {
    let mut w = load();
    let params = DebrisParams { width: 40.0, height: 40.0, centered: true, size_classes: vec![SizeClass::Meso], ..Default::default() };
    let pieces = generate(&params, &mut XorShift64::new(7)).unwrap();
    assert!(!pieces.is_empty());
    let before = w.num_bodies();
    let ids = w.spawn_debris(&pieces, 1.0);
    assert_eq!(w.num_bodies(), before + pieces.len() as u32);
    for (id, p) in ids.iter().zip(&pieces) {
        assert!(w.body_is_dynamic(*id));
        assert!((w.body_mass(*id) as f64 - p.mass).abs() < 1e-6 * p.mass.max(1.0));
        let pos = w.body_pose(*id).pos;
        assert!((pos.z - 1.0).abs() < 1e-6);
    }
    w.step();
}

#[test]
fn unusable_debris_pieces_are_skipped() {
    let mut w = load();
    let piece = |mass: f64| DebrisPiece {
        x: 1.0, y: 1.0, size: 0.01, mass, density: 950.0,
        size_class: SizeClass::Meso, plastic_type: PlasticType::H, material: Material::PE,
    };
    let before = w.num_bodies();
    let ids = w.spawn_debris(&[piece(0.0), piece(f64::NAN), piece(-1.0), piece(0.002)], 1.0);
    assert_eq!(ids.len(), 1);
    assert_eq!(w.num_bodies(), before + 1);
    assert!((w.body_mass(ids[0]) - 0.002).abs() < 1e-6);
    assert!(w.body_is_dynamic(ids[0]));
}
