use log::{debug, warn};
use treadsim_core::{Scalar, TrackId};

use crate::DeviceError;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DeviceKind { LinearMotor, RotationalMotor }

/// Static description of a device, as declared in its track's `device` list.
#[derive(Clone, Debug, PartialEq)]
pub struct DeviceSpec {
    pub name: String,
    pub kind: DeviceKind,
    pub max_velocity: Scalar,
}

impl DeviceSpec {
    pub const DEFAULT_MAX_VELOCITY: Scalar = 10.0;

    pub fn linear(name: impl Into<String>) -> Self {
        Self { name: name.into(), kind: DeviceKind::LinearMotor, max_velocity: Self::DEFAULT_MAX_VELOCITY }
    }
}

#[derive(Clone, Debug)]
struct Slot {
    spec: DeviceSpec,
    applied: Scalar,
    pending: Option<Scalar>,
}

/// A command that took effect at the start of a tick.
#[derive(Clone, Debug, PartialEq)]
pub struct AppliedCommand {
    pub track: TrackId,
    pub device: String,
    pub kind: DeviceKind,
    pub value: Scalar,
}

/// Named actuators grouped by track. Writes are queued and land together in
/// [`DeviceBus::begin_tick`]; reads see the last applied value.
#[derive(Clone, Debug, Default)]
pub struct DeviceBus {
    tracks: Vec<Vec<Slot>>,
}

impl DeviceBus {
    pub fn new() -> Self { Self::default() }

    /// Register a track's devices; names must be unique within the track.
    pub fn add_track(&mut self, devices: Vec<DeviceSpec>) -> Result<TrackId, DeviceError> {
        let id = TrackId(self.tracks.len() as u32);
        let mut slots: Vec<Slot> = Vec::with_capacity(devices.len());
        for spec in devices {
            if slots.iter().any(|s| s.spec.name == spec.name) {
                return Err(DeviceError::DuplicateDevice { track: id, name: spec.name });
            }
            slots.push(Slot { spec, applied: 0.0, pending: None });
        }
        self.tracks.push(slots);
        Ok(id)
    }

    #[inline] pub fn track_count(&self) -> usize { self.tracks.len() }

    fn slot_mut(&mut self, track: TrackId, name: &str) -> Result<&mut Slot, DeviceError> {
        self.tracks.get_mut(track.0 as usize)
            .and_then(|t| t.iter_mut().find(|s| s.spec.name == name))
            .ok_or_else(|| DeviceError::UnknownDevice { track, name: name.to_string() })
    }

    fn slot(&self, track: TrackId, name: &str) -> Result<&Slot, DeviceError> {
        self.tracks.get(track.0 as usize)
            .and_then(|t| t.iter().find(|s| s.spec.name == name))
            .ok_or_else(|| DeviceError::UnknownDevice { track, name: name.to_string() })
    }

    pub fn has_device(&self, track: TrackId, name: &str) -> bool { self.slot(track, name).is_ok() }

    /// Queue a velocity for the next tick. The last write before the tick wins.
    pub fn set_velocity(&mut self, track: TrackId, name: &str, value: Scalar) -> Result<(), DeviceError> {
        let slot = self.slot_mut(track, name)?;
        let max = slot.spec.max_velocity;
        let v = if value.is_finite() { value } else { 0.0 };
        let clamped = v.clamp(-max, max);
        if clamped != value {
            warn!("{track} device `{name}`: velocity {value} clamped to {clamped}");
        }
        slot.pending = Some(clamped);
        Ok(())
    }

    pub fn read_feedback(&self, track: TrackId, name: &str) -> Result<Scalar, DeviceError> {
        Ok(self.slot(track, name)?.applied)
    }

    /// Apply every queued command, in track then declaration order.
    pub fn begin_tick(&mut self) -> Vec<AppliedCommand> {
        let mut out = Vec::new();
        for (ti, slots) in self.tracks.iter_mut().enumerate() {
            for s in slots.iter_mut() {
                if let Some(v) = s.pending.take() {
                    s.applied = v;
                    out.push(AppliedCommand {
                        track: TrackId(ti as u32),
                        device: s.spec.name.clone(),
                        kind: s.spec.kind,
                        value: v,
                    });
                }
            }
        }
        if !out.is_empty() { debug!("bus: applied {} command(s)", out.len()); }
        out
    }

    /// (name, last applied value) for every device of a track.
    pub fn readings(&self, track: TrackId) -> Vec<(String, Scalar)> {
        self.tracks.get(track.0 as usize)
            .map(|t| t.iter().map(|s| (s.spec.name.clone(), s.applied)).collect())
            .unwrap_or_default()
    }

    pub fn specs(&self, track: TrackId) -> impl Iterator<Item = &DeviceSpec> {
        self.tracks.get(track.0 as usize).into_iter().flatten().map(|s| &s.spec)
    }

    /// First of `tracks` that owns a device called `name`.
    pub fn owner_of(&self, tracks: &[TrackId], name: &str) -> Option<TrackId> {
        tracks.iter().copied().find(|t| self.has_device(*t, name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bus_with_motor() -> (DeviceBus, TrackId) {
        let mut bus = DeviceBus::new();
        let t = bus.add_track(vec![DeviceSpec::linear("test_motor")]).unwrap();
        (bus, t)
    }

    #[test]
    fn feedback_changes_only_at_tick_start() {
        let (mut bus, t) = bus_with_motor();
        bus.set_velocity(t, "test_motor", 3.0).unwrap();
        assert_eq!(bus.read_feedback(t, "test_motor").unwrap(), 0.0);
        let applied = bus.begin_tick();
        assert_eq!(applied.len(), 1);
        assert_eq!(bus.read_feedback(t, "test_motor").unwrap(), 3.0);
        // nothing queued: value holds
        assert!(bus.begin_tick().is_empty());
        assert_eq!(bus.read_feedback(t, "test_motor").unwrap(), 3.0);
    }

    #[test]
    fn unknown_name_is_rejected_immediately() {
        let (mut bus, t) = bus_with_motor();
        let err = bus.set_velocity(t, "nope", 1.0).unwrap_err();
        assert!(matches!(err, DeviceError::UnknownDevice { ref name, .. } if name == "nope"));
        assert!(bus.read_feedback(TrackId(9), "test_motor").is_err());
    }

    #[test]
    fn clamps_to_max_velocity() {
        let (mut bus, t) = bus_with_motor();
        bus.set_velocity(t, "test_motor", 25.0).unwrap();
        bus.begin_tick();
        assert_eq!(bus.read_feedback(t, "test_motor").unwrap(), 10.0);
    }

    #[test]
    fn duplicate_names_fail_registration() {
        let mut bus = DeviceBus::new();
        let err = bus.add_track(vec![DeviceSpec::linear("m"), DeviceSpec::linear("m")]).unwrap_err();
        assert!(matches!(err, DeviceError::DuplicateDevice { .. }));
    }

    #[test]
    fn routes_to_owning_track() {
        let mut bus = DeviceBus::new();
        let a = bus.add_track(vec![DeviceSpec::linear("left")]).unwrap();
        let b = bus.add_track(vec![DeviceSpec::linear("right")]).unwrap();
        assert_eq!(bus.owner_of(&[a, b], "right"), Some(b));
        assert_eq!(bus.owner_of(&[a, b], "middle"), None);
    }
}
