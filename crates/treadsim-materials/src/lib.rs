//! Contact properties keyed by material tag pairs.
//!
//! Every collider carries a tag (`contactMaterial`, `"default"` when unset).
//! When two colliders touch, the solver asks the table for the pair; the
//! lookup is symmetric and falls back to the engine defaults.

use std::collections::BTreeMap;
use serde::{Deserialize, Serialize};

pub const DEFAULT_MATERIAL: &str = "default";

/// What the solver uses for one contact pair.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PairProps {
    /// Coulomb friction coefficient.
    pub friction: f32,
    /// Restitution in [0,1].
    pub bounce: f32,
    /// Below this approach speed (m/s) contacts do not bounce.
    pub bounce_velocity: f32,
}

impl PairProps {
    pub fn new(friction: f32, bounce: f32) -> Self {
        Self { friction, bounce, bounce_velocity: 0.01 }
    }

    /// Clamp into the ranges the solver relies on.
    pub fn sanitized(self) -> Self {
        let finite_or = |v: f32, d: f32| if v.is_finite() { v } else { d };
        Self {
            friction: finite_or(self.friction, 1.0).max(0.0),
            bounce: finite_or(self.bounce, 0.0).clamp(0.0, 1.0),
            bounce_velocity: finite_or(self.bounce_velocity, 0.01).max(0.0),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ContactTable {
    defaults: PairProps,
    pairs: BTreeMap<(String, String), PairProps>,
}

#[inline]
fn key(a: &str, b: &str) -> (String, String) {
    if a <= b { (a.to_string(), b.to_string()) } else { (b.to_string(), a.to_string()) }
}

impl ContactTable {
    pub fn new(defaults: PairProps) -> Self {
        Self { defaults: defaults.sanitized(), pairs: BTreeMap::new() }
    }

    /// Insert or replace; the latest entry for a pair wins.
    pub fn insert(&mut self, a: &str, b: &str, props: PairProps) {
        if self.pairs.insert(key(a, b), props.sanitized()).is_some() {
            log::warn!("contact properties for ({a}, {b}) defined twice; keeping the last one");
        }
    }

    pub fn pair(&self, a: &str, b: &str) -> PairProps {
        self.pairs.get(&key(a, b)).copied().unwrap_or(self.defaults)
    }

    pub fn defaults(&self) -> PairProps { self.defaults }
    pub fn len(&self) -> usize { self.pairs.len() }
    pub fn is_empty(&self) -> bool { self.pairs.is_empty() }
}

impl Default for ContactTable {
    fn default() -> Self { Self::new(PairProps::new(1.0, 0.5)) }
}

/// Effective restitution for an approach speed `vn` (negative = approaching).
#[inline]
pub fn restitution_for(p: &PairProps, vn: f32) -> f32 {
    if -vn < p.bounce_velocity { 0.0 } else { p.bounce }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symmetry() {
        let mut t = ContactTable::default();
        t.insert("track", "debris", PairProps::new(500.0, 0.0));
        assert_eq!(t.pair("track", "debris"), t.pair("debris", "track"));
        assert_eq!(t.pair("debris", "track").friction, 500.0);
    }

    #[test]
    fn unmatched_pair_uses_defaults() {
        let t = ContactTable::new(PairProps::new(0.7, 0.2));
        let p = t.pair("a", "b");
        assert_eq!(p.friction, 0.7);
        assert_eq!(p.bounce, 0.2);
    }

    #[test]
    fn slow_contacts_do_not_bounce() {
        let p = PairProps::new(1.0, 0.9);
        assert_eq!(restitution_for(&p, -0.001), 0.0);
        assert_eq!(restitution_for(&p, -1.0), 0.9);
    }

    #[test]
    fn sanitized_clamps_bounce() {
        let p = PairProps { friction: -1.0, bounce: 3.0, bounce_velocity: f32::NAN }.sanitized();
        assert_eq!(p.friction, 0.0);
        assert_eq!(p.bounce, 1.0);
        assert_eq!(p.bounce_velocity, 0.01);
    }
}
