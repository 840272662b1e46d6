use serde::Serialize;

/// Per-tick counters returned by `World::step`.
#[derive(Copy, Clone, Debug, Default, Serialize)]
pub struct StepStats {
    pub tick: u64,
    pub pairs_tested: u32,
    pub contacts: u32,
    pub commands_applied: u32,
    pub commands_dropped: u32,
    pub controller_timeouts: u32,
    pub bodies_in_fluid: u32,
}
