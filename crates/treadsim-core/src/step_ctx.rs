/// Per-tick context handed to subsystems during `World::step`.
#[derive(Copy, Clone, Debug)]
pub struct StepCtx {
    pub dt: f32,
    pub tick: u64,
}
