use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError, TrySendError};
use log::{debug, warn};
use treadsim_core::Scalar;

use crate::wire::{decode_frame, encode_frame, KIND_COMMAND, KIND_STATE};

/// What the engine publishes to a controller each tick.
#[derive(Clone, Debug, PartialEq)]
pub struct SensorFrame {
    pub tick: u64,
    /// (device name, last applied value) over every device the controller drives.
    pub readings: Vec<(String, Scalar)>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DeviceCommand {
    pub device: String,
    pub value: Scalar,
}

impl DeviceCommand {
    pub fn new(device: impl Into<String>, value: Scalar) -> Self {
        Self { device: device.into(), value }
    }
}

/// An external control program. Runs on its own thread; sees one frame per tick.
pub trait Controller: Send + 'static {
    fn step(&mut self, frame: &SensorFrame) -> Vec<DeviceCommand>;
}

impl<F> Controller for F
where
    F: FnMut(&SensorFrame) -> Vec<DeviceCommand> + Send + 'static,
{
    fn step(&mut self, frame: &SensorFrame) -> Vec<DeviceCommand> { self(frame) }
}

/// Result of one lock-step exchange.
#[derive(Clone, Debug, PartialEq)]
pub enum Exchange {
    Commands(Vec<DeviceCommand>),
    /// No answer within the bound; previous commands stay in force.
    TimedOut,
    /// Controller thread is gone; previous commands stay in force.
    Disconnected,
}

/// Engine side of a controller connection: byte frames over crossbeam channels.
///
/// At most one state frame is in flight. While the controller is still busy
/// with it no newer frame is queued behind it, so a controller slower than the
/// timeout answers every other tick instead of falling further behind.
pub struct ControllerLink {
    name: String,
    to_ctrl: Option<Sender<Vec<u8>>>,
    from_ctrl: Receiver<Vec<u8>>,
    handle: Option<JoinHandle<()>>,
    timeout: Duration,
    connected: bool,
    /// Tick of the published frame still waiting for its answer.
    in_flight: Option<u64>,
}

impl ControllerLink {
    pub fn spawn<C: Controller>(name: impl Into<String>, mut controller: C, timeout: Duration) -> Self {
        let name = name.into();
        let (state_tx, state_rx) = bounded::<Vec<u8>>(1);
        let (cmd_tx, cmd_rx) = bounded::<Vec<u8>>(1);
        let thread_name = format!("ctrl-{name}");
        let log_name = name.clone();
        let handle = thread::Builder::new()
            .name(thread_name)
            .spawn(move || {
                // ends when the engine drops its sender
                for buf in state_rx.iter() {
                    let frame = match decode_frame(&buf) {
                        Ok(f) if f.kind == KIND_STATE => f,
                        Ok(f) => { warn!("controller `{log_name}`: ignoring frame kind {}", f.kind); continue; }
                        Err(e) => { warn!("controller `{log_name}`: {e}"); continue; }
                    };
                    let sensors = SensorFrame { tick: frame.tick, readings: frame.entries };
                    let cmds = controller.step(&sensors);
                    let out = encode_frame(KIND_COMMAND, sensors.tick, cmds.iter().map(|c| (c.device.as_str(), c.value)));
                    match out {
                        Ok(bytes) => { if cmd_tx.send(bytes).is_err() { break; } }
                        Err(e) => warn!("controller `{log_name}`: cannot encode commands: {e}"),
                    }
                }
            });
        let (handle, connected) = match handle {
            Ok(h) => (Some(h), true),
            Err(e) => { warn!("controller `{name}`: thread spawn failed: {e}"); (None, false) }
        };
        Self { name, to_ctrl: Some(state_tx), from_ctrl: cmd_rx, handle, timeout, connected, in_flight: None }
    }

    #[inline] pub fn name(&self) -> &str { &self.name }
    #[inline] pub fn is_connected(&self) -> bool { self.connected }

    /// Publish `frame` and wait up to the timeout for the answer.
    ///
    /// If the previous frame timed out and its answer is already queued, that
    /// answer is stale: it is dropped and `frame` is published. If the
    /// controller is still working on it, `frame` is not published and the
    /// late answer is taken when it arrives within this tick's wait.
    pub fn exchange(&mut self, frame: &SensorFrame) -> Exchange {
        if !self.connected { return Exchange::Disconnected; }
        if let Some(pending) = self.in_flight {
            match self.from_ctrl.try_recv() {
                Ok(buf) => {
                    self.discard(&buf, frame.tick);
                    self.in_flight = None;
                }
                Err(TryRecvError::Empty) => {
                    debug!("controller `{}`: still on tick {pending}, not publishing tick {}", self.name, frame.tick);
                }
                Err(TryRecvError::Disconnected) => return self.mark_disconnected(),
            }
        }
        if self.in_flight.is_none() {
            if let Err(ex) = self.publish(frame) { return ex; }
        }
        let Some(expected) = self.in_flight else { return Exchange::TimedOut };

        let deadline = Instant::now() + self.timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.from_ctrl.recv_timeout(remaining) {
                Ok(buf) => match decode_frame(&buf) {
                    Ok(f) if f.kind == KIND_COMMAND && f.tick == expected => {
                        if expected < frame.tick {
                            debug!("controller `{}`: late answer for tick {expected} used at tick {}", self.name, frame.tick);
                        }
                        self.in_flight = None;
                        let cmds = f.entries.into_iter().map(|(device, value)| DeviceCommand { device, value }).collect();
                        return Exchange::Commands(cmds);
                    }
                    Ok(f) if f.tick < expected => {
                        debug!("controller `{}`: dropping stale frame for tick {}", self.name, f.tick);
                    }
                    Ok(f) => warn!("controller `{}`: unexpected frame kind {} tick {}", self.name, f.kind, f.tick),
                    Err(e) => warn!("controller `{}`: {e}", self.name),
                },
                Err(RecvTimeoutError::Timeout) => {
                    warn!("controller `{}`: no reply for tick {} within {:?}, holding last command",
                        self.name, frame.tick, self.timeout);
                    return Exchange::TimedOut;
                }
                Err(RecvTimeoutError::Disconnected) => return self.mark_disconnected(),
            }
        }
    }

    fn publish(&mut self, frame: &SensorFrame) -> Result<(), Exchange> {
        let bytes = match encode_frame(KIND_STATE, frame.tick, frame.readings.iter().map(|(n, v)| (n.as_str(), *v))) {
            Ok(b) => b,
            Err(e) => { warn!("controller `{}`: cannot encode state: {e}", self.name); return Err(Exchange::TimedOut); }
        };
        let Some(tx) = self.to_ctrl.as_ref() else { return Err(self.mark_disconnected()) };
        match tx.try_send(bytes) {
            Ok(()) => { self.in_flight = Some(frame.tick); Ok(()) }
            Err(TrySendError::Full(_)) => {
                warn!("controller `{}`: state queue full at tick {}", self.name, frame.tick);
                Err(Exchange::TimedOut)
            }
            Err(TrySendError::Disconnected(_)) => Err(self.mark_disconnected()),
        }
    }

    fn discard(&self, buf: &[u8], now: u64) {
        match decode_frame(buf) {
            Ok(f) => debug!("controller `{}`: dropping stale frame for tick {} at tick {now}", self.name, f.tick),
            Err(e) => warn!("controller `{}`: {e}", self.name),
        }
    }

    fn mark_disconnected(&mut self) -> Exchange {
        if self.connected {
            warn!("controller `{}` disconnected, holding last command", self.name);
        }
        self.connected = false;
        Exchange::Disconnected
    }

    /// Close the channel and wait for the controller thread to finish.
    pub fn shutdown(mut self) {
        self.to_ctrl.take();
        if let Some(h) = self.handle.take() {
            if h.join().is_err() {
                warn!("controller `{}` panicked", self.name);
            }
        }
    }
}

impl Drop for ControllerLink {
    fn drop(&mut self) {
        // closing the sender lets the thread leave its loop; it is not joined here
        self.to_ctrl.take();
    }
}
