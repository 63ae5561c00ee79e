//! The bridge loop: read a frame, interpret it, publish the result. Plus the
//! control service and heartbeat that write commands back on their own
//! threads.

use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use sensorbridge_frame::{FrameError, FrameReader};
use sensorbridge_osc::{OscError, OscListener, OscMessage, Publish};
use sensorbridge_transport::Transport;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::command::{CommandSender, ControlTable, OutboundCommand};
use crate::error::{BridgeError, Result};
use crate::interpreter::{AddressTable, ChannelKind, InterpretError};
use crate::mapping::{OptoConfig, OptoContext};

/// Address the bridge announces itself on at startup.
pub const SCRIPT_NAME_ADDRESS: &str = "/scriptName";

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// What to do when the transport goes quiet for the idle timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StallPolicy {
    /// Stop the bridge with an error.
    #[default]
    Exit,
    /// Log it and keep waiting.
    Continue,
}

/// Bridge behavior.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Published on `/scriptName` at startup.
    pub script_name: String,
    /// Drop the transport backlog after a frame too short to interpret.
    pub discard_on_malformed: bool,
    pub stall_policy: StallPolicy,
    pub opto: OptoConfig,
    /// How often the control service wakes to check for shutdown.
    pub poll_interval: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            script_name: "sensorbridge".to_string(),
            discard_on_malformed: true,
            stall_policy: StallPolicy::default(),
            opto: OptoConfig::default(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// Where the bridge is within one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeState {
    Idle,
    ReadingFrame,
    Interpreting,
    Publishing,
}

/// Why a frame produced no messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    Malformed { len: usize },
    DanglingEscape,
    UnknownAddress(u8),
    TooLarge { size: usize, max: usize },
}

impl From<InterpretError> for RejectReason {
    fn from(err: InterpretError) -> Self {
        match err {
            InterpretError::MalformedFrame { len } => RejectReason::Malformed { len },
            InterpretError::UnknownAddress(addr) => RejectReason::UnknownAddress(addr),
        }
    }
}

/// Result of one bridge cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// A frame was decoded and this many messages were published.
    Published(usize),
    /// A frame arrived but was discarded.
    Rejected(RejectReason),
    /// Nothing complete arrived yet.
    Idle,
}

/// Why `Bridge::run` returned normally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunExit {
    /// The run flag was cleared.
    Shutdown,
    /// The transport reached end of stream.
    Closed,
}

/// Counters shared by the bridge, control service, and heartbeat.
#[derive(Debug, Default)]
pub struct BridgeStats {
    frames: AtomicU64,
    published: AtomicU64,
    malformed: AtomicU64,
    unknown_address: AtomicU64,
    oversized: AtomicU64,
    publish_errors: AtomicU64,
    stalls: AtomicU64,
    commands_sent: AtomicU64,
    command_errors: AtomicU64,
}

/// Point-in-time copy of `BridgeStats`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct StatsSnapshot {
    pub frames: u64,
    pub published: u64,
    pub malformed: u64,
    pub unknown_address: u64,
    pub oversized: u64,
    pub publish_errors: u64,
    pub stalls: u64,
    pub commands_sent: u64,
    pub command_errors: u64,
}

impl BridgeStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        let get = |c: &AtomicU64| c.load(Ordering::Relaxed);
        StatsSnapshot {
            frames: get(&self.frames),
            published: get(&self.published),
            malformed: get(&self.malformed),
            unknown_address: get(&self.unknown_address),
            oversized: get(&self.oversized),
            publish_errors: get(&self.publish_errors),
            stalls: get(&self.stalls),
            commands_sent: get(&self.commands_sent),
            command_errors: get(&self.command_errors),
        }
    }

    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

impl StatsSnapshot {
    /// Emit the counters as one log line.
    pub fn log(&self) {
        info!(
            frames = self.frames,
            published = self.published,
            malformed = self.malformed,
            unknown_address = self.unknown_address,
            oversized = self.oversized,
            publish_errors = self.publish_errors,
            stalls = self.stalls,
            commands_sent = self.commands_sent,
            command_errors = self.command_errors,
            "bridge stats"
        );
    }
}

/// Reads frames from a transport and publishes what they decode to.
pub struct Bridge<R, P> {
    reader: FrameReader<R>,
    table: AddressTable,
    opto: OptoContext,
    publisher: P,
    config: BridgeConfig,
    state: BridgeState,
    stats: Arc<BridgeStats>,
}

impl<R: Transport, P: Publish> Bridge<R, P> {
    pub fn new(
        reader: FrameReader<R>,
        table: AddressTable,
        publisher: P,
        config: BridgeConfig,
    ) -> Self {
        Self {
            reader,
            table,
            opto: OptoContext::new(config.opto.clone()),
            publisher,
            config,
            state: BridgeState::Idle,
            stats: Arc::new(BridgeStats::default()),
        }
    }

    /// Share counters with other components.
    pub fn with_stats(mut self, stats: Arc<BridgeStats>) -> Self {
        self.stats = stats;
        self
    }

    pub fn stats(&self) -> &Arc<BridgeStats> {
        &self.stats
    }

    pub fn state(&self) -> BridgeState {
        self.state
    }

    pub fn publisher(&self) -> &P {
        &self.publisher
    }

    pub fn opto(&self) -> &OptoContext {
        &self.opto
    }

    /// Publish `/scriptName` so listeners know which bridge is running.
    pub fn announce(&mut self) -> Result<()> {
        let msg = OscMessage::new(SCRIPT_NAME_ADDRESS).arg(self.config.script_name.as_str());
        self.publisher.publish(&msg)?;
        info!(script_name = %self.config.script_name, "announced");
        Ok(())
    }

    /// Run one read-interpret-publish cycle.
    ///
    /// Recoverable frame problems come back as `StepOutcome::Rejected`;
    /// end of stream, stalls, and I/O failures come back as errors.
    pub fn step(&mut self) -> Result<StepOutcome> {
        self.state = BridgeState::ReadingFrame;
        let frame = match self.reader.try_read_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                self.state = BridgeState::Idle;
                return Ok(StepOutcome::Idle);
            }
            Err(FrameError::FrameTooLarge { size, max }) => {
                BridgeStats::bump(&self.stats.oversized);
                warn!(size, max, "frame too large, resynchronizing");
                return Ok(self.reject(RejectReason::TooLarge { size, max }));
            }
            Err(FrameError::DanglingEscape) => {
                BridgeStats::bump(&self.stats.malformed);
                warn!("stream ended inside an escape sequence");
                return Ok(self.reject(RejectReason::DanglingEscape));
            }
            Err(err) => {
                self.state = BridgeState::Idle;
                return Err(err.into());
            }
        };
        BridgeStats::bump(&self.stats.frames);

        self.state = BridgeState::Interpreting;
        let msg = match self.table.interpret(frame.as_ref()) {
            Ok(msg) => msg,
            Err(err) => {
                match err {
                    InterpretError::MalformedFrame { len } => {
                        BridgeStats::bump(&self.stats.malformed);
                        warn!(len, "malformed frame");
                        if self.config.discard_on_malformed {
                            let dropped = self.reader.discard_backlog()?;
                            debug!(dropped, "discarded backlog after malformed frame");
                        }
                    }
                    InterpretError::UnknownAddress(address) => {
                        BridgeStats::bump(&self.stats.unknown_address);
                        debug!(address, "unknown address");
                    }
                }
                return Ok(self.reject(err.into()));
            }
        };

        self.state = BridgeState::Publishing;
        let outgoing = match msg.kind {
            ChannelKind::Value => vec![OscMessage::new(msg.name).arg(msg.value)],
            ChannelKind::Opto { index } => self
                .opto
                .process_raw(index, msg.value)
                .map(|reading| reading.messages())
                .unwrap_or_default(),
        };

        let mut published = 0;
        for out in &outgoing {
            match self.publisher.publish(out) {
                Ok(()) => published += 1,
                Err(err) => {
                    BridgeStats::bump(&self.stats.publish_errors);
                    warn!(address = %out.address, error = %err, "publish failed");
                }
            }
        }
        self.stats
            .published
            .fetch_add(published as u64, Ordering::Relaxed);

        self.state = BridgeState::Idle;
        Ok(StepOutcome::Published(published))
    }

    /// Announce, then step until `running` is cleared or the transport closes.
    ///
    /// A stall ends the run with an error under `StallPolicy::Exit`.
    pub fn run(&mut self, running: &AtomicBool) -> Result<RunExit> {
        self.announce()?;
        let result = loop {
            if !running.load(Ordering::SeqCst) {
                break Ok(RunExit::Shutdown);
            }
            match self.step() {
                Ok(_) => {}
                Err(BridgeError::Frame(FrameError::ConnectionClosed)) => {
                    info!("transport closed");
                    break Ok(RunExit::Closed);
                }
                Err(BridgeError::Frame(FrameError::Stalled(idle))) => {
                    BridgeStats::bump(&self.stats.stalls);
                    match self.config.stall_policy {
                        StallPolicy::Exit => {
                            error!(?idle, "transport stalled");
                            break Err(FrameError::Stalled(idle).into());
                        }
                        StallPolicy::Continue => warn!(?idle, "transport stalled, still waiting"),
                    }
                }
                Err(err) => break Err(err),
            }
        };
        self.state = BridgeState::Idle;
        self.stats.snapshot().log();
        result
    }

    fn reject(&mut self, reason: RejectReason) -> StepOutcome {
        self.state = BridgeState::Idle;
        StepOutcome::Rejected(reason)
    }
}

/// Receives control messages and forwards them as commands.
pub struct ControlService<W> {
    listener: OscListener,
    table: ControlTable,
    sender: CommandSender<W>,
    stats: Arc<BridgeStats>,
    poll_interval: Duration,
}

impl<W: Write + Send + 'static> ControlService<W> {
    pub fn new(
        listener: OscListener,
        table: ControlTable,
        sender: CommandSender<W>,
        stats: Arc<BridgeStats>,
    ) -> Self {
        Self {
            listener,
            table,
            sender,
            stats,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Resolve and send one control message.
    pub fn handle(&self, msg: &OscMessage) -> Result<OutboundCommand> {
        let cmd = match self.table.resolve(msg) {
            Ok(cmd) => cmd,
            Err(err) => {
                BridgeStats::bump(&self.stats.command_errors);
                return Err(err.into());
            }
        };
        if let Err(err) = self.sender.send(&cmd) {
            BridgeStats::bump(&self.stats.command_errors);
            return Err(err.into());
        }
        BridgeStats::bump(&self.stats.commands_sent);
        Ok(cmd)
    }

    /// Serve until `running` is cleared or the command path fails.
    pub fn run(&self, running: &AtomicBool) -> Result<()> {
        self.listener.set_timeout(Some(self.poll_interval))?;
        while running.load(Ordering::SeqCst) {
            let (msg, from) = match self.listener.recv() {
                Ok(Some(received)) => received,
                Ok(None) => continue,
                Err(OscError::Io(err)) => return Err(OscError::Io(err).into()),
                Err(err) => {
                    BridgeStats::bump(&self.stats.command_errors);
                    warn!(error = %err, "ignoring control packet");
                    continue;
                }
            };
            match self.handle(&msg) {
                Ok(cmd) => debug!(%from, address = %msg.address, command = cmd.name(), "control"),
                Err(BridgeError::Command(err)) => {
                    warn!(%from, error = %err, "rejected control message");
                }
                Err(BridgeError::Frame(FrameError::FrameTooLarge { size, max })) => {
                    warn!(size, max, "command too large");
                }
                Err(err) => return Err(err),
            }
        }
        debug!("control service stopped");
        Ok(())
    }

    /// Run on a named thread.
    pub fn spawn(self, running: Arc<AtomicBool>) -> std::io::Result<JoinHandle<Result<()>>> {
        thread::Builder::new()
            .name("control".to_string())
            .spawn(move || {
                let result = self.run(&running);
                if let Err(err) = &result {
                    error!(error = %err, "control service failed");
                }
                result
            })
    }
}

/// Send a `Heartbeat` every `interval` until `running` is cleared.
///
/// The sequence starts at 0 and wraps after 255. Each interval is measured
/// from the end of the previous send. The thread stops on the first send
/// failure.
pub fn spawn_heartbeat<W: Write + Send + 'static>(
    sender: CommandSender<W>,
    interval: Duration,
    running: Arc<AtomicBool>,
    stats: Arc<BridgeStats>,
) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("heartbeat".to_string())
        .spawn(move || {
            let mut sequence: u8 = 0;
            let slice = interval.min(DEFAULT_POLL_INTERVAL);
            let mut next = Instant::now();
            while running.load(Ordering::SeqCst) {
                let now = Instant::now();
                if now < next {
                    thread::sleep(slice.min(next - now));
                    continue;
                }
                if let Err(err) = sender.send(&OutboundCommand::Heartbeat { sequence }) {
                    BridgeStats::bump(&stats.command_errors);
                    warn!(error = %err, "heartbeat failed, stopping");
                    break;
                }
                BridgeStats::bump(&stats.commands_sent);
                sequence = sequence.wrapping_add(1);
                // Ticks missed during a slow write are dropped, not replayed.
                next = Instant::now() + interval;
            }
        })
}
