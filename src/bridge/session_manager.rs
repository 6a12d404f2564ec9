//! Session lifecycle and the per-session control loop.
//!
//! [`SessionManager::admit`] reserves a robot and creates the
//! [`Session`]. [`SessionManager::run`] then owns that session until it is
//! `Disconnected`, racing four suspension points in one biased `select!`:
//!
//! 1. watchdog deadline (fail-safe, always checked first)
//! 2. eviction signal from the registry
//! 3. next inbound frame
//! 4. rate limiter tick
//!
//! Whatever ends the loop, teardown runs the same path: `Closing`, clear
//! the limiter, publish the stop, tell the operator `stopped` if the
//! transport still works, close it, `Disconnected`, release the robot.

use std::fmt;
use std::pin::pin;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::time::{Instant, MissedTickBehavior};

use super::{CommandCodec, CommandPublisher, RateLimiter, Watchdog};
use crate::bus::MiddlewareBus;
use crate::config::{BridgeConfig, MIN_PUBLISH_PERIOD};
use crate::domain::{
    ControlCommand, DrivePayload, RobotId, Session, SessionId, SessionLease, SessionRegistry,
    SessionState,
};
use crate::error::{AdmissionError, DecodeError, PublishError};
use crate::ws::messages::StatusFrame;

/// Timing and validation knobs shared by every session.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Rate limiter period.
    pub publish_period: Duration,
    /// Watchdog deadline after each valid command.
    pub watchdog_timeout: Duration,
    /// Deadline for the first command after admission.
    pub handshake_timeout: Duration,
    /// Consecutive decode errors tolerated before closing.
    pub max_decode_errors: u32,
    /// Accepted component magnitude before rejection.
    pub tolerance: f64,
}

impl SessionSettings {
    /// Extracts the session settings from the bridge configuration.
    #[must_use]
    pub fn from_config(config: &BridgeConfig) -> Self {
        Self {
            publish_period: config.publish_period(),
            watchdog_timeout: config.watchdog_timeout,
            handshake_timeout: config.handshake_timeout,
            max_decode_errors: config.max_decode_errors,
            tolerance: config.sequence_tolerance,
        }
    }
}

/// Transport-level input to a session loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// One data frame (text or binary payload).
    Frame(Vec<u8>),
    /// The peer closed the connection.
    Closed,
}

/// Why a session ended.
#[derive(Debug, Clone, PartialEq)]
pub enum CloseReason {
    /// The operator closed the connection.
    ClientDisconnected,
    /// A write to the operator failed or timed out.
    TransportFailed,
    /// No valid command within the deadline.
    WatchdogTimeout,
    /// Forced eviction through the registry.
    Evicted,
    /// The bus rejected a publish.
    BusFailure(PublishError),
    /// Too many consecutive invalid frames.
    TooManyDecodeErrors(u32),
}

impl CloseReason {
    /// Returns `true` if the transport can still carry a final `stopped`
    /// frame.
    #[must_use]
    pub const fn transport_usable(&self) -> bool {
        !matches!(self, Self::ClientDisconnected | Self::TransportFailed)
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ClientDisconnected => f.write_str("client disconnected"),
            Self::TransportFailed => f.write_str("transport failed"),
            Self::WatchdogTimeout => f.write_str("watchdog timeout"),
            Self::Evicted => f.write_str("session evicted"),
            Self::BusFailure(e) => write!(f, "bus failure: {e}"),
            Self::TooManyDecodeErrors(n) => write!(f, "{n} consecutive invalid frames"),
        }
    }
}

/// Admitted session waiting for its transport.
///
/// Dropping it without calling [`SessionManager::run`] releases the robot.
#[derive(Debug)]
pub struct SessionHandle {
    session: Session,
    lease: SessionLease,
}

impl SessionHandle {
    /// Session identifier.
    #[must_use]
    pub const fn session_id(&self) -> SessionId {
        self.session.id()
    }

    /// Robot the session controls.
    #[must_use]
    pub const fn robot_id(&self) -> &RobotId {
        self.session.robot_id()
    }
}

/// Result of a finished session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionOutcome {
    /// Finished session.
    pub session_id: SessionId,
    /// Robot it controlled.
    pub robot_id: RobotId,
    /// Why it ended.
    pub reason: CloseReason,
    /// Whether the bus accepted the final stop.
    pub stop_published: bool,
    /// Last payload the bus accepted for the robot.
    pub last_published: Option<DrivePayload>,
}

/// Owns session lifecycles and wires codec, limiter, watchdog and
/// publisher for each of them.
#[derive(Debug)]
pub struct SessionManager {
    registry: Arc<SessionRegistry>,
    bus: Arc<dyn MiddlewareBus>,
    codec: CommandCodec,
    settings: SessionSettings,
}

impl SessionManager {
    /// Creates a manager over `registry`, publishing to `bus`.
    #[must_use]
    pub fn new(
        registry: Arc<SessionRegistry>,
        bus: Arc<dyn MiddlewareBus>,
        settings: SessionSettings,
    ) -> Self {
        Self {
            registry,
            bus,
            codec: CommandCodec::new(settings.tolerance),
            settings,
        }
    }

    /// Shared robot → session registry.
    #[must_use]
    pub const fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Session settings.
    #[must_use]
    pub const fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    /// Creates a [`SessionState::Connected`] session for `robot_id`.
    ///
    /// # Errors
    ///
    /// Returns [`AdmissionError::RobotBusy`] if another session holds the
    /// robot.
    pub fn admit(&self, robot_id: RobotId) -> Result<SessionHandle, AdmissionError> {
        let lease = self.registry.reserve(robot_id.clone())?;
        let session = Session::new(lease.session_id(), robot_id);
        tracing::info!(
            robot_id = %session.robot_id(),
            session_id = %session.id(),
            "session connected"
        );
        Ok(SessionHandle { session, lease })
    }

    /// Asks the session holding `robot_id` to close.
    pub fn evict(&self, robot_id: &RobotId) -> bool {
        self.registry.evict(robot_id)
    }

    /// Stops admitting sessions, evicts every live one and waits up to
    /// `timeout` for all of them to reach `Disconnected`. Returns `true`
    /// if the registry drained.
    pub async fn shutdown(&self, timeout: Duration) -> bool {
        let signalled = self.registry.close();
        tracing::info!(sessions = signalled, "evicting sessions for shutdown");
        let deadline = Instant::now() + timeout;
        while !self.registry.is_empty() {
            if Instant::now() >= deadline {
                tracing::warn!(remaining = self.registry.len(), "shutdown drain timed out");
                return false;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        true
    }

    /// Runs the session until it is `Disconnected`.
    ///
    /// `inbound` yields frames from the operator; `outbound` carries
    /// encoded [`StatusFrame`]s back. The robot is released when this
    /// returns.
    pub async fn run<Rx, Tx>(&self, handle: SessionHandle, inbound: Rx, outbound: Tx) -> SessionOutcome
    where
        Rx: Stream<Item = TransportEvent>,
        Tx: Sink<String>,
    {
        let SessionHandle { mut session, lease } = handle;
        let mut inbound = pin!(inbound);
        let mut outbound = pin!(outbound);

        let mut limiter =
            RateLimiter::new(self.settings.publish_period.max(MIN_PUBLISH_PERIOD));
        let mut publisher = CommandPublisher::new(Arc::clone(&self.bus), session.robot_id().clone())
            .with_timeout(self.settings.watchdog_timeout);

        let reason = self
            .drive(
                &mut session,
                &lease,
                &mut limiter,
                &mut publisher,
                &mut inbound,
                &mut outbound,
            )
            .await;

        self.teardown(session, lease, limiter, publisher, &mut outbound, reason)
            .await
    }

    async fn drive<Rx, Tx>(
        &self,
        session: &mut Session,
        lease: &SessionLease,
        limiter: &mut RateLimiter,
        publisher: &mut CommandPublisher,
        inbound: &mut Rx,
        outbound: &mut Tx,
    ) -> CloseReason
    where
        Rx: Stream<Item = TransportEvent> + Unpin,
        Tx: Sink<String> + Unpin,
    {
        let mut watchdog = Watchdog::new(
            self.settings.handshake_timeout,
            self.settings.watchdog_timeout,
            Instant::now(),
        );
        let mut expiry = pin!(tokio::time::sleep_until(watchdog.deadline()));
        let mut evicted = pin!(lease.evicted());
        let mut ticker = tokio::time::interval(limiter.period());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                () = &mut expiry => {
                    tracing::warn!(
                        robot_id = %session.robot_id(),
                        session_id = %session.id(),
                        silent_ms = u64::try_from(watchdog.silence(Instant::now()).as_millis()).unwrap_or(u64::MAX),
                        fed = watchdog.has_been_fed(),
                        "watchdog expired"
                    );
                    return CloseReason::WatchdogTimeout;
                }

                () = &mut evicted => return CloseReason::Evicted,

                event = inbound.next() => {
                    let Some(TransportEvent::Frame(frame)) = event else {
                        return CloseReason::ClientDisconnected;
                    };
                    let reply = match self.accept_frame(session, lease, &frame, Instant::now()) {
                        Ok(command) => {
                            limiter.submit(command);
                            watchdog.reset(command.received_at());
                            expiry.as_mut().reset(watchdog.deadline());
                            StatusFrame::ok()
                        }
                        Err(e) => {
                            let errors = session.record_decode_error();
                            tracing::debug!(
                                session_id = %session.id(),
                                errors,
                                error = %e,
                                "frame rejected"
                            );
                            if errors >= self.settings.max_decode_errors {
                                return CloseReason::TooManyDecodeErrors(errors);
                            }
                            StatusFrame::rejected(e.to_string())
                        }
                    };
                    if !self.send_status(outbound, &reply).await {
                        return CloseReason::TransportFailed;
                    }
                }

                scheduled = ticker.tick() => {
                    if let Some(command) = limiter.on_tick(scheduled) {
                        match publisher.publish(&command).await {
                            Ok(()) => lease.record_published(command.payload()),
                            Err(e) => return CloseReason::BusFailure(e),
                        }
                    }
                }
            }
        }
    }

    fn accept_frame(
        &self,
        session: &mut Session,
        lease: &SessionLease,
        frame: &[u8],
        now: Instant,
    ) -> Result<ControlCommand, DecodeError> {
        let command = self.codec.decode(frame, session.last_seq(), now)?;
        if session.record_command(&command) {
            lease.set_state(SessionState::Active);
            tracing::info!(
                robot_id = %session.robot_id(),
                session_id = %session.id(),
                "session active"
            );
        }
        Ok(command)
    }

    async fn send_status<Tx>(&self, outbound: &mut Tx, status: &StatusFrame) -> bool
    where
        Tx: Sink<String> + Unpin,
    {
        let send = outbound.send(CommandCodec::encode(status));
        matches!(
            tokio::time::timeout(self.settings.watchdog_timeout, send).await,
            Ok(Ok(()))
        )
    }

    async fn teardown<Tx>(
        &self,
        mut session: Session,
        lease: SessionLease,
        mut limiter: RateLimiter,
        mut publisher: CommandPublisher,
        outbound: &mut Tx,
        reason: CloseReason,
    ) -> SessionOutcome
    where
        Tx: Sink<String> + Unpin,
    {
        if let Err(e) = session.transition(SessionState::Closing) {
            tracing::error!(session_id = %session.id(), error = %e, "unexpected state at teardown");
        }
        lease.set_state(session.state());
        limiter.clear();

        let stop_published = publisher.publish_stop().await.is_ok();
        if stop_published {
            lease.record_published(DrivePayload::STOP);
        }

        if reason.transport_usable() {
            let _ = self
                .send_status(outbound, &StatusFrame::stopped(reason.to_string()))
                .await;
        }
        let _ = tokio::time::timeout(self.settings.watchdog_timeout, outbound.close()).await;

        let _ = session.transition(SessionState::Disconnected);
        lease.set_state(session.state());
        tracing::info!(
            robot_id = %session.robot_id(),
            session_id = %session.id(),
            %reason,
            stop_published,
            superseded = limiter.superseded(),
            "session disconnected"
        );
        drop(lease);

        SessionOutcome {
            session_id: session.id(),
            robot_id: session.robot_id().clone(),
            reason,
            stop_published,
            last_published: publisher.last_published(),
        }
    }
}
