//! The per-control session controller.
//!
//! A [`SessionController`] is a single task owning everything a control
//! needs: the peer, the store adapter, the current [`NegotiationSession`]
//! and the negotiation deadline. Commands from the control handle and
//! reports from child tasks (tunnel negotiator, modem correlator, wizard)
//! are processed one at a time from one loop, so no state is shared.
//!
//! ```text
//! NotStarted -> Negotiating(Tunnel) -> Negotiating(Modem) -> AwaitingWizard
//!                                                               |
//!                                                   Committed | Aborted
//! ```
//!
//! Every child task reports through a callback tagged with the id of the
//! session that started it. Reports for any other session are dropped, so
//! replies that arrive after a teardown are never acted upon.

use futures::{FutureExt, select};
use log::{debug, info, warn};
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::Result;
use crate::api::backend::{Backend, Wizard};
use crate::api::builders::{build_dun_connection, build_pan_connection};
use crate::api::models::{
    AccessMethod, ControlState, NegotiationStage, SessionPhase, TechnologyFamily, TetherError,
    TimeoutConfig, TunnelState, WizardOutcome,
};
use crate::core::Notify;
use crate::core::deadline::Deadline;
use crate::core::modem::{CorrelatorEvent, CorrelatorHandle};
use crate::core::store::StoreAdapter;
use crate::core::tunnel::{TunnelEvent, TunnelHandle};
use crate::types::address::PeerAddress;
use crate::types::capability::Profile;
use crate::types::constants::status;

/// Requests sent by a control handle.
#[derive(Debug)]
pub(crate) enum Command {
    Enable(oneshot::Sender<Result<()>>),
    Disable(oneshot::Sender<()>),
}

/// Identifies one negotiation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SessionId(u64);

impl Display for SessionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A report from one of a session's child tasks.
#[derive(Debug)]
pub(crate) struct SessionEvent {
    session: SessionId,
    kind: EventKind,
}

#[derive(Debug)]
enum EventKind {
    Tunnel(TunnelEvent),
    Modem(CorrelatorEvent),
    Wizard(WizardOutcome),
}

/// A running wizard.
struct WizardTask {
    token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl WizardTask {
    fn present(
        wizard: Arc<dyn Wizard>,
        family: TechnologyFamily,
        notify: Notify<WizardOutcome>,
    ) -> Self {
        let token = CancellationToken::new();
        let cancelled = token.clone();
        let task = tokio::spawn(async move {
            select! {
                _ = cancelled.cancelled().fuse() => debug!("Wizard dismissed"),
                outcome = wizard.present(family).fuse() => notify(outcome),
            }
        });

        Self {
            token,
            task: Some(task),
        }
    }

    async fn dismiss(&mut self) {
        self.token.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!("Wizard task ended abnormally: {e}");
            }
        }
    }
}

/// The live negotiation. Each phase holds exactly the resources it owns.
enum NegotiationSession {
    Tunnel {
        id: SessionId,
        tunnel: TunnelHandle,
    },
    Modem {
        id: SessionId,
        tunnel: TunnelHandle,
        interface: String,
        correlator: CorrelatorHandle,
    },
    AwaitingWizard {
        id: SessionId,
        tunnel: TunnelHandle,
        interface: String,
        family: TechnologyFamily,
        wizard: WizardTask,
    },
}

impl NegotiationSession {
    fn id(&self) -> SessionId {
        match self {
            Self::Tunnel { id, .. } | Self::Modem { id, .. } | Self::AwaitingWizard { id, .. } => {
                *id
            }
        }
    }

    fn phase(&self) -> SessionPhase {
        match self {
            Self::Tunnel { .. } => SessionPhase::Negotiating(NegotiationStage::Tunnel),
            Self::Modem { .. } => SessionPhase::Negotiating(NegotiationStage::Modem),
            Self::AwaitingWizard { family, .. } => SessionPhase::AwaitingWizard(*family),
        }
    }

    /// Stops every child task and releases the tunnel.
    async fn teardown(self) {
        match self {
            Self::Tunnel { mut tunnel, .. } => {
                debug!("Stopping tunnel negotiator in state {}", tunnel.state());
                tunnel.cancel().await;
            }
            Self::Modem {
                mut tunnel,
                mut correlator,
                ..
            } => {
                correlator.stop().await;
                tunnel.cancel().await;
            }
            Self::AwaitingWizard {
                mut tunnel,
                mut wizard,
                ..
            } => {
                wizard.dismiss().await;
                tunnel.cancel().await;
            }
        }
    }
}

/// Which loop input woke the controller.
enum Wake {
    Command(Option<Command>),
    Event(Option<SessionEvent>),
    Deadline,
}

pub(crate) struct SessionController {
    peer: PeerAddress,
    profile: Profile,
    backend: Backend,
    store: StoreAdapter,
    config: TimeoutConfig,
    session: Option<NegotiationSession>,
    deadline: Deadline,
    next_id: u64,
    events: mpsc::UnboundedSender<SessionEvent>,
    state: watch::Sender<ControlState>,
}

impl SessionController {
    /// Spawns the controller task for one control.
    ///
    /// Returns the command sender and the published state. The task exits
    /// once every command sender has been dropped.
    pub(crate) fn spawn(
        peer: PeerAddress,
        profile: Profile,
        backend: Backend,
        config: TimeoutConfig,
        initially_active: bool,
    ) -> (mpsc::Sender<Command>, watch::Receiver<ControlState>) {
        let (command_tx, commands) = mpsc::channel(8);
        let (event_tx, events) = mpsc::unbounded_channel();
        let (state_tx, state) = watch::channel(ControlState::idle(initially_active));

        let controller = Self {
            peer,
            profile,
            store: StoreAdapter::new(Arc::clone(&backend.store)),
            backend,
            config,
            session: None,
            deadline: Deadline::disarmed(),
            next_id: 0,
            events: event_tx,
            state: state_tx,
        };
        tokio::spawn(controller.run(commands, events));

        (command_tx, state)
    }

    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut events: mpsc::UnboundedReceiver<SessionEvent>,
    ) {
        debug!("Session controller for {} ({}) started", self.peer, self.profile);

        loop {
            let wake = {
                select! {
                    command = commands.recv().fuse() => Wake::Command(command),
                    event = events.recv().fuse() => Wake::Event(event),
                    _ = self.deadline.expired().fuse() => Wake::Deadline,
                }
            };

            match wake {
                Wake::Command(Some(Command::Enable(reply))) => {
                    let result = self.enable().await;
                    let _ = reply.send(result);
                }
                Wake::Command(Some(Command::Disable(reply))) => {
                    self.disable().await;
                    let _ = reply.send(());
                }
                Wake::Command(None) => break,
                Wake::Event(Some(event)) => self.on_event(event).await,
                Wake::Event(None) => break,
                Wake::Deadline => self.on_deadline().await,
            }
        }

        if let Some(session) = self.session.take() {
            debug!("Control for {} dropped, tearing down session {}", self.peer, session.id());
            session.teardown().await;
        }
        debug!("Session controller for {} stopped", self.peer);
    }

    async fn enable(&mut self) -> Result<()> {
        if let Some(session) = &self.session {
            debug!("Session {} already active for {}", session.id(), self.peer);
            return Err(TetherError::AlreadyActive);
        }

        let profile = self.profile;
        if !profile.is_eligible() {
            return Err(TetherError::NotEligible);
        }

        match self.store.find(&self.peer, profile).await {
            Ok(Some(existing)) => {
                info!("{} already has connection '{}'", self.peer, existing.id);
                self.publish(ControlState::idle(true));
                return Ok(());
            }
            Ok(None) => {}
            Err(e) => warn!("Could not look up existing connection for {}: {e}", self.peer),
        }

        match profile {
            Profile::Pan => self.enable_pan().await,
            Profile::Dun => {
                self.start_session();
                Ok(())
            }
            Profile::None => Err(TetherError::NotEligible),
        }
    }

    async fn enable_pan(&mut self) -> Result<()> {
        match self.store.insert(build_pan_connection(&self.peer)).await {
            Ok(_) => {
                self.publish(ControlState::idle(true));
                Ok(())
            }
            Err(e) => {
                warn!("Failed to save PAN connection for {}: {e}", self.peer);
                self.publish(ControlState {
                    status: format!("Error: {e}"),
                    ..ControlState::idle(false)
                });
                Err(e)
            }
        }
    }

    fn start_session(&mut self) {
        let id = SessionId(self.next_id);
        self.next_id += 1;
        info!("Starting DUN session {id} for {}", self.peer);

        let tunnel = TunnelHandle::start(
            Arc::clone(&self.backend.adapters),
            self.peer,
            self.config.connect_timeout,
            self.notifier(id, EventKind::Tunnel),
        );
        self.deadline.arm(self.config.negotiation_timeout);
        self.session = Some(NegotiationSession::Tunnel { id, tunnel });
        self.publish_progress(status::DETECTING);
    }

    async fn disable(&mut self) {
        if let Some(session) = self.session.take() {
            info!("Cancelling session {} for {}", session.id(), self.peer);
            self.deadline.disarm();
            session.teardown().await;
        }

        match self.store.find(&self.peer, self.profile).await {
            Ok(Some(stored)) => {
                if let Err(e) = self.store.delete(&stored).await {
                    warn!("Failed to delete connection '{}': {e}", stored.id);
                }
            }
            Ok(None) => debug!("No stored connection for {}", self.peer),
            Err(e) => warn!("Could not look up connection for {}: {e}", self.peer),
        }

        self.publish(ControlState::idle(false));
    }

    async fn on_event(&mut self, event: SessionEvent) {
        let current = self.session.as_ref().map(NegotiationSession::id);
        if current != Some(event.session) {
            debug!(
                "Discarding {:?} from stale session {}",
                event.kind, event.session
            );
            return;
        }

        match event.kind {
            EventKind::Tunnel(TunnelEvent::Phase(state)) => self.on_tunnel_phase(state),
            EventKind::Tunnel(TunnelEvent::Opened { interface }) => self.on_tunnel_open(interface),
            EventKind::Tunnel(TunnelEvent::Failed(e)) => {
                if matches!(self.session, Some(NegotiationSession::AwaitingWizard { .. })) {
                    debug!("Ignoring tunnel failure while the wizard is open: {e}");
                    return;
                }
                self.abort(e).await;
            }
            EventKind::Modem(CorrelatorEvent::Matched { path, family }) => {
                self.on_modem_matched(path, family).await
            }
            EventKind::Modem(CorrelatorEvent::Failed(e)) => self.abort(e).await,
            EventKind::Wizard(WizardOutcome::Completed(method)) => self.commit(method).await,
            EventKind::Wizard(WizardOutcome::Canceled) => {
                self.abort(TetherError::WizardCanceled).await
            }
        }
    }

    fn on_tunnel_phase(&mut self, state: TunnelState) {
        if !matches!(self.session, Some(NegotiationSession::Tunnel { .. })) {
            return;
        }
        let text = match state {
            TunnelState::LocatingPeer => status::LOCATING,
            TunnelState::OpeningTunnel => status::CONNECTING,
            _ => status::DETECTING,
        };
        self.publish_progress(text);
    }

    fn on_tunnel_open(&mut self, interface: String) {
        match self.session.take() {
            Some(NegotiationSession::Tunnel { id, tunnel }) => {
                debug!("Session {id}: looking for the modem behind '{interface}'");
                let correlator = CorrelatorHandle::watch(
                    Arc::clone(&self.backend.modems),
                    &interface,
                    self.notifier(id, EventKind::Modem),
                );
                self.session = Some(NegotiationSession::Modem {
                    id,
                    tunnel,
                    interface,
                    correlator,
                });
                self.publish_progress(status::DETECTING);
            }
            other => self.session = other,
        }
    }

    async fn on_modem_matched(&mut self, path: String, family: TechnologyFamily) {
        match self.session.take() {
            Some(NegotiationSession::Modem {
                id,
                tunnel,
                interface,
                mut correlator,
            }) => {
                correlator.stop().await;
                self.deadline.disarm();
                info!("Session {id}: '{interface}' is {family} modem {path}");

                let wizard = WizardTask::present(
                    Arc::clone(&self.backend.wizard),
                    family,
                    self.notifier(id, EventKind::Wizard),
                );
                self.session = Some(NegotiationSession::AwaitingWizard {
                    id,
                    tunnel,
                    interface,
                    family,
                    wizard,
                });
                self.publish_progress(status::AWAITING_DETAILS);
            }
            other => self.session = other,
        }
    }

    async fn commit(&mut self, method: AccessMethod) {
        let Some(session) = self.session.take() else {
            return;
        };
        if let NegotiationSession::AwaitingWizard {
            family, interface, ..
        } = &session
        {
            debug!("Wizard finished for '{interface}'");
            if *family != method.family {
                warn!(
                    "Wizard returned {} settings for a {family} modem",
                    method.family
                );
            }
        }

        let id = session.id();
        session.teardown().await;

        match self
            .store
            .insert(build_dun_connection(&self.peer, &method))
            .await
        {
            Ok(stored) => {
                info!("Session {id} committed as '{}'", stored.id);
                self.publish(ControlState {
                    active: true,
                    sensitive: true,
                    busy: false,
                    status: status::READY.into(),
                    phase: SessionPhase::Committed,
                });
            }
            Err(e) => self.publish_aborted(&e),
        }
    }

    async fn on_deadline(&mut self) {
        match &self.session {
            Some(NegotiationSession::Tunnel { .. } | NegotiationSession::Modem { .. }) => {
                warn!("Timed out detecting phone details for {}", self.peer);
                self.abort(TetherError::NegotiationTimeout).await;
            }
            _ => debug!("Deadline fired with no negotiation running"),
        }
    }

    /// Ends the current session with `error`.
    async fn abort(&mut self, error: TetherError) {
        self.deadline.disarm();
        if let Some(session) = self.session.take() {
            warn!("Session {} for {} aborted: {error}", session.id(), self.peer);
            session.teardown().await;
        }
        self.publish_aborted(&error);
    }

    fn publish_aborted(&self, error: &TetherError) {
        let status = match error {
            TetherError::WizardCanceled => status::WIZARD_CANCELED.to_string(),
            e => format!("Error: {e}"),
        };
        self.publish(ControlState {
            active: false,
            sensitive: true,
            busy: false,
            status,
            phase: SessionPhase::Aborted(error.kind()),
        });
    }

    /// Publishes a state for the running session.
    fn publish_progress(&self, text: &str) {
        let Some(session) = &self.session else {
            return;
        };
        self.publish(ControlState {
            active: true,
            sensitive: false,
            busy: !matches!(session, NegotiationSession::AwaitingWizard { .. }),
            status: text.to_string(),
            phase: session.phase(),
        });
    }

    fn publish(&self, state: ControlState) {
        debug!(
            "Control for {}: {:?} active={} '{}'",
            self.peer, state.phase, state.active, state.status
        );
        self.state.send_replace(state);
    }

    /// Builds the callback a child task of session `id` reports through.
    fn notifier<E: 'static>(&self, id: SessionId, wrap: fn(E) -> EventKind) -> Notify<E> {
        let events = self.events.clone();
        Box::new(move |event| {
            let _ = events.send(SessionEvent {
                session: id,
                kind: wrap(event),
            });
        })
    }
}
