//! Serial tunnel negotiation with a remote phone.
//!
//! The negotiator walks through the following states, issuing exactly one
//! request at a time:
//!
//! ```text
//! Idle -> DiscoveringAdapter -> LocatingPeer -> OpeningTunnel -> TunnelOpen
//!                                                                  |
//!                                                        Closed | Failed
//! ```
//!
//! Once the tunnel is open the negotiator keeps watching the peer's
//! `Connected` property. If the phone drops the link, the tunnel is released
//! and the negotiator fails with [`TetherError::TunnelLost`].
//!
//! Each negotiator runs in its own task and reports back through a
//! [`Notify`] callback. It is stopped with [`TunnelHandle::cancel`].

use futures::stream::{BoxStream, Fuse, FusedStream};
use futures::{FutureExt, StreamExt, select};
use futures_timer::Delay;
use log::{debug, info, warn};
use std::future::Future;
use std::pin::pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::api::backend::{AdapterRegistry, PropertyChange, PropertyValue, SerialPeer};
use crate::api::models::{TetherError, TunnelState};
use crate::core::Notify;
use crate::types::address::PeerAddress;
use crate::types::constants::{CONNECTED_PROPERTY, DUN_ROLE, timeouts};

/// Progress reports sent by a running negotiator.
#[derive(Debug)]
pub(crate) enum TunnelEvent {
    /// The negotiator moved to a new intermediate state.
    Phase(TunnelState),
    /// The tunnel is up on the given interface.
    Opened { interface: String },
    /// The negotiator failed and has released everything it held.
    Failed(TetherError),
}

/// Handle to a running tunnel negotiator.
pub(crate) struct TunnelHandle {
    token: CancellationToken,
    state: watch::Receiver<TunnelState>,
    task: Option<JoinHandle<()>>,
}

impl TunnelHandle {
    /// Starts negotiating a tunnel to `peer`.
    pub(crate) fn start(
        adapters: Arc<dyn AdapterRegistry>,
        peer: PeerAddress,
        connect_timeout: Duration,
        notify: Notify<TunnelEvent>,
    ) -> Self {
        let token = CancellationToken::new();
        let (state_tx, state) = watch::channel(TunnelState::Idle);

        let negotiator = Negotiator {
            adapters,
            peer,
            connect_timeout,
            token: token.clone(),
            state: state_tx,
            notify,
        };
        let task = tokio::spawn(negotiator.run());

        Self {
            token,
            state,
            task: Some(task),
        }
    }

    /// Current state of the negotiator.
    pub(crate) fn state(&self) -> TunnelState {
        *self.state.borrow()
    }

    /// Stops the negotiator and waits until it has let go of the tunnel.
    ///
    /// Calling this on a negotiator that already finished is a no-op.
    pub(crate) async fn cancel(&mut self) {
        self.token.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!("Tunnel negotiator task ended abnormally: {e}");
            }
        }
    }
}

impl Drop for TunnelHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// The task side of a negotiation.
struct Negotiator {
    adapters: Arc<dyn AdapterRegistry>,
    peer: PeerAddress,
    connect_timeout: Duration,
    token: CancellationToken,
    state: watch::Sender<TunnelState>,
    notify: Notify<TunnelEvent>,
}

/// Why a negotiation step did not produce a value.
enum Interrupt {
    Cancelled,
    Failed(TetherError),
}

impl From<TetherError> for Interrupt {
    fn from(e: TetherError) -> Self {
        Self::Failed(e)
    }
}

/// The resources held once the tunnel is up.
struct OpenTunnel {
    remote: Arc<dyn SerialPeer>,
    interface: String,
    changes: Fuse<BoxStream<'static, PropertyChange>>,
}

impl Negotiator {
    async fn run(self) {
        debug!("Starting DUN tunnel negotiation with {}", self.peer);

        let open = match self.open().await {
            Ok(open) => open,
            Err(Interrupt::Cancelled) => {
                debug!("Tunnel negotiation with {} cancelled before open", self.peer);
                self.set_state(TunnelState::Closed);
                return;
            }
            Err(Interrupt::Failed(e)) => {
                self.fail(e);
                return;
            }
        };

        self.set_state(TunnelState::TunnelOpen);
        info!("Serial tunnel to {} open on '{}'", self.peer, open.interface);
        (self.notify)(TunnelEvent::Opened {
            interface: open.interface.clone(),
        });

        self.supervise(open).await;
    }

    /// Runs the three sequential steps up to an open tunnel.
    async fn open(&self) -> Result<OpenTunnel, Interrupt> {
        self.enter(TunnelState::DiscoveringAdapter);
        let adapter = self
            .step(self.adapters.default_adapter())
            .await?
            .map_err(|e| step_error(e, TetherError::AdapterUnavailable))?;

        self.enter(TunnelState::LocatingPeer);
        let remote = self
            .step(adapter.find_peer(&self.peer))
            .await?
            .map_err(|e| step_error(e, TetherError::PeerNotFound))?;

        // Watch the device before connecting so a drop right after the
        // connect reply is not missed.
        let mut changes = self
            .step(remote.property_changes())
            .await?
            .map_err(|e| TetherError::TunnelOpenFailed(format!("cannot watch peer: {e}")))?
            .fuse();

        self.enter(TunnelState::OpeningTunnel);
        let interface = {
            let mut connect = pin!(remote.connect(DUN_ROLE, self.connect_timeout).fuse());
            let mut timeout = pin!(Delay::new(self.connect_timeout).fuse());

            loop {
                select! {
                    _ = self.token.cancelled().fuse() => return Err(Interrupt::Cancelled),
                    _ = timeout => {
                        warn!("Serial connect to {} timed out after {:?}", self.peer, self.connect_timeout);
                        return Err(TetherError::TunnelOpenFailed("timed out".into()).into());
                    }
                    reply = connect => {
                        let interface = reply.map_err(|e| step_error(e, TetherError::TunnelOpenFailed))?;
                        if interface.is_empty() {
                            return Err(TetherError::TunnelOpenFailed("no tunnel interface".into()).into());
                        }
                        break interface;
                    }
                    change = changes.next() => {
                        // Link state only matters once the tunnel is open.
                        if let Some(change) = change {
                            debug!("Ignoring {} change while opening tunnel", change.name);
                        }
                    }
                }
            }
        };

        Ok(OpenTunnel {
            remote,
            interface,
            changes,
        })
    }

    /// Watches an open tunnel until it is cancelled or the phone drops it.
    async fn supervise(&self, open: OpenTunnel) {
        let OpenTunnel {
            remote,
            interface,
            mut changes,
        } = open;

        while !changes.is_terminated() {
            select! {
                _ = self.token.cancelled().fuse() => {
                    release(remote.as_ref(), &interface).await;
                    self.set_state(TunnelState::Closed);
                    debug!("Tunnel to {} closed", self.peer);
                    return;
                }
                change = changes.next() => match change {
                    Some(PropertyChange { name, value }) if name == CONNECTED_PROPERTY => {
                        match value {
                            PropertyValue::Bool(false) => {
                                warn!("{} unexpectedly disconnected", self.peer);
                                break;
                            }
                            PropertyValue::Bool(true) => debug!("{} reports connected", self.peer),
                            other => debug!("Unexpected Connected value: {other:?}"),
                        }
                    }
                    Some(change) => debug!("Ignoring property change: {}", change.name),
                    None => warn!("Property stream for {} ended", self.peer),
                }
            }
        }

        drop(changes);
        release(remote.as_ref(), &interface).await;
        self.fail(TetherError::TunnelLost);
    }

    /// Awaits one request, giving up if the negotiation is cancelled.
    async fn step<T>(&self, request: impl Future<Output = T>) -> Result<T, Interrupt> {
        select! {
            _ = self.token.cancelled().fuse() => Err(Interrupt::Cancelled),
            value = request.fuse() => Ok(value),
        }
    }

    fn enter(&self, state: TunnelState) {
        self.set_state(state);
        (self.notify)(TunnelEvent::Phase(state));
    }

    fn set_state(&self, state: TunnelState) {
        debug!("Tunnel negotiator for {} -> {}", self.peer, state);
        self.state.send_replace(state);
    }

    fn fail(&self, error: TetherError) {
        warn!("Tunnel negotiation with {} failed: {error}", self.peer);
        self.set_state(TunnelState::Failed(error.kind()));
        (self.notify)(TunnelEvent::Failed(error));
    }
}

/// Reports a failed step as `wrap`, unless the error already says so.
fn step_error(e: TetherError, wrap: fn(String) -> TetherError) -> TetherError {
    if e.kind() == wrap(String::new()).kind() {
        e
    } else {
        wrap(e.to_string())
    }
}

/// Best-effort disconnect of an open tunnel. The result is only logged.
async fn release(remote: &dyn SerialPeer, interface: &str) {
    let mut grace = pin!(Delay::new(timeouts::disconnect_timeout()).fuse());
    select! {
        result = remote.disconnect(interface).fuse() => {
            if let Err(e) = result {
                debug!("Disconnect of '{interface}' failed: {e}");
            }
        }
        _ = grace => debug!("Disconnect of '{interface}' did not answer in time"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::backend::Adapter;
    use crate::Result;
    use async_trait::async_trait;
    use futures::channel::mpsc;
    use std::sync::Mutex;

    struct Phone {
        interface: Option<String>,
        changes: Mutex<Option<mpsc::UnboundedReceiver<PropertyChange>>>,
        released: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl SerialPeer for Phone {
        async fn connect(&self, _role: &str, _timeout: Duration) -> Result<String> {
            match &self.interface {
                Some(interface) => Ok(interface.clone()),
                None => futures::future::pending().await,
            }
        }

        async fn disconnect(&self, interface: &str) -> Result<()> {
            self.released.lock().unwrap().push(interface.to_string());
            Ok(())
        }

        async fn property_changes(&self) -> Result<BoxStream<'static, PropertyChange>> {
            let changes = self.changes.lock().unwrap().take().unwrap();
            Ok(changes.boxed())
        }
    }

    struct Registry(Arc<Phone>);

    #[async_trait]
    impl AdapterRegistry for Registry {
        async fn default_adapter(&self) -> Result<Box<dyn Adapter>> {
            Ok(Box::new(Registry(Arc::clone(&self.0))))
        }
    }

    #[async_trait]
    impl Adapter for Registry {
        async fn find_peer(&self, _address: &PeerAddress) -> Result<Arc<dyn SerialPeer>> {
            Ok(self.0.clone())
        }
    }

    fn phone(interface: Option<&str>) -> (Arc<Phone>, mpsc::UnboundedSender<PropertyChange>) {
        let (tx, rx) = mpsc::unbounded();
        let phone = Arc::new(Phone {
            interface: interface.map(String::from),
            changes: Mutex::new(Some(rx)),
            released: Mutex::new(Vec::new()),
        });
        (phone, tx)
    }

    fn start(phone: &Arc<Phone>) -> (TunnelHandle, mpsc::UnboundedReceiver<TunnelEvent>) {
        let (tx, rx) = mpsc::unbounded();
        let handle = TunnelHandle::start(
            Arc::new(Registry(Arc::clone(phone))),
            "00:1A:7D:DA:71:13".parse().unwrap(),
            Duration::from_secs(5),
            Box::new(move |event| {
                let _ = tx.unbounded_send(event);
            }),
        );
        (handle, rx)
    }

    async fn opened(events: &mut mpsc::UnboundedReceiver<TunnelEvent>) -> String {
        while let Some(event) = events.next().await {
            if let TunnelEvent::Opened { interface } = event {
                return interface;
            }
        }
        panic!("negotiator ended without opening the tunnel");
    }

    #[tokio::test]
    async fn reports_phases_in_order() {
        let (phone, _changes) = phone(Some("/dev/rfcomm0"));
        let (mut handle, mut events) = start(&phone);

        let mut phases = Vec::new();
        while let Some(event) = events.next().await {
            match event {
                TunnelEvent::Phase(state) => phases.push(state),
                TunnelEvent::Opened { .. } => break,
                TunnelEvent::Failed(e) => panic!("unexpected failure: {e}"),
            }
        }

        assert_eq!(
            phases,
            vec![
                TunnelState::DiscoveringAdapter,
                TunnelState::LocatingPeer,
                TunnelState::OpeningTunnel
            ]
        );
        assert_eq!(handle.state(), TunnelState::TunnelOpen);
        handle.cancel().await;
    }

    #[tokio::test]
    async fn cancel_releases_open_tunnel_once() {
        let (phone, _changes) = phone(Some("/dev/rfcomm0"));
        let (mut handle, mut events) = start(&phone);
        assert_eq!(opened(&mut events).await, "/dev/rfcomm0");

        handle.cancel().await;
        handle.cancel().await;

        assert_eq!(handle.state(), TunnelState::Closed);
        assert_eq!(*phone.released.lock().unwrap(), vec!["/dev/rfcomm0".to_string()]);
    }

    #[tokio::test]
    async fn cancel_before_open_releases_nothing() {
        let (phone, _changes) = phone(None);
        let (mut handle, _events) = start(&phone);

        handle.cancel().await;

        assert_eq!(handle.state(), TunnelState::Closed);
        assert!(phone.released.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn link_drop_fails_with_tunnel_lost() {
        let (phone, changes) = phone(Some("/dev/rfcomm0"));
        let (mut handle, mut events) = start(&phone);
        opened(&mut events).await;

        changes
            .unbounded_send(PropertyChange::boolean("Name", false))
            .unwrap();
        changes
            .unbounded_send(PropertyChange::boolean(CONNECTED_PROPERTY, false))
            .unwrap();

        let event = events.next().await;
        assert!(matches!(event, Some(TunnelEvent::Failed(TetherError::TunnelLost))));
        assert_eq!(handle.state(), TunnelState::Failed(crate::api::models::ErrorKind::TunnelLost));
        assert_eq!(phone.released.lock().unwrap().len(), 1);

        // Already terminal.
        handle.cancel().await;
        assert_eq!(phone.released.lock().unwrap().len(), 1);
    }

    #[test]
    fn step_errors_are_not_wrapped_twice() {
        let e = step_error(
            TetherError::PeerNotFound("gone".into()),
            TetherError::PeerNotFound,
        );
        assert_eq!(e.to_string(), "peer discovery failed: gone");

        let e = step_error(TetherError::TunnelLost, TetherError::TunnelOpenFailed);
        assert_eq!(e.to_string(), "tunnel open failed: lost connection to the phone");
    }
}
