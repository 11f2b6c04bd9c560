//! In-memory collaborators for driving a control without a system bus.

#![allow(dead_code)]

use async_trait::async_trait;
use futures::channel::{mpsc, oneshot};
use futures::future;
use futures::stream::{BoxStream, StreamExt};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use nmtether::backend::{
    Adapter, AdapterRegistry, Backend, ConnectionStore, ModemEvent, ModemProperties,
    ModemRegistry, PropertyChange, SerialPeer, Wizard,
};
use nmtether::builders::{ConnectionSettings, describe_connection};
use nmtether::{
    ControlState, PeerAddress, Result, StoredConnection, TechnologyFamily, TetherControl,
    TetherError, WizardOutcome,
};

pub const PEER: &str = "00:1A:7D:DA:71:13";
pub const OTHER_PEER: &str = "C8:1F:E8:F0:51:57";
pub const TTY: &str = "/dev/rfcomm0";

pub fn peer() -> PeerAddress {
    PEER.parse().unwrap()
}

/// How the fake phone answers `Serial.Connect`.
#[derive(Debug, Clone)]
pub enum ConnectBehavior {
    Reply(String),
    Fail,
    Hang,
}

pub struct FakePeer {
    connect: ConnectBehavior,
    changes: Mutex<Option<mpsc::UnboundedReceiver<PropertyChange>>>,
    pub disconnects: Mutex<Vec<String>>,
}

#[async_trait]
impl SerialPeer for FakePeer {
    async fn connect(&self, _role: &str, _timeout: Duration) -> Result<String> {
        match &self.connect {
            ConnectBehavior::Reply(interface) => Ok(interface.clone()),
            ConnectBehavior::Fail => Err(TetherError::TunnelOpenFailed("refused".into())),
            ConnectBehavior::Hang => future::pending().await,
        }
    }

    async fn disconnect(&self, interface: &str) -> Result<()> {
        self.disconnects.lock().unwrap().push(interface.to_string());
        Ok(())
    }

    async fn property_changes(&self) -> Result<BoxStream<'static, PropertyChange>> {
        match self.changes.lock().unwrap().take() {
            Some(changes) => Ok(changes.boxed()),
            None => Ok(futures::stream::pending().boxed()),
        }
    }
}

pub struct FakeAdapters {
    pub attempts: AtomicUsize,
    pub adapter_missing: bool,
    pub peer_missing: bool,
    peer: Arc<FakePeer>,
}

struct FakeAdapter {
    peer_missing: bool,
    peer: Arc<FakePeer>,
}

#[async_trait]
impl AdapterRegistry for FakeAdapters {
    async fn default_adapter(&self) -> Result<Box<dyn Adapter>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.adapter_missing {
            return Err(TetherError::AdapterUnavailable("no adapter".into()));
        }
        Ok(Box::new(FakeAdapter {
            peer_missing: self.peer_missing,
            peer: Arc::clone(&self.peer),
        }))
    }
}

#[async_trait]
impl Adapter for FakeAdapter {
    async fn find_peer(&self, address: &PeerAddress) -> Result<Arc<dyn SerialPeer>> {
        if self.peer_missing {
            return Err(TetherError::PeerNotFound(address.to_string()));
        }
        Ok(self.peer.clone())
    }
}

#[derive(Default)]
pub struct FakeModems {
    events: Mutex<Option<mpsc::UnboundedReceiver<ModemEvent>>>,
    present: Mutex<Vec<String>>,
    properties: Mutex<HashMap<String, ModemProperties>>,
    gate: Mutex<Option<oneshot::Receiver<()>>>,
    pub fetches: Mutex<Vec<String>>,
}

impl FakeModems {
    /// Registers the properties reported for `path`.
    pub fn define(&self, path: &str, device: &str, modem_type: u32) {
        self.properties.lock().unwrap().insert(
            path.to_string(),
            ModemProperties {
                device: Some(device.to_string()),
                modem_type: Some(modem_type),
            },
        );
    }

    /// Marks `path` as present before the correlator starts.
    pub fn plug(&self, path: &str) {
        self.present.lock().unwrap().push(path.to_string());
    }

    /// Holds the next property fetch until the returned sender fires.
    pub fn hold_next_fetch(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        *self.gate.lock().unwrap() = Some(rx);
        tx
    }
}

#[async_trait]
impl ModemRegistry for FakeModems {
    async fn device_events(&self) -> Result<BoxStream<'static, ModemEvent>> {
        match self.events.lock().unwrap().take() {
            Some(events) => Ok(events.boxed()),
            None => Ok(futures::stream::pending().boxed()),
        }
    }

    async fn enumerate(&self) -> Result<Vec<String>> {
        Ok(self.present.lock().unwrap().clone())
    }

    async fn properties(&self, path: &str) -> Result<ModemProperties> {
        self.fetches.lock().unwrap().push(path.to_string());
        let gate = self.gate.lock().unwrap().take();
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        self.properties
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| TetherError::StoreFailure(format!("no such modem {path}")))
    }
}

#[derive(Default)]
pub struct MemoryStore {
    pub records: Mutex<Vec<StoredConnection>>,
    pub saved: Mutex<Vec<ConnectionSettings>>,
    pub deleted: Mutex<Vec<String>>,
    pub fail_add: AtomicBool,
    pub fail_delete: AtomicBool,
    next: Mutex<u32>,
}

impl MemoryStore {
    pub fn record_count(&self) -> usize {
        self.records.lock().unwrap().len()
    }
}

#[async_trait]
impl ConnectionStore for MemoryStore {
    async fn add(&self, settings: ConnectionSettings) -> Result<StoredConnection> {
        if self.fail_add.load(Ordering::SeqCst) {
            return Err(TetherError::StoreFailure("disk full".into()));
        }
        let mut next = self.next.lock().unwrap();
        *next += 1;
        let stored = describe_connection(
            format!("/org/freedesktop/NetworkManager/Settings/{next}"),
            &settings,
        );
        self.records.lock().unwrap().push(stored.clone());
        self.saved.lock().unwrap().push(settings);
        Ok(stored)
    }

    async fn list(&self) -> Result<Vec<StoredConnection>> {
        Ok(self.records.lock().unwrap().clone())
    }

    async fn delete(&self, stored: &StoredConnection) -> Result<()> {
        self.deleted.lock().unwrap().push(stored.path.clone());
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(TetherError::StoreFailure("permission denied".into()));
        }
        self.records.lock().unwrap().retain(|r| r.path != stored.path);
        Ok(())
    }
}

/// A wizard that answers with a fixed outcome, answers when told to, or
/// never answers.
pub struct FakeWizard {
    answer: Option<WizardOutcome>,
    later: Mutex<Option<oneshot::Receiver<WizardOutcome>>>,
    pub presented: Mutex<Vec<TechnologyFamily>>,
}

impl FakeWizard {
    pub fn answering(answer: WizardOutcome) -> Self {
        Self {
            answer: Some(answer),
            later: Mutex::new(None),
            presented: Mutex::new(Vec::new()),
        }
    }

    pub fn silent() -> Self {
        Self {
            answer: None,
            later: Mutex::new(None),
            presented: Mutex::new(Vec::new()),
        }
    }

    /// A wizard whose answer is sent through the returned channel.
    pub fn deferred() -> (Self, oneshot::Sender<WizardOutcome>) {
        let (tx, rx) = oneshot::channel();
        let wizard = Self {
            answer: None,
            later: Mutex::new(Some(rx)),
            presented: Mutex::new(Vec::new()),
        };
        (wizard, tx)
    }

    pub fn presented(&self) -> Vec<TechnologyFamily> {
        self.presented.lock().unwrap().clone()
    }
}

#[async_trait]
impl Wizard for FakeWizard {
    async fn present(&self, family: TechnologyFamily) -> WizardOutcome {
        self.presented.lock().unwrap().push(family);
        if let Some(answer) = &self.answer {
            return answer.clone();
        }
        let later = self.later.lock().unwrap().take();
        match later {
            Some(answer) => match answer.await {
                Ok(outcome) => outcome,
                Err(_) => future::pending().await,
            },
            None => future::pending().await,
        }
    }
}

/// A complete fake system plus the handles a test drives it with.
pub struct Harness {
    pub backend: Backend,
    pub adapters: Arc<FakeAdapters>,
    pub peer: Arc<FakePeer>,
    pub modems: Arc<FakeModems>,
    pub store: Arc<MemoryStore>,
    pub wizard: Arc<FakeWizard>,
    pub changes: mpsc::UnboundedSender<PropertyChange>,
    pub modem_events: mpsc::UnboundedSender<ModemEvent>,
}

impl Harness {
    pub fn new(connect: ConnectBehavior, wizard: FakeWizard) -> Self {
        Self::build(connect, wizard, false, false)
    }

    pub fn build(
        connect: ConnectBehavior,
        wizard: FakeWizard,
        adapter_missing: bool,
        peer_missing: bool,
    ) -> Self {
        let (changes, changes_rx) = mpsc::unbounded();
        let (modem_events, events_rx) = mpsc::unbounded();

        let peer = Arc::new(FakePeer {
            connect,
            changes: Mutex::new(Some(changes_rx)),
            disconnects: Mutex::new(Vec::new()),
        });
        let adapters = Arc::new(FakeAdapters {
            attempts: AtomicUsize::new(0),
            adapter_missing,
            peer_missing,
            peer: Arc::clone(&peer),
        });
        let modems = Arc::new(FakeModems {
            events: Mutex::new(Some(events_rx)),
            ..Default::default()
        });
        let store = Arc::new(MemoryStore::default());
        let wizard = Arc::new(wizard);

        let backend = Backend {
            adapters: adapters.clone(),
            modems: modems.clone(),
            store: store.clone(),
            wizard: wizard.clone(),
        };

        Self {
            backend,
            adapters,
            peer,
            modems,
            store,
            wizard,
            changes,
            modem_events,
        }
    }

    pub fn disconnects(&self) -> Vec<String> {
        self.peer.disconnects.lock().unwrap().clone()
    }

    pub fn add_modem(&self, path: &str) {
        let _ = self
            .modem_events
            .unbounded_send(ModemEvent::Added(path.to_string()));
    }

    pub fn remove_modem(&self, path: &str) {
        let _ = self
            .modem_events
            .unbounded_send(ModemEvent::Removed(path.to_string()));
    }

    pub fn drop_link(&self) {
        let _ = self
            .changes
            .unbounded_send(PropertyChange::boolean("Connected", false));
    }
}

/// Waits (bounded) until the control's state satisfies `done`.
pub async fn settle(
    control: &TetherControl,
    done: impl FnMut(&ControlState) -> bool,
) -> ControlState {
    tokio::time::timeout(Duration::from_secs(5), control.wait_for(done))
        .await
        .expect("control did not reach the expected state")
        .expect("controller gone")
}

/// Lets spawned tasks run for a moment.
pub async fn idle() {
    tokio::time::sleep(Duration::from_millis(100)).await;
}
