//! Correlation of a serial tunnel with the modem ModemManager creates for it.
//!
//! Once the tunnel is open, ModemManager probes the new serial port and
//! exports a modem for it. The correlator watches modems being added and
//! removed, fetches the properties of each new one, and reports the first
//! modem whose `Device` matches the tunnel interface.
//!
//! Property fetches run concurrently. Every fetch carries a ticket; removing a
//! modem (or stopping the correlator) invalidates its ticket, so a reply that
//! arrives afterwards is dropped instead of acted upon.

use futures::future::BoxFuture;
use futures::stream::FuturesUnordered;
use futures::{FutureExt, StreamExt, select};
use log::{debug, info, warn};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::Result;
use crate::api::backend::{ModemEvent, ModemProperties, ModemRegistry};
use crate::api::models::{TechnologyFamily, TetherError};
use crate::core::Notify;

/// Outcome reported by the correlator. At most one is ever sent.
#[derive(Debug)]
pub(crate) enum CorrelatorEvent {
    Matched {
        path: String,
        family: TechnologyFamily,
    },
    Failed(TetherError),
}

/// A modem seen while correlating.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ModemCandidate {
    pub(crate) path: String,
    pub(crate) device: Option<String>,
    pub(crate) family: Option<TechnologyFamily>,
}

impl ModemCandidate {
    fn new(path: String) -> Self {
        Self {
            path,
            device: None,
            family: None,
        }
    }
}

/// Identifies one property fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Ticket(u64);

/// Matching state, independent of how requests are carried out.
#[derive(Debug)]
pub(crate) struct Correlator {
    interface: String,
    candidates: HashMap<String, ModemCandidate>,
    pending: HashMap<String, Ticket>,
    next_ticket: u64,
}

impl Correlator {
    pub(crate) fn new(tunnel_interface: &str) -> Self {
        Self {
            interface: basename(tunnel_interface).to_string(),
            candidates: HashMap::new(),
            pending: HashMap::new(),
            next_ticket: 0,
        }
    }

    /// Starts tracking a modem. Returns the ticket for its property fetch,
    /// or `None` if the modem is already being tracked.
    pub(crate) fn track(&mut self, path: &str) -> Option<Ticket> {
        if self.candidates.contains_key(path) {
            debug!("({path}) modem already tracked");
            return None;
        }

        let ticket = Ticket(self.next_ticket);
        self.next_ticket += 1;
        self.candidates
            .insert(path.to_string(), ModemCandidate::new(path.to_string()));
        self.pending.insert(path.to_string(), ticket);
        Some(ticket)
    }

    /// Stops tracking a modem. An outstanding fetch for it becomes stale.
    pub(crate) fn forget(&mut self, path: &str) {
        self.pending.remove(path);
        if self.candidates.remove(path).is_some() {
            debug!("({path}) modem removed");
        }
    }

    /// Invalidates every outstanding fetch and drops all candidates.
    pub(crate) fn clear(&mut self) {
        self.pending.clear();
        self.candidates.clear();
    }

    #[cfg(test)]
    pub(crate) fn candidate(&self, path: &str) -> Option<&ModemCandidate> {
        self.candidates.get(path)
    }

    pub(crate) fn outstanding(&self) -> usize {
        self.pending.len()
    }

    /// Handles a property fetch reply.
    ///
    /// Returns the verdict once the tunnel's modem has been found.
    pub(crate) fn on_reply(
        &mut self,
        path: &str,
        ticket: Ticket,
        reply: Result<ModemProperties>,
    ) -> Option<CorrelatorEvent> {
        if self.pending.get(path) != Some(&ticket) {
            debug!("({path}) discarding stale modem properties reply");
            return None;
        }
        self.pending.remove(path);

        let props = match reply {
            Ok(props) => props,
            Err(e) => {
                warn!("({path}) error getting modem properties: {e}");
                self.candidates.remove(path);
                return None;
            }
        };

        let candidate = self.candidates.get_mut(path)?;
        candidate.device = props.device.clone();
        candidate.family = props.modem_type.and_then(TechnologyFamily::from_modem_type);

        let Some(device) = props.device.as_deref() else {
            debug!("({path}) modem had no 'Device' property");
            return None;
        };

        if basename(device) != self.interface {
            debug!(
                "({path}) ({device}) not the modem we're looking for ({})",
                self.interface
            );
            return None;
        }

        let verdict = match candidate.family {
            Some(family) => {
                info!("({path}) found {family} modem for '{}'", self.interface);
                CorrelatorEvent::Matched {
                    path: path.to_string(),
                    family,
                }
            }
            None => {
                warn!("({path}) unknown modem type {:?}", props.modem_type);
                CorrelatorEvent::Failed(TetherError::ModemTypeUnknown)
            }
        };
        Some(verdict)
    }
}

/// Last path segment, so `/dev/rfcomm0` and `rfcomm0` compare equal.
fn basename(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Handle to a running correlator.
pub(crate) struct CorrelatorHandle {
    token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl CorrelatorHandle {
    /// Starts watching for the modem backing `tunnel_interface`.
    pub(crate) fn watch(
        modems: Arc<dyn ModemRegistry>,
        tunnel_interface: &str,
        notify: Notify<CorrelatorEvent>,
    ) -> Self {
        let token = CancellationToken::new();
        let task = tokio::spawn(run(
            modems,
            Correlator::new(tunnel_interface),
            token.clone(),
            notify,
        ));

        Self {
            token,
            task: Some(task),
        }
    }

    /// Stops watching. Replies still in flight are discarded.
    ///
    /// Calling this more than once is a no-op.
    pub(crate) async fn stop(&mut self) {
        self.token.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!("Modem correlator task ended abnormally: {e}");
            }
        }
    }
}

impl Drop for CorrelatorHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

type Fetch = BoxFuture<'static, (String, Ticket, Result<ModemProperties>)>;

fn fetch(modems: &Arc<dyn ModemRegistry>, path: String, ticket: Ticket) -> Fetch {
    let modems = Arc::clone(modems);
    async move {
        debug!("({path}) fetching modem properties");
        let reply = modems.properties(&path).await;
        (path, ticket, reply)
    }
    .boxed()
}

async fn run(
    modems: Arc<dyn ModemRegistry>,
    mut correlator: Correlator,
    token: CancellationToken,
    notify: Notify<CorrelatorEvent>,
) {
    let events = select! {
        _ = token.cancelled().fuse() => return,
        events = modems.device_events().fuse() => events,
    };
    let mut events = match events {
        Ok(events) => events.fuse(),
        Err(e) => {
            warn!("Cannot watch ModemManager devices: {e}");
            notify(CorrelatorEvent::Failed(e));
            return;
        }
    };

    let mut fetches: FuturesUnordered<Fetch> = FuturesUnordered::new();

    // Modems that appeared before the subscription would otherwise be missed.
    let present = select! {
        _ = token.cancelled().fuse() => return,
        present = modems.enumerate().fuse() => present,
    };
    match present {
        Ok(paths) => {
            for path in paths {
                if let Some(ticket) = correlator.track(&path) {
                    fetches.push(fetch(&modems, path, ticket));
                }
            }
        }
        Err(e) => warn!("Failed to enumerate modems: {e}"),
    }

    loop {
        select! {
            _ = token.cancelled().fuse() => break,
            event = events.next() => match event {
                Some(ModemEvent::Added(path)) => {
                    debug!("({path}) modem found");
                    if let Some(ticket) = correlator.track(&path) {
                        fetches.push(fetch(&modems, path, ticket));
                    }
                }
                Some(ModemEvent::Removed(path)) => correlator.forget(&path),
                None => warn!("ModemManager device stream ended"),
            },
            (path, ticket, reply) = fetches.select_next_some() => {
                if let Some(verdict) = correlator.on_reply(&path, ticket, reply) {
                    notify(verdict);
                    break;
                }
            }
        }
    }

    debug!(
        "Modem correlator done, abandoning {} outstanding fetches",
        correlator.outstanding()
    );
    correlator.clear();
}
