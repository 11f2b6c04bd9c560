use tokio::sync::{mpsc, oneshot, watch};

use crate::Result;
use crate::api::backend::Backend;
use crate::api::models::{ControlState, TetherError, TimeoutConfig};
use crate::core::session::{Command, SessionController};
use crate::types::address::PeerAddress;
use crate::types::capability::Profile;

/// Handle to the tethering toggle of one peer.
///
/// A control is what a settings panel shows next to a phone: a switch that
/// turns tethering on or off, a busy indicator and a status line. Each
/// control runs its own controller task; all clones of a control talk to the
/// same task, which stops once the last clone is dropped.
///
/// # Example
///
/// ```no_run
/// use nmtether::Tether;
///
/// # async fn example(tether: Tether) -> nmtether::Result<()> {
/// let services = ["DialupNetworking"];
///
/// if let Some(control) = tether.build_control("00:1A:7D:DA:71:13", &services).await? {
///     control.enable().await?;
///     let state = control.wait_for(|s| !s.busy).await?;
///     println!("{}", state.status);
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct TetherControl {
    peer: PeerAddress,
    profile: Profile,
    commands: mpsc::Sender<Command>,
    state: watch::Receiver<ControlState>,
}

impl TetherControl {
    pub(crate) fn spawn(
        peer: PeerAddress,
        profile: Profile,
        backend: Backend,
        config: TimeoutConfig,
        initially_active: bool,
    ) -> Self {
        let (commands, state) =
            SessionController::spawn(peer, profile, backend, config, initially_active);
        Self {
            peer,
            profile,
            commands,
            state,
        }
    }

    /// Turns tethering on.
    ///
    /// For a PAN peer the connection is saved before this returns. For a DUN
    /// peer this only starts the negotiation; follow its progress through
    /// [`state`](Self::state) or [`subscribe`](Self::subscribe).
    ///
    /// Returns [`TetherError::AlreadyActive`] if a negotiation is running.
    pub async fn enable(&self) -> Result<()> {
        let (reply, response) = oneshot::channel();
        self.send(Command::Enable(reply)).await?;
        response.await.map_err(|_| TetherError::ControllerGone)?
    }

    /// Turns tethering off.
    ///
    /// Cancels a running negotiation and deletes the saved connection, if
    /// any. A failed delete is only logged; the control is off either way.
    pub async fn disable(&self) -> Result<()> {
        let (reply, response) = oneshot::channel();
        self.send(Command::Disable(reply)).await?;
        response.await.map_err(|_| TetherError::ControllerGone)
    }

    /// Snapshot of the current control state.
    pub fn state(&self) -> ControlState {
        self.state.borrow().clone()
    }

    /// Receiver that is notified on every state change.
    pub fn subscribe(&self) -> watch::Receiver<ControlState> {
        self.state.clone()
    }

    /// Waits until the published state satisfies `done`, and returns it.
    ///
    /// Resolves immediately if the current state already does.
    pub async fn wait_for(
        &self,
        done: impl FnMut(&ControlState) -> bool,
    ) -> Result<ControlState> {
        let mut state = self.state.clone();
        let matched = state
            .wait_for(done)
            .await
            .map_err(|_| TetherError::ControllerGone)?;
        Ok(matched.clone())
    }

    pub fn profile(&self) -> Profile {
        self.profile
    }

    pub fn peer(&self) -> PeerAddress {
        self.peer
    }

    async fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| TetherError::ControllerGone)
    }
}
