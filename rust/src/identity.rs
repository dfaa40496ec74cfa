use std::sync::Arc;

use souk_storage_traits::Identity;
use tokio::sync::watch;

/// Source of the signed-in identity.
///
/// Core operations never read this implicitly; it only drives the `subscribe_current_*`
/// views, which resubscribe whenever the identity changes.
pub trait IdentityProvider: Send + Sync + 'static {
    fn current_identity(&self) -> Option<Identity>;
    fn subscribe_identity(&self) -> watch::Receiver<Option<Identity>>;
}

pub type SharedIdentityProvider = Arc<dyn IdentityProvider>;

/// An [`IdentityProvider`] whose identity is set directly, e.g. by a login flow.
#[derive(Debug)]
pub struct SwitchableIdentity {
    sender: watch::Sender<Option<Identity>>,
}

impl Default for SwitchableIdentity {
    fn default() -> Self {
        Self::new(None)
    }
}

impl SwitchableIdentity {
    pub fn new(initial: Option<Identity>) -> Self {
        let (sender, _) = watch::channel(initial);
        Self { sender }
    }

    pub fn sign_in(&self, identity: Identity) {
        tracing::info!(identity = %identity, "identity signed in");
        self.sender.send_replace(Some(identity));
    }

    pub fn sign_out(&self) {
        if self.sender.send_replace(None).is_some() {
            tracing::info!("identity signed out");
        }
    }
}

impl IdentityProvider for SwitchableIdentity {
    fn current_identity(&self) -> Option<Identity> {
        self.sender.borrow().clone()
    }

    fn subscribe_identity(&self) -> watch::Receiver<Option<Identity>> {
        self.sender.subscribe()
    }
}
