use std::fmt;
use std::sync::{Arc, OnceLock};

use crate::registry::FactoryId;
use crate::traits::UnitOfWork;

/// Immutable link between an interceptor and the unit of work it loads
/// through.
///
/// Markers are shared: every entity a session loads points at the same
/// `Arc<SessionAssociation>`. A marker is never changed in place. Attaching
/// or detaching produces another marker and the interceptor swaps its `Arc`,
/// so other interceptors keep reading the old one undisturbed.
///
/// The session does not hold its marker, which keeps the two free of
/// reference cycles. Whether the linked session is still usable is asked of
/// the session itself at load time.
pub struct SessionAssociation {
    session: Option<Arc<dyn UnitOfWork>>,
    allow_load_outside_transaction: bool,
    factory_id: Option<FactoryId>,
    detached: OnceLock<Arc<SessionAssociation>>,
}

impl SessionAssociation {
    /// The shared marker of interceptors that were never attached and may
    /// not load outside a session.
    pub fn unassociated() -> Arc<SessionAssociation> {
        static UNASSOCIATED: OnceLock<Arc<SessionAssociation>> = OnceLock::new();
        Arc::clone(UNASSOCIATED.get_or_init(|| {
            Arc::new(SessionAssociation {
                session: None,
                allow_load_outside_transaction: false,
                factory_id: None,
                detached: OnceLock::new(),
            })
        }))
    }

    /// A marker for entities loaded by `session`.
    ///
    /// The out-of-transaction setting is captured now so it survives
    /// detachment, along with the factory id when that setting is on.
    pub fn attach(session: Arc<dyn UnitOfWork>) -> Arc<SessionAssociation> {
        let allow_load_outside_transaction =
            session.factory_options().allow_load_outside_transaction;
        let factory_id = if allow_load_outside_transaction {
            session.factory_id()
        } else {
            None
        };
        Arc::new(SessionAssociation {
            session: Some(session),
            allow_load_outside_transaction,
            factory_id,
            detached: OnceLock::new(),
        })
    }

    /// The marker interceptors switch to when their session lets go of them.
    ///
    /// Keeps the out-of-transaction setting and factory id but drops the
    /// session. When loading outside a session is not allowed there is
    /// nothing worth keeping and the shared unassociated marker is returned.
    /// Repeated calls on one marker return the same detached marker.
    pub fn detached(self: &Arc<Self>) -> Arc<SessionAssociation> {
        if self.session.is_none() {
            return Arc::clone(self);
        }
        if !self.allow_load_outside_transaction {
            return Self::unassociated();
        }
        Arc::clone(self.detached.get_or_init(|| {
            Arc::new(SessionAssociation {
                session: None,
                allow_load_outside_transaction: true,
                factory_id: self.factory_id,
                detached: OnceLock::new(),
            })
        }))
    }

    /// The linked session, open or not.
    pub fn session(&self) -> Option<&Arc<dyn UnitOfWork>> {
        self.session.as_ref()
    }

    pub fn is_associated(&self) -> bool {
        self.session.is_some()
    }

    pub fn is_associated_with(&self, session: &dyn UnitOfWork) -> bool {
        self.session.as_ref().is_some_and(|s| s.id() == session.id())
    }

    pub fn allow_load_outside_transaction(&self) -> bool {
        self.allow_load_outside_transaction
    }

    pub fn factory_id(&self) -> Option<FactoryId> {
        self.factory_id
    }
}

impl fmt::Debug for SessionAssociation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionAssociation")
            .field("session", &self.session.as_ref().map(|s| s.id()))
            .field(
                "allow_load_outside_transaction",
                &self.allow_load_outside_transaction,
            )
            .field("factory_id", &self.factory_id)
            .finish()
    }
}
