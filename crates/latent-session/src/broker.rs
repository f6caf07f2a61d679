use std::sync::Arc;

use tracing::{debug, warn};

use crate::association::SessionAssociation;
use crate::config::SessionOptions;
use crate::error::{LazyInitCause, SessionError};
use crate::registry::FactoryRegistry;
use crate::traits::UnitOfWork;

/// Run `work` against a usable unit of work, resolving factories through
/// the process-wide [`FactoryRegistry`].
///
/// `work` receives the unit of work and whether it is a temporary one. A
/// temporary session is torn down before this returns; failures during
/// that teardown are logged and dropped.
pub fn perform_work<T, E, F>(
    association: &SessionAssociation,
    entity_name: &str,
    attribute: &str,
    work: F,
) -> Result<T, E>
where
    F: FnOnce(&dyn UnitOfWork, bool) -> Result<T, E>,
    E: From<SessionError>,
{
    perform_work_with(
        FactoryRegistry::global(),
        association,
        entity_name,
        attribute,
        work,
    )
}

/// [`perform_work`] with an explicit registry.
pub fn perform_work_with<T, E, F>(
    registry: &FactoryRegistry,
    association: &SessionAssociation,
    entity_name: &str,
    attribute: &str,
    work: F,
) -> Result<T, E>
where
    F: FnOnce(&dyn UnitOfWork, bool) -> Result<T, E>,
    E: From<SessionError>,
{
    let cause = match association.session() {
        Some(session) if session.is_open() && session.is_connected() => {
            debug!(
                entity = entity_name,
                attribute,
                session = %session.id(),
                "lazy load through attached session"
            );
            return work(session.as_ref(), false);
        }
        Some(session) if !session.is_open() => LazyInitCause::ClosedSession,
        Some(_) => LazyInitCause::DisconnectedSession,
        None => LazyInitCause::NoSession,
    };

    let fail = |cause| SessionError::lazy_initialization(cause, entity_name, attribute);

    if !association.allow_load_outside_transaction() {
        return Err(fail(cause).into());
    }
    let factory_id = association
        .factory_id()
        .ok_or_else(|| fail(LazyInitCause::NoFactoryId))?;
    let factory = registry
        .resolve(factory_id)?
        .ok_or_else(|| fail(LazyInitCause::FactoryNotRegistered))?;

    let session = factory.open_session(SessionOptions::temporary())?;
    debug!(
        entity = entity_name,
        attribute,
        factory = %factory_id,
        session = %session.id(),
        "opened temporary session for lazy load"
    );

    let mut guard = TemporarySession::new(session);
    if !factory.options().transaction_model.is_externally_managed() {
        guard.session.begin_transaction()?;
        guard.transaction_begun = true;
    }

    let result = work(guard.session.as_ref(), true);
    guard.succeeded = result.is_ok();
    result
}

/// Owns a temporary session and tears it down when dropped.
///
/// Running teardown from `Drop` covers early returns and unwinding alike.
struct TemporarySession {
    session: Arc<dyn UnitOfWork>,
    transaction_begun: bool,
    succeeded: bool,
}

impl TemporarySession {
    fn new(session: Arc<dyn UnitOfWork>) -> Self {
        Self {
            session,
            transaction_begun: false,
            succeeded: false,
        }
    }
}

impl Drop for TemporarySession {
    fn drop(&mut self) {
        let id = self.session.id();
        if self.transaction_begun && self.session.is_transaction_active() {
            let (step, outcome) = if self.succeeded {
                ("commit", self.session.commit())
            } else {
                ("rollback", self.session.rollback())
            };
            if let Err(e) = outcome {
                warn!(session = %id, error = %e, "unable to {} temporary session", step);
            }
        }
        match self.session.close() {
            Ok(()) => debug!(session = %id, "closed temporary session"),
            Err(e) => warn!(session = %id, error = %e, "unable to close temporary session"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{SessionFactoryOptions, TransactionModel};
    use crate::memory::{FaultInjection, InMemorySessionFactory};
    use crate::traits::SessionFactory;
    use crate::SessionResult;
    use latent_meta::{LazyLoadingConfig, Metamodel};
    use std::panic::{catch_unwind, AssertUnwindSafe};

    fn factory(options: SessionFactoryOptions) -> InMemorySessionFactory {
        let model = Metamodel::builder(LazyLoadingConfig::default()).build().unwrap();
        InMemorySessionFactory::new(Arc::new(model), options)
    }

    fn outside_transaction() -> SessionFactoryOptions {
        SessionFactoryOptions {
            allow_load_outside_transaction: true,
            ..Default::default()
        }
    }

    /// A registered factory and a marker that was detached from one of its
    /// sessions.
    fn detached(options: SessionFactoryOptions) -> (FactoryRegistry, InMemorySessionFactory, Arc<SessionAssociation>) {
        let registry = FactoryRegistry::new();
        let factory = factory(options);
        factory.register(&registry).unwrap();
        let session = factory.open_session(SessionOptions::default()).unwrap();
        let marker = SessionAssociation::attach(Arc::clone(&session)).detached();
        session.close().unwrap();
        (registry, factory, marker)
    }

    fn cause(err: SessionError) -> LazyInitCause {
        match err {
            SessionError::LazyInitialization { cause, .. } => cause,
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn uses_attached_session_when_usable() {
        let registry = FactoryRegistry::new();
        let factory = factory(SessionFactoryOptions::default());
        let session = factory.open_session(SessionOptions::default()).unwrap();
        let marker = SessionAssociation::attach(Arc::clone(&session));

        let (id, temporary) = perform_work_with(&registry, &marker, "Order", "total", |uow, temporary| {
            SessionResult::Ok((uow.id(), temporary))
        })
        .unwrap();

        assert_eq!(id, session.id());
        assert!(!temporary);
        assert_eq!(factory.statistics().sessions_opened, 1);
    }

    #[test]
    fn no_session_without_outside_loading() {
        let registry = FactoryRegistry::new();
        let err = perform_work_with(
            &registry,
            &SessionAssociation::unassociated(),
            "Order",
            "total",
            |_, _| SessionResult::Ok(()),
        )
        .unwrap_err();
        assert_eq!(cause(err), LazyInitCause::NoSession);
    }

    #[test]
    fn closed_session_without_outside_loading() {
        let registry = FactoryRegistry::new();
        let factory = factory(SessionFactoryOptions::default());
        let session = factory.open_session(SessionOptions::default()).unwrap();
        let marker = SessionAssociation::attach(Arc::clone(&session));
        session.close().unwrap();

        let err = perform_work_with(&registry, &marker, "Order", "total", |_, _| SessionResult::Ok(()))
            .unwrap_err();
        assert_eq!(cause(err), LazyInitCause::ClosedSession);
    }

    #[test]
    fn disconnected_session_without_outside_loading() {
        let registry = FactoryRegistry::new();
        let factory = factory(SessionFactoryOptions::default());
        let session = factory.open(SessionOptions::default()).unwrap();
        let marker = SessionAssociation::attach(session.clone());
        session.disconnect().unwrap();

        let mut ran = false;
        let err = perform_work_with(&registry, &marker, "Order", "total", |_, _| {
            ran = true;
            SessionResult::Ok(())
        })
        .unwrap_err();
        assert_eq!(cause(err), LazyInitCause::DisconnectedSession);
        assert!(!ran);
    }

    #[test]
    fn unregistered_factory_is_reported() {
        let (_, factory, marker) = detached(outside_transaction());
        let empty = FactoryRegistry::new();
        let err = perform_work_with(&empty, &marker, "Order", "total", |_, _| SessionResult::Ok(()))
            .unwrap_err();
        assert_eq!(cause(err), LazyInitCause::FactoryNotRegistered);
        assert_eq!(factory.statistics().open_sessions(), 0);
    }

    #[test]
    fn temporary_session_is_read_only_and_closed_after_success() {
        let (registry, factory, marker) = detached(outside_transaction());

        let mut seen = None;
        let value = perform_work_with(&registry, &marker, "Order", "total", |uow, temporary| {
            assert!(temporary);
            assert!(uow.is_transaction_active());
            seen = Some(uow.options());
            SessionResult::Ok(7)
        })
        .unwrap();

        assert_eq!(value, 7);
        assert_eq!(seen, Some(SessionOptions::temporary()));
        let counts = factory.statistics();
        assert_eq!(counts.open_sessions(), 0);
        assert_eq!(counts.commits, 1);
        assert_eq!(counts.rollbacks, 0);
    }

    #[test]
    fn temporary_session_is_rolled_back_and_closed_after_failure() {
        let (registry, factory, marker) = detached(outside_transaction());

        let err = perform_work_with(&registry, &marker, "Order", "total", |_, _| {
            SessionResult::<()>::Err(SessionError::Storage("boom".into()))
        })
        .unwrap_err();

        assert_eq!(err, SessionError::Storage("boom".into()));
        let counts = factory.statistics();
        assert_eq!(counts.open_sessions(), 0);
        assert_eq!(counts.commits, 0);
        assert_eq!(counts.rollbacks, 1);
    }

    #[test]
    fn temporary_session_is_closed_when_work_panics() {
        let (registry, factory, marker) = detached(outside_transaction());

        let outcome = catch_unwind(AssertUnwindSafe(|| {
            perform_work_with(&registry, &marker, "Order", "total", |_, _| -> SessionResult<()> {
                panic!("work exploded")
            })
        }));

        assert!(outcome.is_err());
        assert_eq!(factory.statistics().open_sessions(), 0);
    }

    #[test]
    fn teardown_failures_do_not_mask_the_result() {
        let (registry, factory, marker) = detached(outside_transaction());
        factory.inject_faults(FaultInjection {
            fail_commit: true,
            fail_close: true,
            ..Default::default()
        });

        let value = perform_work_with(&registry, &marker, "Order", "total", |_, _| SessionResult::Ok("loaded"))
            .unwrap();

        assert_eq!(value, "loaded");
        assert_eq!(factory.statistics().open_sessions(), 0);
    }

    #[test]
    fn failed_begin_still_closes() {
        let (registry, factory, marker) = detached(outside_transaction());
        factory.inject_faults(FaultInjection {
            fail_begin: true,
            ..Default::default()
        });

        let err = perform_work_with(&registry, &marker, "Order", "total", |_, _| SessionResult::Ok(()))
            .unwrap_err();

        assert!(matches!(err, SessionError::Storage(_)));
        assert_eq!(factory.statistics().open_sessions(), 0);
    }

    #[test]
    fn externally_managed_transactions_are_left_alone() {
        let (registry, factory, marker) = detached(SessionFactoryOptions {
            allow_load_outside_transaction: true,
            transaction_model: TransactionModel::ExternallyManaged,
        });

        perform_work_with(&registry, &marker, "Order", "total", |uow, temporary| {
            assert!(temporary);
            assert!(!uow.is_transaction_active());
            SessionResult::Ok(())
        })
        .unwrap();

        let counts = factory.statistics();
        assert_eq!(counts.transactions_begun, 0);
        assert_eq!(counts.open_sessions(), 0);
    }

    #[test]
    fn missing_factory_id_is_reported() {
        // A marker that allows outside loading but never learned its factory.
        struct Anonymous(Arc<dyn UnitOfWork>);

        let factory = factory(outside_transaction());
        let inner = factory.open_session(SessionOptions::default()).unwrap();
        let session: Arc<dyn UnitOfWork> = Arc::new(Anonymous(inner));
        let marker = SessionAssociation::attach(Arc::clone(&session)).detached();
        session.close().unwrap();

        let err = perform_work_with(&FactoryRegistry::new(), &marker, "Order", "total", |_, _| {
            SessionResult::Ok(())
        })
        .unwrap_err();
        assert_eq!(cause(err), LazyInitCause::NoFactoryId);

        impl UnitOfWork for Anonymous {
            fn id(&self) -> crate::SessionId {
                self.0.id()
            }
            fn factory_id(&self) -> Option<crate::FactoryId> {
                None
            }
            fn factory_options(&self) -> SessionFactoryOptions {
                self.0.factory_options()
            }
            fn options(&self) -> SessionOptions {
                self.0.options()
            }
            fn is_open(&self) -> bool {
                self.0.is_open()
            }
            fn is_connected(&self) -> bool {
                self.0.is_connected()
            }
            fn is_transaction_active(&self) -> bool {
                self.0.is_transaction_active()
            }
            fn begin_transaction(&self) -> SessionResult<()> {
                self.0.begin_transaction()
            }
            fn commit(&self) -> SessionResult<()> {
                self.0.commit()
            }
            fn rollback(&self) -> SessionResult<()> {
                self.0.rollback()
            }
            fn close(&self) -> SessionResult<()> {
                self.0.close()
            }
            fn persister(&self, entity_name: &str) -> SessionResult<Arc<dyn crate::EntityPersister>> {
                self.0.persister(entity_name)
            }
            fn register_read_only(&self, key: &latent_types::EntityKey) -> SessionResult<()> {
                self.0.register_read_only(key)
            }
        }
    }
}
