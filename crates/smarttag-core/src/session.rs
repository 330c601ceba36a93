// ── Session ownership and renewal ──
//
// The coordinator owns exactly one portal session. Readers grab the
// current one lock-free through `ArcSwapOption`; renewal is serialized
// by a mutex and keyed on a generation number, so a burst of fetches
// that all saw the same stale session triggers a single renewal.

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use smarttag_api::{Credentials, Session};
use tokio::sync::Mutex;
use tracing::debug;

use crate::portal::{Portal, PortalError};

/// A session tagged with the generation it was installed at.
#[derive(Debug)]
pub(crate) struct SessionSlot {
    pub(crate) generation: u64,
    pub(crate) session: Session,
}

pub(crate) struct SessionCell {
    current: ArcSwapOption<SessionSlot>,
    renew_lock: Mutex<u64>,
}

impl SessionCell {
    pub(crate) fn new() -> Self {
        Self {
            current: ArcSwapOption::empty(),
            renew_lock: Mutex::new(0),
        }
    }

    pub(crate) fn current(&self) -> Option<Arc<SessionSlot>> {
        self.current.load_full()
    }

    /// Return the live session, logging in first if there is none.
    pub(crate) async fn ensure(
        &self,
        portal: &dyn Portal,
        credentials: &Credentials,
    ) -> Result<Arc<SessionSlot>, PortalError> {
        if let Some(slot) = self.current() {
            return Ok(slot);
        }

        let mut generation = self.renew_lock.lock().await;
        if let Some(slot) = self.current() {
            return Ok(slot);
        }

        let session = portal.authenticate(credentials).await?;
        debug!("portal session established");
        Ok(self.install_locked(&mut generation, session))
    }

    /// Renew after `stale` was rejected.
    ///
    /// If another task already replaced `stale`, its replacement is
    /// returned without calling the portal again.
    pub(crate) async fn renew(
        &self,
        portal: &dyn Portal,
        credentials: &Credentials,
        stale: &SessionSlot,
    ) -> Result<Arc<SessionSlot>, PortalError> {
        let mut generation = self.renew_lock.lock().await;
        if let Some(slot) = self.current() {
            if slot.generation != stale.generation {
                return Ok(slot);
            }
        }

        let session = portal.renew(&stale.session, credentials).await.inspect_err(|_| {
            self.current.store(None);
        })?;
        debug!(generation = *generation + 1, "portal session renewed");
        Ok(self.install_locked(&mut generation, session))
    }

    /// Replace whatever is there with a freshly authenticated session.
    pub(crate) async fn install(&self, session: Session) -> Arc<SessionSlot> {
        let mut generation = self.renew_lock.lock().await;
        self.install_locked(&mut generation, session)
    }

    pub(crate) fn clear(&self) {
        self.current.store(None);
    }

    fn install_locked(&self, generation: &mut u64, session: Session) -> Arc<SessionSlot> {
        *generation += 1;
        let slot = Arc::new(SessionSlot {
            generation: *generation,
            session,
        });
        self.current.store(Some(Arc::clone(&slot)));
        slot
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;
    use secrecy::SecretString;
    use smarttag_api::Ride;

    use super::*;
    use crate::model::{BusStatus, DiscoveredStudent, StudentId};

    #[derive(Default)]
    struct CountingPortal {
        logins: AtomicU32,
    }

    #[async_trait]
    impl Portal for CountingPortal {
        async fn authenticate(&self, _: &Credentials) -> Result<Session, PortalError> {
            let n = self.logins.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            Ok(Session::new(SecretString::from(format!("t{n}")), None))
        }

        async fn fetch_status(&self, _: &Session, _: &StudentId) -> Result<BusStatus, PortalError> {
            unreachable!()
        }

        async fn list_students(&self, _: &Session) -> Result<Vec<DiscoveredStudent>, PortalError> {
            unreachable!()
        }

        async fn list_rides(
            &self,
            _: &Session,
            _: &StudentId,
            _: u32,
        ) -> Result<Vec<Ride>, PortalError> {
            unreachable!()
        }
    }

    fn creds() -> Credentials {
        Credentials::new("p@example.com", SecretString::from("pw".to_owned()))
    }

    #[tokio::test]
    async fn ensure_logs_in_once() {
        let cell = SessionCell::new();
        let portal = CountingPortal::default();
        let a = cell.ensure(&portal, &creds()).await.unwrap();
        let b = cell.ensure(&portal, &creds()).await.unwrap();
        assert_eq!(a.generation, b.generation);
        assert_eq!(portal.logins.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn concurrent_renewals_of_same_generation_collapse() {
        let cell = Arc::new(SessionCell::new());
        let portal = Arc::new(CountingPortal::default());
        let stale = cell.ensure(portal.as_ref(), &creds()).await.unwrap();

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let cell = Arc::clone(&cell);
            let portal = Arc::clone(&portal);
            let stale = Arc::clone(&stale);
            tasks.push(tokio::spawn(async move {
                cell.renew(portal.as_ref(), &creds(), &stale).await.unwrap().generation
            }));
        }
        for task in tasks {
            assert_eq!(task.await.unwrap(), stale.generation + 1);
        }
        // one initial login + one renewal
        assert_eq!(portal.logins.load(Ordering::SeqCst), 2);
    }
}
