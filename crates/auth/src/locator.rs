//! Lazy, thread-safe construction of the auth service.
//!
//! The locator tolerates partially-missing configuration at startup:
//! [`ServiceLocator::get_service`] always hands back an instance, degraded
//! if dependencies are absent, so callers hit a classified error instead of
//! a panic. [`ServiceLocator::init_service`] is the eager variant for
//! binaries that prefer failing at boot.

use std::sync::{Arc, RwLock};

use tracing::warn;

use crate::error::AuthError;
use crate::service::{AuthDeps, AuthService};

/// Lazily constructs and caches one [`AuthService`] instance.
pub struct ServiceLocator {
    deps: AuthDeps,
    slot: RwLock<Option<Arc<AuthService>>>,
}

impl ServiceLocator {
    /// Create a locator over the given dependencies. Nothing is constructed
    /// until the first [`get_service`](Self::get_service) call.
    #[must_use]
    pub const fn new(deps: AuthDeps) -> Self {
        Self {
            deps,
            slot: RwLock::new(None),
        }
    }

    /// Get the service, constructing it on first use.
    ///
    /// Double-checked under the slot lock so concurrent first callers build
    /// at most one instance. Missing dependencies yield a degraded instance
    /// whose operations return [`AuthError::NotInitialized`].
    ///
    /// # Panics
    ///
    /// Panics if the slot lock is poisoned, which requires a prior panic
    /// while holding it.
    #[must_use]
    #[allow(clippy::unwrap_used)]
    pub fn get_service(&self) -> Arc<AuthService> {
        if let Some(service) = self.slot.read().unwrap().as_ref() {
            return Arc::clone(service);
        }

        let mut slot = self.slot.write().unwrap();
        // Another caller may have built it between the read and write locks.
        if let Some(service) = slot.as_ref() {
            return Arc::clone(service);
        }

        let service = Arc::new(AuthService::new(self.deps.clone()));
        if !service.is_fully_initialized() {
            warn!("auth service constructed with missing dependencies; operations will be refused");
        }
        *slot = Some(Arc::clone(&service));
        service
    }

    /// Eagerly construct the service, refusing if any dependency is absent.
    ///
    /// # Errors
    ///
    /// [`AuthError::NotInitialized`] naming the first missing dependency.
    pub fn init_service(&self) -> Result<Arc<AuthService>, AuthError> {
        if self.deps.store.is_none() {
            return Err(AuthError::NotInitialized("user store"));
        }
        if self.deps.cache.is_none() {
            return Err(AuthError::NotInitialized("session cache"));
        }
        if self.deps.issuer.is_none() {
            return Err(AuthError::NotInitialized("token issuer"));
        }
        if self.deps.google.is_none() {
            return Err(AuthError::NotInitialized("google client"));
        }
        Ok(self.get_service())
    }
}

impl std::fmt::Debug for ServiceLocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceLocator")
            .field("deps", &self.deps)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_same_instance_across_calls() {
        let locator = ServiceLocator::new(AuthDeps::default());
        let first = locator.get_service();
        let second = locator.get_service();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_init_refuses_missing_store() {
        let locator = ServiceLocator::new(AuthDeps::default());
        assert!(matches!(
            locator.init_service(),
            Err(AuthError::NotInitialized("user store"))
        ));
    }

    #[tokio::test]
    async fn test_degraded_service_returns_classified_error() {
        let locator = ServiceLocator::new(AuthDeps::default());
        let service = locator.get_service();

        let err = service
            .sign_out("not-even-a-uuid", blue_papaya_core::AuthProvider::Local)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::NotInitialized(_)));
    }

    #[test]
    fn test_concurrent_first_access_builds_one_instance() {
        let locator = Arc::new(ServiceLocator::new(AuthDeps::default()));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let locator = Arc::clone(&locator);
                std::thread::spawn(move || locator.get_service())
            })
            .collect();

        let instances: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        for instance in &instances {
            assert!(Arc::ptr_eq(&instances[0], instance));
        }
    }
}
