//! Acceptor credentials.
//!
//! A [`Credential`] is acquired once per `(service, name type)` and shared by
//! every session through an `Arc`. It is never mutated after acquisition.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use crate::diagnostics::{self, Diagnostics};
use crate::error::CredentialError;
use crate::mechanism::MechanismProvider;
use crate::name::{Name, NameError, NameType};
use crate::status::{RoutineError, Status};

const COMPONENT: &str = "credential";

struct Inner<M: MechanismProvider> {
    mechanism: Arc<M>,
    name: Name,
    handle: M::Credential,
}

/// Read-only acceptor credential bound to a service identity.
pub struct Credential<M: MechanismProvider> {
    inner: Arc<Inner<M>>,
}

impl<M: MechanismProvider> Credential<M> {
    /// Service identity the credential is bound to.
    pub fn name(&self) -> &Name {
        &self.inner.name
    }

    /// Mechanism that issued the credential.
    pub fn mechanism(&self) -> &Arc<M> {
        &self.inner.mechanism
    }

    /// Mechanism-specific handle.
    pub fn handle(&self) -> &M::Credential {
        &self.inner.handle
    }

    /// Whether both values refer to the same acquired credential.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<M: MechanismProvider> Clone for Credential<M> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<M: MechanismProvider> fmt::Debug for Credential<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("mechanism", &self.inner.mechanism.name())
            .field("name", &self.inner.name)
            .field("handle", &self.inner.handle)
            .finish()
    }
}

/// Acquires and caches acceptor credentials.
pub struct CredentialStore<M: MechanismProvider> {
    mechanism: Arc<M>,
    diagnostics: Arc<dyn Diagnostics>,
    cache: Mutex<HashMap<(String, NameType), Credential<M>>>,
}

impl<M: MechanismProvider> CredentialStore<M> {
    /// Create a store backed by `mechanism`.
    pub fn new(mechanism: Arc<M>) -> Self {
        Self {
            mechanism,
            diagnostics: diagnostics::default_sink(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Send status reports to `sink` instead of the tracing default.
    #[must_use]
    pub fn with_diagnostics(mut self, sink: Arc<dyn Diagnostics>) -> Self {
        self.diagnostics = sink;
        self
    }

    /// Acquire an acceptor credential for `service` of type `name_type`.
    ///
    /// Repeated calls for the same identity return the same shared handle.
    pub fn acquire(&self, service: &str, name_type: NameType) -> Result<Credential<M>, CredentialError> {
        let key = (service.to_string(), name_type);
        if let Some(cached) = self.cache.lock().ok().and_then(|c| c.get(&key).cloned()) {
            tracing::debug!(service, %name_type, "credential cache hit");
            return Ok(cached);
        }

        let name = Name::parse(service, name_type).map_err(|e| {
            let routine = match e {
                NameError::Unsupported(_) => RoutineError::BadNameType,
                _ => RoutineError::BadName,
            };
            let status = Status::routine(routine, 0);
            self.diagnostics
                .report(COMPONENT, "acquire", status, &status.render(Some(&e.to_string())));
            CredentialError::NameResolutionFailed
        })?;

        let handle = self.mechanism.acquire_credential(&name).map_err(|status| {
            let message = status.render(self.mechanism.minor_message(status.minor()));
            self.diagnostics.report(COMPONENT, "acquire", status, &message);
            CredentialError::from(status)
        })?;

        tracing::info!(
            service,
            %name_type,
            mechanism = self.mechanism.name(),
            "acquired acceptor credential"
        );

        let credential = Credential {
            inner: Arc::new(Inner {
                mechanism: Arc::clone(&self.mechanism),
                name,
                handle,
            }),
        };
        // A racing acquire may have filled the slot first; hand out its handle.
        match self.cache.lock() {
            Ok(mut cache) => Ok(cache.entry(key).or_insert(credential).clone()),
            Err(_) => Ok(credential),
        }
    }

    /// Mechanism backing the store.
    pub fn mechanism(&self) -> &Arc<M> {
        &self.mechanism
    }
}
