//! Provider registry.
//!
//! The registry is the only shared mutable state in the router.  It is backed
//! by [`DashMap`], whose sharded locks give each entry its own critical
//! section: a snapshot clones a provider while holding the entry's read lock,
//! and [`ProviderRegistry::update`] mutates it while holding the write lock,
//! so scoring never observes a half-applied feedback update.
//!
//! Providers are inserted when the registry is built from configuration and
//! are never removed afterwards.
//!
//! # Example
//!
//! ```rust
//! # use polyroute_core::provider::{Capabilities, Provider};
//! # use polyroute_core::registry::ProviderRegistry;
//! let registry = ProviderRegistry::new();
//! registry.register(Provider::new("anthropic", Capabilities::default())).unwrap();
//!
//! registry.set_load("anthropic", 0.4).unwrap();
//! let snapshot = registry.snapshot("anthropic").unwrap();
//! assert_eq!(snapshot.current_load, 0.4);
//! ```

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::error::{NoProviderReason, Result, RouterError};
use crate::provider::{Provider, ProviderSnapshot, clamp01};

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Concurrent provider registry backed by [`DashMap`].
///
/// The registry is cheaply cloneable (`Arc`-backed) and `Send + Sync`.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    inner: Arc<DashMap<String, Provider>>,
}

impl ProviderRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(DashMap::new()),
        }
    }

    /// Build a registry from validated provider records.
    pub fn from_providers(providers: impl IntoIterator<Item = Provider>) -> Result<Self> {
        let registry = Self::new();
        for provider in providers {
            registry.register(provider)?;
        }
        Ok(registry)
    }

    /// Register a provider after validating it.
    ///
    /// Registering an id twice is a configuration error.
    pub fn register(&self, provider: Provider) -> Result<()> {
        provider.validate()?;

        let id = provider.id.clone();
        match self.inner.entry(id.clone()) {
            Entry::Occupied(_) => Err(RouterError::config(
                "providers.id",
                format!("duplicate provider id `{id}`"),
            )),
            Entry::Vacant(slot) => {
                tracing::info!(provider_id = %id, available = provider.available, "provider registered");
                slot.insert(provider);
                Ok(())
            }
        }
    }

    /// Consistent copy of one provider's full state.
    pub fn snapshot(&self, id: &str) -> Result<Provider> {
        self.inner
            .get(id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| RouterError::UnknownProvider {
                provider_id: id.to_string(),
            })
    }

    /// Consistent copies of every available provider, sorted by id.
    ///
    /// # Errors
    ///
    /// [`RouterError::NoProviderAvailable`] when the registry is empty or every
    /// provider is disabled.
    pub fn available_snapshots(&self) -> Result<Vec<Provider>> {
        let registered = self.inner.len();
        let mut available: Vec<Provider> = self
            .inner
            .iter()
            .filter(|e| e.value().available)
            .map(|e| e.value().clone())
            .collect();

        if available.is_empty() {
            let reason = if registered == 0 {
                NoProviderReason::RegistryEmpty
            } else {
                NoProviderReason::AllDisabled { registered }
            };
            return Err(RouterError::NoProviderAvailable { reason });
        }

        available.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(available)
    }

    /// Apply `f` to one provider while holding its write lock.
    ///
    /// Returns the value produced by `f`.  The provider is not touched when
    /// `f` returns an error.
    pub fn update<T>(&self, id: &str, f: impl FnOnce(&mut Provider) -> Result<T>) -> Result<T> {
        let mut entry = self
            .inner
            .get_mut(id)
            .ok_or_else(|| RouterError::UnknownProvider {
                provider_id: id.to_string(),
            })?;

        let mut staged = entry.value().clone();
        let value = f(&mut staged)?;
        *entry.value_mut() = staged;
        Ok(value)
    }

    /// Report a provider's live load.  Values are clamped to `[0, 1]`.
    pub fn set_load(&self, id: &str, load: f64) -> Result<()> {
        self.update(id, |p| {
            p.current_load = clamp01(load);
            Ok(())
        })?;
        tracing::debug!(provider_id = %id, load, "provider load updated");
        Ok(())
    }

    /// Enable or disable a provider (configuration reload).
    pub fn set_available(&self, id: &str, available: bool) -> Result<()> {
        let old = self.update(id, |p| Ok(std::mem::replace(&mut p.available, available)))?;
        if old != available {
            tracing::info!(provider_id = %id, available, "provider availability changed");
        }
        Ok(())
    }

    /// Read-only snapshots of every provider, sorted by id.
    pub fn list(&self) -> Vec<ProviderSnapshot> {
        let mut all: Vec<ProviderSnapshot> = self
            .inner
            .iter()
            .map(|e| ProviderSnapshot::from(e.value()))
            .collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    /// Full copies of every provider, sorted by id.
    pub fn all(&self) -> Vec<Provider> {
        let mut all: Vec<Provider> = self.inner.iter().map(|e| e.value().clone()).collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    pub fn contains(&self, id: &str) -> bool {
        self.inner.contains_key(id)
    }

    pub fn count(&self) -> usize {
        self.inner.len()
    }

    pub fn available_count(&self) -> usize {
        self.inner.iter().filter(|e| e.value().available).count()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
