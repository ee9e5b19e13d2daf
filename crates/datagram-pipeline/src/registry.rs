// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Collaborator resolution.
//!
//! The pipeline never owns its protocol or packet pool. It resolves them by
//! name through a [`ModuleDirectory`] and keeps only weak
//! [`CollaboratorHandle`]s, which re-resolve when the target went away and
//! become permanently unavailable once released at stop.

use crate::error::PipelineError;
use crate::packet::PooledPacket;
use crate::pool::PacketPool;
use crate::protocol::Protocol;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

/// Connection provider handed to the pipeline at construction.
pub trait ModuleDirectory<P>: Send + Sync {
    /// Look up a protocol collaborator.
    fn protocol(&self, name: &str) -> Option<Arc<dyn Protocol<P>>>;

    /// Look up a packet pool collaborator.
    fn packet_pool(&self, name: &str) -> Option<Arc<dyn PacketPool<P>>>;
}

/// In-memory name -> collaborator map.
pub struct ModuleRegistry<P: PooledPacket> {
    protocols: RwLock<HashMap<String, Arc<dyn Protocol<P>>>>,
    pools: RwLock<HashMap<String, Arc<dyn PacketPool<P>>>>,
}

impl<P: PooledPacket> ModuleRegistry<P> {
    pub fn new() -> Self {
        Self {
            protocols: RwLock::new(HashMap::new()),
            pools: RwLock::new(HashMap::new()),
        }
    }

    /// Register (or replace) a protocol under `name`.
    pub fn register_protocol(&self, name: impl Into<String>, protocol: Arc<dyn Protocol<P>>) {
        self.protocols.write().insert(name.into(), protocol);
    }

    /// Register (or replace) a packet pool under `name`.
    pub fn register_packet_pool(&self, name: impl Into<String>, pool: Arc<dyn PacketPool<P>>) {
        self.pools.write().insert(name.into(), pool);
    }

    /// Remove every collaborator registered under `name`.
    ///
    /// Returns true if anything was removed.
    pub fn unregister(&self, name: &str) -> bool {
        let protocol = self.protocols.write().remove(name).is_some();
        let pool = self.pools.write().remove(name).is_some();
        protocol || pool
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .protocols
            .read()
            .keys()
            .chain(self.pools.read().keys())
            .cloned()
            .collect();
        names.sort();
        names.dedup();
        names
    }
}

impl<P: PooledPacket> Default for ModuleRegistry<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: PooledPacket> ModuleDirectory<P> for ModuleRegistry<P> {
    fn protocol(&self, name: &str) -> Option<Arc<dyn Protocol<P>>> {
        self.protocols.read().get(name).cloned()
    }

    fn packet_pool(&self, name: &str) -> Option<Arc<dyn PacketPool<P>>> {
        self.pools.read().get(name).cloned()
    }
}

type Resolver<T> = Box<dyn Fn() -> Option<Arc<T>> + Send + Sync>;

/// Weak, name-resolved reference to a collaborator.
pub struct CollaboratorHandle<T: ?Sized> {
    name: String,
    resolver: Resolver<T>,
    cached: Mutex<Option<Weak<T>>>,
    released: AtomicBool,
}

impl<T: ?Sized> CollaboratorHandle<T> {
    /// Create an unresolved handle; `resolver` is called on every refresh.
    pub fn new<F>(name: impl Into<String>, resolver: F) -> Self
    where
        F: Fn() -> Option<Arc<T>> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            resolver: Box::new(resolver),
            cached: Mutex::new(None),
            released: AtomicBool::new(false),
        }
    }

    /// Collaborator name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Re-run resolution. Returns true if the collaborator is reachable.
    pub fn refresh(&self) -> bool {
        if self.released.load(Ordering::Acquire) {
            return false;
        }
        let resolved = (self.resolver)();
        let found = resolved.is_some();
        *self.cached.lock() = resolved.as_ref().map(Arc::downgrade);
        found
    }

    /// Upgrade to a strong reference, re-resolving once if the cached target is gone.
    pub fn get(&self) -> Result<Arc<T>, PipelineError> {
        if self.released.load(Ordering::Acquire) {
            return Err(PipelineError::CollaboratorUnavailable(self.name.clone()));
        }

        let mut cached = self.cached.lock();
        if let Some(target) = cached.as_ref().and_then(Weak::upgrade) {
            return Ok(target);
        }

        match (self.resolver)() {
            Some(target) => {
                *cached = Some(Arc::downgrade(&target));
                Ok(target)
            }
            None => {
                *cached = None;
                Err(PipelineError::CollaboratorUnavailable(self.name.clone()))
            }
        }
    }

    /// True if `get` would currently succeed.
    pub fn is_available(&self) -> bool {
        self.get().is_ok()
    }

    /// Make the handle permanently unavailable.
    pub fn release(&self) {
        self.released.store(true, Ordering::Release);
        *self.cached.lock() = None;
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }
}

impl<T: ?Sized> fmt::Debug for CollaboratorHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollaboratorHandle")
            .field("name", &self.name)
            .field("released", &self.is_released())
            .finish()
    }
}
