//! Shared metrics store
//!
//! Tracks which containers are watched and their latest CPU/memory readings.
//! Every operation runs under one lock so that removing a watcher and its
//! metrics is never observed half done.

use crate::models::ContainerUsage;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tracing::debug;

/// Stop signal handed to a watcher when it is registered
#[derive(Debug, Clone)]
pub struct StopSignal(watch::Receiver<bool>);

impl StopSignal {
    /// Whether the watcher has been asked to stop (or its registration is gone)
    pub fn is_stopped(&self) -> bool {
        *self.0.borrow() || self.0.has_changed().is_err()
    }

    /// Resolves once the watcher has been asked to stop
    pub async fn stopped(&mut self) {
        // An error means the sender was dropped with the registration
        let _ = self.0.wait_for(|stop| *stop).await;
    }
}

/// A watcher slot returned by [`MetricsStore::upsert_watcher`]
#[derive(Debug)]
pub struct Registration {
    pub container_id: String,
    pub generation: u64,
    pub stop: StopSignal,
}

#[derive(Debug)]
struct WatcherEntry {
    generation: u64,
    stop: watch::Sender<bool>,
}

#[derive(Debug, Default)]
struct Inner {
    watchers: HashMap<String, WatcherEntry>,
    cpu: HashMap<String, f64>,
    memory: HashMap<String, f64>,
    next_generation: u64,
}

impl Inner {
    fn remove(&mut self, container_id: &str) -> bool {
        self.cpu.remove(container_id);
        self.memory.remove(container_id);
        match self.watchers.remove(container_id) {
            Some(entry) => {
                entry.stop.send_replace(true);
                true
            }
            None => false,
        }
    }
}

/// Point-in-time copy of the store contents
#[derive(Debug, Clone, Default)]
pub struct MetricsSnapshot {
    /// Watched container IDs, sorted
    pub container_ids: Vec<String>,
    pub cpu: HashMap<String, f64>,
    pub memory: HashMap<String, f64>,
}

impl MetricsSnapshot {
    /// Number of registered watchers
    pub fn container_count(&self) -> usize {
        self.container_ids.len()
    }

    /// Mean CPU percentage over containers that have reported; NaN when none have
    pub fn average_cpu(&self) -> f64 {
        mean(&self.cpu)
    }

    /// Mean memory bytes over containers that have reported; NaN when none have
    pub fn average_memory(&self) -> f64 {
        mean(&self.memory)
    }

    /// Latest usage for a container, if it has reported both values
    pub fn usage(&self, container_id: &str) -> Option<ContainerUsage> {
        Some(ContainerUsage {
            cpu_percent: *self.cpu.get(container_id)?,
            memory_bytes: *self.memory.get(container_id)?,
        })
    }
}

fn mean(values: &HashMap<String, f64>) -> f64 {
    values.values().sum::<f64>() / values.len() as f64
}

/// Registry of active watchers and their latest metrics
#[derive(Debug, Default)]
pub struct MetricsStore {
    inner: Mutex<Inner>,
}

impl MetricsStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // Critical sections never panic midway, so a poisoned map is still consistent
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a watcher for `container_id` unless one already exists.
    ///
    /// Returns the new registration, or `None` if the container is already watched.
    pub fn upsert_watcher(&self, container_id: &str) -> Option<Registration> {
        let mut inner = self.lock();
        if inner.watchers.contains_key(container_id) {
            return None;
        }

        inner.next_generation += 1;
        let generation = inner.next_generation;
        let (stop_tx, stop_rx) = watch::channel(false);
        inner.watchers.insert(
            container_id.to_string(),
            WatcherEntry {
                generation,
                stop: stop_tx,
            },
        );
        debug!(container_id = %container_id, generation, "Registered watcher");

        Some(Registration {
            container_id: container_id.to_string(),
            generation,
            stop: StopSignal(stop_rx),
        })
    }

    /// Overwrite the latest metrics for a watched container.
    ///
    /// Returns false (and stores nothing) if the container is no longer watched.
    pub fn set_metrics(&self, container_id: &str, cpu_percent: f64, memory_bytes: f64) -> bool {
        let mut inner = self.lock();
        if !inner.watchers.contains_key(container_id) {
            return false;
        }
        inner.cpu.insert(container_id.to_string(), cpu_percent);
        inner.memory.insert(container_id.to_string(), memory_bytes);
        true
    }

    /// Remove a watcher and its metrics, signalling it to stop.
    ///
    /// Returns false if nothing was registered under `container_id`.
    pub fn evict(&self, container_id: &str) -> bool {
        let removed = self.lock().remove(container_id);
        if removed {
            debug!(container_id = %container_id, "Evicted watcher");
        }
        removed
    }

    /// Remove a watcher only if `generation` is still the live registration.
    ///
    /// Used by watchers removing themselves so a replacement registered for
    /// the same container in the meantime is left alone.
    pub fn evict_registration(&self, container_id: &str, generation: u64) -> bool {
        let mut inner = self.lock();
        match inner.watchers.get(container_id) {
            Some(entry) if entry.generation == generation => inner.remove(container_id),
            _ => false,
        }
    }

    /// Copy out the current watched set and metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        let inner = self.lock();
        let mut container_ids: Vec<String> = inner.watchers.keys().cloned().collect();
        container_ids.sort();

        MetricsSnapshot {
            container_ids,
            cpu: inner.cpu.clone(),
            memory: inner.memory.clone(),
        }
    }

    /// IDs of all watched containers
    pub fn watched_ids(&self) -> Vec<String> {
        self.lock().watchers.keys().cloned().collect()
    }

    pub fn contains(&self, container_id: &str) -> bool {
        self.lock().watchers.contains_key(container_id)
    }

    pub fn len(&self) -> usize {
        self.lock().watchers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().watchers.is_empty()
    }
}
