//! Thread management and CPU affinity
//!
//! Processors are long-running loops, each needing a thread of its own. The
//! consumer graph only asks an [`Executor`] to run a task; [`ThreadExecutor`] is
//! the default, spawning named OS threads and optionally pinning them to cores.

use crate::disruptor::{DisruptorError, Result};
use core_affinity::CoreId;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};

/// Runs long-lived tasks on independent threads of execution
pub trait Executor: Send + Sync {
    /// Start `task` on its own thread
    ///
    /// # Arguments
    /// * `name` - Human readable name of the task, used for thread naming
    /// * `task` - The work to run; typically a processor loop
    ///
    /// # Errors
    /// `Spawn` if no thread could be started
    fn execute(&self, name: &str, task: Box<dyn FnOnce() + Send + 'static>) -> Result<()>;
}

/// Handle to a spawned processor thread
///
/// Dropping the handle detaches the thread.
pub struct ManagedThread {
    join_handle: Option<JoinHandle<()>>,
    thread_name: String,
}

impl ManagedThread {
    pub(crate) fn new(join_handle: JoinHandle<()>, thread_name: String) -> Self {
        Self {
            join_handle: Some(join_handle),
            thread_name,
        }
    }

    /// Get the thread name
    pub fn thread_name(&self) -> &str {
        &self.thread_name
    }

    /// Join the thread, waiting for it to complete
    pub fn join(mut self) -> thread::Result<()> {
        match self.join_handle.take() {
            Some(handle) => handle.join(),
            None => Ok(()),
        }
    }

    /// Check if the thread is still running
    pub fn is_running(&self) -> bool {
        self.join_handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl std::fmt::Debug for ManagedThread {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagedThread")
            .field("thread_name", &self.thread_name)
            .field("running", &self.is_running())
            .finish()
    }
}

/// Executor that spawns one named OS thread per task
///
/// Threads are named `{prefix}-{task name}`. When cores are configured, threads
/// are pinned round-robin over them.
#[derive(Debug)]
pub struct ThreadExecutor {
    name_prefix: String,
    cores: Vec<CoreId>,
    next_core: AtomicUsize,
    threads: Mutex<Vec<ManagedThread>>,
}

impl ThreadExecutor {
    /// Create an executor with the default `ringbatch` name prefix
    pub fn new() -> Self {
        Self::with_name_prefix("ringbatch")
    }

    /// Create an executor that prefixes thread names with `prefix`
    pub fn with_name_prefix<S: Into<String>>(prefix: S) -> Self {
        Self {
            name_prefix: prefix.into(),
            cores: Vec::new(),
            next_core: AtomicUsize::new(0),
            threads: Mutex::new(Vec::new()),
        }
    }

    /// Pin spawned threads round-robin over `core_ids`
    ///
    /// # Errors
    /// `Config` if any of the cores is not available on this machine
    pub fn pin_at_cores(mut self, core_ids: &[usize]) -> Result<Self> {
        let available = get_available_cores();
        if let Some(missing) = core_ids.iter().find(|&&id| !available.contains(&id)) {
            return Err(DisruptorError::Config(format!(
                "CPU core {missing} is not available. Available cores: {available:?}"
            )));
        }

        self.cores = core_ids.iter().map(|&id| CoreId { id }).collect();
        Ok(self)
    }

    fn next_affinity(&self) -> Option<CoreId> {
        if self.cores.is_empty() {
            return None;
        }
        let index = self.next_core.fetch_add(1, Ordering::Relaxed) % self.cores.len();
        Some(self.cores[index])
    }

    /// Number of threads spawned and not yet joined
    pub fn thread_count(&self) -> usize {
        self.threads.lock().len()
    }

    /// Join every spawned thread
    ///
    /// # Returns
    /// The number of threads that terminated by panicking
    pub fn join_all(&self) -> usize {
        let threads: Vec<ManagedThread> = std::mem::take(&mut *self.threads.lock());
        let mut panicked = 0;

        for managed in threads {
            let name = managed.thread_name().to_owned();
            if managed.join().is_err() {
                tracing::warn!(thread = %name, "processor thread panicked");
                panicked += 1;
            }
        }

        panicked
    }
}

impl Default for ThreadExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl Executor for ThreadExecutor {
    fn execute(&self, name: &str, task: Box<dyn FnOnce() + Send + 'static>) -> Result<()> {
        let thread_name = format!("{}-{name}", self.name_prefix);
        let affinity = self.next_affinity();

        let name_for_thread = thread_name.clone();
        let join_handle = thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || {
                set_affinity_if_defined(affinity, &name_for_thread);
                task();
            })?;

        tracing::debug!(thread = %thread_name, "spawned processor thread");
        self.threads
            .lock()
            .push(ManagedThread::new(join_handle, thread_name));
        Ok(())
    }
}

fn set_affinity_if_defined(affinity: Option<CoreId>, thread_name: &str) {
    if let Some(core_id) = affinity {
        if core_affinity::set_for_current(core_id) {
            tracing::debug!(thread = thread_name, core = core_id.id, "pinned thread to core");
        } else {
            tracing::warn!(thread = thread_name, core = core_id.id, "could not pin thread to core");
        }
    }
}

/// Get available CPU core IDs
pub fn get_available_cores() -> Vec<usize> {
    core_affinity::get_core_ids()
        .unwrap_or_default()
        .iter()
        .map(|core| core.id)
        .collect()
}
