//! Process-wide runtime
//!
//! Holds the thread table and the key table, each behind its own reader/writer
//! lock. The runtime starts on the first call that needs it, configured from
//! the environment, or explicitly through [`init`].

use std::{
    sync::{OnceLock, atomic::Ordering},
    time::Duration,
};

use px_exec::{SemLock, sched};

use crate::{
    config::{Config, ConfigError},
    thread::{
        self,
        registry::{self, Registry},
    },
    tls::KeyTable,
};

static RUNTIME: OnceLock<Runtime> = OnceLock::new();

/// Interval at which [`shutdown`] polls for detached threads.
const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

pub(crate) struct Runtime {
    pub(crate) config: Config,
    pub(crate) threads: SemLock<Registry>,
    pub(crate) keys: SemLock<KeyTable>,
}

impl Runtime {
    fn new(config: Config) -> Self {
        Self {
            threads: SemLock::new(Registry::new(config.max_threads)),
            keys: SemLock::new(KeyTable::new(config.max_keys)),
            config,
        }
    }
}

/// Returns the runtime, starting it from the environment if needed.
pub(crate) fn get() -> &'static Runtime {
    RUNTIME.get_or_init(|| {
        let config = Config::from_env().unwrap_or_else(|err| {
            log::warn!("ignoring thread library environment: {err}");
            Config::default()
        });
        log::debug!("starting thread runtime with {config:?}");
        Runtime::new(config)
    })
}

/// Starts the runtime with `config` and registers the calling thread as the
/// initial thread.
///
/// # Errors
///
/// Returns [`InitError::Config`] for an invalid configuration and
/// [`InitError::AlreadyInitialized`] if the runtime is already running,
/// whether started by an earlier `init` or lazily.
pub fn init(config: Config) -> Result<(), InitError> {
    config.validate()?;

    log::debug!("starting thread runtime with {config:?}");
    RUNTIME
        .set(Runtime::new(config))
        .map_err(|_| InitError::AlreadyInitialized)?;

    if registry::cached().is_none() {
        registry::adopt(true);
    }

    Ok(())
}

/// Waits for the threads created by this library to finish.
///
/// Joinable threads are joined, their results discarded. Detached threads are
/// waited for until they have released their slots. Returns the number of
/// threads joined.
///
/// Must not be called while other threads still create threads.
pub fn shutdown() -> usize {
    let Some(runtime) = RUNTIME.get() else {
        return 0;
    };

    let me = registry::cached().map(|info| info.handle);
    let joinable: Vec<_> = runtime
        .threads
        .read()
        .threads()
        .filter(|info| !info.adopted && Some(info.handle) != me)
        .filter(|info| !info.detached.load(Ordering::Acquire))
        .map(|info| info.handle)
        .collect();

    let joined = joinable
        .into_iter()
        .filter(|handle| thread::join(*handle).is_ok())
        .count();

    loop {
        let running = runtime
            .threads
            .read()
            .threads()
            .filter(|info| !info.adopted && Some(info.handle) != me)
            .count();
        if running == 0 {
            break;
        }
        sched::delay(DRAIN_POLL_INTERVAL);
    }

    log::debug!("thread runtime shut down, {joined} threads joined");
    joined
}

/// Error returned by [`init`]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InitError {
    /// The configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// The runtime is already running.
    #[error("thread runtime already initialized")]
    AlreadyInitialized,
}
