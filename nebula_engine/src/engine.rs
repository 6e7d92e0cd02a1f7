/// Nebula Engine - Singleton manager for engine subsystems
///
/// Hosts the global logger and the shared worker pool. Both live in
/// thread-safe static storage guarded by RwLock.

use std::sync::{OnceLock, RwLock, Arc};
use std::time::SystemTime;
use crate::error::{Result, Error};
use crate::jobs::{WorkerPool, WorkerPoolConfig};
use crate::log::{Logger, LogEntry, LogSeverity, DefaultLogger};

// ===== INTERNAL STATE =====

/// Global engine state storage
static ENGINE_STATE: OnceLock<EngineState> = OnceLock::new();

/// Global logger (initialized with DefaultLogger)
static LOGGER: OnceLock<RwLock<Box<dyn Logger>>> = OnceLock::new();

/// Internal state structure holding all engine singletons
struct EngineState {
    /// Worker pool singleton
    worker_pool: RwLock<Option<Arc<WorkerPool>>>,
}

impl EngineState {
    fn new() -> Self {
        Self {
            worker_pool: RwLock::new(None),
        }
    }
}

fn logger_lock() -> &'static RwLock<Box<dyn Logger>> {
    LOGGER.get_or_init(|| RwLock::new(Box::new(DefaultLogger::new())))
}

// ===== PUBLIC API =====

/// Main engine singleton manager
///
/// # Example
///
/// ```no_run
/// use nebula_engine::nebula::Engine;
/// use nebula_engine::nebula::jobs::WorkerPoolConfig;
///
/// Engine::initialize()?;
/// Engine::create_worker_pool(WorkerPoolConfig::default(), 4)?;
///
/// let pool = Engine::worker_pool()?;
/// pool.submit(|| println!("hello from a worker"));
///
/// Engine::shutdown();
/// # Ok::<(), nebula_engine::nebula::Error>(())
/// ```
pub struct Engine;

impl Engine {
    /// Log errors before returning them (internal use)
    fn log_and_return_error(error: Error) -> Error {
        crate::engine_error!("nebula::Engine", "{}", error);
        error
    }

    fn state() -> Result<&'static EngineState> {
        ENGINE_STATE.get()
            .ok_or_else(|| Self::log_and_return_error(
                Error::InitializationFailed("Engine not initialized. Call Engine::initialize() first.".to_string())
            ))
    }

    /// Initialize the engine
    ///
    /// Idempotent. Must be called before creating any singleton.
    pub fn initialize() -> Result<()> {
        ENGINE_STATE.get_or_init(EngineState::new);
        Ok(())
    }

    /// Shutdown the engine and destroy all singletons
    ///
    /// The worker pool is stopped and its threads joined if this was the
    /// last reference to it.
    pub fn shutdown() {
        if let Some(state) = ENGINE_STATE.get() {
            // Released before joining: running tasks may still read the singleton
            let pool = state.worker_pool.write().ok().and_then(|mut lock| lock.take());
            if let Some(pool) = pool {
                pool.stop();
            }
        }
    }

    // ===== WORKER POOL API =====

    /// Create, start and register the worker pool singleton
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The engine is not initialized
    /// - A worker pool already exists
    /// - Worker threads could not be spawned
    pub fn create_worker_pool(config: WorkerPoolConfig, thread_count: usize) -> Result<()> {
        let state = Self::state()?;

        let mut lock = state.worker_pool.write()
            .map_err(|_| Self::log_and_return_error(
                Error::BackendError("WorkerPool lock poisoned".to_string())
            ))?;

        if lock.is_some() {
            return Err(Self::log_and_return_error(
                Error::InitializationFailed("WorkerPool already exists. Call Engine::destroy_worker_pool() first.".to_string())
            ));
        }

        let pool = WorkerPool::new(config);
        pool.start(thread_count)?;
        *lock = Some(Arc::new(pool));

        crate::engine_info!("nebula::Engine", "WorkerPool singleton created with {} threads", thread_count);

        Ok(())
    }

    /// Get the worker pool singleton
    ///
    /// # Errors
    ///
    /// Returns an error if the engine is not initialized or the pool has not been created
    pub fn worker_pool() -> Result<Arc<WorkerPool>> {
        let state = Self::state()?;

        let lock = state.worker_pool.read()
            .map_err(|_| Self::log_and_return_error(
                Error::BackendError("WorkerPool lock poisoned".to_string())
            ))?;

        lock.clone()
            .ok_or_else(|| Self::log_and_return_error(
                Error::InitializationFailed("WorkerPool not created. Call Engine::create_worker_pool() first.".to_string())
            ))
    }

    /// Stop and unregister the worker pool singleton
    ///
    /// # Errors
    ///
    /// Returns an error if the engine is not initialized
    pub fn destroy_worker_pool() -> Result<()> {
        let state = Self::state()?;

        let pool = state.worker_pool.write()
            .map_err(|_| Self::log_and_return_error(
                Error::BackendError("WorkerPool lock poisoned".to_string())
            ))?
            .take();

        // Released before joining: running tasks may still read the singleton
        if let Some(pool) = pool {
            pool.stop();
        }

        crate::engine_info!("nebula::Engine", "WorkerPool singleton destroyed");

        Ok(())
    }

    /// Reset all singletons for testing (only available in test builds)
    #[cfg(test)]
    pub fn reset_for_testing() {
        Self::shutdown();
    }

    // ===== LOGGING API =====

    /// Set a custom logger
    ///
    /// # Example
    ///
    /// ```no_run
    /// use nebula_engine::nebula::{Engine, log::{Logger, LogEntry}};
    ///
    /// struct FileLogger;
    /// impl Logger for FileLogger {
    ///     fn log(&self, entry: &LogEntry) {
    ///         // Write to file...
    ///     }
    /// }
    ///
    /// Engine::set_logger(FileLogger);
    /// ```
    pub fn set_logger<L: Logger + 'static>(logger: L) {
        if let Ok(mut lock) = logger_lock().write() {
            *lock = Box::new(logger);
        }
    }

    /// Reset logger to default (DefaultLogger)
    pub fn reset_logger() {
        if let Ok(mut lock) = logger_lock().write() {
            *lock = Box::new(DefaultLogger::new());
        }
    }

    /// Internal logging method (for simple logs without file:line)
    ///
    /// Used by macros like engine_info!, engine_warn!, etc.
    pub fn log(severity: LogSeverity, source: &str, message: String) {
        if let Ok(lock) = logger_lock().read() {
            lock.log(&LogEntry {
                severity,
                timestamp: SystemTime::now(),
                source: source.to_string(),
                message,
                file: None,
                line: None,
            });
        }
    }

    /// Internal logging method with file:line information (for ERROR logs)
    ///
    /// Used by engine_error!, engine_err! and engine_bail!.
    pub fn log_detailed(
        severity: LogSeverity,
        source: &str,
        message: String,
        file: &'static str,
        line: u32,
    ) {
        if let Ok(lock) = logger_lock().read() {
            lock.log(&LogEntry {
                severity,
                timestamp: SystemTime::now(),
                source: source.to_string(),
                message,
                file: Some(file),
                line: Some(line),
            });
        }
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
