use crate::connection;
use crate::registry::Registry;
use crate::stream::UntilStopped;
use crate::{race, Config, Error, Tracker, Winner};
use log::{debug, error, info, warn};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::TcpListenerStream;
use tokio_stream::StreamExt;

/// Lifecycle phase of a [`Server`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Phase {
    /// Accepting connections and serving requests.
    Running = 0,
    /// No longer accepting; waiting for open connections to finish on their own.
    Draining = 1,
    /// The grace period ran out; open connections have been cancelled.
    Escalating = 2,
    /// Every connection has finished.
    Stopped = 3,
}

impl Phase {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Phase::Running,
            1 => Phase::Draining,
            2 => Phase::Escalating,
            _ => Phase::Stopped,
        }
    }
}

/// How a call to [`Server::stop`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Every connection finished within the grace period; nothing was cancelled.
    Drained,
    /// The grace period ran out and the remaining connections were cancelled.
    Escalated {
        /// How many connections were cancelled.
        cancelled: usize,
    },
    /// Stop had already been called on this server.
    AlreadyStopped,
}

/// The payment simulator server.
///
/// Cloning a `Server` gives another handle to the same server, so one task can run it while
/// another stops it.
#[derive(Clone)]
pub struct Server(Arc<Shared>);

struct Shared {
    config: Config,
    tracker: Tracker,
    registry: Arc<Registry>,
    phase: AtomicU8,
    started: AtomicBool,
    stop_called: AtomicBool,
    accept_task: Mutex<Option<JoinHandle<()>>>,
}

impl Server {
    /// Create a server for `config`. Nothing is bound until [`start`](Server::start).
    pub fn new(config: Config) -> Self {
        Server(Arc::new(Shared {
            config,
            tracker: Tracker::new(),
            registry: Arc::new(Registry::new()),
            phase: AtomicU8::new(Phase::Running as u8),
            started: AtomicBool::new(false),
            stop_called: AtomicBool::new(false),
            accept_task: Mutex::new(None),
        }))
    }

    /// The configuration this server was created with.
    pub fn config(&self) -> &Config {
        &self.0.config
    }

    /// Bind the listener and start accepting connections in the background.
    ///
    /// Stop is initiated when `stop_signal` completes, or when [`stop`](Server::stop) is called,
    /// whichever happens first. From then on the listener is closed and no further connections are
    /// accepted. Returns the address actually bound.
    pub async fn start<F>(&self, stop_signal: F) -> Result<SocketAddr, Error>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.0.tracker.is_stopping() {
            return Err(Error::Stopped);
        }
        if self.0.started.swap(true, Ordering::AcqRel) {
            return Err(Error::AlreadyStarted);
        }

        let address = self.0.config.address().to_owned();
        let listener = TcpListener::bind(&address)
            .await
            .map_err(|source| Error::Bind { address, source })?;
        let local_addr = listener.local_addr().map_err(|source| Error::Bind {
            address: self.0.config.address().to_owned(),
            source,
        })?;
        if self.0.tracker.is_stopping() {
            debug!("Stopped while binding {}; closing listener", local_addr);
            return Err(Error::Stopped);
        }
        info!("Server started on {}", local_addr);

        let server = self.clone();
        tokio::spawn(async move {
            let tracker = &server.0.tracker;
            if let Winner::First(()) = race(stop_signal, tracker.stopping()).await {
                info!("Stop signal received");
                tracker.stop();
                server.begin_draining();
            }
        });

        let task = tokio::spawn(accept_loop(
            listener,
            self.0.tracker.clone(),
            self.0.registry.clone(),
        ));
        *self.lock_accept_task() = Some(task);
        Ok(local_addr)
    }

    /// Stop the server.
    ///
    /// Closes the listener, then waits up to the configured grace period for open connections to
    /// finish. Connections still open after that are cancelled: requests waiting out a simulated
    /// delay are answered with `Cancelled`, idle connections are closed, and this waits until every
    /// connection has wound down.
    ///
    /// Only the first call does anything; later calls return [`Outcome::AlreadyStopped`].
    pub async fn stop(&self) -> Outcome {
        if self.0.stop_called.swap(true, Ordering::AcqRel) {
            debug!("Stop called again; ignoring");
            return Outcome::AlreadyStopped;
        }

        info!("Shutting down...");
        self.0.tracker.stop();
        self.begin_draining();

        // The listener is closed once the accept loop has returned.
        let accept_task = self.lock_accept_task().take();
        if let Some(task) = accept_task {
            if let Err(e) = task.await {
                error!("Accept loop failed; err = {:?}", e);
            }
        }

        let grace_period = self.0.config.grace_period();
        let outcome = match race(self.0.tracker.drained(), tokio::time::sleep(grace_period)).await
        {
            Winner::First(()) => Outcome::Drained,
            Winner::Second(()) => {
                self.set_phase(Phase::Escalating);
                let cancelled = self.0.registry.cancel_all();
                warn!(
                    "Grace period of {:?} exceeded. Cancelled {} connection(s) in progress.",
                    grace_period, cancelled
                );
                self.0.tracker.drained().await;
                Outcome::Escalated { cancelled }
            }
        };

        self.set_phase(Phase::Stopped);
        info!("Shutdown complete");
        outcome
    }

    /// Wait until stop has been initiated, by the stop signal or by [`stop`](Server::stop).
    pub fn stop_requested(&self) -> impl Future<Output = ()> {
        self.0.tracker.stopping()
    }

    /// The current lifecycle phase.
    ///
    /// This becomes [`Phase::Draining`] as soon as stop is initiated, whether by the stop signal
    /// or by [`stop`](Server::stop).
    pub fn phase(&self) -> Phase {
        Phase::from_u8(self.0.phase.load(Ordering::Acquire))
    }

    /// How many connections are currently being served.
    pub fn active_connections(&self) -> usize {
        self.0.tracker.outstanding()
    }

    /// How many connections are currently registered for cancellation.
    pub fn registered_connections(&self) -> usize {
        self.0.registry.len()
    }

    fn set_phase(&self, phase: Phase) {
        self.0.phase.store(phase as u8, Ordering::Release);
    }

    fn begin_draining(&self) {
        let _ = self.0.phase.compare_exchange(
            Phase::Running as u8,
            Phase::Draining as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    fn lock_accept_task(&self) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
        self.0
            .accept_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("address", &self.0.config.address())
            .field("phase", &self.phase())
            .field("active_connections", &self.active_connections())
            .finish()
    }
}

async fn accept_loop(listener: TcpListener, tracker: Tracker, registry: Arc<Registry>) {
    let mut incoming = UntilStopped::new(tracker.clone(), TcpListenerStream::new(listener));
    while let Some(conn) = incoming.next().await {
        match conn {
            Ok(stream) => {
                match stream.peer_addr() {
                    Ok(peer) => debug!("Accepted connection from {}", peer),
                    Err(_) => debug!("Accepted connection"),
                }
                // Counted before spawning so a stop that follows immediately still waits for it.
                let guard = tracker.track();
                tokio::spawn(connection::serve(stream, registry.clone(), guard));
            }
            Err(e) if tracker.is_stopping() => {
                debug!("Accept failed during shutdown; err = {:?}", e);
                break;
            }
            Err(e) => {
                warn!("Error accepting connection; err = {:?}", e);
            }
        }
    }
    debug!("Listener closed");
}
