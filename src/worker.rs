//! Event-loop workers.
//!
//! A worker is one OS thread running its own single-threaded tokio runtime
//! and hyper connection handler. The primary worker binds the listening
//! socket; secondary workers get a duplicate of that descriptor and accept on
//! it independently, so the kernel spreads connections across the loops.
//! Distribution is up to the kernel and is not guaranteed to be even.

use std::convert::Infallible;
use std::io;
use std::net::{SocketAddr, TcpListener};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use hyper::server::conn::Http;
use hyper::service::service_fn;
use hyper::{Body, StatusCode};
use tokio::sync::oneshot;

use crate::error::ServiceError;
use crate::http::{Request, Response};
use crate::router::{dispatch_request, Dispatch};

/// Pause after a failed accept, e.g. when the process is out of descriptors.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(10);

/// Longest wait for the first bytes of a freshly accepted connection.
const FIRST_REQUEST_WAIT: Duration = Duration::from_millis(50);

/// One event loop with its thread and, when serving, its listening socket.
///
/// Dropping a worker asks its loop to exit and joins the thread before the
/// socket is released. A request being dispatched finishes first, since
/// dispatch is a plain synchronous call.
pub struct Worker {
    id: usize,
    listener: Option<TcpListener>,
    shutdown: Option<oneshot::Sender<()>>,
    thread: Option<thread::JoinHandle<()>>,
}

impl Worker {
    /// Binds `address:port` and starts serving on it.
    ///
    /// A bind failure is logged and leaves the worker without a socket; see
    /// [`Worker::is_serving`].
    pub fn primary(id: usize, address: &str, port: u16, dispatch: Arc<dyn Dispatch>) -> Self {
        match bind(address, port) {
            Ok(listener) => Worker::start(id, listener, dispatch),
            Err(e) => {
                let err = ServiceError::Bind {
                    address: format!("{}:{}", address, port),
                    source: e,
                };
                log::error!("Worker {}: {}", id, err);
                Worker::idle(id)
            }
        }
    }

    /// Starts serving on a duplicate of an already bound `socket`.
    pub fn secondary(id: usize, socket: &TcpListener, dispatch: Arc<dyn Dispatch>) -> Self {
        match socket.try_clone() {
            Ok(listener) => Worker::start(id, listener, dispatch),
            Err(e) => {
                log::error!("Worker {}: failed to share the listening socket: {}", id, e);
                Worker::idle(id)
            }
        }
    }

    /// A worker that serves nothing.
    pub(crate) fn idle(id: usize) -> Self {
        Worker {
            id,
            listener: None,
            shutdown: None,
            thread: None,
        }
    }

    fn start(id: usize, listener: TcpListener, dispatch: Arc<dyn Dispatch>) -> Self {
        let accept_socket = match listener.try_clone() {
            Ok(socket) => socket,
            Err(e) => {
                log::error!("Worker {}: failed to duplicate the listening socket: {}", id, e);
                return Worker::idle(id);
            }
        };

        let (shutdown, signal) = oneshot::channel();
        let spawned = thread::Builder::new()
            .name(format!("microhost-worker-{}", id))
            .spawn(move || run(id, accept_socket, dispatch, signal));

        match spawned {
            Ok(thread) => Worker {
                id,
                listener: Some(listener),
                shutdown: Some(shutdown),
                thread: Some(thread),
            },
            Err(e) => {
                log::error!("Worker {}: {}", id, ServiceError::ThreadSpawn(e));
                Worker::idle(id)
            }
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// The listening socket, if this worker is serving.
    pub fn socket(&self) -> Option<&TcpListener> {
        self.listener.as_ref()
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.as_ref().and_then(|l| l.local_addr().ok())
    }

    /// Whether the worker has a socket and a running event loop.
    pub fn is_serving(&self) -> bool {
        self.listener.is_some() && self.thread.as_ref().map_or(false, |t| !t.is_finished())
    }

    /// Asks the event loop to exit without waiting for it.
    pub(crate) fn signal(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }

    /// Waits for the worker thread to finish.
    pub(crate) fn join(&mut self) {
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::error!("Worker {}: thread panicked", self.id);
            }
        }
    }

    /// Stops the event loop, joins the thread, then closes the socket.
    pub fn stop(&mut self) {
        self.signal();
        self.join();
        self.listener = None;
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.stop();
    }
}

fn bind(address: &str, port: u16) -> io::Result<TcpListener> {
    let listener = TcpListener::bind((address, port))?;
    listener.set_nonblocking(true)?;
    Ok(listener)
}

/// Body of the worker thread: build the event loop and run the accept loop
/// until shutdown. Connections still open when the loop exits are dropped
/// together with the runtime.
fn run(
    id: usize,
    listener: TcpListener,
    dispatch: Arc<dyn Dispatch>,
    shutdown: oneshot::Receiver<()>,
) {
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            log::error!("Worker {}: {}", id, ServiceError::Runtime(e));
            return;
        }
    };

    log::debug!("Worker {} started", id);
    runtime.block_on(accept_loop(id, listener, dispatch, shutdown));
    log::debug!("Worker {} stopped", id);
}

async fn accept_loop(
    id: usize,
    listener: TcpListener,
    dispatch: Arc<dyn Dispatch>,
    mut shutdown: oneshot::Receiver<()>,
) {
    let listener = match listener
        .set_nonblocking(true)
        .and_then(|()| tokio::net::TcpListener::from_std(listener))
    {
        Ok(listener) => listener,
        Err(e) => {
            log::error!("Worker {}: failed to register the listening socket: {}", id, e);
            return;
        }
    };

    let mut http = Http::new();
    http.http1_keep_alive(true);

    loop {
        tokio::select! {
            biased;
            _ = &mut shutdown => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    if let Err(e) = stream.set_nodelay(true) {
                        log::debug!("Worker {}: set_nodelay failed for {}: {}", id, peer, e);
                    }
                    // Wait for the request head so it is dispatched here
                    // before this loop accepts another connection.
                    let _ = tokio::time::timeout(FIRST_REQUEST_WAIT, stream.readable()).await;

                    let dispatch = Arc::clone(&dispatch);
                    let service = service_fn(move |request| {
                        let dispatch = Arc::clone(&dispatch);
                        async move {
                            Ok::<_, Infallible>(serve(dispatch.as_ref(), request, peer).await)
                        }
                    });

                    let connection = http.serve_connection(stream, service);
                    tokio::spawn(async move {
                        if let Err(e) = connection.await {
                            log::debug!("Worker {}: connection error: {}", id, e);
                        }
                    });
                    // Let the new connection run its dispatch first. While a
                    // handler blocks this thread, idle workers take the backlog.
                    tokio::task::yield_now().await;
                }
                Err(e) => {
                    log::error!("Worker {}: accept failed: {}", id, e);
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            }
        }
    }
}

/// Translates one hyper request, dispatches it and translates the response back.
async fn serve(
    dispatch: &dyn Dispatch,
    request: hyper::Request<Body>,
    peer: SocketAddr,
) -> hyper::Response<Body> {
    let (parts, body) = request.into_parts();
    let body = match hyper::body::to_bytes(body).await {
        Ok(body) => body,
        Err(e) => {
            log::error!("Failed to read request body from {}: {}", peer, e);
            let mut response = Response::for_client(&peer.ip().to_string());
            response.set_error(StatusCode::BAD_REQUEST, "failed to read request body");
            return response.into_hyper();
        }
    };

    let mut request = Request::from_parts(&parts, body, peer);
    dispatch_request(dispatch, &mut request).into_hyper()
}
