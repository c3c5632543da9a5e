use std::net::SocketAddr;
use std::sync::Arc;

use crate::router::Dispatch;
use crate::worker::Worker;

/// A fixed set of workers sharing one listening socket.
///
/// Worker 0 binds the address; workers `1..size` accept on duplicates of its
/// socket. If the bind fails, every worker is idle and the pool serves
/// nothing, which [`WorkerPool::serving`] reports.
pub struct WorkerPool {
    workers: Vec<Worker>,
}

impl WorkerPool {
    pub fn new(address: &str, port: u16, size: usize, dispatch: Arc<dyn Dispatch>) -> Self {
        let size = if size == 0 {
            log::warn!("Worker pool size 0 requested, using a single worker");
            1
        } else {
            size
        };

        let primary = Worker::primary(0, address, port, Arc::clone(&dispatch));
        let mut secondaries = Vec::with_capacity(size - 1);
        for id in 1..size {
            match primary.socket() {
                Some(socket) => secondaries.push(Worker::secondary(id, socket, Arc::clone(&dispatch))),
                None => secondaries.push(Worker::idle(id)),
            }
        }

        let mut workers = Vec::with_capacity(size);
        workers.push(primary);
        workers.extend(secondaries);

        let pool = WorkerPool { workers };
        log::info!(
            "Worker pool started: {} of {} workers serving on {}:{}",
            pool.serving(),
            size,
            address,
            port
        );
        pool
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Number of workers with a running event loop.
    pub fn serving(&self) -> usize {
        self.workers.iter().filter(|w| w.is_serving()).count()
    }

    /// The bound address; useful when the pool was started on port 0.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.workers.first().and_then(Worker::local_addr)
    }

    pub fn workers(&self) -> &[Worker] {
        &self.workers
    }

    /// Signals every worker first and then joins them, so the loops wind
    /// down concurrently.
    pub fn shutdown(&mut self) {
        for worker in &mut self.workers {
            worker.signal();
        }
        for worker in &mut self.workers {
            worker.stop();
        }
        if !self.workers.is_empty() {
            log::info!("Worker pool stopped");
        }
        self.workers.clear();
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{Request, Response};
    use crate::worker::tests::http_request;
    use std::net::TcpListener;
    use std::sync::Barrier;
    use std::thread;
    use std::time::{Duration, Instant};

    fn echo_path() -> Arc<dyn Dispatch> {
        Arc::new(|request: &mut Request, response: &mut Response| {
            response.data_mut().set_text(request.uri().path().to_string());
        })
    }

    #[test]
    fn test_pool_serves_on_shared_socket() {
        let pool = WorkerPool::new("127.0.0.1", 0, 3, echo_path());
        assert_eq!(pool.len(), 3);
        assert_eq!(pool.serving(), 3);

        let addr = pool.local_addr().unwrap();
        for worker in pool.workers() {
            assert_eq!(worker.local_addr(), Some(addr));
        }

        for i in 0..6 {
            let path = format!("/req/{}", i);
            let (status, body) = http_request(addr, "GET", &path);
            assert_eq!(status, 200);
            assert_eq!(body, path);
        }
    }

    #[test]
    fn test_zero_size_runs_one_worker() {
        let pool = WorkerPool::new("127.0.0.1", 0, 0, echo_path());
        assert_eq!(pool.len(), 1);
        assert_eq!(pool.serving(), 1);
    }

    /// Tests that a bind failure yields a pool with no serving workers.
    #[test]
    fn test_bind_failure() {
        let taken = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = taken.local_addr().unwrap().port();

        let pool = WorkerPool::new("127.0.0.1", port, 2, echo_path());
        assert_eq!(pool.len(), 2);
        assert_eq!(pool.serving(), 0);
        assert!(pool.local_addr().is_none());
    }

    /// Tests that simultaneous blocking requests are spread over the workers
    /// and overlap in time, round after round.
    #[test]
    fn test_workers_run_in_parallel() {
        const DELAY: Duration = Duration::from_millis(400);
        const CLIENTS: usize = 4;

        let dispatch: Arc<dyn Dispatch> = Arc::new(|_req: &mut Request, resp: &mut Response| {
            thread::sleep(DELAY);
            let worker = thread::current().name().unwrap_or("unnamed").to_string();
            resp.data_mut().set_text(worker);
        });
        let pool = WorkerPool::new("127.0.0.1", 0, CLIENTS, dispatch);
        let addr = pool.local_addr().unwrap();

        for round in 0..5 {
            let barrier = Arc::new(Barrier::new(CLIENTS));
            let clients: Vec<_> = (0..CLIENTS)
                .map(|i| {
                    let barrier = Arc::clone(&barrier);
                    thread::spawn(move || {
                        barrier.wait();
                        let started = Instant::now();
                        let (status, body) = http_request(addr, "GET", &format!("/slow/{}", i));
                        assert_eq!(status, 200);
                        (started.elapsed(), body)
                    })
                })
                .collect();

            let results: Vec<(Duration, String)> =
                clients.into_iter().map(|c| c.join().unwrap()).collect();
            let worst = results.iter().map(|(elapsed, _)| *elapsed).max().unwrap();
            let workers: Vec<&str> = results.iter().map(|(_, w)| w.as_str()).collect();

            assert!(
                worst < DELAY * 2,
                "round {} serialized: worst {:?} on {:?}",
                round,
                worst,
                workers
            );
        }
    }

    /// Tests that shutting down waits for a request that is being dispatched
    /// and that its client still gets the full response.
    #[test]
    fn test_shutdown_completes_inflight_request() {
        let entered = Arc::new(Barrier::new(2));
        let in_handler = Arc::clone(&entered);
        let dispatch: Arc<dyn Dispatch> = Arc::new(move |_req: &mut Request, resp: &mut Response| {
            in_handler.wait();
            thread::sleep(Duration::from_millis(300));
            resp.data_mut().set_text("finished");
        });
        let mut pool = WorkerPool::new("127.0.0.1", 0, 2, dispatch);
        let addr = pool.local_addr().unwrap();

        let client = thread::spawn(move || http_request(addr, "GET", "/slow"));
        entered.wait();
        pool.shutdown();

        assert_eq!(client.join().unwrap(), (200, "finished".to_string()));
        assert_eq!(pool.serving(), 0);
    }

    #[test]
    fn test_shutdown_releases_socket() {
        let mut pool = WorkerPool::new("127.0.0.1", 0, 2, echo_path());
        let addr = pool.local_addr().unwrap();
        pool.shutdown();

        assert!(pool.is_empty());
        assert!(TcpListener::bind(addr).is_ok());
    }
}
