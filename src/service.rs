use std::net::SocketAddr;
use std::sync::Arc;

use hyper::Method;

use crate::config::ServiceConfig;
use crate::error::{Result, ServiceError};
use crate::health::{self, HealthCheck, HealthReport, Probe};
use crate::http::{Request, Response};
use crate::pool::WorkerPool;
use crate::router::{Dispatcher, Router};

/// A configurable HTTP microservice.
///
/// Routes and health probes are registered while the service is stopped.
/// [`MicroService::start`] freezes them into a shared snapshot and starts the
/// worker pool; [`MicroService::stop`] (or dropping the service) shuts every
/// worker down.
///
/// ```no_run
/// use microhost::{MicroService, Method, ServiceConfig};
///
/// # fn main() -> microhost::Result<()> {
/// let mut service = MicroService::new(ServiceConfig::new()?)?;
/// service.add_handler(Method::GET, "/hello/(\\w+)", |req, resp| {
///     resp.data_mut().set_text(format!("hello {}", req.uri().sub_match(1)));
/// })?;
/// service.start()?;
/// # Ok(())
/// # }
/// ```
pub struct MicroService {
    config: ServiceConfig,
    router: Router,
    probes: Vec<Probe>,
    pool: Option<WorkerPool>,
}

impl MicroService {
    /// Creates a stopped service from a configuration snapshot.
    ///
    /// # Errors
    /// Fails if the configured prefix does not form a valid route pattern.
    pub fn new(config: ServiceConfig) -> Result<Self> {
        let mut service = MicroService {
            router: Router::new(config.service.prefix.clone()),
            config: ServiceConfig::default(),
            probes: Vec::new(),
            pool: None,
        };
        service.reload(config)?;
        Ok(service)
    }

    pub fn name(&self) -> &str {
        &self.config.service.name
    }

    pub fn prefix(&self) -> &str {
        self.router.prefix()
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Registers `handler` for `method` on `path` below the prefix.
    ///
    /// See [`Router::add`] for the pattern rules.
    ///
    /// # Errors
    /// `AlreadyServing` while the service is running, `InvalidRoute` if the
    /// pattern does not compile.
    pub fn add_handler<F>(&mut self, method: Method, path: &str, handler: F) -> Result<()>
    where
        F: Fn(&Request, &mut Response) + Send + Sync + 'static,
    {
        self.ensure_stopped()?;
        self.router.add(method, path, handler)
    }

    /// Appends health probes; they run in order on every health request.
    ///
    /// # Errors
    /// `AlreadyServing` while the service is running.
    pub fn add_check_functions<I>(&mut self, probes: I) -> Result<()>
    where
        I: IntoIterator<Item = Probe>,
    {
        self.ensure_stopped()?;
        self.probes.extend(probes);
        Ok(())
    }

    /// Appends a single health probe.
    ///
    /// # Errors
    /// `AlreadyServing` while the service is running.
    pub fn add_check_function<F>(&mut self, probe: F) -> Result<()>
    where
        F: Fn() -> HealthReport + Send + Sync + 'static,
    {
        self.add_check_functions(std::iter::once(Arc::new(probe) as Probe))
    }

    fn ensure_stopped(&self) -> Result<()> {
        if self.is_running() {
            Err(ServiceError::AlreadyServing)
        } else {
            Ok(())
        }
    }

    /// Starts the worker pool. Does nothing if the service is already running.
    ///
    /// A bind failure does not fail this call: it is logged and the pool
    /// serves nothing, which [`MicroService::serving_workers`] reports as 0.
    pub fn start(&mut self) -> Result<()> {
        if self.is_running() {
            return Ok(());
        }

        let settings = &self.config.service;
        log::info!(
            "HTTP server parameters {}:{}",
            settings.address,
            settings.port
        );

        let dispatcher = Dispatcher::new(
            self.router.clone(),
            HealthCheck::new(settings.name.clone(), self.probes.clone()),
        );
        self.pool = Some(WorkerPool::new(
            self.config.bind_address(),
            settings.port,
            settings.pool_size,
            Arc::new(dispatcher),
        ));
        Ok(())
    }

    /// Stops and joins every worker. Does nothing if the service is stopped.
    pub fn stop(&mut self) {
        if let Some(mut pool) = self.pool.take() {
            pool.shutdown();
        }
    }

    pub fn is_running(&self) -> bool {
        self.pool.is_some()
    }

    /// The bound address while running.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.pool.as_ref().and_then(WorkerPool::local_addr)
    }

    pub fn serving_workers(&self) -> usize {
        self.pool.as_ref().map_or(0, WorkerPool::serving)
    }

    /// Runs the registered probes outside of an HTTP request.
    pub fn health_check(&self) -> HealthReport {
        HealthCheck::new(self.name(), self.probes.clone()).run()
    }

    /// Applies a new configuration.
    ///
    /// Stops the pool, drops every registered route and probe, installs
    /// the default directory probe and the health route, and restarts the
    /// pool if it was running. Handlers must be registered again afterwards,
    /// which requires stopping the service first.
    ///
    /// # Errors
    /// Fails if the new prefix does not form a valid route pattern; the
    /// service is then left stopped.
    pub fn reload(&mut self, config: ServiceConfig) -> Result<()> {
        let was_running = self.is_running();
        self.stop();

        self.router = Router::new(config.service.prefix.clone());
        self.probes.clear();

        if config.dirs.is_empty() {
            log::warn!("No directories configured, directory health check disabled");
        } else {
            self.probes.push(health::directories_probe(config.dirs.clone()));
        }
        self.config = config;
        self.router.add_health()?;

        if was_running {
            self.start()?;
        }
        Ok(())
    }
}

impl Drop for MicroService {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DirectoryConfig;
    use crate::health::HealthStatus;
    use crate::worker::tests::http_request;

    fn local_config(name: &str) -> ServiceConfig {
        let mut config = ServiceConfig::default();
        config.service.name = name.to_string();
        config.service.address = "127.0.0.1".to_string();
        config.service.port = 0;
        config.service.pool_size = 2;
        config
    }

    #[test]
    fn test_defaults() {
        let service = MicroService::new(ServiceConfig::default()).unwrap();
        assert_eq!(service.name(), "Unknown");
        assert_eq!(service.prefix(), "/api/v1");
        assert!(!service.is_running());
        assert_eq!(service.serving_workers(), 0);
        assert_eq!(service.health_check().status(), HealthStatus::Ok);
    }

    /// Tests the health endpoint end to end over a socket.
    #[test]
    fn test_health_endpoint() {
        let mut service = MicroService::new(local_config("inventory")).unwrap();
        service
            .add_check_function(|| HealthReport::new("db", HealthStatus::Critical, "down"))
            .unwrap();
        service.start().unwrap();
        let addr = service.local_addr().unwrap();

        let (status, body) = http_request(addr, "GET", "/api/v1/health");
        assert_eq!(status, 200);
        let report: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(report["status"], "critical");
        assert_eq!(report["name"], "inventory");
        assert_eq!(report["check_reports"][0]["name"], "db");
        assert_eq!(report["check_reports"][0]["message"], "down");
    }

    #[test]
    fn test_handlers_and_not_found() {
        let mut service = MicroService::new(local_config("svc")).unwrap();
        service
            .add_handler(Method::GET, "/items/(\\d+)/", |req, resp| {
                let id = req.uri().sub_match(1).to_string();
                resp.data_mut().set_text(id);
            })
            .unwrap();
        service.start().unwrap();
        assert_eq!(service.serving_workers(), 2);
        let addr = service.local_addr().unwrap();

        assert_eq!(http_request(addr, "GET", "/api/v1/items/42"), (200, "42".to_string()));
        assert_eq!(http_request(addr, "GET", "/api/v1/items/42/"), (200, "42".to_string()));
        assert_eq!(http_request(addr, "GET", "/api/v1/items/x").0, 404);
        assert_eq!(http_request(addr, "DELETE", "/api/v1/items/42").0, 404);
    }

    #[test]
    fn test_registration_while_running_is_rejected() {
        let mut service = MicroService::new(local_config("svc")).unwrap();
        service.start().unwrap();

        let err = service
            .add_handler(Method::GET, "/late", |_req, _resp| {})
            .unwrap_err();
        assert!(matches!(err, ServiceError::AlreadyServing));
        let err = service
            .add_check_function(|| HealthReport::ok("late"))
            .unwrap_err();
        assert!(matches!(err, ServiceError::AlreadyServing));

        service.stop();
        assert!(!service.is_running());
        service
            .add_handler(Method::GET, "/late", |_req, _resp| {})
            .unwrap();
    }

    /// Tests that reload drops user routes and probes and restarts the pool.
    #[test]
    fn test_reload() {
        let mut service = MicroService::new(local_config("before")).unwrap();
        service
            .add_handler(Method::GET, "/ping", |_req, _resp| {})
            .unwrap();
        service
            .add_check_function(|| HealthReport::new("db", HealthStatus::Warning, "slow"))
            .unwrap();
        service.start().unwrap();

        let mut config = local_config("after");
        config.service.prefix = "/api/v2".to_string();
        config.dirs.insert(
            "tmp".to_string(),
            DirectoryConfig::new(std::env::temp_dir().to_string_lossy(), "r"),
        );
        service.reload(config).unwrap();

        assert!(service.is_running());
        assert_eq!(service.name(), "after");
        let addr = service.local_addr().unwrap();

        assert_eq!(http_request(addr, "GET", "/api/v1/ping").0, 404);
        assert_eq!(http_request(addr, "GET", "/api/v2/ping").0, 404);

        let (status, body) = http_request(addr, "GET", "/api/v2/health");
        assert_eq!(status, 200);
        let report: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(report["name"], "after");
        assert_eq!(report["status"], "ok");
        assert_eq!(report["check_reports"][0]["name"], health::DIRECTORIES_CHECK);
    }

    #[test]
    fn test_invalid_route_is_reported() {
        let mut service = MicroService::new(ServiceConfig::default()).unwrap();
        let err = service
            .add_handler(Method::GET, "/[", |_req, _resp| {})
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidRoute { .. }));
    }
}
