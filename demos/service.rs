//! An inventory microservice built on microhost.
//!
//! Shows handlers that share application state through an `Arc`, a custom
//! health probe and the built-in health endpoint.
//!
//! ```bash
//! MICROHOST_SERVICE__PORT=8080 RUST_LOG=info cargo run --example service
//! curl http://127.0.0.1:8080/api/v1/items/
//! curl -X POST -d 'bolt' http://127.0.0.1:8080/api/v1/items
//! curl http://127.0.0.1:8080/api/v1/items/0
//! curl http://127.0.0.1:8080/api/v1/health
//! ```

use std::sync::{Arc, Mutex};

use microhost::{
    HealthReport, HealthStatus, MicroService, Method, Request, Response, ServiceConfig, StatusCode,
};

/// Application state shared by every handler.
#[derive(Default)]
struct Inventory {
    items: Mutex<Vec<String>>,
}

impl Inventory {
    fn list(&self, _req: &Request, resp: &mut Response) {
        let items = self.items.lock().unwrap_or_else(|e| e.into_inner());
        if let Err(e) = resp.data_mut().set_json(&*items) {
            resp.set_error(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string());
        }
    }

    fn get(&self, req: &Request, resp: &mut Response) {
        let items = self.items.lock().unwrap_or_else(|e| e.into_inner());
        let item = req
            .uri()
            .sub_match(1)
            .parse::<usize>()
            .ok()
            .and_then(|index| items.get(index));

        match item {
            Some(item) => resp.data_mut().set_text(item.clone()),
            None => resp.set_error(StatusCode::NOT_FOUND, "no such item"),
        }
    }

    fn add(&self, req: &Request, resp: &mut Response) {
        let name = match req.data().as_str() {
            Some(name) if !name.trim().is_empty() => name.trim().to_string(),
            _ => return resp.set_error(StatusCode::BAD_REQUEST, "item name required"),
        };

        let mut items = self.items.lock().unwrap_or_else(|e| e.into_inner());
        items.push(name);
        resp.set_code(StatusCode::CREATED);
        resp.data_mut().set_text((items.len() - 1).to_string());
    }

    fn health(&self) -> HealthReport {
        let count = self.items.lock().map(|items| items.len());
        match count {
            Ok(count) if count < 1000 => HealthReport::ok("inventory"),
            Ok(count) => HealthReport::new(
                "inventory",
                HealthStatus::Warning,
                format!("{} items stored", count),
            ),
            Err(_) => HealthReport::new("inventory", HealthStatus::Critical, "state poisoned"),
        }
    }
}

#[tokio::main]
async fn main() -> microhost::Result<()> {
    pretty_env_logger::init();

    let inventory = Arc::new(Inventory::default());
    let mut service = MicroService::new(ServiceConfig::new()?)?;

    let state = Arc::clone(&inventory);
    service.add_handler(Method::GET, "/items/", move |req, resp| state.list(req, resp))?;
    let state = Arc::clone(&inventory);
    service.add_handler(Method::GET, "/items/(\\d+)", move |req, resp| state.get(req, resp))?;
    let state = Arc::clone(&inventory);
    service.add_handler(Method::POST, "/items", move |req, resp| state.add(req, resp))?;

    let state = Arc::clone(&inventory);
    service.add_check_function(move || state.health())?;

    service.start()?;
    log::info!(
        "{} serving with {} workers, press Ctrl-C to stop",
        service.name(),
        service.serving_workers()
    );

    tokio::signal::ctrl_c().await?;
    service.stop();
    Ok(())
}
