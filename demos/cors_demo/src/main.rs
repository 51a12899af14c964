use async_trait::async_trait;
use pingora::server::Server;
use pingora_cors::error::bad_request;
use pingora_cors::{
    App, CorsConfig, CorsMiddleware, Handler, Request, Response, RouteError, Router, StatusCode,
    TracingMiddleware, WebError, WebService,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, fmt::format::FmtSpan};

#[derive(Serialize)]
struct User {
    id: u64,
    name: String,
}

#[derive(Deserialize)]
struct NewUser {
    name: String,
}

struct ListUsers;

#[async_trait]
impl Handler for ListUsers {
    async fn handle(&self, _req: Request) -> Result<Response, WebError> {
        let users = vec![
            User { id: 1, name: "ada".into() },
            User { id: 2, name: "grace".into() },
        ];
        Ok(Response::json(StatusCode::OK, users))
    }
}

struct CreateUser;

#[async_trait]
impl Handler for CreateUser {
    async fn handle(&self, req: Request) -> Result<Response, WebError> {
        let new: NewUser = serde_json::from_slice(req.body())?;
        if new.name.is_empty() {
            return Err(bad_request("name must not be empty"));
        }
        Ok(Response::json(StatusCode::CREATED, User { id: 3, name: new.name }))
    }
}

struct ShowUser;

#[async_trait]
impl Handler for ShowUser {
    async fn handle(&self, req: Request) -> Result<Response, WebError> {
        let id = req
            .param("id")
            .and_then(|s| s.parse::<u64>().ok())
            .ok_or_else(|| bad_request("id must be numeric"))?;
        Ok(Response::json(StatusCode::OK, User { id, name: format!("user-{}", id) }))
    }
}

struct DeleteUser;

#[async_trait]
impl Handler for DeleteUser {
    async fn handle(&self, _req: Request) -> Result<Response, WebError> {
        Ok(Response::empty(StatusCode::NO_CONTENT))
    }
}

fn build_router() -> Result<Router, RouteError> {
    let users = WebService::new("/users")?
        .get("", Arc::new(ListUsers))?
        .post("", Arc::new(CreateUser))?
        .get("/{id}", Arc::new(ShowUser))?
        .delete("/{id}", Arc::new(DeleteUser))?;

    let mut router = Router::new();
    router.service(users)?;
    router.get_fn("/health", |_req| Ok(Response::text(StatusCode::OK, "ok")))?;
    Ok(router)
}

/// `CORS_CONFIG` may hold a JSON document such as `{"cookies_allowed": true}`.
fn load_cors_config() -> CorsConfig {
    match std::env::var("CORS_CONFIG") {
        Ok(raw) => CorsConfig::from_json_str(&raw).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "ignoring invalid CORS_CONFIG");
            CorsConfig::default()
        }),
        Err(_) => CorsConfig::default(),
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_span_events(FmtSpan::CLOSE)
        .init();

    let router = match build_router() {
        Ok(router) => router,
        Err(e) => {
            tracing::error!(error = %e, "route registration failed");
            std::process::exit(1);
        }
    };

    let mut app = App::new(router);
    let cors = CorsMiddleware::with_config(load_cors_config(), app.route_table());
    tracing::info!(config = ?cors.config(), "CORS filter installed");
    app.use_middleware(cors);
    // Registered last so the request span wraps the CORS decision
    app.use_middleware(TracingMiddleware::new());

    tracing::info!("listening on http://localhost:8080");
    tracing::info!("try: curl -i -X OPTIONS -H 'Access-Control-Request-Method: POST' localhost:8080/users");

    if let Err(e) = run_server(app, "0.0.0.0:8080") {
        tracing::error!(error = %e, "server error");
    }
}

fn run_server(app: App, addr: &str) -> std::io::Result<()> {
    let mut server = Server::new(None).map_err(|e| std::io::Error::other(e.to_string()))?;
    server.bootstrap();

    let mut service = app.to_service("CORS demo HTTP");
    service.add_tcp(addr);
    server.add_service(service);

    server.run_forever()
}
