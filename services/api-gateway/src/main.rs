//! API gateway
//!
//! Single entry point for the admin UI. Requests are forwarded to the auth,
//! IP inventory, or audit query upstream, with failures normalized into
//! stable JSON envelopes: upstream responses pass through untouched, an
//! unreachable upstream becomes 503, anything unexpected becomes 500, and
//! locally rejected input becomes 422.

use api_gateway::{handlers, AppState};
use ipledger::prelude::*;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load_named(env!("CARGO_PKG_NAME"))?;
    init_tracing(&config)?;

    let gateway = config.require_gateway()?.clone();
    info!(
        auth = %gateway.auth_url,
        inventory = %gateway.inventory_url,
        audit = %gateway.audit_url,
        "Upstreams configured"
    );

    let state = AppState::from_config(&gateway, config.service.debug)?;
    let app = routes(state);

    Server::new(config).serve(app).await?;

    info!("API gateway stopped");
    Ok(())
}

fn routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/v1/login", post(handlers::login))
        .route("/api/v1/refresh", post(handlers::refresh))
        .route("/api/v1/logout", delete(handlers::logout))
        .route(
            "/api/v1/ip-addresses",
            get(handlers::list_ip_addresses).post(handlers::create_ip_address),
        )
        .route("/api/v1/ip-addresses/stats", get(handlers::ip_address_stats))
        .route(
            "/api/v1/ip-addresses/{id}",
            get(handlers::get_ip_address)
                .put(handlers::update_ip_address)
                .patch(handlers::update_ip_address)
                .delete(handlers::delete_ip_address),
        )
        .route("/api/v1/audit-logs", get(handlers::list_audit_logs))
        .route("/api/v1/audit-logs/{id}", get(handlers::get_audit_log))
        .route(
            "/api/v1/users",
            get(handlers::list_users).post(handlers::create_user),
        )
        .route("/api/v1/users/{id}", get(handlers::get_user))
        .with_state(state)
}
