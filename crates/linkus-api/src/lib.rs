pub mod auth;
pub mod config;
pub mod contacts;
pub mod conversations;
pub mod convert;
pub mod email;
pub mod error;
pub mod extract;
pub mod messages;
pub mod middleware;
pub mod pages;
pub mod rate_limit;

use axum::{
    Router,
    middleware::from_fn_with_state,
    routing::{delete, get, post},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::auth::AppState;
use crate::middleware::require_auth;
use crate::rate_limit::{limit_auth, limit_general};

/// The full HTTP surface. Serve it with
/// `into_make_service_with_connect_info::<SocketAddr>()` so the limiters can
/// key on the client address.
pub fn router(state: AppState) -> Router {
    let credential_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route_layer(from_fn_with_state(state.clone(), limit_auth));

    let public_routes = Router::new()
        .route("/auth/verify-email/{token}", get(auth::verify_email))
        .route_layer(from_fn_with_state(state.clone(), limit_general));

    // require_auth runs first so the limiter can key on the user
    let protected_routes = Router::new()
        .route("/conversations", get(conversations::list_conversations))
        .route("/conversations/private", post(conversations::open_private))
        .route("/conversations/group", post(conversations::create_group))
        .route("/conversations/{conversation_id}", delete(conversations::leave_conversation))
        .route(
            "/conversations/{conversation_id}/participants",
            post(conversations::add_participant),
        )
        .route(
            "/conversations/{conversation_id}/messages",
            get(messages::get_messages).post(messages::send_message),
        )
        .route("/conversations/{conversation_id}/read", post(conversations::mark_read))
        .route("/messages/search", get(messages::search_messages))
        .route("/contacts", get(contacts::list_contacts).post(contacts::add_contact))
        .route(
            "/contacts/{user_id}",
            get(contacts::is_contact).delete(contacts::remove_contact),
        )
        .route_layer(from_fn_with_state(state.clone(), limit_general))
        .route_layer(from_fn_with_state(state.clone(), require_auth));

    let api = Router::new()
        .merge(credential_routes)
        .merge(public_routes)
        .merge(protected_routes);

    Router::new()
        .nest("/api", api)
        .route("/health", get(health))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}
