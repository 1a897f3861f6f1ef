use core::time::Duration;

use axum::{
    Router,
    body::Body,
    http::{
        Request, StatusCode,
        header::{AUTHORIZATION, COOKIE},
    },
    middleware::{self as ax_middleware},
    routing::{self, IntoMakeService, any},
};
use tower::ServiceBuilder;
use tower_http::{
    ServiceBuilderExt as _, cors::CorsLayer, request_id::MakeRequestUuid, timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::{
    app::AppState,
    http::{
        api,
        error::MessageBody,
        m2m,
        server::middleware::{LevelAdjustingOnFailure, api_headers_middleware},
    },
    websocket,
};

/// Creates the application router.
///
/// Dashboard and device endpoints live under `/api`, the push stream at `/ws`.
pub(crate) fn create_app_router() -> Router<AppState> {
    Router::new()
        .nest("/api", api::routes().merge(m2m::routes()))
        .route("/ws", any(websocket::ws_handler))
}

pub(crate) fn create_app(app_state: AppState) -> IntoMakeService<Router<()>> {
    let cors = if app_state.config_rx.borrow().server.allow_any_origin {
        CorsLayer::permissive()
    } else {
        CorsLayer::new()
    };

    let middleware_stack = ServiceBuilder::new()
        .sensitive_headers([AUTHORIZATION, COOKIE])
        .set_x_request_id(MakeRequestUuid)
        .propagate_x_request_id()
        .layer(TraceLayer::new_for_http().on_failure(LevelAdjustingOnFailure))
        .layer(cors)
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(30),
        ))
        .layer(ax_middleware::from_fn(api_headers_middleware));

    let app = create_app_router()
        .with_state(app_state)
        .fallback(routing::any(|req: Request<Body>| async move {
            tracing::warn!(method = %req.method(), uri = %req.uri(), "Unhandled request");
            (StatusCode::NOT_FOUND, MessageBody::new("Not found"))
        }))
        .layer(middleware_stack);

    app.into_make_service()
}
