use axum::{
    middleware,
    routing::{delete, get, post, put},
    Router,
};

use super::{handlers, middleware::device_middleware};
use crate::AppState;

pub fn create_router(state: AppState) -> Router<AppState> {
    // Auth routes
    let auth_routes = Router::new()
        .route("/otp/request", post(handlers::auth::request_otp))
        .route("/otp/verify", post(handlers::auth::verify_otp))
        .route("/logout", post(handlers::auth::logout))
        .route("/me", get(handlers::auth::me));

    // Profile routes (signed-in user)
    let profile_routes = Router::new().route(
        "/",
        get(handlers::profiles::get_profile).put(handlers::profiles::save_profile),
    );

    // Order routes
    let order_routes = Router::new()
        .route("/", post(handlers::orders::create_order))
        .route("/", get(handlers::orders::get_all_orders))
        .route("/mine", get(handlers::orders::get_my_orders))
        .route("/stats", get(handlers::orders::get_order_stats))
        .route("/:id/status", put(handlers::orders::update_order_status));

    // Inquiry routes
    let inquiry_routes = Router::new()
        .route("/", post(handlers::inquiries::create_inquiry))
        .route("/", get(handlers::inquiries::get_all_inquiries))
        .route("/mine", get(handlers::inquiries::get_my_inquiries))
        .route("/:id/status", put(handlers::inquiries::update_inquiry_status));

    // Owner dashboard inquiries, mirrored in device storage
    let dashboard_routes = Router::new()
        .route("/inquiries", post(handlers::inquiries::add_dashboard_inquiry))
        .route("/inquiries", get(handlers::inquiries::get_dashboard_inquiries))
        .route("/inquiries", delete(handlers::inquiries::clear_dashboard_inquiries))
        .route("/inquiries/:id", delete(handlers::inquiries::remove_dashboard_inquiry));

    // Product catalogue
    let product_routes = Router::new()
        .route("/", post(handlers::products::save_product))
        .route("/", get(handlers::products::get_all_products))
        .route("/:id", delete(handlers::products::delete_product));

    Router::new()
        .nest("/auth", auth_routes)
        .nest("/profile", profile_routes)
        .nest("/orders", order_routes)
        .nest("/inquiries", inquiry_routes)
        .nest("/dashboard", dashboard_routes)
        .nest("/products", product_routes)
        .layer(middleware::from_fn_with_state(state.clone(), device_middleware))
        .with_state(state)
}
