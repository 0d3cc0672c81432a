//! HTTP route handlers for the patient portal.
//!
//! # Route Structure
//!
//! ```text
//! GET    /health                                      - Liveness check
//!
//! # Auth
//! POST   /api/auth/login                              - Log in, set session cookies
//! POST   /api/auth/logout                             - Clear session cookies
//! GET    /api/auth/auto-login                         - Token hand-off from another site
//!
//! # Patient (CRM, bearer token from cookies)
//! GET    /api/user/profile                            - Profile
//! POST   /api/user/profile                            - Update profile (JSON or multipart)
//! GET    /api/orders                                  - Orders
//! GET    /api/user/orders                             - Orders, paged
//! GET    /api/user/order/invoice/download/{orderId}   - Invoice PDF
//! GET    /api/user/subscriptions                      - Subscriptions
//! GET    /api/user/subscription/{id}                  - One subscription
//! PUT    /api/user/subscription/update/quantity/{id}  - Change line item quantity
//! POST   /api/user/pause-cancel-subscription          - Pause or cancel
//! POST   /api/user/change-refill-date                 - Move next refill
//! POST   /api/user/refill-subscription-renewal        - Renew early
//! GET    /api/user/prescriptions                      - Prescriptions
//! GET    /api/user/prescription/{id}                  - One prescription
//! GET    /api/user/{userId}/documents                 - Documents
//! POST   /api/user/{userId}/documents                 - Upload a document
//! PATCH  /api/user/billing/address/update             - Billing (and shipping) address
//! PATCH  /api/user/shipping/address/update            - Shipping address
//! PATCH  /api/user/payment/profiles/update            - Payment profiles
//! GET    /api/user/{userId}/payment/profiles          - Payment profiles
//! GET    /api/user/medical-profile                    - Medical profile
//! POST   /api/user/medical-profile                    - Save medical profile
//! GET    /api/user/consultations                      - Consultations
//! GET    /api/user/appointments                       - Booked meetings
//!
//! # Messenger (userId cookie)
//! POST   /api/messenger/session                       - Chat login URL
//! GET    /api/messenger/unread-count                  - Unread messages
//! GET    /api/messenger/subscription-thread           - Thread for a subscription
//! GET    /api/messenger/threads/search-by-participants - Thread search
//!
//! # Store (no session)
//! GET    /api/cart                                    - Store cart
//! POST   /api/cart/add-item                           - Add to cart
//! GET    /api/cart/checkout-url                       - Checkout redirect URL
//! GET    /api/products/{productId}/variations         - Product variations
//! POST   /api/postcanada/address-details              - Address autocomplete
//! ```

pub mod auth;
pub mod billing;
pub mod extract;
pub mod messenger;
pub mod orders;
pub mod postcanada;
pub mod profile;
pub mod records;
pub mod store;
pub mod subscriptions;

use axum::{
    Router,
    extract::{DefaultBodyLimit, Request},
    middleware as axum_middleware,
    routing::{get, patch, post, put},
};
use tower_http::trace::TraceLayer;

use crate::middleware::request_id_middleware;
use crate::state::AppState;

/// Create the auth routes router.
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/login", post(auth::login))
        .route("/logout", post(auth::logout))
        .route("/auto-login", get(auth::auto_login))
}

/// Create the patient routes router.
pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/profile",
            get(profile::show)
                .post(profile::update)
                .layer(DefaultBodyLimit::max(extract::UPLOAD_BODY_LIMIT)),
        )
        .route("/orders", get(orders::paged))
        .route("/order/invoice/download/{order_id}", get(orders::invoice))
        .route("/subscriptions", get(subscriptions::index))
        .route("/subscription/{id}", get(subscriptions::show))
        .route(
            "/subscription/update/quantity/{id}",
            put(subscriptions::update_quantity),
        )
        .route(
            "/pause-cancel-subscription",
            post(subscriptions::pause_or_cancel),
        )
        .route(
            "/change-refill-date",
            post(subscriptions::change_refill_date),
        )
        .route(
            "/refill-subscription-renewal",
            post(subscriptions::refill_renewal),
        )
        .route("/prescriptions", get(records::prescriptions))
        .route("/prescription/{id}", get(records::prescription))
        .route(
            "/{user_id}/documents",
            get(records::documents)
                .post(records::upload_document)
                .layer(DefaultBodyLimit::max(extract::UPLOAD_BODY_LIMIT)),
        )
        .route(
            "/billing/address/update",
            patch(billing::update_billing_address),
        )
        .route(
            "/shipping/address/update",
            patch(billing::update_shipping_address),
        )
        .route(
            "/payment/profiles/update",
            patch(billing::update_payment_profiles),
        )
        .route(
            "/{user_id}/payment/profiles",
            get(billing::payment_profiles),
        )
        .route(
            "/medical-profile",
            get(records::medical_profile).post(records::update_medical_profile),
        )
        .route("/consultations", get(records::consultations))
        .route("/appointments", get(records::appointments))
}

/// Create the messenger routes router.
pub fn messenger_routes() -> Router<AppState> {
    Router::new()
        .route("/session", post(messenger::session))
        .route("/unread-count", get(messenger::unread_count))
        .route("/subscription-thread", get(messenger::subscription_thread))
        .route(
            "/threads/search-by-participants",
            get(messenger::search_by_participants),
        )
}

/// Create the cart routes router.
pub fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(store::cart))
        .route("/add-item", post(store::add_item))
        .route("/checkout-url", get(store::checkout_url))
}

/// Create all API routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .nest("/api/auth", auth_routes())
        .route("/api/orders", get(orders::index))
        .nest("/api/user", user_routes())
        .nest("/api/messenger", messenger_routes())
        .nest("/api/cart", cart_routes())
        .route(
            "/api/products/{product_id}/variations",
            get(store::variations),
        )
        .route(
            "/api/postcanada/address-details",
            post(postcanada::address_details),
        )
}

/// The complete application: health check, API routes and the per-request
/// layers, bound to `state`.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .merge(routes())
        .layer(axum_middleware::from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http().make_span_with(|request: &Request| {
            tracing::info_span!(
                "request",
                method = %request.method(),
                uri = %request.uri(),
                request_id = tracing::field::Empty,
            )
        }))
        .with_state(state)
}

/// Liveness health check endpoint.
///
/// Returns "ok" if the server is running. Does not check upstreams.
async fn health() -> &'static str {
    "ok"
}
