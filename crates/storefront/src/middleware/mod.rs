//! HTTP middleware stack for the API.
//!
//! # Middleware Order (outermost first)
//!
//! 1. Sentry layers (hub per request, transactions)
//! 2. `TraceLayer` (request span)
//! 3. Request ID (recorded on the span and returned to the client)
//! 4. CORS
//! 5. Security headers
//! 6. Rate limiting on sign-in routes (governor)
//! 7. Sessions on the Google sign-in routes (tower-sessions)
//!
//! Authentication is not a layer: handlers take `RequireClient`,
//! `OptionalClient`, or `RequireAdmin` and the `CartIdHeader` extractor.

pub mod auth;
pub mod cart_header;
pub mod rate_limit;
pub mod request_id;
pub mod security_headers;
pub mod session;

pub use auth::{OptionalClient, RequireAdmin, RequireClient};
pub use cart_header::{CART_ID_HEADER, CartIdHeader};
pub use rate_limit::login_rate_limiter;
pub use request_id::{REQUEST_ID_HEADER, request_id_middleware};
pub use security_headers::security_headers_middleware;
pub use session::create_session_layer;
