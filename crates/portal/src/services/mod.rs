//! Clients for the non-CRM upstreams.
//!
//! - `woocommerce` - product variations (cached) and the Store API cart
//! - `postcanada` - Canada Post `AddressComplete` lookups
//! - `meetings` - booked consultations from the meetings API

pub mod meetings;
pub mod postcanada;
pub mod woocommerce;

pub use meetings::MeetingsClient;
pub use postcanada::{AddressQuery, PostCanadaClient};
pub use woocommerce::{StoreResponse, VariationCache, WooCommerceClient};
