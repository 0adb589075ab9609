//! Provider API clients.
//!
//! One thin reqwest client per third-party integration, holding the
//! credentials and base URLs it needs. Base URLs are configurable so tests
//! can point them at a mock server.

pub mod google;
pub mod square;
pub mod stripe;

pub use google::GoogleProvider;
pub use square::SquareProvider;
pub use stripe::StripeProvider;
