//! Repository layer wrapping SeaORM operations on the portal's tables.

pub mod client;
pub mod oauth_state;

pub use client::ClientRepository;
pub use oauth_state::OAuthStateRepository;
