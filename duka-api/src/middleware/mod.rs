pub mod auth;

pub use auth::{access_guard, Claims, Principal};
