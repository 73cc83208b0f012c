pub mod models;
pub mod money;
pub mod pii;

pub use money::{Money, MoneyError};
pub use pii::Masked;
