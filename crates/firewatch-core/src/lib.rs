pub mod error;
pub mod model;
pub mod store;
pub mod views;

pub use error::*;
pub use model::*;
pub use store::*;
pub use views::*;
