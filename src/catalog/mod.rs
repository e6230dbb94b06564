pub mod currency;
pub mod models;
pub mod transform;

pub use models::CanonicalItem;
pub use transform::{TransformContext, TransformError};
