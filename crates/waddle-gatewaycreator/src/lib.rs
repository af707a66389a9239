pub mod creator;
pub mod db;
pub mod error;
pub mod types;

pub use creator::GatewayCreator;
pub use db::GatewayStore;
pub use error::{GatewayCreatorError, Result};
pub use types::{Gateway, PlatformServer};
