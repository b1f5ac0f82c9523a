pub mod clock;
pub mod config;
pub mod error;
pub mod follow;
pub mod geolocation;
pub mod location;
pub mod models;
pub mod policy;
pub mod presence;
pub mod render;
pub mod session;
pub mod store;

pub use error::{AppError, GeoError, StoreError, SubscriptionError};
pub use session::{MapStatus, MapView, Session, SessionDeps, SessionSettings};
