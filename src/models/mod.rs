mod live_set;
mod location;
mod presence;
pub mod user;

pub use live_set::LiveLocationSet;
pub use location::{Coordinates, Location, Position};
pub use presence::PresenceRecord;
pub use user::UserProfile;
