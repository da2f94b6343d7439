pub mod identity;
pub mod ride;
pub mod ride_match;
pub mod route;
