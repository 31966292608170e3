pub mod analysis;
pub mod artists;
pub mod charts;
pub mod countries;
pub mod loader;
pub mod seed;
pub mod users;
