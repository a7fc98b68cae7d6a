pub mod credits;
pub mod posts;
pub mod users;
