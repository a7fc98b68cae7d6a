pub mod cookies;
pub mod delivery;
pub mod error;
pub mod linkedin;
pub mod session;
