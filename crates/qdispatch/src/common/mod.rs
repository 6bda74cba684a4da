pub mod error;
pub mod fsutils;
pub mod lockfile;
pub mod setup;
pub mod timeutils;
