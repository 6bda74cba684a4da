pub mod cluster;
pub mod common;
pub mod dispatch;

pub type Error = crate::common::error::DispatchError;
pub type Result<T> = std::result::Result<T, Error>;
