//! Data models for repository operations

pub mod branch;
pub mod credential;
pub mod operation;
pub mod progress;
pub mod remote;
pub mod repository;

pub use branch::*;
pub use credential::*;
pub use operation::*;
pub use progress::*;
pub use remote::*;
pub use repository::*;
