//! Account records, persistence, and the live instance directory.

pub mod accounts;
pub mod instances;
pub mod storage;

pub use accounts::AccountManager;
pub use instances::{InstanceDirectory, InstanceHandle};
pub use storage::AccountStore;
