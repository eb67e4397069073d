//! Command scheduling, dispatch, and the handler protocol.

pub mod command_scheduler;
pub mod handler;
pub mod registry;

pub use command_scheduler::{
    CommandScheduler, QueueSnapshot, COLLISION_WINDOW, DESTROY_HORIZON, RESPONSE_TIMEOUT,
};
pub use handler::{CommandHandler, ResponsePattern};
pub use registry::CommandRegistry;
