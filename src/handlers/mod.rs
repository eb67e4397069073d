//! Feature handlers and the startup registration list.
//!
//! One module per feature category. Registration is explicit and
//! ordered — the registry resolves free-text keywords in this order.

pub mod bounty;
pub mod fishing;
pub mod garden;
pub mod meditation;
pub mod profile;
pub mod realm;
pub mod zoo;

use std::sync::Arc;

use regex::Captures;

use crate::scheduler::CommandRegistry;
use crate::Result;

/// Build the full dispatch table.
///
/// # Errors
///
/// Returns [`AppError::Config`](crate::AppError::Config) when a
/// pattern fails to compile or a category/command-type collides.
pub fn build_registry() -> Result<CommandRegistry> {
    let mut registry = CommandRegistry::new();
    registry.register(Arc::new(profile::ProfileHandler::new()?))?;
    registry.register(Arc::new(meditation::MeditationHandler::new()?))?;
    registry.register(Arc::new(garden::GardenHandler::new()?))?;
    registry.register(Arc::new(bounty::BountyHandler::new()?))?;
    registry.register(Arc::new(realm::SecretRealmHandler::new()?))?;
    registry.register(Arc::new(zoo::ZooHandler::new()?))?;
    registry.register(Arc::new(fishing::FishingHandler::new()?))?;
    Ok(registry)
}

pub(crate) fn named_u32(caps: &Captures<'_>, name: &str) -> Option<u32> {
    caps.name(name).and_then(|m| m.as_str().parse().ok())
}
