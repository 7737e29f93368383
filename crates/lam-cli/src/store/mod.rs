pub mod actor;

pub use actor::{ActorError, RegistryHandle};
