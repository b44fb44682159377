mod context;
mod model;
mod store;

pub use context::ContextStore;
pub use model::{Message, Role, Session};
pub use store::SessionStore;
