// Library exports for the consulta chat client

pub mod api;
pub mod attachments;
pub mod chat;
pub mod config;
pub mod logger;
pub mod notify;
pub mod registry;
pub mod reveal;
pub mod session;
pub mod store;
pub mod sync;

// Re-export commonly used types
pub use chat::{AttachmentMeta, ChatMessage, MessageDelta, MessageRole};
pub use registry::{SessionRegistry, SharedRegistry};
pub use session::{ChatSession, SessionMode};
pub use store::MessageStore;
pub use sync::SyncController;
