pub mod conversation_store;
pub mod documents;
pub mod message_log;
pub mod references;
pub mod session;

pub use conversation_store::{ConversationGroups, ConversationStore};
pub use documents::DocumentSelection;
pub use message_log::MessageLog;
pub use references::{ReferencePanel, ReferenceViewer};
pub use session::SessionState;
