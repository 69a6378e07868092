pub mod chat_session;
pub mod conversations;
pub mod poller;
pub mod streaming;

pub use chat_session::ChatSession;
pub use poller::{PollOutcome, PollingReconciler};
pub use streaming::SendOutcome;
