mod attachment;
mod message;
mod session;

pub use attachment::Attachment;
pub use message::{ChatMessage, Role};
pub(crate) use session::SessionHeader;
pub use session::{Session, SessionDocument, SessionId, SessionSummary};
