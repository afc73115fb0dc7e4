//! Job dispatch to remote agents
//!
//! `JobDispatcher` correlates results with submissions; `JobTransport`
//! hands envelopes to agents.

mod dispatcher;
mod transport;

pub use dispatcher::JobDispatcher;
pub use transport::{JobTransport, MailboxTransport};
