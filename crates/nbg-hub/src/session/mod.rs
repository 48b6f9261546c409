//! Session management

mod manager;
mod reclaimer;
mod token;

pub use manager::{IdleRecord, LoginGuard, Session, SessionManager, SessionRecord};
pub use reclaimer::{classify, IdleReclaimer, IdleVerdict, SweepReport};
pub use token::{Claims, TokenCodec};
