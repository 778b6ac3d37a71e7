pub mod identity;
pub mod message;
pub mod queue;
pub mod report;
pub mod session;

pub use identity::{Identity, IdentityResolver, StaticIdentityResolver, Tier};
pub use message::{BlockReason, Message, ModerationOutcome, ModerationVerdict, PostOutcome};
pub use queue::{JoinOutcome, LookingFor, QueueEntry, QueueStatus};
pub use report::{Report, ReportCategory};
pub use session::{ChatSession, EndReason, SessionState};
