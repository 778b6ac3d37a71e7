#![allow(unused_variables, dead_code, async_fn_in_trait)]

pub mod cli;
pub mod clock;
pub mod config;
pub mod error;
pub mod fanout;
pub mod http;
pub mod infra;
pub mod logging;
pub mod model;
pub mod moderation;
pub mod queue;
pub mod scheduler;
pub mod server;
pub mod session;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::ServerConfig;
pub use error::{Result, ServerError};
pub use fanout::{EventType, FanoutEvent, FanoutHub, SubscriptionHandle, Topic};
pub use model::*;
pub use moderation::{ModerationGate, ModerationService};
pub use queue::{Matchmaker, QueueManager};
pub use scheduler::Scheduler;
pub use server::PairchatServer;
pub use session::SessionCoordinator;
