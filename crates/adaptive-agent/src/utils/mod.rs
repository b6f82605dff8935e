pub mod clock;
pub mod error;
pub mod logger;
pub mod retry;
pub mod schedule;
pub mod token_estimator;

pub use clock::{Clock, ManualClock, SystemClock};
pub use retry::RetryPolicy;
pub use schedule::ScheduledTask;
