//! Schedule - cron parsing and the in-process job scheduler.

pub mod catalog;
pub mod cron;
pub mod scheduler;

pub use self::catalog::JobCatalog;
pub use self::cron::CronExpr;
pub use self::scheduler::{Dispatch, Registration, Scheduler};
