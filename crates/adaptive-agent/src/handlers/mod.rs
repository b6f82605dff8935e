pub mod cache;
pub mod health;
pub mod learning;
pub mod optimizer;
pub mod performance;
pub mod session;
