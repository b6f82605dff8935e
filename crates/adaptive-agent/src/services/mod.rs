pub mod agent;
pub mod cache;
pub mod collaborators;
pub mod conversation;
pub mod learning;
pub mod optimizer;
pub mod telemetry;

pub use agent::{AdaptiveAgent, AgentConfig, AgentReply, Collaborators};
