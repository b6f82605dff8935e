pub mod manager;
pub mod persistence;
pub mod signals;
pub mod types;

pub use manager::ContextManager;
pub use persistence::{PersistenceConfig, PersistenceWriter};
pub use signals::{HeuristicSignals, SignalExtractor};
pub use types::{
    validate_session_id, CommunicationStyle, ContextConfig, ContextError, ContextMetrics, Message,
    MessageMetadata, NewMessage, Role, SessionContext, UserProfile,
};
