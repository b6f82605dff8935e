pub mod http;
pub mod memory;
pub mod provider;
pub mod router;

pub use http::{
    validate_endpoint, HttpBatchDispatcher, HttpContextStore, HttpGenerationClient, HttpSummarizer,
};
pub use memory::InMemoryContextStore;
pub use provider::{
    BatchDispatcher, CollaboratorsConfig, ContextStore, GenerationConfig, GenerationProvider,
    Summarizer,
};
pub use router::{CollaboratorRouter, GenerationSummarizer};

#[cfg(test)]
pub use provider::{MockBatchDispatcher, MockContextStore, MockGenerationProvider, MockSummarizer};
