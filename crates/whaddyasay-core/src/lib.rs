pub mod advice;
pub mod ai;
pub mod config;
pub mod consent;
pub mod context;
pub mod crypto;
pub mod discovery;
pub mod error;
pub mod heuristics;
pub mod mcp;
pub mod patterns;
pub mod pipeline;
pub mod prompt;
pub mod provider;
pub mod selection;
pub mod session;
pub mod storage;
pub mod templates;

// Re-export main types for convenience
pub use advice::{
    AdviceContent, AdviceRequest, AdviceResult, AdviceSource, ConversationContext, PrivacyLevel,
    SituationType, Urgency,
};
pub use ai::{Backend, BackendDescriptor, BackendKind, ModelRuntime};
pub use config::Config;
pub use consent::ConsentState;
pub use crypto::{Cipher, Vault, VaultStatus};
pub use discovery::ModelAvailability;
pub use error::{Error, Result};
pub use provider::Provider;
pub use selection::Selection;
pub use session::{AdviceSession, EngineStatus, SessionOptions};
pub use storage::{ConversationRecord, Database, MemoryRecord, MemorySearch, RecordStore, Settings};
