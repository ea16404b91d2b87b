pub mod assemble;
pub mod document;
pub mod error;
pub mod merge;
pub mod prompt;

pub use assemble::{
    assemble, build_document, AssembleInput, AssembleReport, PlatformIntegration,
    DEFAULT_CONFIG_TOML, RESERVED_SERVER_ID,
};
pub use document::{ConfigDocument, Section};
pub use error::ConfigError;
pub use merge::{merge, overlay, MergeInput};
pub use prompt::{inject, read_prompt, InjectOutcome};
