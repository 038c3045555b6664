//! playcast-core: line protocol client engine for playout services
//!
//! This crate provides the wire tokenizer and packer, the interned protocol
//! words and feature flags, the per-connection service state, and the
//! connector that drives one upstream service connection.

pub mod completion;
pub mod connector;
pub mod feature;
pub mod message;
pub mod pack;
pub mod state;
pub mod tokenizer;
pub mod word;

pub use completion::{CompletionGuard, WaitGroup};
pub use connector::{
    Connector, ConnectorError, ConnectorHandle, Lifecycle, OBSERVER_CAPACITY, Response,
};
pub use feature::Feature;
pub use message::{Message, MessageError};
pub use pack::pack;
pub use state::{ServiceSnapshot, ServiceState, UNKNOWN_STATE, UpdateError, format_duration};
pub use tokenizer::{MAX_WORD_SIZE, TokenizeError, Tokenized, Tokenizer};
pub use word::Word;
