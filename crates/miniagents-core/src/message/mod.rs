//! Message promises and sequence flattening.
//!
//! - `promise` -- `MessagePromise`: text tokens that reduce to one `Message`
//! - `sequence` -- `MessageSequencePromise`: an ordered stream of message promises
//! - `input` -- `MessageInput`: anything that can be flattened into a sequence
//! - `flatten` -- depth-first expansion of a `MessageInput` into a sequence

pub mod flatten;
pub mod input;
pub mod promise;
pub mod sequence;

pub use flatten::flatten;
pub(crate) use flatten::flatten_stream;
pub use input::MessageInput;
pub use promise::MessagePromise;
pub use sequence::MessageSequencePromise;
