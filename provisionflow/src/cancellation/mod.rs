//! Cooperative abandonment of a running stage.
//!
//! There is no mid-step cancellation: a running step always reaches its own
//! terminal status. The sequencer consults the token only between steps.

mod token;

pub use token::AbandonToken;
