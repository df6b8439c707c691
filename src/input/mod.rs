//! Controller input: the event type and the filters that produce it.
pub mod event;
pub mod filter;
