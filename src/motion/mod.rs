//! The motion controller.
//!
//! [`controller`] runs one frame of the pipeline; [`state_machine`] decides what the
//! frame does; [`filter`] smooths every commanded quantity; [`context`] bundles the
//! services the states borrow.
pub mod context;
pub mod controller;
pub mod filter;
pub mod state_machine;
