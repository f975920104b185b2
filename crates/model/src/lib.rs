//! A provider-neutral protocol for talking to generative language models.
//!
//! The chat client only ever needs one kind of exchange: a list of turns
//! goes in, a stream of text comes out. This crate pins down the shape of
//! that exchange so the rest of the workspace doesn't care which hosted
//! model answers it.
//!
//! Types in this crate don't define any behavior, instead they are the
//! constraints that the implementors should adhere to.

#![deny(missing_docs)]

mod error;
mod generation;
mod provider;
mod request;
mod response;

pub use error::*;
pub use generation::*;
pub use provider::*;
pub use request::*;
pub use response::*;
