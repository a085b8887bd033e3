//! Core types shared by every crate of the berlink stack: the error
//! taxonomy and the protocol sizing limits.

pub mod error;
pub mod limits;

pub use error::{BerlinkError, BerlinkResult};
