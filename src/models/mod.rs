//! Domain model module declarations.

pub mod export;
pub mod recovery;
pub mod snapshot;
