//! Protocol helpers shared by the parser and the response writer

pub mod headers;
pub mod version;
