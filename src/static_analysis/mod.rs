//! Static analysis of the package contents.
//!
//! Every analyzer works on bytes already read from the container and never touches the
//! filesystem.

pub mod certificate;
pub mod manifest;
pub mod permission;
