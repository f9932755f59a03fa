//! Data models exchanged between the object store, the gateway and HTTP
//! clients.
//!
//! Objects are described by [`object::ObjectDescriptor`]; responses project
//! them into [`file::FileDescriptor`] and wrap everything in the
//! [`envelope::Envelope`] JSON shape.

pub mod envelope;
pub mod file;
pub mod object;
