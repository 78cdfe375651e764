//! # Repository Module
//!
//! ## Available Repositories
//!
//! - [`kv::KvRepository`] - Raw JSON documents by key
//! - [`state::StateRepository`] - Typed view over the persistence layout

pub mod kv;
pub mod state;
