//! Core types and trait definitions for the gestiones case backend.
//!
//! This crate is deliberately free of HTTP and database dependencies.
//! Storage backends implement [`store::GestionStore`]; the HTTP layer drives
//! the [`service::Gestiones`] service.

// `GestionStore` spells out `Send` on its returned futures; implementors use
// native `async fn`.
#![allow(async_fn_in_trait)]

pub mod actor;
pub mod error;
pub mod evento;
pub mod geo;
pub mod gestion;
pub mod service;
pub mod store;

pub use error::{Error, Result};
