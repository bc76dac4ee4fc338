//! Public request/response surface. Handlers are framework-free so the
//! routing layer can live outside the crate.

pub mod dto;
pub mod handlers;

pub use handlers::Reply;
