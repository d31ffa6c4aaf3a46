//! Los Libros Reader
//!
//! EPUB reading engine: document loading, position addressing, layout and
//! navigation, progress saving with resume, and annotations. The persistence
//! server that backs positions and annotations lives here too; `main.rs`
//! runs it.
//!
//! # Modules
//!
//! - `epub`, `cfi`, `locations`: the loaded document and addresses into it
//! - `render`, `navigation`: layout, pages and input handling
//! - `progress`, `annotations`, `remote`: what the reader saves and where
//! - `session`: one open document with everything wired together
//! - `db`, `routes`, `state`: the persistence API server

pub mod annotations;
pub mod cfi;
pub mod config;
pub mod db;
pub mod epub;
pub mod error;
pub mod locations;
pub mod navigation;
pub mod progress;
pub mod remote;
pub mod render;
pub mod routes;
pub mod session;
pub mod state;

pub use error::{ReaderError, ReaderResult};
pub use session::{ReaderSession, ReaderView, SessionOptions};
