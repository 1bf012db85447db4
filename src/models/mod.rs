//! Data models for folio.

mod page;

pub use page::{PageRecord, TextField};
