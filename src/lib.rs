//! folio: concurrent AI transcription for historical documents.
//!
//! A project is an ordered table of scanned pages. Jobs run every selected
//! page through an AI backend (handwriting recognition, correction,
//! translation, metadata extraction) with bounded concurrency, and PDF
//! imports append rasterized pages to the table.

pub mod cli;
pub mod config;
pub mod import;
pub mod jobs;
pub mod models;
pub mod providers;
pub mod store;
