//! Placeholder detection and filling for template documents.
//!
//! Text is scanned into a [`placeholder::Catalog`], raw answers are
//! normalized into [`fill::ResolvedValues`], and the values are written back
//! either into plain text for preview or into the document markup.

pub mod config;
pub mod docx;
pub mod fill;
pub mod pipeline;
pub mod placeholder;
pub mod progress;
pub mod textutil;
