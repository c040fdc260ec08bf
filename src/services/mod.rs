//! Business logic services.
//!
//! Services validate requests and orchestrate the knowledge store.

mod container;
mod context;
mod entries;
mod extraction;
mod query;
mod tokens;
mod upload;

pub use container::KnowledgeBase;
pub use context::{
    ContextBuilderService, render_scope_block, scope_banner, scope_introduction, select_entries,
};
pub use entries::{EntryService, suffixed_name};
pub use extraction::{
    DocumentMetadata, DocumentProcessor, Extraction, FORMAT_DETAILS, SUPPORTED_FORMATS,
    SupportedFormat, TextChunk, chunk_text, clean_text,
};
pub use query::{QueryService, query_terms};
pub use tokens::{CHARS_PER_TOKEN, estimate_tokens};
pub use upload::{
    UploadOutcome, UploadRequest, UploadService, placeholder_content, upload_entry_name,
};
