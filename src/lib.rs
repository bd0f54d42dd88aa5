//! Vietnamese-aware prompt resolution and text embeddings for RAG pipelines.
//!
//! vietrag supplies the two locale-sensitive pieces of a retrieval-augmented
//! generation pipeline:
//!
//! - **Prompt resolution**: templates are looked up by key in a per-locale
//!   collection, falling back to English, with best-effort `{placeholder}`
//!   substitution. The locale comes from configuration or is detected from the
//!   query text.
//! - **Embeddings**: batches of text become L2-normalized vectors of a fixed
//!   dimension (1024 for the default Vietnamese model), computed locally with
//!   ONNX Runtime or through a hosted feature-extraction API, with bounded
//!   retry on rate limits and network failures.
//!
//! | Locale | Code | Thousands | Decimal |
//! |--------|------|-----------|---------|
//! | **English** | `en` | `,` | `.` |
//! | **Vietnamese** | `vi` | `.` | `,` |
//!
//! # Modules
//!
//! - [`config`]: Configuration loading from TOML files and environment variables
//! - [`locale`]: Locale identifiers, language detection, and number formatting
//! - [`prompt`]: Template collections, per-locale store, and the resolver
//! - [`embedding`]: Model cache, device selection, local and remote backends
//! - [`vdb`]: Dimension checks for existing vector store files

pub mod config;
pub mod embedding;
pub mod locale;
pub mod prompt;
pub mod vdb;
