//! Python stub (`.pyi`) support for stubfix.
//!
//! Text flows through [`parser`] into the [`model`], is patched by the
//! [`engine`] (with [`signals`] normalizing every signal), and goes back to
//! text through [`writer`]. [`pipeline`] runs that over many modules.

pub mod engine;
pub mod error;
pub mod lexer;
pub mod model;
pub mod parser;
pub mod pipeline;
pub mod signals;
pub mod signature;
pub mod writer;

pub use engine::{RewriteEngine, RewriteReport};
pub use error::{ParseError, SignatureError};
pub use model::Module;
pub use parser::{parse_fragment, parse_module, ParseOptions};
pub use pipeline::{ModuleOutcome, ModuleSource, Pipeline, PipelineOptions, RunOutcome};
pub use signals::{normalize_signal, VariantEdit};
pub use writer::{write_module, WriterOptions};
