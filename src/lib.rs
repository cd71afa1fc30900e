// ABOUTME: Library module for the deckhand program.
// ABOUTME: Resolves configuration and renders, serves, builds and prints reveal.js presentations.

pub mod assets;
pub mod build;
pub mod config;
pub mod document;
pub mod engine;
pub mod errors;
pub mod hyperlinks;
pub mod init;
pub mod preprocess;
pub mod print;
pub mod render;
pub mod server;
pub mod utils;
pub mod watch;

// Reexport common types and functions
pub use build::{BuildOutcome, BuildReport, BuildUnit, Builder};
pub use config::{CliOptions, Config, ConfigResolver, PrintTarget};
pub use errors::{DeckError, Result};
pub use preprocess::{Preprocessor, PreprocessorRegistry};
pub use print::Printer;
pub use render::{DocumentOptions, Renderer};
pub use server::{Reply, Router, Server};
