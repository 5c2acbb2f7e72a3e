//! taskchain-glob: script-name pattern matching.
//!
//! Provides:
//! - **ScriptPattern**: a compiled, colon-segment-aware glob for script names
//! - **expand_braces**: `{a,b}` alternative expansion
//! - **is_pattern**: detect whether a name needs pattern matching at all
//!
//! ```
//! use taskchain_glob::ScriptPattern;
//!
//! let pat = ScriptPattern::new("build:*").unwrap();
//! assert!(pat.matches("build:js"));
//! assert!(!pat.matches("build:js:min"));
//! ```

mod pattern;

pub use pattern::{is_pattern, expand_braces, ScriptPattern, SEGMENT_SEPARATOR};

use thiserror::Error;

/// Errors from compiling a pattern.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatternError {
    #[error("unclosed brace in pattern: {0}")]
    UnclosedBrace(String),
    #[error("unclosed character class in pattern: {0}")]
    UnclosedClass(String),
}
