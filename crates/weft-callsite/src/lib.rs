//! Assembly call-site resolution for weft pipeline stages.
//!
//! A weft pipeline is assembled in one place and executed later, so a stack
//! trace taken when a stage fails no longer shows *where the stage was
//! built*. This crate produces the missing piece at assembly time: given the
//! current call stack (live, via [`weft-callsite-capture`], or already
//! rendered as text), it locates the boundary between weft's own stage
//! internals and caller code and renders a compact, stable label such as:
//!
//! ```text
//! Stage::map ⇢ at app::ingest::build_pipeline(ingest.rs:88)
//! ```
//!
//! The label degrades gracefully: a stack with no internal frames yields the
//! first caller frame verbatim, a stack with only internal frames yields the
//! deepest one with the `weft::stage::` prefix stripped, and an empty stack
//! yields `[no operator assembly information]`.
//!
//! Everything here is synchronous, allocation-conscious CPU work. Parsing
//! runs over [`StackLineView`] windows into the original buffer and only
//! materializes owned strings for the final label.
//!
//! [`weft-callsite-capture`]: https://docs.rs/weft-callsite-capture

pub mod classify;
pub mod config;
pub mod extract;
mod info;
mod line_view;

pub use self::classify::{is_user_code, should_sanitize};
pub use self::config::{
    AssemblyConfig, CALL_SITE_GLUE, DEFAULT_INTERNAL_PREFIX, NO_ASSEMBLY_INFORMATION, config,
};
pub use self::extract::{extract_label, extract_parts};
pub use self::info::AssemblyInformation;
pub use self::line_view::{StackLineView, TrimmedLines, trimmed_nonempty_lines};
