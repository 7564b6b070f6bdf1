//! Predicates over one stack frame's textual representation.

use crate::config::config;

/// True when a frame row belongs to caller code rather than weft internals.
///
/// A row under the internal namespace prefix is framework code, with one
/// carve-out: any row containing `"Test"` is user code even when it lives
/// under the prefix, so the framework's own test suites trace back to
/// themselves instead of being swallowed as internal noise.
pub fn is_user_code(row: &str) -> bool {
    !row.starts_with(config().internal_prefix.as_str()) || row.contains("Test")
}

/// True for rows that are pure assembly plumbing and should be dropped from
/// consideration during a sanitized walk.
///
/// This is a fixed table, independent of the namespace-prefix check: an
/// internal frame can be informative and kept, and some institutional noise
/// lives outside the internal namespace entirely.
pub fn should_sanitize(row: &str) -> bool {
    row.starts_with("core::ops::function")
        || row.starts_with("weft::stage::Task::on_assembly")
        || row == "weft::stage::Flow::on_assembly"
        || row == "weft::stage::ParallelFlow::on_assembly"
        || row.starts_with("weft::stage::SignalLog")
        || row.starts_with("weft::stage::FlowOnAssembly")
        || row.starts_with("weft::stage::TaskOnAssembly::")
        || row.starts_with("weft::stage::hooks")
        || row.starts_with("std::panicking")
        || row.starts_with("std::sys")
        || row.starts_with("tokio::runtime")
}
