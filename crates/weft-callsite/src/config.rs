//! Process-wide assembly-trace configuration.
//!
//! Read from the environment once, on first use, and immutable for the
//! lifetime of the process. Capture capability and namespace layout cannot
//! change while the process runs, so nothing here is ever re-read.

use std::sync::LazyLock;

/// Default namespace prefix identifying frames that belong to weft's own
/// stage internals rather than caller code.
pub const DEFAULT_INTERNAL_PREFIX: &str = "weft::stage::";

/// Glue token joining the operator segment and the user call site in a
/// rendered label.
pub const CALL_SITE_GLUE: &str = " ⇢ ";

/// Label rendered when a capture or extraction observes no frames at all.
pub const NO_ASSEMBLY_INFORMATION: &str = "[no operator assembly information]";

const FULL_STACKTRACE_ENV: &str = "WEFT_TRACE_ASSEMBLY_FULLSTACKTRACE";
const INTERNAL_PREFIX_ENV: &str = "WEFT_TRACE_ASSEMBLY_PREFIX";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssemblyConfig {
    /// When set, capture keeps the raw internal frame sequence: the sanitize
    /// table and the short-frame skip rule are disabled.
    pub full_stack_trace: bool,
    /// Frames whose qualified symbol starts with this prefix are treated as
    /// framework internals.
    pub internal_prefix: String,
}

static CONFIG: LazyLock<AssemblyConfig> = LazyLock::new(|| AssemblyConfig {
    full_stack_trace: std::env::var(FULL_STACKTRACE_ENV)
        .map(|value| parse_bool(&value))
        .unwrap_or(false),
    internal_prefix: std::env::var(INTERNAL_PREFIX_ENV)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| DEFAULT_INTERNAL_PREFIX.to_string()),
});

/// The process-wide configuration, resolved on first access.
pub fn config() -> &'static AssemblyConfig {
    &CONFIG
}

fn parse_bool(value: &str) -> bool {
    let value = value.trim().to_ascii_lowercase();
    matches!(value.as_str(), "1" | "true" | "yes" | "on")
}
