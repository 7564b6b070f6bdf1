//! Live stack capture for weft assembly call-sites.
//!
//! At stage-assembly time the framework calls [`obtain_capturer`] and
//! invokes the returned [`Capturer`] immediately. The capturer walks the
//! current call stack through the process-wide [`CaptureBackend`], applies
//! the frame classifier from `weft-callsite` to skip and merge frames, and
//! returns a fresh [`AssemblyInformation`].
//!
//! Two backends exist, tried in order at selection time:
//!
//! 1. **frame-walk**: `backtrace::trace` with per-frame symbol resolution.
//!    Stops at the user-code boundary, so frames past it are never
//!    resolved. Fastest, but requires that symbol resolution actually names
//!    frames on this platform.
//! 2. **eager-snapshot**: `backtrace::Backtrace::new` materializes and
//!    resolves the whole stack up front, then the same walk runs over the
//!    snapshot. Costs more, exists wherever the backtrace crate links.
//!
//! Selection runs exactly once per process. A candidate that fails to
//! construct is skipped silently; exhausting every candidate is a
//! configuration error and aborts at initialization rather than at the
//! first capture.

use std::error::Error;
use std::fmt;
use std::path::Path;
use std::sync::LazyLock;

use weft_callsite::{AssemblyInformation, config, is_user_code, should_sanitize};

const FRAME_WALK: &str = "frame-walk";
const EAGER_SNAPSHOT: &str = "eager-snapshot";

/// Frames a construction probe is willing to examine while looking for one
/// resolvable symbol.
const PROBE_FRAME_LIMIT: usize = 16;

/// One concrete strategy for walking the current call stack.
pub trait CaptureBackend: Send + Sync {
    /// Short identifier, used once in the selection debug event.
    fn name(&self) -> &'static str;

    /// Walks the current call stack and resolves the assembly site. Invoked
    /// fresh for every assembly event; never blocks, retries, or fails.
    fn capture(&self) -> AssemblyInformation;
}

/// Zero-argument capture handle bound to the process-wide backend.
#[derive(Clone, Copy)]
pub struct Capturer {
    backend: &'static dyn CaptureBackend,
}

impl Capturer {
    pub fn capture(&self) -> AssemblyInformation {
        self.backend.capture()
    }
}

/// Why a candidate backend could not be constructed on this platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendUnavailable {
    /// The probe walk produced no frames at all.
    EmptyProbe { backend: &'static str },
    /// Frames were walked but none resolved to a symbol name, so the
    /// classifier would have nothing to work with.
    NoResolvableSymbols { backend: &'static str },
}

impl fmt::Display for BackendUnavailable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyProbe { backend } => {
                write!(f, "{backend}: probe walk produced no stack frames on this platform")
            }
            Self::NoResolvableSymbols { backend } => {
                write!(f, "{backend}: no frame in the probe walk resolved to a symbol name")
            }
        }
    }
}

impl Error for BackendUnavailable {}

// ── Frame records ────────────────────────────────────────────

/// One resolved stack frame, reduced to the fields the classifier needs.
#[derive(Debug, Clone, PartialEq, Eq)]
struct RawFrame {
    symbol: Option<String>,
    file: Option<String>,
    line: Option<u32>,
}

impl RawFrame {
    /// The qualified symbol name with rustc's trailing `::h<hash>` stripped.
    fn qualified_name(&self) -> Option<&str> {
        self.symbol.as_deref().map(strip_symbol_hash)
    }

    /// Renders the frame as `name(file:line)`, matching the texture of
    /// pre-rendered stack text. A frame with no usable location renders as
    /// the bare name rather than failing.
    fn render(&self) -> String {
        let name = self.qualified_name().unwrap_or("<unresolved>");
        match (self.file.as_deref(), self.line) {
            (Some(file), Some(line)) => {
                let file = Path::new(file)
                    .file_name()
                    .and_then(|name| name.to_str())
                    .unwrap_or(file);
                format!("{name}({file}:{line})")
            }
            _ => name.to_string(),
        }
    }
}

/// Strips the `::h0123456789abcdef` suffix rustc appends to mangled symbol
/// names, leaving the readable path.
fn strip_symbol_hash(symbol: &str) -> &str {
    match symbol.rsplit_once("::h") {
        Some((head, hash)) if hash.len() == 16 && hash.bytes().all(|b| b.is_ascii_hexdigit()) => {
            head
        }
        _ => symbol,
    }
}

/// Frames belonging to the capture machinery itself. The fixed skip counts
/// cover the backtrace crate's preamble; this filter catches machinery
/// frames that survive inlining changes. Trait-impl symbols demangle as
/// `<Type as Trait>::method`, hence the substring check for our own crates.
fn is_capture_machinery(name: &str) -> bool {
    name.contains("weft_callsite")
        || name.starts_with("backtrace::")
        || name.starts_with("std::backtrace")
}

// ── The boundary walk ────────────────────────────────────────

/// Incremental state for the shallow-to-deep boundary walk shared by both
/// backends.
struct FrameWalk {
    full: bool,
    previous: Option<RawFrame>,
    result: Option<AssemblyInformation>,
}

impl FrameWalk {
    fn new(full: bool) -> Self {
        Self {
            full,
            previous: None,
            result: None,
        }
    }

    /// Feeds the next frame, shallow to deep. Returns `false` once the
    /// boundary has been found and the walk can stop.
    fn push(&mut self, frame: RawFrame) -> bool {
        let Some(name) = frame.qualified_name() else {
            // Unresolvable frames carry no boundary information.
            return true;
        };

        if is_capture_machinery(name) {
            return true;
        }

        if is_user_code(name) {
            let user = frame.render();
            self.result = Some(match self.previous.take() {
                Some(previous) => AssemblyInformation::from_stack_frames(previous.render(), user),
                None => AssemblyInformation::from_stack_frame(user),
            });
            return false;
        }

        if !self.full {
            // Synthetic and native frames carry no usable location.
            if frame.line.unwrap_or(0) <= 1 {
                return true;
            }
            if should_sanitize(name) {
                return true;
            }
        }

        // Only the deepest internal frame immediately preceding user code
        // survives; aliases overwrite their shallower duplicates.
        self.previous = Some(frame);
        true
    }

    /// Finishes the walk after frame exhaustion.
    fn finish(self) -> AssemblyInformation {
        if let Some(result) = self.result {
            return result;
        }
        match self.previous {
            Some(last) => {
                let rendered = last.render();
                let label = rendered
                    .strip_prefix(config().internal_prefix.as_str())
                    .map(str::to_string)
                    .unwrap_or(rendered);
                AssemblyInformation::from_operator(label)
            }
            None => AssemblyInformation::empty(),
        }
    }
}

fn walk_frames<I>(frames: I) -> AssemblyInformation
where
    I: IntoIterator<Item = RawFrame>,
{
    let mut walk = FrameWalk::new(config().full_stack_trace);
    for frame in frames {
        if !walk.push(frame) {
            break;
        }
    }
    walk.finish()
}

// ── Backends ─────────────────────────────────────────────────

/// Walks the stack lazily via `backtrace::trace`, resolving one frame at a
/// time and stopping at the user-code boundary so deeper frames are never
/// resolved.
struct FrameWalkBackend(());

impl FrameWalkBackend {
    /// Frames owned by `backtrace::trace` itself at the top of every walk.
    /// The machinery filter in [`FrameWalk::push`] backs this count up; the
    /// invariant is that the first classified frame is never part of the
    /// capture machinery, not the count itself.
    const SKIP_FRAMES: usize = 2;

    fn try_new() -> Result<Self, BackendUnavailable> {
        let mut frames = 0usize;
        let mut resolved = 0usize;
        backtrace::trace(|frame| {
            frames += 1;
            backtrace::resolve_frame(frame, |symbol| {
                if symbol.name().is_some() {
                    resolved += 1;
                }
            });
            resolved == 0 && frames < PROBE_FRAME_LIMIT
        });

        if frames == 0 {
            return Err(BackendUnavailable::EmptyProbe { backend: FRAME_WALK });
        }
        if resolved == 0 {
            return Err(BackendUnavailable::NoResolvableSymbols { backend: FRAME_WALK });
        }
        Ok(Self(()))
    }
}

impl CaptureBackend for FrameWalkBackend {
    fn name(&self) -> &'static str {
        FRAME_WALK
    }

    fn capture(&self) -> AssemblyInformation {
        let mut skip_remaining = Self::SKIP_FRAMES;
        let mut walk = FrameWalk::new(config().full_stack_trace);
        backtrace::trace(|frame| {
            if skip_remaining > 0 {
                skip_remaining -= 1;
                return true;
            }
            walk.push(resolve_raw_frame(frame))
        });
        walk.finish()
    }
}

fn resolve_raw_frame(frame: &backtrace::Frame) -> RawFrame {
    let mut raw = RawFrame {
        symbol: None,
        file: None,
        line: None,
    };
    backtrace::resolve_frame(frame, |symbol| {
        // The first callback is the shallowest inlined symbol; keep it.
        if raw.symbol.is_none() {
            raw.symbol = symbol.name().map(|name| name.to_string());
            raw.file = symbol
                .filename()
                .and_then(|path| path.to_str())
                .map(str::to_string);
            raw.line = symbol.lineno();
        }
    });
    raw
}

/// Captures and resolves the whole stack in one shot via
/// `backtrace::Backtrace::new`, then walks the snapshot. Exists wherever the
/// backtrace crate links.
struct EagerSnapshotBackend(());

impl EagerSnapshotBackend {
    /// The snapshot constructor's own frame.
    const SKIP_FRAMES: usize = 1;

    fn try_new() -> Result<Self, BackendUnavailable> {
        let probe = backtrace::Backtrace::new_unresolved();
        if probe.frames().is_empty() {
            return Err(BackendUnavailable::EmptyProbe {
                backend: EAGER_SNAPSHOT,
            });
        }
        Ok(Self(()))
    }
}

impl CaptureBackend for EagerSnapshotBackend {
    fn name(&self) -> &'static str {
        EAGER_SNAPSHOT
    }

    fn capture(&self) -> AssemblyInformation {
        let snapshot = backtrace::Backtrace::new();
        walk_frames(
            snapshot
                .frames()
                .iter()
                .skip(Self::SKIP_FRAMES)
                .map(raw_frame_of),
        )
    }
}

fn raw_frame_of(frame: &backtrace::BacktraceFrame) -> RawFrame {
    match frame.symbols().first() {
        Some(symbol) => RawFrame {
            symbol: symbol.name().map(|name| name.to_string()),
            file: symbol
                .filename()
                .and_then(|path| path.to_str())
                .map(str::to_string),
            line: symbol.lineno(),
        },
        None => RawFrame {
            symbol: None,
            file: None,
            line: None,
        },
    }
}

// ── Strategy selection ───────────────────────────────────────

fn frame_walk_candidate() -> Result<Box<dyn CaptureBackend>, BackendUnavailable> {
    FrameWalkBackend::try_new().map(|backend| Box::new(backend) as Box<dyn CaptureBackend>)
}

fn eager_snapshot_candidate() -> Result<Box<dyn CaptureBackend>, BackendUnavailable> {
    EagerSnapshotBackend::try_new().map(|backend| Box::new(backend) as Box<dyn CaptureBackend>)
}

static SELECTED_BACKEND: LazyLock<Box<dyn CaptureBackend>> = LazyLock::new(|| {
    const CANDIDATES: &[fn() -> Result<Box<dyn CaptureBackend>, BackendUnavailable>] =
        &[frame_walk_candidate, eager_snapshot_candidate];

    for candidate in CANDIDATES {
        // A candidate that cannot construct on this platform is skipped
        // silently; capability is fixed for the process lifetime.
        if let Ok(backend) = candidate() {
            tracing::debug!(backend = backend.name(), "selected call-site capture backend");
            return backend;
        }
    }

    panic!("no call-site capture strategy available: every candidate backend failed to construct")
});

/// Returns the process-wide capturer. The backend is selected on first use
/// and never reselected; the returned handle is cheap to copy and invoke.
pub fn obtain_capturer() -> Capturer {
    Capturer {
        backend: &**SELECTED_BACKEND,
    }
}

// Total candidate exhaustion is a configuration error and must abort at
// process initialization, not at the first capture.
#[ctor::ctor]
fn select_backend_at_startup() {
    let _ = obtain_capturer();
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_callsite::NO_ASSEMBLY_INFORMATION;

    fn frame(symbol: &str, file: &str, line: u32) -> RawFrame {
        RawFrame {
            symbol: Some(symbol.to_string()),
            file: Some(file.to_string()),
            line: Some(line),
        }
    }

    fn walk(frames: Vec<RawFrame>, full: bool) -> AssemblyInformation {
        let mut state = FrameWalk::new(full);
        for raw in frames {
            if !state.push(raw) {
                break;
            }
        }
        state.finish()
    }

    #[test]
    fn boundary_between_operator_and_user_code() {
        let info = walk(
            vec![
                frame("weft::stage::Flow::filter", "flow.rs", 4209),
                frame("app::job::run", "job.rs", 2),
            ],
            false,
        );
        assert_eq!(info.operator(), "Flow::filter ⇢ at app::job::run(job.rs:2)");
    }

    #[test]
    fn aliases_collapse_to_the_deepest_operator_frame() {
        let info = walk(
            vec![
                frame("weft::stage::Flow::concat_map", "flow.rs", 3071),
                frame("weft::stage::Flow::delay_until", "flow.rs", 3388),
                frame("weft::stage::Flow::delay_elements", "flow.rs", 3314),
                frame("app::job::run", "job.rs", 10),
            ],
            false,
        );
        assert_eq!(
            info.operator(),
            "Flow::delay_elements ⇢ at app::job::run(job.rs:10)"
        );
    }

    #[test]
    fn first_frame_already_user_code() {
        let info = walk(vec![frame("app::job::run", "job.rs", 2)], false);
        assert_eq!(info.operator(), "app::job::run(job.rs:2)");
    }

    #[test]
    fn sanitized_frames_never_become_the_boundary() {
        let info = walk(
            vec![
                frame("weft::stage::Flow::map", "flow.rs", 4209),
                frame("weft::stage::hooks::on_each_operator", "hooks.rs", 40),
                frame("app::job::run", "job.rs", 2),
            ],
            false,
        );
        assert_eq!(info.operator(), "Flow::map ⇢ at app::job::run(job.rs:2)");
    }

    #[test]
    fn short_internal_frames_are_dropped() {
        let info = walk(
            vec![
                frame("weft::stage::Flow::map", "flow.rs", 4209),
                frame("weft::stage::Flow::native_shim", "flow.rs", 0),
                frame("weft::stage::Flow::generated", "flow.rs", 1),
                frame("app::job::run", "job.rs", 2),
            ],
            false,
        );
        assert_eq!(info.operator(), "Flow::map ⇢ at app::job::run(job.rs:2)");
    }

    #[test]
    fn full_mode_keeps_sanitized_and_short_frames() {
        let info = walk(
            vec![
                frame("weft::stage::Flow::map", "flow.rs", 4209),
                frame("weft::stage::hooks::on_each_operator", "hooks.rs", 0),
                frame("app::job::run", "job.rs", 2),
            ],
            true,
        );
        assert_eq!(
            info.operator(),
            "hooks::on_each_operator ⇢ at app::job::run(job.rs:2)"
        );
    }

    #[test]
    fn all_internal_frames_yield_the_deepest_prefix_stripped() {
        let info = walk(
            vec![
                frame("weft::stage::Flow::concat_map", "flow.rs", 3071),
                frame("weft::stage::Flow::map", "flow.rs", 4209),
            ],
            false,
        );
        assert_eq!(info.operator(), "Flow::map(flow.rs:4209)");
    }

    #[test]
    fn no_frames_yield_the_empty_record() {
        let info = walk(Vec::new(), false);
        assert_eq!(info.operator(), NO_ASSEMBLY_INFORMATION);
    }

    #[test]
    fn only_dropped_frames_yield_the_empty_record() {
        let info = walk(
            vec![
                frame("weft::stage::hooks::on_each_operator", "hooks.rs", 40),
                frame("weft::stage::Flow::native_shim", "flow.rs", 0),
            ],
            false,
        );
        assert_eq!(info.operator(), NO_ASSEMBLY_INFORMATION);
    }

    #[test]
    fn test_marked_internal_frame_is_user_code() {
        let info = walk(
            vec![frame("weft::stage::FlowTest::delay", "flow_test.rs", 22)],
            false,
        );
        assert_eq!(info.operator(), "weft::stage::FlowTest::delay(flow_test.rs:22)");
    }

    #[test]
    fn unresolved_frames_are_skipped() {
        let info = walk(
            vec![
                RawFrame {
                    symbol: None,
                    file: None,
                    line: None,
                },
                frame("app::job::run", "job.rs", 2),
            ],
            false,
        );
        assert_eq!(info.operator(), "app::job::run(job.rs:2)");
    }

    #[test]
    fn machinery_frames_are_never_classified() {
        let info = walk(
            vec![
                frame("backtrace::backtrace::trace", "mod.rs", 66),
                frame("<weft_callsite_capture::FrameWalkBackend as weft_callsite_capture::CaptureBackend>::capture", "lib.rs", 230),
                frame("app::job::run", "job.rs", 2),
            ],
            false,
        );
        assert_eq!(info.operator(), "app::job::run(job.rs:2)");
    }

    #[test]
    fn symbol_hash_is_stripped() {
        assert_eq!(
            strip_symbol_hash("weft::stage::Flow::map::h0123456789abcdef"),
            "weft::stage::Flow::map"
        );
        assert_eq!(strip_symbol_hash("weft::stage::Flow::map"), "weft::stage::Flow::map");
        assert_eq!(
            strip_symbol_hash("weft::stage::Flow::hash_join"),
            "weft::stage::Flow::hash_join"
        );
    }

    #[test]
    fn frames_render_with_file_basename() {
        let raw = frame("app::job::run", "/home/dev/app/src/job.rs", 2);
        assert_eq!(raw.render(), "app::job::run(job.rs:2)");
    }

    #[test]
    fn frames_without_location_render_the_bare_name() {
        let raw = RawFrame {
            symbol: Some("app::job::run".to_string()),
            file: None,
            line: None,
        };
        assert_eq!(raw.render(), "app::job::run");
    }

    #[test]
    fn backend_unavailable_messages_name_the_backend() {
        let err = BackendUnavailable::NoResolvableSymbols { backend: FRAME_WALK };
        assert!(err.to_string().contains("frame-walk"));
        assert!(matches!(
            err,
            BackendUnavailable::NoResolvableSymbols { backend: "frame-walk" }
        ));
    }

    #[test]
    fn obtain_capturer_is_process_wide() {
        let first = obtain_capturer();
        let second = obtain_capturer();
        assert!(std::ptr::eq(first.backend, second.backend));
    }

    #[test]
    fn live_capture_produces_a_label() {
        let info = obtain_capturer().capture();
        assert!(!info.operator().is_empty());
    }
}
