//! The immutable record produced by a call-site capture.

use std::fmt;

use facet::Facet;

use crate::config::{CALL_SITE_GLUE, NO_ASSEMBLY_INFORMATION, config};

/// Where a pipeline stage was assembled: the deepest weft-internal frame
/// adjacent to user code, the first user-code frame, and the one-line label
/// derived from them.
///
/// Instances are created fresh per assembly event through the named
/// constructors below, owned by whoever requested the capture, and never
/// mutated.
#[derive(Facet, Debug, Clone, PartialEq, Eq)]
pub struct AssemblyInformation {
    operator_stack_frame: Option<String>,
    user_code_stack_frame: Option<String>,
    operator: String,
}

impl AssemblyInformation {
    fn new(
        operator_stack_frame: Option<String>,
        user_code_stack_frame: Option<String>,
        operator: String,
    ) -> Self {
        Self {
            operator_stack_frame,
            user_code_stack_frame,
            operator,
        }
    }

    /// No frames were observed at all.
    pub fn empty() -> Self {
        Self::new(None, None, NO_ASSEMBLY_INFORMATION.to_string())
    }

    /// The first observed frame was already user code; the label is that
    /// frame verbatim.
    pub fn from_stack_frame(user_code_stack_frame: impl Into<String>) -> Self {
        let user = user_code_stack_frame.into();
        Self::new(None, Some(user.clone()), user)
    }

    /// An internal frame directly preceding the first user-code frame.
    pub fn from_stack_frames(
        operator_stack_frame: impl Into<String>,
        user_code_stack_frame: impl Into<String>,
    ) -> Self {
        let operator_frame = operator_stack_frame.into();
        let user_frame = user_code_stack_frame.into();
        let operator = to_operator(&operator_frame, &user_frame);
        Self::new(Some(operator_frame), Some(user_frame), operator)
    }

    /// Builds from the unsanitized tail of a larger rendered trace: the last
    /// two newline-delimited segments become the operator and user frames,
    /// with no classification applied. A single segment becomes a lone user
    /// frame.
    pub fn from_stack_trace_tail(source: &str) -> Self {
        let source = source.trim_end_matches('\n');
        match source.rsplit_once('\n') {
            None => Self::from_stack_frame(source.trim()),
            Some((head, user_frame)) => {
                let operator_frame = head.rsplit('\n').next().unwrap_or(head);
                Self::from_stack_frames(operator_frame.trim(), user_frame.trim())
            }
        }
    }

    /// A literal, already-rendered label.
    pub fn from_operator(operator: impl Into<String>) -> Self {
        let operator = operator.into();
        Self::new(None, Some(operator.clone()), operator)
    }

    /// The rendered single-line label.
    pub fn operator(&self) -> &str {
        &self.operator
    }

    /// Renders the frames this record holds, one per line, each prefixed
    /// with a tab and terminated by a newline, for embedding in a larger
    /// diagnostic trace.
    pub fn as_stack_trace(&self) -> String {
        let mut out = String::new();
        for frame in [&self.operator_stack_frame, &self.user_code_stack_frame]
            .into_iter()
            .flatten()
        {
            out.push('\t');
            out.push_str(frame);
            out.push('\n');
        }
        out
    }
}

impl fmt::Display for AssemblyInformation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.operator)
    }
}

/// Renders `Stage::map ⇢ at app::job::run(job.rs:123)` from an internal
/// frame and the user frame that follows it.
fn to_operator(operator_stack_frame: &str, user_code_stack_frame: &str) -> String {
    let api_line = match operator_stack_frame.find('(') {
        Some(index) if index > 0 => &operator_stack_frame[..index],
        _ => operator_stack_frame,
    };
    let api_line = api_line
        .strip_prefix(config().internal_prefix.as_str())
        .unwrap_or(api_line);
    format!("{api_line}{CALL_SITE_GLUE}at {user_code_stack_frame}")
}
