//! Progress callbacks from a recording run to whatever UI hosts it.

use std::fmt;

/// What the subject should be doing right now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cue {
    /// Perform the named mode.
    Mode(String),
    /// Rest; nothing to perform.
    None,
}

impl fmt::Display for Cue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cue::Mode(mode) => f.write_str(mode),
            Cue::None => f.write_str("none"),
        }
    }
}

/// Receives status text and cue changes during a recording.
///
/// Methods are called from the recording task and should return quickly.
pub trait RecordingNotifier: Send {
    fn status(&mut self, text: &str);
    fn cue(&mut self, cue: &Cue);
}

/// Notifier that only logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl RecordingNotifier for LogNotifier {
    fn status(&mut self, text: &str) {
        tracing::info!(status = text, "Recording status");
    }

    fn cue(&mut self, cue: &Cue) {
        tracing::info!(%cue, "Recording cue");
    }
}
