use std::io::Write;

use colored::Colorize;
use thinkgear_bridge::recording::{Cue, RecordingNotifier};

/// Prints recording progress and shows cues as a banner with a bell.
#[derive(Debug, Default)]
pub struct TerminalNotifier;

impl RecordingNotifier for TerminalNotifier {
    fn status(&mut self, text: &str) {
        println!("{} {}", "»".bright_blue(), text);
    }

    fn cue(&mut self, cue: &Cue) {
        match cue {
            Cue::Mode(mode) => {
                // Terminal bell in place of an audio cue.
                print!("\x07");
                println!(
                    "\n    {}\n",
                    format!("  >>> {} <<<  ", mode.to_uppercase())
                        .bold()
                        .black()
                        .on_bright_green()
                );
            }
            Cue::None => println!("    {}", "(rest)".dimmed()),
        }
        let _ = std::io::stdout().flush();
    }
}
