//! Speech output through an external text-to-speech program.

use greeter_core::{Speaker, SpeakerError};
use std::io::ErrorKind;
use std::process::{Command, Stdio};

pub const DEFAULT_SPEECH_PROGRAM: &str = "espeak";

/// Runs `program [args...] <text>` and waits for it to exit.
///
/// Works with `espeak`, `espeak-ng`, `spd-say --wait`, `say` and similar.
#[derive(Debug, Clone)]
pub struct CommandSpeaker {
    program: String,
    args: Vec<String>,
}

impl CommandSpeaker {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Parse a whitespace-separated command line such as `"spd-say --wait"`.
    pub fn from_command_line(command: &str) -> Option<Self> {
        let mut parts = command.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self::new(program, parts.collect()))
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

impl Default for CommandSpeaker {
    fn default() -> Self {
        Self::new(DEFAULT_SPEECH_PROGRAM, Vec::new())
    }
}

impl Speaker for CommandSpeaker {
    fn say(&mut self, text: &str) -> Result<(), SpeakerError> {
        tracing::debug!(program = %self.program, text, "speaking");

        let status = Command::new(&self.program)
            .args(&self.args)
            .arg(text)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .status()
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => {
                    SpeakerError::Unavailable(format!("{}: program not found", self.program))
                }
                _ => SpeakerError::Io(e),
            })?;

        if status.success() {
            Ok(())
        } else {
            Err(SpeakerError::Failed(format!("{} exited with {status}", self.program)))
        }
    }
}
