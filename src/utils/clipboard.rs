//! OS clipboard integration via the platform copy command.

use std::io::Write;
use std::process::{Command, Stdio};

#[cfg(target_os = "macos")]
const COPY_COMMANDS: &[(&str, &[&str])] = &[("pbcopy", &[])];

#[cfg(target_os = "windows")]
const COPY_COMMANDS: &[(&str, &[&str])] = &[("cmd", &["/C", "clip"])];

#[cfg(not(any(target_os = "macos", target_os = "windows")))]
const COPY_COMMANDS: &[(&str, &[&str])] = &[
    ("wl-copy", &[]),
    ("xclip", &["-selection", "clipboard"]),
    ("xsel", &["--clipboard", "--input"]),
];

/// Pipes `text` into the first working platform copy command.
pub fn copy_to_clipboard(text: &str) -> Result<(), String> {
    let mut last_error = String::from("no clipboard command configured");

    for (program, args) in COPY_COMMANDS {
        match pipe_into(program, args, text) {
            Ok(()) => return Ok(()),
            Err(e) => last_error = e,
        }
    }

    Err(last_error)
}

fn pipe_into(program: &str, args: &[&str], input: &str) -> Result<(), String> {
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|_| format!("clipboard command `{program}` not available"))?;

    if let Some(stdin) = child.stdin.as_mut() {
        stdin
            .write_all(input.as_bytes())
            .map_err(|e| format!("clipboard command `{program}` rejected input: {e}"))?;
    }

    match child.wait() {
        Ok(status) if status.success() => Ok(()),
        Ok(status) => Err(format!("clipboard command `{program}` exited with {status}")),
        Err(e) => Err(format!("clipboard command `{program}` failed: {e}")),
    }
}
