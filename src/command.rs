//! Command identifiers and stay-open script assembly.

use std::sync::{Mutex, PoisonError};

pub(crate) const CMD_ID_MIN: u32 = 1;
pub(crate) const CMD_ID_MAX: u32 = 2_000_000_000;

// Unique across every supervisor instance and thread in the process.
static NEXT_CMD_ID: Mutex<u32> = Mutex::new(CMD_ID_MIN);

/// A queued command: its identifier and the script bytes written to the
/// helper's stdin.
#[derive(Debug, Clone)]
pub(crate) struct Command {
    pub id: u32,
    pub script: Vec<u8>,
}

/// Allocates the next command id. The maximum is issued, then the
/// counter wraps back to the minimum.
pub(crate) fn next_command_id() -> u32 {
    let mut next = NEXT_CMD_ID.lock().unwrap_or_else(PoisonError::into_inner);
    take_next_id(&mut next)
}

fn take_next_id(next: &mut u32) -> u32 {
    let id = *next;
    if *next >= CMD_ID_MAX {
        *next = CMD_ID_MIN;
    } else {
        *next += 1;
    }
    id
}

/// Renders the stay-open script for one command.
///
/// The caller's arguments go first, one per line. `-echo1`/`-echo2` make
/// the helper print `{await<id>}` on stdout/stderr before it starts
/// working, so the response framer can tell this command's output from
/// leftovers. `-echo4` terminates the stderr channel with `{ready}`;
/// stdout normally gets its `{ready}` from `-execute` itself.
pub(crate) fn build_script(id: u32, args: &[&str]) -> Vec<u8> {
    // Constant width so the await marker is a fixed 18-byte line.
    let id_str = format!("{id:010}");

    let mut script = Vec::new();
    for arg in args {
        script.extend_from_slice(arg.as_bytes());
        script.push(b'\n');
    }

    script.extend_from_slice(format!("-echo1\n{{await{id_str}}}\n").as_bytes());
    script.extend_from_slice(format!("-echo2\n{{await{id_str}}}\n").as_bytes());

    // Quiet and tabular output suppress the helper's own stdout
    // terminator, so request an explicit one.
    if wants_explicit_stdout_ready(args) {
        script.extend_from_slice(b"-echo3\n{ready}\n");
    }

    script.extend_from_slice(b"-echo4\n{ready}\n");
    script.extend_from_slice(b"-execute\n");
    script
}

fn wants_explicit_stdout_ready(args: &[&str]) -> bool {
    args.iter().any(|arg| {
        *arg == "-q"
            || *arg == "-T"
            || arg.eq_ignore_ascii_case("-quiet")
            || arg.eq_ignore_ascii_case("-table")
    })
}
