//! Shell scripts standing in for `mongod` in supervision tests.
//!
//! The server is launched as
//! `mongod --storageEngine ephemeralForTest --dbpath <dir> --port <port>`, so
//! the scripts find the data directory in `$4` and the port in `$6`.

use std::os::unix::fs::PermissionsExt as _;

use camino::{Utf8Path, Utf8PathBuf};
use nix::errno::Errno;
use nix::sys::signal::kill;
use nix::unistd::Pid;

/// Announces readiness on the requested port, then idles.
pub const READY: &str = "echo \"[initandlisten] waiting for connections on port $6\"\nexec sleep 600";

/// Never reports readiness.
pub const SILENT: &str = "exec sleep 600";

/// Reports a bind failure on stderr, then idles.
pub const PORT_TAKEN: &str =
    "echo \"listen(): bind() failed addr already in use for socket 0.0.0.0:$6\" >&2\nexec sleep 600";

/// Exits before printing anything.
pub const EXITS: &str = "exit 3";

/// Writes an executable script called `mongod` with `body` into `dir`.
pub fn write_script(dir: &Utf8Path, body: &str) -> Utf8PathBuf {
    let path = dir.join("mongod");
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write fake mongod");
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
        .expect("chmod fake mongod");
    path
}

/// Reports whether `pid` names a live process.
pub fn is_alive(pid: u32) -> bool {
    let raw = i32::try_from(pid).expect("pid fits in i32");
    match kill(Pid::from_raw(raw), None) {
        Ok(()) => true,
        Err(Errno::ESRCH) => false,
        Err(err) => panic!("probing pid {pid} failed: {err}"),
    }
}

/// Polls `probe` until it holds or `attempts` tenths of a second elapse.
pub fn eventually(attempts: u32, mut probe: impl FnMut() -> bool) -> bool {
    for _ in 0..attempts {
        if probe() {
            return true;
        }
        std::thread::sleep(std::time::Duration::from_millis(100));
    }
    probe()
}
