//! Single-shot process sandbox for an online judge.
//!
//! The binary reads one framed [`JudgeRequest`] on stdin, executes the
//! target program under CPU-time, memory, process-count and filesystem
//! isolation, and writes one framed [`JudgeResult`] on stdout. Isolation is
//! built from unprivileged user namespaces and a per-run cgroup v2 leaf, so
//! the whole pipeline runs from a regular host account.

pub use {
  driver::Driver,
  error::{Error, Result},
  request::{InputFile, JudgeRequest},
  response::{JudgeResult, OutputFile, Verdict},
  system::{MaterialSystem, System},
};

use {
  crate::{
    barrier::Barrier,
    cgroup::CgroupLeaf,
    executor::{EXIT_OK, EXIT_RE, EXIT_TLE},
    files::{collect_output_files, materialize_input_files, read_or_empty, validate_filename},
    mount::{make_mounts_private, BindMount, SandboxRoot, Tmpfs},
    path_ext::PathExt,
    spawn::{spawn, ChildGuard},
    wire::{
      read_bytes, read_i32, read_i64, read_string, write_bytes, write_i32, write_i64, write_str,
    },
  },
  camino::{Utf8Path, Utf8PathBuf},
  nix::{
    errno::Errno,
    fcntl::OFlag,
    mount::{mount, umount2, MntFlags, MsFlags},
    sched::{unshare, CloneFlags},
    sys::{
      resource::{setrlimit, Resource},
      signal::{kill, signal, SigHandler, SigSet, Signal},
      stat::{umask, Mode},
      wait::{waitpid, WaitPidFlag, WaitStatus},
    },
    unistd::{
      chdir, chroot, dup2, execve, fork, getgid, getuid, pipe2, read, sethostname, setresgid,
      setresuid, write, ForkResult, Gid, Pid, Uid,
    },
  },
  std::{
    ffi::CString,
    fmt, fs,
    fs::File,
    io,
    os::{
      fd::{AsRawFd, OwnedFd},
      unix::fs::{OpenOptionsExt, PermissionsExt},
    },
    time::{Duration, Instant},
  },
  tracing::{debug, error, warn},
};

#[macro_use]
mod ensure;

mod barrier;
mod cgroup;
mod driver;
mod error;
mod executor;
mod files;
mod mount;
mod namespace_init;
mod path_ext;
mod request;
mod response;
mod spawn;
mod system;
mod wire;
