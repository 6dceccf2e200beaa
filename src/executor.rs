use super::*;

pub const EXIT_OK: i32 = 0;
pub const EXIT_RE: i32 = 1;
pub const EXIT_TLE: i32 = 2;
pub const EXIT_SYS: i32 = 3;

/// Absorbs scheduling jitter, so the in-sandbox waiter catches a true TLE
/// before any outer wall-clock deadline fires.
pub const GRACE_MS: u32 = 1000;

/// The only identity visible to the target; unmapped in every parent
/// namespace.
const NOBODY: u32 = 65534;

const TARGET_PATH: &str = "PATH=/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin";

/// Entry point of the executor process, pid 1 of its own PID namespace.
///
/// Every outcome is encoded in the exit byte: [`EXIT_OK`], [`EXIT_RE`],
/// [`EXIT_TLE`], or [`EXIT_SYS`] for failures of the sandbox itself.
pub fn run(request: &JudgeRequest, root: &Utf8Path, barrier: &mut Barrier) -> isize {
  let executor = Executor {
    request,
    root,
    barrier,
  };

  match executor.execute() {
    Ok(code) => code as isize,
    Err(e) => {
      error!("executor setup failed: {e}");
      EXIT_SYS as isize
    }
  }
}

struct Executor<'a> {
  request: &'a JudgeRequest,
  root: &'a Utf8Path,
  barrier: &'a mut Barrier,
}

impl Executor<'_> {
  fn execute(self) -> Result<i32> {
    let tmp = self.root.join("tmp");

    chdir(tmp.as_std_path())?;

    fs::write("stdin", &self.request.stdin_bytes)?;

    self.drop_privileges()?;

    chroot(self.root.as_std_path())?;
    chdir("/tmp")?;

    self.redirect_stdio()?;

    // Until the release, the parent has not yet enrolled us in the cgroup;
    // starting the target earlier would let it run unaccounted.
    self.barrier.wait()?;

    self.run_target()
  }

  /// The parent user namespace maps uid 0 and nothing else, and an identity
  /// can only be assumed if it is mapped; a nested namespace mapping
  /// 65534 onto our current identity makes the drop possible.
  fn drop_privileges(&self) -> Result {
    unshare(CloneFlags::CLONE_NEWUSER)?;

    fs::write("/proc/self/setgroups", "deny")?;
    fs::write("/proc/self/uid_map", format!("{NOBODY} 0 1\n"))?;
    fs::write("/proc/self/gid_map", format!("{NOBODY} 0 1\n"))?;

    let gid = Gid::from_raw(NOBODY);
    let uid = Uid::from_raw(NOBODY);

    setresgid(gid, gid, gid)?;
    setresuid(uid, uid, uid)?;

    Ok(())
  }

  fn redirect_stdio(&self) -> Result {
    let stdin = File::open("stdin")?;
    let stdout = File::create("stdout")?;
    let stderr = File::create("stderr")?;

    dup2(stdin.as_raw_fd(), 0)?;
    dup2(stdout.as_raw_fd(), 1)?;
    dup2(stderr.as_raw_fd(), 2)?;

    Ok(())
  }

  fn run_target(&self) -> Result<i32> {
    let mut sigchld = SigSet::empty();

    sigchld.add(Signal::SIGCHLD);

    // Blocked, child termination becomes a waitable event instead of a
    // handler invocation.
    sigchld.thread_block()?;

    match unsafe { fork() }? {
      ForkResult::Child => self.exec_target(&sigchld),
      ForkResult::Parent { child } => self.await_target(child, &sigchld),
    }
  }

  fn exec_target(&self, sigchld: &SigSet) -> ! {
    let _ = sigchld.thread_unblock();

    // cgroup memory.max is the effective ceiling; the default 8 MiB stack
    // would fail deep recursion long before it.
    let _ = setrlimit(
      Resource::RLIMIT_STACK,
      libc::RLIM_INFINITY,
      libc::RLIM_INFINITY,
    );

    let argv: Option<Vec<CString>> = self
      .request
      .cmdline
      .iter()
      .map(|argument| CString::new(argument.as_bytes()).ok())
      .collect();

    if let (Some(argv), Ok(path_variable)) = (argv, CString::new(TARGET_PATH)) {
      let _ = execve(&argv[0], &argv, &[path_variable.as_c_str()]);
    }

    unsafe { libc::_exit(127) }
  }

  fn await_target(&self, child: Pid, sigchld: &SigSet) -> Result<i32> {
    let budget =
      Duration::from_millis(u64::from(self.request.time_limit_ms) + u64::from(GRACE_MS));

    let deadline = Instant::now() + budget;

    loop {
      let remaining = deadline.saturating_duration_since(Instant::now());

      match sigtimedwait(sigchld, remaining) {
        Err(Errno::EAGAIN) => {
          kill_and_reap(child);
          return Ok(EXIT_TLE);
        }
        Err(Errno::EINTR) => continue,
        Err(e) => return Err(e.into()),
        Ok(()) => match waitpid(child, Some(WaitPidFlag::WNOHANG))? {
          WaitStatus::Exited(_, 0) => return Ok(EXIT_OK),
          WaitStatus::Exited(..) | WaitStatus::Signaled(..) => return Ok(EXIT_RE),
          _ => {
            // SIGCHLD from a reparented orphan, not the direct child.
            kill_and_reap(child);
            return Ok(EXIT_RE);
          }
        },
      }
    }
  }
}

fn sigtimedwait(set: &SigSet, timeout: Duration) -> Result<(), Errno> {
  let timeout = libc::timespec {
    tv_sec: timeout.as_secs() as libc::time_t,
    tv_nsec: timeout.subsec_nanos() as libc::c_long,
  };

  let signal = unsafe { libc::sigtimedwait(set.as_ref(), std::ptr::null_mut(), &timeout) };

  if signal < 0 {
    Err(Errno::last())
  } else {
    Ok(())
  }
}

fn kill_and_reap(child: Pid) {
  let _ = kill(child, Signal::SIGKILL);
  let _ = waitpid(child, None);
}
