use super::*;

const CHILD_STACK_SIZE: usize = 1024 * 1024;

/// Clones a child into the requested new namespaces.
///
/// The callback runs in the child on a private stack; its return value
/// becomes the child's exit code.
pub fn spawn<F: FnMut() -> isize>(flags: CloneFlags, child: F) -> Result<Pid> {
  let mut stack = vec![0u8; CHILD_STACK_SIZE];

  unsafe { nix::sched::clone(Box::new(child), &mut stack, flags, Some(libc::SIGCHLD)) }
    .map_err(|e| Error::Spawn(format!("clone: {e}")))
}

/// Kills and reaps the child on drop unless it was waited for, so no error
/// path leaks a half-set-up process.
pub struct ChildGuard {
  pid: Pid,
  armed: bool,
}

impl ChildGuard {
  pub fn new(pid: Pid) -> Self {
    Self { pid, armed: true }
  }

  pub fn pid(&self) -> Pid {
    self.pid
  }

  /// Blocks until the child terminates and disarms the guard.
  pub fn wait(mut self) -> Result<WaitStatus> {
    self.armed = false;

    loop {
      match waitpid(self.pid, None) {
        Ok(status @ WaitStatus::Exited(..)) | Ok(status @ WaitStatus::Signaled(..)) => {
          return Ok(status)
        }
        Ok(_) => continue,
        Err(Errno::EINTR) => continue,
        Err(e) => return Err(e.into()),
      }
    }
  }
}

impl Drop for ChildGuard {
  fn drop(&mut self) {
    if !self.armed {
      return;
    }

    let _ = kill(self.pid, Signal::SIGKILL);
    let _ = waitpid(self.pid, None);
  }
}
