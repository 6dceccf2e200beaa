use super::*;

/// Entry point of the namespace-init process.
///
/// Runs as apparent root inside the namespaces the driver created. Whatever
/// happens, exactly one framed result goes down the result pipe; a setup
/// failure becomes a UKE result, and the mount and cgroup guards release on
/// every path. The exit code is non-zero only when the result could not be
/// written at all.
pub fn run<S: System>(
  system: &S,
  request: &JudgeRequest,
  barrier: &mut Barrier,
  result_pipe: &mut File,
) -> isize {
  // The uid map is not installed until the driver releases; privileged
  // operations before that would fail with EPERM.
  if let Err(e) = barrier.wait() {
    error!("namespace-init startup failed: {e}");
    return 1;
  }

  let init = NamespaceInit { system, request };

  let result = init.execute().unwrap_or_else(|e| {
    error!("sandbox setup failed: {e}");
    JudgeResult::internal_error(&e)
  });

  match result.encode(result_pipe) {
    Ok(()) => 0,
    Err(e) => {
      error!("failed to write result: {e}");
      1
    }
  }
}

struct NamespaceInit<'a, S> {
  system: &'a S,
  request: &'a JudgeRequest,
}

impl<S: System> NamespaceInit<'_, S> {
  fn execute(&self) -> Result<JudgeResult> {
    let request = self.request;

    // Directories and files below carry their literal modes.
    self.system.umask(Mode::empty());

    sethostname("sandbox")?;

    make_mounts_private()?;

    let root = SandboxRoot::create(&request.sandbox_id)?;

    let _bind = BindMount::read_only(&request.rootfs_path, root.path())?;

    let tmp = root.tmp_dir();

    let _tmpfs = Tmpfs::mount(&tmp, &request.tmpfs_size)?;

    materialize_input_files(&tmp, &request.input_files)?;

    let cgroup = CgroupLeaf::create(
      &request.cgroup_root,
      &request.sandbox_id,
      request.memory_limit_mb,
      request.pids_limit,
    )?;

    let mut executor_barrier = Barrier::new()?;

    let child = spawn(
      CloneFlags::CLONE_NEWPID
        | CloneFlags::CLONE_NEWNET
        | CloneFlags::CLONE_NEWNS
        | CloneFlags::CLONE_NEWUTS,
      || executor::run(request, root.path(), &mut executor_barrier),
    )?;

    let child = ChildGuard::new(child);

    cgroup.attach(child.pid())?;

    executor_barrier.release()?;

    // The executor is pid 1 of its PID namespace; its descendants die with
    // it, so only the direct child is ever reaped here.
    let status = child.wait()?;

    let exit_code = match status {
      WaitStatus::Exited(_, code) => Some(code),
      _ => None,
    };

    // Counters are final only once the executor is gone.
    let time_ms = cgroup.cpu_user_ms()?;
    let memory_mb = cgroup.memory_peak_mb()?;
    let oom_killed = cgroup.oom_killed()?;

    let verdict = Verdict::classify(exit_code, oom_killed, time_ms, request.time_limit_ms);

    let stdout = read_or_empty(&tmp.join("stdout"));
    let stderr = read_or_empty(&tmp.join("stderr"));
    let output_files = collect_output_files(&tmp, &request.output_filenames);

    debug!(%verdict, time_ms, memory_mb, "run finished");

    Ok(JudgeResult {
      verdict,
      time_ms,
      memory_mb,
      stdout,
      stderr,
      output_files,
    })
  }
}
