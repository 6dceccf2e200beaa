use super::*;

/// The outer process: speaks the framed protocol on its own stdio and owns
/// the namespace-init lifecycle.
pub struct Driver<S = MaterialSystem> {
  system: S,
}

impl Driver {
  pub fn new() -> Self {
    Self {
      system: MaterialSystem,
    }
  }
}

impl Default for Driver {
  fn default() -> Self {
    Self::new()
  }
}

impl<S: System> Driver<S> {
  /// Serves one request: decodes it from `input`, performs the run, writes
  /// the response frame to `output`.
  ///
  /// Exactly one response frame is produced even when the sandbox itself
  /// fails; the returned process exit code is non-zero for a UKE outcome or
  /// when no response could be written at all.
  pub fn run(&self, input: &mut impl io::Read, output: &mut impl io::Write) -> i32 {
    // A downstream reader going away must not kill us before the response
    // is assembled.
    if let Err(e) = unsafe { signal(Signal::SIGPIPE, SigHandler::SigIgn) } {
      error!("failed to ignore SIGPIPE: {e}");
      return 1;
    }

    let result = self.execute(input).unwrap_or_else(|e| {
      error!("judging failed: {e}");
      JudgeResult::internal_error(&e)
    });

    if let Err(e) = result.encode(output) {
      error!("failed to write response: {e}");
      return 1;
    }

    if let Err(e) = output.flush() {
      error!("failed to flush response: {e}");
      return 1;
    }

    i32::from(result.verdict == Verdict::Uke)
  }

  fn execute(&self, input: &mut impl io::Read) -> Result<JudgeResult> {
    let request = JudgeRequest::decode(input)?;

    request.validate()?;

    debug!(sandbox_id = %request.sandbox_id, "request accepted");

    let mut barrier = Barrier::new()?;

    let (result_rx, result_tx) = pipe2(OFlag::O_CLOEXEC)?;

    let mut result_tx = File::from(result_tx);

    // No PID namespace here: namespace-init must keep a stable view of
    // /proc so the executor grandchild can be set up from the parent side.
    let child = spawn(
      CloneFlags::CLONE_NEWUSER
        | CloneFlags::CLONE_NEWNS
        | CloneFlags::CLONE_NEWIPC
        | CloneFlags::CLONE_NEWNET
        | CloneFlags::CLONE_NEWUTS,
      || namespace_init::run(&self.system, &request, &mut barrier, &mut result_tx),
    )?;

    let child = ChildGuard::new(child);

    drop(result_tx);

    self.install_user_mappings(Utf8Path::new("/proc"), child.pid())?;

    barrier.release()?;

    // Read before reaping: a response larger than the pipe buffer would
    // deadlock the other way around.
    let mut result_rx = File::from(result_rx);

    let result = JudgeResult::decode(&mut result_rx)?;

    child.wait()?;

    Ok(result)
  }

  /// Maps inner root onto the invoking identity, granting namespace-init
  /// its capabilities without touching host privileges.
  ///
  /// `setgroups` must be denied before a gid map can be installed from the
  /// parent side.
  fn install_user_mappings(&self, proc_root: &Utf8Path, pid: Pid) -> Result {
    let dir = proc_root.join(pid.to_string());

    let install = |file: &str, content: String| {
      fs::write(dir.join(file), content)
        .map_err(|e| Error::Spawn(format!("write {file} for {pid}: {e}")))
    };

    install("setgroups", "deny".into())?;
    install("uid_map", format!("0 {} 1\n", self.system.getuid()))?;
    install("gid_map", format!("0 {} 1\n", self.system.getgid()))?;

    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use {super::*, crate::request::sample_request, std::io::Cursor, tempfile::TempDir};

  struct MockSystem {
    gid: u32,
    uid: u32,
  }

  impl System for MockSystem {
    fn getgid(&self) -> Gid {
      Gid::from_raw(self.gid)
    }

    fn getuid(&self) -> Uid {
      Uid::from_raw(self.uid)
    }

    fn umask(&self, _mask: Mode) -> Mode {
      Mode::empty()
    }
  }

  fn mock_driver() -> Driver<MockSystem> {
    Driver {
      system: MockSystem {
        gid: 1000,
        uid: 1000,
      },
    }
  }

  #[test]
  fn user_mappings_map_inner_root_to_the_invoking_identity() {
    let temp = TempDir::new().unwrap();

    let proc_root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();

    fs::create_dir(proc_root.join("4242")).unwrap();

    mock_driver()
      .install_user_mappings(&proc_root, Pid::from_raw(4242))
      .unwrap();

    assert_eq!(
      fs::read_to_string(proc_root.join("4242/setgroups")).unwrap(),
      "deny"
    );

    assert_eq!(
      fs::read_to_string(proc_root.join("4242/uid_map")).unwrap(),
      "0 1000 1\n"
    );

    assert_eq!(
      fs::read_to_string(proc_root.join("4242/gid_map")).unwrap(),
      "0 1000 1\n"
    );
  }

  #[test]
  fn empty_input_yields_a_single_uke_frame_and_exit_one() {
    let mut output = Vec::new();

    let code = mock_driver().run(&mut Cursor::new(Vec::new()), &mut output);

    assert_eq!(code, 1);

    let mut cursor = Cursor::new(output);

    let result = JudgeResult::decode(&mut cursor).unwrap();

    assert_eq!(result.verdict, Verdict::Uke);
    assert_eq!(result.time_ms, 0);
    assert_eq!(result.memory_mb, 0);
    assert!(result.output_files.is_empty());

    let stderr = String::from_utf8(result.stderr).unwrap();

    assert!(stderr.starts_with("Internal Error: "));

    // exactly one frame
    assert_eq!(cursor.position(), cursor.get_ref().len() as u64);
  }

  #[test]
  fn invalid_request_is_refused_before_any_setup() {
    let mut request = sample_request();

    request.time_limit_ms = 0;

    let mut input = Vec::new();

    request.encode(&mut input).unwrap();

    let mut output = Vec::new();

    let code = mock_driver().run(&mut Cursor::new(input), &mut output);

    assert_eq!(code, 1);

    let result = JudgeResult::decode(&mut Cursor::new(output)).unwrap();

    assert_eq!(result.verdict, Verdict::Uke);

    let stderr = String::from_utf8(result.stderr).unwrap();

    assert!(stderr.contains("time limit"));
  }

  #[test]
  fn escaping_filenames_are_refused_before_any_setup() {
    let mut request = sample_request();

    request.output_filenames = vec!["../loot".into()];

    let mut input = Vec::new();

    request.encode(&mut input).unwrap();

    let mut output = Vec::new();

    let code = mock_driver().run(&mut Cursor::new(input), &mut output);

    assert_eq!(code, 1);

    let result = JudgeResult::decode(&mut Cursor::new(output)).unwrap();

    assert_eq!(result.verdict, Verdict::Uke);
  }
}
