use super::*;

/// A file materialized in the sandbox tmpfs before the target runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputFile {
  /// Name of the file, relative to the sandbox `/tmp`.
  ///
  /// Plain names only: no `/`, no `.` or `..` components.
  pub filename: String,

  /// Raw file content.
  pub content: Vec<u8>,

  /// Unix permission bits applied to the created file.
  pub mode: u32,
}

/// One judged run, fully described.
///
/// All configuration travels in the request; the binary takes no arguments
/// and reads no environment knobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JudgeRequest {
  /// CPU-time budget for the run, in milliseconds.
  pub time_limit_ms: u32,

  /// Hard memory cap (anonymous + cache + kernel), in megabytes.
  pub memory_limit_mb: u64,

  /// Maximum number of concurrent processes inside the sandbox.
  pub pids_limit: u32,

  /// Host path of a prepared root filesystem tree, bind-mounted read-only.
  ///
  /// The tree must contain at least a dynamic loader, the shared libraries
  /// the target needs, and an empty `/tmp` to carry the writable tmpfs.
  pub rootfs_path: Utf8PathBuf,

  /// Size cap for the sandbox tmpfs, in `mount -o size=` syntax (e.g. "64M").
  pub tmpfs_size: String,

  /// Host path of a delegated cgroup v2 subtree writable by the caller.
  pub cgroup_root: Utf8PathBuf,

  /// Unique name for this run; uniqueness is the caller's contract.
  ///
  /// Names the ephemeral mountpoint `/tmp/judger_sandbox_<id>` and the
  /// cgroup leaf `<cgroup_root>/judge.<id>`.
  pub sandbox_id: String,

  /// Bytes piped to the target as standard input.
  pub stdin_bytes: Vec<u8>,

  /// Argument vector of the target; `cmdline[0]` is the absolute in-sandbox
  /// path of the executable.
  pub cmdline: Vec<String>,

  /// Files written into the tmpfs before execution.
  pub input_files: Vec<InputFile>,

  /// Files collected from the tmpfs after execution, in this order.
  ///
  /// A missing file yields empty content rather than an error.
  pub output_filenames: Vec<String>,
}

impl JudgeRequest {
  pub fn decode(reader: &mut impl io::Read) -> Result<Self> {
    let time_limit_ms = decode_u32(reader, "time limit")?;
    let memory_limit_mb = decode_u64(reader, "memory limit")?;
    let pids_limit = decode_u32(reader, "pids limit")?;

    let rootfs_path = Utf8PathBuf::from(read_string(reader)?);
    let tmpfs_size = read_string(reader)?;
    let cgroup_root = Utf8PathBuf::from(read_string(reader)?);
    let sandbox_id = read_string(reader)?;
    let stdin_bytes = read_bytes(reader)?;

    let cmdline_count = decode_count(reader, "cmdline")?;

    let mut cmdline = Vec::with_capacity(cmdline_count);

    for _ in 0..cmdline_count {
      cmdline.push(read_string(reader)?);
    }

    let input_count = decode_count(reader, "input files")?;

    let mut input_files = Vec::with_capacity(input_count);

    for _ in 0..input_count {
      let filename = read_string(reader)?;
      let content = read_bytes(reader)?;
      let mode = decode_u32(reader, "input file mode")?;

      input_files.push(InputFile {
        filename,
        content,
        mode,
      });
    }

    let output_count = decode_count(reader, "output files")?;

    let mut output_filenames = Vec::with_capacity(output_count);

    for _ in 0..output_count {
      output_filenames.push(read_string(reader)?);
    }

    Ok(Self {
      time_limit_ms,
      memory_limit_mb,
      pids_limit,
      rootfs_path,
      tmpfs_size,
      cgroup_root,
      sandbox_id,
      stdin_bytes,
      cmdline,
      input_files,
      output_filenames,
    })
  }

  pub fn encode(&self, writer: &mut impl io::Write) -> Result {
    write_i32(writer, self.time_limit_ms as i32)?;
    write_i64(writer, self.memory_limit_mb as i64)?;
    write_i32(writer, self.pids_limit as i32)?;

    write_str(writer, self.rootfs_path.as_str())?;
    write_str(writer, &self.tmpfs_size)?;
    write_str(writer, self.cgroup_root.as_str())?;
    write_str(writer, &self.sandbox_id)?;
    write_bytes(writer, &self.stdin_bytes)?;

    write_i32(writer, self.cmdline.len() as i32)?;

    for argument in &self.cmdline {
      write_str(writer, argument)?;
    }

    write_i32(writer, self.input_files.len() as i32)?;

    for file in &self.input_files {
      write_str(writer, &file.filename)?;
      write_bytes(writer, &file.content)?;
      write_i32(writer, file.mode as i32)?;
    }

    write_i32(writer, self.output_filenames.len() as i32)?;

    for filename in &self.output_filenames {
      write_str(writer, filename)?;
    }

    Ok(())
  }

  /// Checked before any host resource is acquired; a failure here becomes a
  /// UKE response.
  pub fn validate(&self) -> Result {
    ensure!(
      self.time_limit_ms > 0,
      Error::Request("time limit must be positive".into())
    );

    ensure!(
      self.memory_limit_mb > 0,
      Error::Request("memory limit must be positive".into())
    );

    ensure!(
      self.pids_limit > 0,
      Error::Request("pids limit must be positive".into())
    );

    ensure!(
      !self.cmdline.is_empty(),
      Error::Request("cmdline must not be empty".into())
    );

    ensure!(
      !self.tmpfs_size.is_empty(),
      Error::Request("tmpfs size must not be empty".into())
    );

    ensure!(
      !self.rootfs_path.as_str().is_empty(),
      Error::Request("rootfs path must not be empty".into())
    );

    ensure!(
      !self.cgroup_root.as_str().is_empty(),
      Error::Request("cgroup root must not be empty".into())
    );

    ensure!(
      !self.sandbox_id.is_empty() && self.sandbox_id.chars().all(is_sandbox_id_char),
      Error::Request(format!("invalid sandbox id {:?}", self.sandbox_id))
    );

    for file in &self.input_files {
      validate_filename(&file.filename)?;
    }

    for filename in &self.output_filenames {
      validate_filename(filename)?;
    }

    Ok(())
  }
}

/// The id names a mountpoint and a cgroup leaf, so it must stay a single
/// path component.
fn is_sandbox_id_char(c: char) -> bool {
  c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')
}

fn decode_u32(reader: &mut impl io::Read, field: &str) -> Result<u32> {
  u32::try_from(read_i32(reader)?).map_err(|_| Error::Protocol(format!("negative {field}")))
}

fn decode_u64(reader: &mut impl io::Read, field: &str) -> Result<u64> {
  u64::try_from(read_i64(reader)?).map_err(|_| Error::Protocol(format!("negative {field}")))
}

fn decode_count(reader: &mut impl io::Read, field: &str) -> Result<usize> {
  usize::try_from(read_i32(reader)?)
    .map_err(|_| Error::Protocol(format!("negative {field} count")))
}

#[cfg(test)]
pub(crate) fn sample_request() -> JudgeRequest {
  JudgeRequest {
    time_limit_ms: 1000,
    memory_limit_mb: 64,
    pids_limit: 16,
    rootfs_path: Utf8PathBuf::from("/srv/rootfs"),
    tmpfs_size: "64M".into(),
    cgroup_root: Utf8PathBuf::from("/sys/fs/cgroup/judge"),
    sandbox_id: "run-1".into(),
    stdin_bytes: b"hello\n".to_vec(),
    cmdline: vec!["/bin/sh".into(), "-c".into(), "cat".into()],
    input_files: vec![InputFile {
      filename: "in.txt".into(),
      content: b"42".to_vec(),
      mode: 0o644,
    }],
    output_filenames: vec!["out.bin".into()],
  }
}

#[cfg(test)]
mod tests {
  use {super::*, assert_matches::assert_matches, std::io::Cursor};

  #[test]
  fn request_round_trip() {
    let request = sample_request();

    let mut buffer = Vec::new();

    request.encode(&mut buffer).unwrap();

    let decoded = JudgeRequest::decode(&mut Cursor::new(buffer)).unwrap();

    assert_eq!(decoded, request);
  }

  #[test]
  fn truncated_request_is_a_protocol_error() {
    let request = sample_request();

    let mut buffer = Vec::new();

    request.encode(&mut buffer).unwrap();

    buffer.truncate(buffer.len() / 2);

    assert_matches!(
      JudgeRequest::decode(&mut Cursor::new(buffer)),
      Err(Error::Protocol(_))
    );
  }

  #[test]
  fn negative_limit_is_a_protocol_error() {
    let mut buffer = Vec::new();

    write_i32(&mut buffer, -5).unwrap();

    assert_matches!(
      JudgeRequest::decode(&mut Cursor::new(buffer)),
      Err(Error::Protocol(message)) if message.contains("time limit")
    );
  }

  #[test]
  fn valid_request_passes_validation() {
    assert!(sample_request().validate().is_ok());
  }

  #[test]
  fn zero_limits_are_rejected() {
    for mutate in [
      (|r: &mut JudgeRequest| r.time_limit_ms = 0) as fn(&mut JudgeRequest),
      |r| r.memory_limit_mb = 0,
      |r| r.pids_limit = 0,
    ] {
      let mut request = sample_request();

      mutate(&mut request);

      assert_matches!(request.validate(), Err(Error::Request(_)));
    }
  }

  #[test]
  fn empty_cmdline_is_rejected() {
    let mut request = sample_request();

    request.cmdline.clear();

    assert_matches!(
      request.validate(),
      Err(Error::Request(message)) if message.contains("cmdline")
    );
  }

  #[test]
  fn sandbox_id_with_path_separator_is_rejected() {
    for id in ["", "a/b", "../escape", "run 1"] {
      let mut request = sample_request();

      request.sandbox_id = id.into();

      assert_matches!(
        request.validate(),
        Err(Error::Request(message)) if message.contains("sandbox id")
      );
    }
  }

  #[test]
  fn escaping_input_filename_is_rejected() {
    let mut request = sample_request();

    request.input_files[0].filename = "../etc/passwd".into();

    assert_matches!(request.validate(), Err(Error::InputFile(_)));
  }

  #[test]
  fn escaping_output_filename_is_rejected() {
    let mut request = sample_request();

    request.output_filenames = vec!["nested/out".into()];

    assert_matches!(request.validate(), Err(Error::InputFile(_)));
  }
}
