use super::*;

/// Terminal classification of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
  /// Exited zero within all limits.
  Ok,
  /// CPU time over the limit, or the grace timer fired.
  Tle,
  /// Killed by the cgroup OOM killer.
  Mle,
  /// Non-zero exit or death by signal, within limits.
  Re,
  /// Sandbox or system failure, distinguishable from a target failure.
  Uke,
}

impl Verdict {
  pub fn code(self) -> i32 {
    match self {
      Verdict::Ok => 0,
      Verdict::Tle => 1,
      Verdict::Mle => 2,
      Verdict::Re => 3,
      Verdict::Uke => 4,
    }
  }

  pub fn from_code(code: i32) -> Result<Self> {
    match code {
      0 => Ok(Verdict::Ok),
      1 => Ok(Verdict::Tle),
      2 => Ok(Verdict::Mle),
      3 => Ok(Verdict::Re),
      4 => Ok(Verdict::Uke),
      other => Err(Error::Protocol(format!("unknown verdict code {other}"))),
    }
  }

  /// Combines the executor's exit byte with the cgroup counters.
  ///
  /// Priority: a system failure is never reinterpreted; an observed OOM kill
  /// beats every target-attributed verdict; measured CPU time over the limit
  /// beats a runtime error. The time check is applied even when the executor
  /// already reported a clean exit, because `user_usec` accounting can exceed
  /// the limit without the grace timer firing.
  pub fn classify(
    exit_code: Option<i32>,
    oom_killed: bool,
    time_ms: u32,
    time_limit_ms: u32,
  ) -> Self {
    let base = match exit_code {
      Some(EXIT_OK) => Verdict::Ok,
      Some(EXIT_RE) => Verdict::Re,
      Some(EXIT_TLE) => Verdict::Tle,
      _ => Verdict::Uke,
    };

    if base == Verdict::Uke {
      return Verdict::Uke;
    }

    if oom_killed {
      return Verdict::Mle;
    }

    if base == Verdict::Tle || time_ms > time_limit_ms {
      return Verdict::Tle;
    }

    base
  }
}

impl fmt::Display for Verdict {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      Verdict::Ok => "OK",
      Verdict::Tle => "TLE",
      Verdict::Mle => "MLE",
      Verdict::Re => "RE",
      Verdict::Uke => "UKE",
    };

    write!(f, "{name}")
  }
}

/// An artifact collected from the sandbox tmpfs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputFile {
  pub filename: String,
  pub content: Vec<u8>,
}

/// The response to one [`JudgeRequest`](crate::JudgeRequest).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JudgeResult {
  pub verdict: Verdict,

  /// CPU-user time consumed, from `cpu.stat`.
  pub time_ms: u32,

  /// Peak memory use, from `memory.peak`.
  pub memory_mb: u64,

  pub stdout: Vec<u8>,
  pub stderr: Vec<u8>,

  /// Collected artifacts, in request order.
  pub output_files: Vec<OutputFile>,
}

impl JudgeResult {
  /// The response emitted when the sandbox itself failed.
  pub fn internal_error(error: &Error) -> Self {
    Self {
      verdict: Verdict::Uke,
      time_ms: 0,
      memory_mb: 0,
      stdout: Vec::new(),
      stderr: format!("Internal Error: {error}").into_bytes(),
      output_files: Vec::new(),
    }
  }

  pub fn decode(reader: &mut impl io::Read) -> Result<Self> {
    let verdict = Verdict::from_code(read_i32(reader)?)?;

    let time_ms = u32::try_from(read_i32(reader)?)
      .map_err(|_| Error::Protocol("negative time".into()))?;

    let memory_mb = u64::try_from(read_i64(reader)?)
      .map_err(|_| Error::Protocol("negative memory".into()))?;

    let stdout = read_bytes(reader)?;
    let stderr = read_bytes(reader)?;

    let file_count = usize::try_from(read_i32(reader)?)
      .map_err(|_| Error::Protocol("negative file count".into()))?;

    let mut output_files = Vec::with_capacity(file_count);

    for _ in 0..file_count {
      let filename = read_string(reader)?;
      let content = read_bytes(reader)?;

      output_files.push(OutputFile { filename, content });
    }

    Ok(Self {
      verdict,
      time_ms,
      memory_mb,
      stdout,
      stderr,
      output_files,
    })
  }

  pub fn encode(&self, writer: &mut impl io::Write) -> Result {
    write_i32(writer, self.verdict.code())?;
    write_i32(writer, self.time_ms as i32)?;
    write_i64(writer, self.memory_mb as i64)?;

    write_bytes(writer, &self.stdout)?;
    write_bytes(writer, &self.stderr)?;

    write_i32(writer, self.output_files.len() as i32)?;

    for file in &self.output_files {
      write_str(writer, &file.filename)?;
      write_bytes(writer, &file.content)?;
    }

    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use {super::*, assert_matches::assert_matches, std::io::Cursor};

  fn sample_result() -> JudgeResult {
    JudgeResult {
      verdict: Verdict::Ok,
      time_ms: 120,
      memory_mb: 3,
      stdout: b"hello\n".to_vec(),
      stderr: Vec::new(),
      output_files: vec![
        OutputFile {
          filename: "out.bin".into(),
          content: b"ok\n".to_vec(),
        },
        OutputFile {
          filename: "missing".into(),
          content: Vec::new(),
        },
      ],
    }
  }

  #[test]
  fn result_round_trip() {
    let result = sample_result();

    let mut buffer = Vec::new();

    result.encode(&mut buffer).unwrap();

    let decoded = JudgeResult::decode(&mut Cursor::new(buffer)).unwrap();

    assert_eq!(decoded, result);
  }

  #[test]
  fn verdict_wire_codes_are_stable() {
    for (verdict, code) in [
      (Verdict::Ok, 0),
      (Verdict::Tle, 1),
      (Verdict::Mle, 2),
      (Verdict::Re, 3),
      (Verdict::Uke, 4),
    ] {
      assert_eq!(verdict.code(), code);
      assert_eq!(Verdict::from_code(code).unwrap(), verdict);
    }

    assert_matches!(Verdict::from_code(5), Err(Error::Protocol(_)));
  }

  #[test]
  fn classify_clean_exit() {
    assert_eq!(Verdict::classify(Some(EXIT_OK), false, 500, 1000), Verdict::Ok);
  }

  #[test]
  fn classify_runtime_error() {
    assert_eq!(Verdict::classify(Some(EXIT_RE), false, 500, 1000), Verdict::Re);
  }

  #[test]
  fn classify_grace_timer_expiry() {
    assert_eq!(
      Verdict::classify(Some(EXIT_TLE), false, 900, 1000),
      Verdict::Tle
    );
  }

  #[test]
  fn classify_measured_time_overrides_clean_exit() {
    assert_eq!(
      Verdict::classify(Some(EXIT_OK), false, 1001, 1000),
      Verdict::Tle
    );
  }

  #[test]
  fn classify_oom_overrides_time_and_exit() {
    assert_eq!(Verdict::classify(Some(EXIT_OK), true, 0, 1000), Verdict::Mle);
    assert_eq!(Verdict::classify(Some(EXIT_RE), true, 0, 1000), Verdict::Mle);
    assert_eq!(
      Verdict::classify(Some(EXIT_TLE), true, 2000, 1000),
      Verdict::Mle
    );
  }

  #[test]
  fn classify_system_failure_is_never_reinterpreted() {
    assert_eq!(
      Verdict::classify(Some(executor::EXIT_SYS), true, 2000, 1000),
      Verdict::Uke
    );
    assert_eq!(Verdict::classify(Some(42), false, 0, 1000), Verdict::Uke);
    assert_eq!(Verdict::classify(None, true, 0, 1000), Verdict::Uke);
  }

  #[test]
  fn internal_error_response_shape() {
    let result = JudgeResult::internal_error(&Error::Protocol("bad frame".into()));

    assert_eq!(result.verdict, Verdict::Uke);
    assert_eq!(result.time_ms, 0);
    assert_eq!(result.memory_mb, 0);
    assert!(result.stdout.is_empty());
    assert!(result.output_files.is_empty());

    let stderr = String::from_utf8(result.stderr).unwrap();

    assert!(stderr.starts_with("Internal Error: "));
    assert!(stderr.contains("bad frame"));
  }
}
