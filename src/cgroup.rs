use super::*;

/// One full CPU per 100 ms scheduling window.
const CPU_MAX: &str = "100000 100000";

/// A per-run cgroup v2 leaf under the caller's delegated subtree.
///
/// Carries the CPU, PID and memory limits for the run and is read back for
/// accounting after the executor has been reaped. Removed on drop so no exit
/// path leaves a stale `judge.*` entry behind.
#[derive(Debug)]
pub struct CgroupLeaf {
  path: Utf8PathBuf,
  present: bool,
}

impl CgroupLeaf {
  pub fn create(
    cgroup_root: &Utf8Path,
    sandbox_id: &str,
    memory_limit_mb: u64,
    pids_limit: u32,
  ) -> Result<Self> {
    let path = cgroup_root.join(format!("judge.{sandbox_id}"));

    fs::create_dir(&path).map_err(|e| Error::Cgroup(format!("create {path}: {e}")))?;

    let leaf = Self {
      path,
      present: true,
    };

    leaf.write_control("cpu.max", CPU_MAX)?;
    leaf.write_control("pids.max", &pids_limit.to_string())?;
    leaf.write_control("memory.max", &(memory_limit_mb * 1024 * 1024).to_string())?;

    // No swap: going over memory.max must OOM rather than page out.
    leaf.write_control("memory.swap.max", "0")?;

    Ok(leaf)
  }

  /// Enrolls a process; it must not have started running the target yet.
  pub fn attach(&self, pid: Pid) -> Result {
    self.write_control("cgroup.procs", &pid.to_string())
  }

  /// CPU-user time consumed by the whole leaf, in milliseconds.
  pub fn cpu_user_ms(&self) -> Result<u32> {
    let stat = self.read_control("cpu.stat")?;

    let user_usec = flat_keyed_value(&stat, "user_usec")
      .ok_or_else(|| Error::Cgroup("cpu.stat has no user_usec".into()))?;

    Ok(u32::try_from(user_usec / 1000).unwrap_or(u32::MAX))
  }

  /// Peak memory use of the leaf, in megabytes.
  ///
  /// `memory.peak` is missing on older kernels; the final `memory.current`
  /// snapshot stands in for it there.
  pub fn memory_peak_mb(&self) -> Result<u64> {
    let content = match self.read_control("memory.peak") {
      Ok(content) => content,
      Err(Error::Cgroup(message)) if message.contains("No such file") => {
        self.read_control("memory.current")?
      }
      Err(e) => return Err(e),
    };

    Ok(single_value(&content)? / (1024 * 1024))
  }

  pub fn oom_killed(&self) -> Result<bool> {
    let events = self.read_control("memory.events")?;

    let oom_kills = flat_keyed_value(&events, "oom_kill")
      .ok_or_else(|| Error::Cgroup("memory.events has no oom_kill".into()))?;

    Ok(oom_kills > 0)
  }

  /// Best-effort removal; the leaf must be empty by the time this runs.
  pub fn remove(&mut self) {
    if !self.present {
      return;
    }

    self.present = false;

    if let Err(e) = fs::remove_dir(&self.path) {
      warn!("failed to remove cgroup leaf {}: {e}", self.path);
    }
  }

  fn write_control(&self, file: &str, value: &str) -> Result {
    let path = self.path.join(file);

    fs::write(&path, value).map_err(|e| Error::Cgroup(format!("write {path}: {e}")))
  }

  fn read_control(&self, file: &str) -> Result<String> {
    let path = self.path.join(file);

    fs::read_to_string(&path).map_err(|e| Error::Cgroup(format!("read {path}: {e}")))
  }
}

impl Drop for CgroupLeaf {
  fn drop(&mut self) {
    self.remove();
  }
}

fn flat_keyed_value(content: &str, key: &str) -> Option<u64> {
  content.lines().find_map(|line| {
    let mut fields = line.split_whitespace();

    match (fields.next(), fields.next()) {
      (Some(k), Some(value)) if k == key => value.parse().ok(),
      _ => None,
    }
  })
}

fn single_value(content: &str) -> Result<u64> {
  content
    .trim()
    .parse()
    .map_err(|e| Error::Cgroup(format!("unparseable counter {content:?}: {e}")))
}
