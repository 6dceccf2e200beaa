use super::*;

/// Stops mount events in the new namespace from propagating back to the
/// host.
pub fn make_mounts_private() -> Result {
  mount(
    None::<&str>,
    "/",
    None::<&str>,
    MsFlags::MS_REC | MsFlags::MS_PRIVATE,
    None::<&str>,
  )
  .map_err(|e| Error::Mount(format!("remount / private: {e}")))
}

/// The ephemeral directory `/tmp/judger_sandbox_<id>` carrying the run's
/// mounts. Removed on drop.
pub struct SandboxRoot {
  path: Utf8PathBuf,
  present: bool,
}

impl SandboxRoot {
  pub fn create(sandbox_id: &str) -> Result<Self> {
    let path = Utf8PathBuf::from(format!("/tmp/judger_sandbox_{sandbox_id}"));

    path.recreate(0o777)?;

    Ok(Self {
      path,
      present: true,
    })
  }

  pub fn path(&self) -> &Utf8Path {
    &self.path
  }

  /// The writable tmpfs mountpoint inside the rootfs.
  pub fn tmp_dir(&self) -> Utf8PathBuf {
    self.path.join("tmp")
  }
}

impl Drop for SandboxRoot {
  fn drop(&mut self) {
    if !self.present {
      return;
    }

    self.present = false;

    if let Err(e) = fs::remove_dir(&self.path) {
      warn!("failed to remove sandbox root {}: {e}", self.path);
    }
  }
}

/// A read-only bind of the prepared rootfs onto the sandbox root.
/// Detach-unmounted on drop.
pub struct BindMount {
  target: Utf8PathBuf,
  mounted: bool,
}

impl BindMount {
  pub fn read_only(source: &Utf8Path, target: &Utf8Path) -> Result<Self> {
    mount(
      Some(source.as_std_path()),
      target.as_std_path(),
      None::<&str>,
      MsFlags::MS_BIND | MsFlags::MS_REC,
      None::<&str>,
    )
    .map_err(|e| Error::Mount(format!("bind {source} onto {target}: {e}")))?;

    let guard = Self {
      target: target.to_owned(),
      mounted: true,
    };

    // A bind inherits the source's write access; only a remount of the bind
    // itself makes it read-only.
    mount(
      None::<&str>,
      target.as_std_path(),
      None::<&str>,
      MsFlags::MS_REMOUNT | MsFlags::MS_BIND | MsFlags::MS_RDONLY,
      None::<&str>,
    )
    .map_err(|e| Error::Mount(format!("remount {target} read-only: {e}")))?;

    Ok(guard)
  }
}

impl Drop for BindMount {
  fn drop(&mut self) {
    if !self.mounted {
      return;
    }

    self.mounted = false;

    if let Err(e) = umount2(self.target.as_std_path(), MntFlags::MNT_DETACH) {
      warn!("failed to unmount {}: {e}", self.target);
    }
  }
}

/// The run's writable, size-capped tmpfs. Detach-unmounted on drop.
pub struct Tmpfs {
  target: Utf8PathBuf,
  mounted: bool,
}

impl Tmpfs {
  pub fn mount(target: &Utf8Path, size: &str) -> Result<Self> {
    let options = Self::options(size);

    mount(
      Some("tmpfs"),
      target.as_std_path(),
      Some("tmpfs"),
      MsFlags::empty(),
      Some(options.as_str()),
    )
    .map_err(|e| Error::Mount(format!("mount tmpfs at {target}: {e}")))?;

    Ok(Self {
      target: target.to_owned(),
      mounted: true,
    })
  }

  fn options(size: &str) -> String {
    format!("mode=0777,size={size}")
  }
}

impl Drop for Tmpfs {
  fn drop(&mut self) {
    if !self.mounted {
      return;
    }

    self.mounted = false;

    if let Err(e) = umount2(self.target.as_std_path(), MntFlags::MNT_DETACH) {
      warn!("failed to unmount {}: {e}", self.target);
    }
  }
}
