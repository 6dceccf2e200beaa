use super::*;

pub trait System {
  fn getgid(&self) -> Gid;
  fn getuid(&self) -> Uid;
  fn umask(&self, mask: Mode) -> Mode;
}

pub struct MaterialSystem;

impl System for MaterialSystem {
  fn getgid(&self) -> Gid {
    getgid()
  }

  fn getuid(&self) -> Uid {
    getuid()
  }

  fn umask(&self, mask: Mode) -> Mode {
    umask(mask)
  }
}
