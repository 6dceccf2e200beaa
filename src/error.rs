use super::*;

#[derive(Debug, thiserror::Error)]
pub enum Error {
  #[error("barrier error: {0}")]
  Barrier(String),
  #[error("cgroup error: {0}")]
  Cgroup(String),
  #[error("filesystem error: {0}")]
  Filesystem(#[from] io::Error),
  #[error("input file error: {0}")]
  InputFile(String),
  #[error("mount error: {0}")]
  Mount(String),
  #[error("protocol error: {0}")]
  Protocol(String),
  #[error("invalid request: {0}")]
  Request(String),
  #[error("spawn error: {0}")]
  Spawn(String),
  #[error("system call failed: {0}")]
  Sys(#[from] Errno),
}

pub type Result<T = (), E = Error> = std::result::Result<T, E>;
