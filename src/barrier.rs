use super::*;

/// One-byte pipe ordering two otherwise concurrent operations across a
/// process boundary.
///
/// After a clone both processes hold a copy of both ends; `wait` and
/// `release` each close the ends the caller must not keep, so a peer dying
/// early surfaces as EOF instead of a hang.
pub struct Barrier {
  rx: Option<OwnedFd>,
  tx: Option<OwnedFd>,
}

impl Barrier {
  pub fn new() -> Result<Self> {
    let (rx, tx) = pipe2(OFlag::O_CLOEXEC)?;

    Ok(Self {
      rx: Some(rx),
      tx: Some(tx),
    })
  }

  /// Blocks until the peer releases.
  pub fn wait(&mut self) -> Result {
    self.tx.take();

    let rx = self
      .rx
      .take()
      .ok_or_else(|| Error::Barrier("already waited".into()))?;

    let mut byte = [0u8; 1];

    loop {
      match read(rx.as_raw_fd(), &mut byte) {
        Ok(0) => return Err(Error::Barrier("peer exited before release".into())),
        Ok(_) => return Ok(()),
        Err(Errno::EINTR) => continue,
        Err(e) => return Err(e.into()),
      }
    }
  }

  /// Unblocks the waiting peer.
  pub fn release(&mut self) -> Result {
    self.rx.take();

    let tx = self
      .tx
      .take()
      .ok_or_else(|| Error::Barrier("already released".into()))?;

    loop {
      match write(&tx, &[1u8]) {
        Ok(_) => return Ok(()),
        Err(Errno::EINTR) => continue,
        Err(e) => return Err(e.into()),
      }
    }
  }
}
