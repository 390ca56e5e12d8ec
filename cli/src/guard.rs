//! Process guards: one instance at a time, never as root.

use std::fs::{File, OpenOptions};
use std::os::fd::AsRawFd;
use std::path::Path;

use anyhow::{Context, bail};
use is_root::is_root;
use nix::errno::Errno;
use nix::fcntl::{FlockArg, flock};
use tracing::debug;

/// Holds an exclusive `flock` on the lock file until dropped.
pub struct InstanceLock {
    _file: File,
}

impl InstanceLock {
    pub fn acquire(path: &Path) -> anyhow::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)
            .with_context(|| format!("cannot open lock file {}", path.display()))?;

        match flock(file.as_raw_fd(), FlockArg::LockExclusiveNonblock) {
            Ok(()) => {}
            Err(Errno::EWOULDBLOCK) => {
                bail!("another infrasync instance holds {}", path.display())
            }
            Err(e) => bail!("cannot lock {}: {e}", path.display()),
        }

        debug!("Acquired {}", path.display());
        Ok(Self { _file: file })
    }
}

/// Fails when running with root privileges.
pub fn refuse_root() -> anyhow::Result<()> {
    if is_root() {
        bail!("refusing to run as root, use an unprivileged account");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_lock_on_same_file_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("infrasync.lock");

        let first = InstanceLock::acquire(&path).unwrap();
        assert!(InstanceLock::acquire(&path).is_err());

        drop(first);
        assert!(InstanceLock::acquire(&path).is_ok());
    }
}
