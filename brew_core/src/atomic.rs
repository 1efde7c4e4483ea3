//! Small "atomic" helpers: a lock-free `f32` cell for telemetry values and a
//! crash-safe file replacement for the settings store.

use std::sync::atomic::{AtomicU32, Ordering};
use std::{fs, io::Write, path::Path};

/// `f32` stored as its bit pattern in an `AtomicU32`.
#[derive(Debug, Default)]
pub struct AtomicF32(AtomicU32);

impl AtomicF32 {
    pub fn new(v: f32) -> Self {
        Self(AtomicU32::new(v.to_bits()))
    }

    #[inline]
    pub fn load(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Acquire))
    }

    #[inline]
    pub fn store(&self, v: f32) {
        self.0.store(v.to_bits(), Ordering::Release);
    }
}

/// Write `bytes` to a sibling temp file, fsync it, then rename over `path`.
///
/// Readers see either the old file or the new one, never a torn write.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }
    let tmp = path.with_extension("new");
    {
        let mut f = fs::File::create(&tmp)?;
        f.write_all(bytes)?;
        f.sync_all()?;
    }
    fs::rename(tmp, path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atomic_f32_keeps_sign_and_fraction() {
        let a = AtomicF32::new(0.0);
        a.store(-12.34);
        assert_eq!(a.load(), -12.34);
    }

    #[test]
    fn write_atomic_replaces_and_leaves_no_temp() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("state.toml");
        write_atomic(&path, b"a = 1").unwrap();
        write_atomic(&path, b"a = 2").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "a = 2");
        assert!(!path.with_extension("new").exists());
    }
}
