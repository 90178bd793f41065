/// View of the node's root filesystem as mounted into the installer container.
///
/// Every path handed to the installer (preset locations, shim install paths,
/// the ledger) is an absolute host path. `HostFs` resolves those to the
/// physical location under the mount so the rest of the crate never joins
/// paths by hand.
use std::io::Write;
use std::path::{Component, Path, PathBuf};

#[derive(Debug, Clone)]
pub struct HostFs {
    root: PathBuf,
}

impl HostFs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Physical path for an absolute host path.
    pub fn resolve(&self, host_path: &Path) -> PathBuf {
        let mut resolved = self.root.clone();
        for component in host_path.components() {
            match component {
                Component::Normal(part) => resolved.push(part),
                Component::ParentDir => {
                    if resolved != self.root {
                        resolved.pop();
                    }
                }
                Component::RootDir | Component::CurDir | Component::Prefix(_) => {}
            }
        }
        resolved
    }

    pub fn exists(&self, host_path: &Path) -> std::io::Result<()> {
        std::fs::metadata(self.resolve(host_path)).map(|_| ())
    }

    pub fn read_to_string(&self, host_path: &Path) -> std::io::Result<String> {
        std::fs::read_to_string(self.resolve(host_path))
    }

    pub fn read(&self, host_path: &Path) -> std::io::Result<Vec<u8>> {
        std::fs::read(self.resolve(host_path))
    }

    pub fn remove_file(&self, host_path: &Path) -> std::io::Result<()> {
        std::fs::remove_file(self.resolve(host_path))
    }

    pub fn create_dir_all(&self, host_path: &Path) -> std::io::Result<()> {
        std::fs::create_dir_all(self.resolve(host_path))
    }

    /// Replace a file's contents through a sibling temp file and a rename, so a
    /// crash leaves either the old or the new contents on disk. An existing
    /// file keeps its permissions; a new one gets 0644.
    pub fn write_atomic(&self, host_path: &Path, contents: &[u8]) -> std::io::Result<()> {
        self.write_atomic_inner(host_path, contents, None)
    }

    /// Same as [`HostFs::write_atomic`] but always applies `mode`.
    pub fn write_atomic_with_mode(
        &self,
        host_path: &Path,
        contents: &[u8],
        mode: u32,
    ) -> std::io::Result<()> {
        self.write_atomic_inner(host_path, contents, Some(mode))
    }

    fn write_atomic_inner(
        &self,
        host_path: &Path,
        contents: &[u8],
        mode: Option<u32>,
    ) -> std::io::Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let target = self.resolve(host_path);
        let dir = target.parent().ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("{} has no parent directory", target.display()),
            )
        })?;
        std::fs::create_dir_all(dir)?;

        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(contents)?;
        tmp.as_file().sync_all()?;
        let permissions = match (mode, std::fs::metadata(&target)) {
            (Some(mode), _) => std::fs::Permissions::from_mode(mode),
            (None, Ok(meta)) => meta.permissions(),
            (None, Err(_)) => std::fs::Permissions::from_mode(0o644),
        };
        tmp.as_file().set_permissions(permissions)?;
        tmp.persist(&target).map_err(|e| e.error)?;
        Ok(())
    }
}
