use std::path::{Path, PathBuf};

use crate::error::{JobError, Result};

/// Directory holding the worker scripts a job may name.
#[derive(Clone, Debug)]
pub struct ScriptDir {
    root: PathBuf,
    default_script: Option<String>,
}

impl ScriptDir {
    /// Scripts live under `root`; `default_script` is used when a request names none.
    pub fn new(root: impl Into<PathBuf>, default_script: Option<String>) -> Self {
        Self { root: root.into(), default_script }
    }

    /// Directory root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a script name to `(name, path)`.
    pub fn resolve(&self, name: Option<&str>) -> Result<(String, PathBuf)> {
        let name = match name.map(str::trim).filter(|n| !n.is_empty()) {
            Some(n) => n,
            None => self
                .default_script
                .as_deref()
                .ok_or_else(|| JobError::InvalidScriptName("script name is required".into()))?,
        };
        if name == "." || name.contains("..") || name.contains(['/', '\\']) {
            return Err(JobError::InvalidScriptName(format!(
                "`{name}` must be a plain file name"
            )));
        }
        Ok((name.to_string(), self.root.join(name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_under_root() {
        let dir = ScriptDir::new("/srv/scripts", None);
        let (name, path) = dir.resolve(Some("sync.py")).unwrap();
        assert_eq!(name, "sync.py");
        assert_eq!(path, PathBuf::from("/srv/scripts/sync.py"));
    }

    #[test]
    fn falls_back_to_default() {
        let dir = ScriptDir::new("/srv/scripts", Some("example.py".into()));
        assert_eq!(dir.resolve(None).unwrap().0, "example.py");
        assert_eq!(dir.resolve(Some("  ")).unwrap().0, "example.py");
    }

    #[test]
    fn rejects_escapes_and_missing() {
        let dir = ScriptDir::new("/srv/scripts", None);
        for bad in ["../etc/passwd", "a/b.sh", "..", ".", "x\\y"] {
            assert!(dir.resolve(Some(bad)).is_err(), "{bad}");
        }
        let err = dir.resolve(None).unwrap_err();
        assert_eq!(err.code(), "INVALID_SCRIPT_NAME");
    }
}
