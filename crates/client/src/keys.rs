use crate::error::{Error, Result};
use reqwest::Url;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Local storage for allocation private keys.
///
/// File names are namespaced by service host and port, so the same
/// pool-assigned host id arriving from two different services never lands on
/// one path.
#[derive(Debug, Clone)]
pub struct KeyStore {
    dir: PathBuf,
    namespace: String,
}

impl KeyStore {
    /// Key store for one service. `dir` overrides the default `~/.ssh`;
    /// home-relative values are tilde-expanded.
    pub fn for_service(service_url: &Url, dir: Option<&Path>) -> Self {
        let dir = dir.map(expand_home).unwrap_or_else(default_key_dir);
        let namespace = match (service_url.host_str(), service_url.port_or_known_default()) {
            (Some(host), Some(port)) => format!("{}_{}", host, port),
            (Some(host), None) => host.to_string(),
            _ => "service".to_string(),
        };
        KeyStore { dir, namespace }
    }

    pub fn path_for(&self, host_id: &str) -> PathBuf {
        self.dir.join(format!("key_{}_{}", self.namespace, host_id))
    }

    /// Write key content as-is, readable by the owner only, creating the
    /// parent directory when missing.
    pub fn save(&self, host_id: &str, contents: &str) -> Result<PathBuf> {
        let path = self.path_for(host_id);
        write_restricted(&path, contents).map_err(|source| Error::KeyFile {
            path: path.clone(),
            source,
        })?;
        debug!(path = %path.display(), "key file written");
        Ok(path)
    }
}

fn default_key_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".ssh")
}

fn expand_home(dir: &Path) -> PathBuf {
    match dir.strip_prefix("~") {
        Ok(rest) => dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(rest),
        Err(_) => dir.to_path_buf(),
    }
}

#[cfg(unix)]
fn write_restricted(path: &Path, contents: &str) -> io::Result<()> {
    use std::io::Write;
    use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    file.write_all(contents.as_bytes())?;
    // mode() only applies when the file is created; an overwrite keeps the
    // old permissions unless reset here
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    Ok(())
}

#[cfg(not(unix))]
fn write_restricted(path: &Path, contents: &str) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, contents)
}

/// Delete a key file. An already-absent file is not an error; returns whether
/// anything was removed.
pub fn remove_key_file(path: &Path) -> io::Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err),
    }
}
