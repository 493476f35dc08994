use crate::error::{Error, Result};
use crate::keys;
use common::AllocationRecord;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub const HOST_ID: &str = "host_id";
pub const IP: &str = "ip";
pub const PORT: &str = "port";
pub const USER: &str = "user";
pub const PASSWORD: &str = "password";
pub const KEY: &str = "key";
pub const PUBLIC_ADDRESS: &str = "public_address";

/// Every property key this plugin owns.
pub const ALL_KEYS: [&str; 7] = [HOST_ID, IP, PORT, USER, PASSWORD, KEY, PUBLIC_ADDRESS];

/// Mutable per-node property map owned by the orchestration engine. The
/// engine's store is injected behind this trait so the mapping logic can be
/// exercised against an in-memory stand-in.
pub trait PropertyStore {
    fn get(&self, key: &str) -> Option<&Value>;
    fn set(&mut self, key: &str, value: Value);
    fn remove(&mut self, key: &str);
}

/// HashMap-backed store for tests and embedders without a durable backend.
#[derive(Debug, Clone, Default)]
pub struct InMemoryProperties {
    values: HashMap<String, Value>,
}

impl InMemoryProperties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl PropertyStore for InMemoryProperties {
    fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    fn set(&mut self, key: &str, value: Value) {
        self.values.insert(key.to_string(), value);
    }

    fn remove(&mut self, key: &str) {
        self.values.remove(key);
    }
}

fn opt(value: &Option<String>) -> Value {
    match value {
        Some(s) => Value::String(s.clone()),
        None => Value::Null,
    }
}

/// Project an allocation into node properties. Absent optional fields are
/// written as null, never omitted, so release logic can rely on the keys
/// being present. `key_path` is the local key file when one was written; it
/// takes precedence over a password.
pub fn apply_allocation<S: PropertyStore>(
    props: &mut S,
    record: &AllocationRecord,
    key_path: Option<&Path>,
) {
    props.set(HOST_ID, Value::String(record.host_id.clone()));
    props.set(IP, Value::String(record.ip.clone()));
    props.set(PORT, Value::from(record.port));
    props.set(USER, opt(&record.username));
    match key_path {
        Some(path) => {
            props.set(KEY, Value::String(path.to_string_lossy().into_owned()));
            props.set(PASSWORD, Value::Null);
        }
        None => {
            props.set(KEY, Value::Null);
            props.set(PASSWORD, opt(&record.password));
        }
    }
    props.set(PUBLIC_ADDRESS, opt(&record.public_address));
}

/// The stored host id, required for release. Missing or null means release
/// ran without a prior successful acquire, a lifecycle ordering bug in the
/// caller.
pub fn stored_host_id<S: PropertyStore>(props: &S) -> Result<String> {
    match props.get(HOST_ID) {
        Some(Value::String(s)) if !s.is_empty() => Ok(s.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        _ => Err(Error::MissingProperty(HOST_ID)),
    }
}

/// The stored key file path, when acquire wrote one.
pub fn stored_key_path<S: PropertyStore>(props: &S) -> Option<PathBuf> {
    match props.get(KEY) {
        Some(Value::String(s)) if !s.is_empty() => Some(PathBuf::from(s)),
        _ => None,
    }
}

/// Remove the key file (if any) and delete every property this plugin wrote.
/// Safe to call twice: an already-absent key file is skipped silently.
pub fn finalize<S: PropertyStore>(props: &mut S) -> Result<()> {
    if let Some(path) = stored_key_path(props) {
        keys::remove_key_file(&path).map_err(|source| Error::KeyFile { path, source })?;
    }
    for key in ALL_KEYS {
        props.remove(key);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> AllocationRecord {
        AllocationRecord {
            host_id: "abc".to_string(),
            ip: "10.0.0.5".to_string(),
            port: 22,
            protocol: Some("ssh".to_string()),
            username: Some("u".to_string()),
            password: Some("p".to_string()),
            key: None,
            public_address: None,
        }
    }

    #[test]
    fn password_credentials_leave_key_null() {
        let mut props = InMemoryProperties::new();
        apply_allocation(&mut props, &record(), None);
        assert_eq!(props.get(PASSWORD), Some(&Value::from("p")));
        assert_eq!(props.get(KEY), Some(&Value::Null));
        assert_eq!(props.get(USER), Some(&Value::from("u")));
        assert_eq!(props.get(PORT), Some(&Value::from(22)));
        assert_eq!(props.get(PUBLIC_ADDRESS), Some(&Value::Null));
    }

    #[test]
    fn key_path_takes_precedence_over_password() {
        let mut props = InMemoryProperties::new();
        apply_allocation(&mut props, &record(), Some(Path::new("/tmp/key_abc")));
        assert_eq!(props.get(KEY), Some(&Value::from("/tmp/key_abc")));
        assert_eq!(props.get(PASSWORD), Some(&Value::Null));
    }

    #[test]
    fn every_key_is_written_even_when_absent() {
        let mut props = InMemoryProperties::new();
        let mut bare = record();
        bare.username = None;
        bare.password = None;
        apply_allocation(&mut props, &bare, None);
        for key in ALL_KEYS {
            assert!(props.get(key).is_some(), "property '{}' not written", key);
        }
    }

    #[test]
    fn stored_host_id_requires_a_value() {
        let mut props = InMemoryProperties::new();
        assert!(matches!(
            stored_host_id(&props),
            Err(Error::MissingProperty("host_id"))
        ));

        props.set(HOST_ID, Value::Null);
        assert!(stored_host_id(&props).is_err());

        props.set(HOST_ID, Value::from(12345));
        assert_eq!(stored_host_id(&props).unwrap(), "12345");

        props.set(HOST_ID, Value::from("abc"));
        assert_eq!(stored_host_id(&props).unwrap(), "abc");
    }

    #[test]
    fn finalize_removes_key_file_and_all_properties() {
        let tmp = tempfile::tempdir().unwrap();
        let key_path = tmp.path().join("key_svc_8080_abc");
        std::fs::write(&key_path, "KEYDATA").unwrap();

        let mut props = InMemoryProperties::new();
        let mut rec = record();
        rec.password = None;
        rec.key = Some("KEYDATA".to_string());
        apply_allocation(&mut props, &rec, Some(&key_path));

        finalize(&mut props).unwrap();
        assert!(props.is_empty());
        assert!(!key_path.exists());
    }

    #[test]
    fn finalize_twice_is_fine() {
        let tmp = tempfile::tempdir().unwrap();
        let key_path = tmp.path().join("key_svc_8080_abc");
        std::fs::write(&key_path, "KEYDATA").unwrap();

        let mut props = InMemoryProperties::new();
        props.set(KEY, Value::String(key_path.to_string_lossy().into_owned()));
        finalize(&mut props).unwrap();
        // second call sees no key property and no file
        finalize(&mut props).unwrap();

        // even with the property still set, a missing file is tolerated
        props.set(KEY, Value::String(key_path.to_string_lossy().into_owned()));
        finalize(&mut props).unwrap();
        assert!(props.is_empty());
    }
}
