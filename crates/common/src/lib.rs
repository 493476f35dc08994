use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Which generation of the host-pool REST API the service speaks.
///
/// Each variant knows its own endpoint paths and success codes; callers never
/// branch on version strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceContract {
    /// `POST {base}/hosts` / `DELETE {base}/hosts/{id}`; allocation answers 201.
    Legacy,
    /// `POST {base}/host/allocate` with a JSON filter body /
    /// `DELETE {base}/host/{id}/deallocate`; allocation answers 200.
    #[default]
    Current,
}

impl ServiceContract {
    pub fn allocate_url(&self, base: &str) -> String {
        let base = base.trim_end_matches('/');
        match self {
            ServiceContract::Legacy => format!("{}/hosts", base),
            ServiceContract::Current => format!("{}/host/allocate", base),
        }
    }

    pub fn deallocate_url(&self, base: &str, host_id: &str) -> String {
        let base = base.trim_end_matches('/');
        match self {
            ServiceContract::Legacy => format!("{}/hosts/{}", base, host_id),
            ServiceContract::Current => format!("{}/host/{}/deallocate", base, host_id),
        }
    }

    pub fn is_allocate_success(&self, status: u16) -> bool {
        match self {
            ServiceContract::Legacy => status == 201,
            ServiceContract::Current => status == 200,
        }
    }

    /// Both generations signal deallocation success with any 2xx; the current
    /// service typically answers 204.
    pub fn is_deallocate_success(&self, status: u16) -> bool {
        (200..300).contains(&status)
    }
}

/// Filter criteria forwarded to the allocate endpoint of a current-contract
/// service. The legacy allocate endpoint takes no body.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AllocationFilters {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub os: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl AllocationFilters {
    pub fn is_empty(&self) -> bool {
        self.os.is_none() && self.extra.is_empty()
    }
}

/// Host identifiers arrive as either JSON numbers or strings depending on the
/// service generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HostId {
    Number(u64),
    Text(String),
}

impl fmt::Display for HostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostId::Number(n) => write!(f, "{}", n),
            HostId::Text(s) => f.write_str(s),
        }
    }
}

/// Allocation response body from the legacy `/hosts` endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LegacyHost {
    pub host: String,
    pub port: u16,
    pub host_id: HostId,
    pub auth: LegacyAuth,
    #[serde(default)]
    pub public_address: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LegacyAuth {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub keyfile: Option<String>,
}

/// Allocation response body from the current `/host/allocate` endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocatedHost {
    pub id: HostId,
    #[serde(default)]
    pub os: Option<String>,
    pub endpoint: HostEndpoint,
    #[serde(default)]
    pub credentials: Option<HostCredentials>,
    #[serde(default)]
    pub public_address: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostEndpoint {
    pub ip: String,
    pub port: u16,
    #[serde(default)]
    pub protocol: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HostCredentials {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub key: Option<String>,
}

/// Contract-independent view of a successful allocation. Both wire shapes
/// normalize into this before anything downstream sees them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocationRecord {
    pub host_id: String,
    pub ip: String,
    pub port: u16,
    pub protocol: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub key: Option<String>,
    pub public_address: Option<String>,
}

impl From<LegacyHost> for AllocationRecord {
    fn from(host: LegacyHost) -> Self {
        AllocationRecord {
            host_id: host.host_id.to_string(),
            ip: host.host,
            port: host.port,
            protocol: None,
            username: host.auth.username,
            password: host.auth.password,
            key: host.auth.keyfile,
            public_address: host.public_address,
        }
    }
}

impl From<AllocatedHost> for AllocationRecord {
    fn from(host: AllocatedHost) -> Self {
        let credentials = host.credentials.unwrap_or_default();
        AllocationRecord {
            host_id: host.id.to_string(),
            ip: host.endpoint.ip,
            port: host.endpoint.port,
            protocol: host.endpoint.protocol,
            username: credentials.username,
            password: credentials.password,
            key: credentials.key,
            public_address: host.public_address,
        }
    }
}

/// Error body the service attaches to non-success responses.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub code: Option<u16>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contract_urls() {
        assert_eq!(
            ServiceContract::Legacy.allocate_url("http://svc:8080/"),
            "http://svc:8080/hosts"
        );
        assert_eq!(
            ServiceContract::Current.allocate_url("http://svc:8080"),
            "http://svc:8080/host/allocate"
        );
        assert_eq!(
            ServiceContract::Legacy.deallocate_url("http://svc", "abc"),
            "http://svc/hosts/abc"
        );
        assert_eq!(
            ServiceContract::Current.deallocate_url("http://svc", "42"),
            "http://svc/host/42/deallocate"
        );
    }

    #[test]
    fn contract_success_codes() {
        assert!(ServiceContract::Legacy.is_allocate_success(201));
        assert!(!ServiceContract::Legacy.is_allocate_success(200));
        assert!(ServiceContract::Current.is_allocate_success(200));
        assert!(!ServiceContract::Current.is_allocate_success(201));
        assert!(ServiceContract::Legacy.is_deallocate_success(200));
        assert!(ServiceContract::Current.is_deallocate_success(204));
        assert!(!ServiceContract::Current.is_deallocate_success(404));
    }

    #[test]
    fn legacy_body_normalizes() {
        let body = r#"{
            "host": "172.16.99.123",
            "port": 22,
            "host_id": 12345,
            "auth": {"username": "my-username", "keyfile": "KEYDATA"}
        }"#;
        let host: LegacyHost = serde_json::from_str(body).unwrap();
        let record = AllocationRecord::from(host);
        assert_eq!(record.host_id, "12345");
        assert_eq!(record.ip, "172.16.99.123");
        assert_eq!(record.port, 22);
        assert_eq!(record.username.as_deref(), Some("my-username"));
        assert_eq!(record.key.as_deref(), Some("KEYDATA"));
        assert_eq!(record.password, None);
        assert_eq!(record.public_address, None);
    }

    #[test]
    fn current_body_normalizes() {
        let body = r#"{
            "id": "host-7",
            "os": "linux",
            "endpoint": {"ip": "10.0.0.5", "port": 22, "protocol": "ssh"},
            "credentials": {"username": "u", "password": "p"},
            "public_address": "198.51.100.9"
        }"#;
        let host: AllocatedHost = serde_json::from_str(body).unwrap();
        let record = AllocationRecord::from(host);
        assert_eq!(record.host_id, "host-7");
        assert_eq!(record.protocol.as_deref(), Some("ssh"));
        assert_eq!(record.password.as_deref(), Some("p"));
        assert_eq!(record.key, None);
        assert_eq!(record.public_address.as_deref(), Some("198.51.100.9"));
    }

    #[test]
    fn current_body_without_credentials() {
        let body = r#"{"id": 9, "endpoint": {"ip": "10.0.0.6", "port": 2222}}"#;
        let host: AllocatedHost = serde_json::from_str(body).unwrap();
        let record = AllocationRecord::from(host);
        assert_eq!(record.host_id, "9");
        assert_eq!(record.username, None);
        assert_eq!(record.password, None);
        assert_eq!(record.key, None);
    }

    #[test]
    fn filters_serialize_flat() {
        let mut filters = AllocationFilters {
            os: Some("linux".to_string()),
            ..Default::default()
        };
        filters
            .extra
            .insert("zone".to_string(), Value::String("rack-2".to_string()));
        let json = serde_json::to_value(&filters).unwrap();
        assert_eq!(json["os"], "linux");
        assert_eq!(json["zone"], "rack-2");
    }

    #[test]
    fn error_body_is_lenient() {
        let body: ErrorBody = serde_json::from_str(r#"{"error": "boom", "code": 500}"#).unwrap();
        assert_eq!(body.error.as_deref(), Some("boom"));
        assert_eq!(body.code, Some(500));
        assert!(serde_json::from_str::<ErrorBody>("not json").is_err());
    }
}
