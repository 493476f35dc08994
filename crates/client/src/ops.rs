use crate::client::{HostPoolClient, ServiceSettings};
use crate::error::{Error, Result};
use crate::keys::KeyStore;
use crate::properties::{self, InMemoryProperties, PropertyStore};
use common::AllocationFilters;
use serde_json::{Map, Value};
use tracing::{error, info};

/// Per-node view the engine hands to an operation: the node's identity, its
/// static configuration, and its runtime property store.
#[derive(Debug)]
pub struct NodeContext<S = InMemoryProperties> {
    pub node_id: String,
    pub config: Map<String, Value>,
    pub properties: S,
}

impl NodeContext<InMemoryProperties> {
    pub fn new(node_id: impl Into<String>) -> Self {
        NodeContext {
            node_id: node_id.into(),
            config: Map::new(),
            properties: InMemoryProperties::new(),
        }
    }
}

impl<S: PropertyStore> NodeContext<S> {
    pub fn with_store(node_id: impl Into<String>, config: Map<String, Value>, properties: S) -> Self {
        NodeContext {
            node_id: node_id.into(),
            config,
            properties,
        }
    }
}

/// Lease a host from the pool and record the lease on the node.
///
/// Writes the key file before touching properties, so a write failure leaves
/// the property store clean; the remote lease is then orphaned and the error
/// says so.
pub async fn acquire<S: PropertyStore>(
    ctx: &mut NodeContext<S>,
    settings: &ServiceSettings,
) -> Result<()> {
    info!(node = %ctx.node_id, url = %settings.url, "acquiring host");
    let filters = filters_from_config(&ctx.config)?;
    let service_url = settings.parsed_url()?;
    let client = HostPoolClient::new(settings)?;
    let record = client.allocate(&filters).await?;

    let key_store = KeyStore::for_service(&service_url, settings.key_dir.as_deref());
    let key_path = match record.key.as_deref().filter(|key| !key.is_empty()) {
        Some(contents) => match key_store.save(&record.host_id, contents) {
            Ok(path) => Some(path),
            Err(err) => {
                error!(
                    node = %ctx.node_id,
                    host_id = %record.host_id,
                    "key file write failed after allocation; the host is leased remotely but untracked and must be deallocated manually"
                );
                return Err(err);
            }
        },
        None => None,
    };
    properties::apply_allocation(&mut ctx.properties, &record, key_path.as_deref());
    info!(node = %ctx.node_id, host_id = %record.host_id, ip = %record.ip, "host acquired");
    Ok(())
}

/// Return the node's host to the pool, then clear everything acquire wrote.
///
/// A failed deallocate leaves properties and key file untouched so the
/// operation can run again once the service recovers.
pub async fn release<S: PropertyStore>(
    ctx: &mut NodeContext<S>,
    settings: &ServiceSettings,
) -> Result<()> {
    info!(node = %ctx.node_id, url = %settings.url, "releasing host");
    let host_id = properties::stored_host_id(&ctx.properties)?;
    let client = HostPoolClient::new(settings)?;
    client.deallocate(&host_id).await?;
    properties::finalize(&mut ctx.properties)?;
    info!(node = %ctx.node_id, host_id = %host_id, "host released");
    Ok(())
}

/// Build allocate filters from node configuration. `os` must be a string and
/// `filters` a map; anything else is a caller programming error, surfaced
/// before any network activity.
fn filters_from_config(config: &Map<String, Value>) -> Result<AllocationFilters> {
    let os = match config.get("os") {
        None | Some(Value::Null) => None,
        Some(Value::String(os)) => Some(os.clone()),
        Some(_) => {
            return Err(Error::Configuration(
                "Requested OS must be a string".to_string(),
            ))
        }
    };
    let extra = match config.get("filters") {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(map)) => map.clone(),
        Some(_) => {
            return Err(Error::Configuration(
                "Host filters must be a map".to_string(),
            ))
        }
    };
    Ok(AllocationFilters { os, extra })
}
