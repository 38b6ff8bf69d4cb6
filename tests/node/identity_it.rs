use crate::node_fixture;
use ledgerstore::config::ServerConfig;
use ledgerstore::node::{
    get_bookie_address, get_bookie_id, BookieBuilder, BookieId, BookieSocketAddress, HostResolver,
    IdentityError,
};
use std::collections::HashMap;
use std::io;
use std::net::IpAddr;
use std::sync::Arc;
use tempfile::TempDir;

/// Resolver answering from fixed tables.
#[derive(Debug, Clone)]
struct TableResolver {
    host_name: String,
    hosts: HashMap<String, IpAddr>,
    interfaces: HashMap<String, IpAddr>,
    canonical: HashMap<IpAddr, String>,
}

impl TableResolver {
    fn new() -> Self {
        let ip: IpAddr = "10.0.0.5".parse().expect("ip");
        let eth1: IpAddr = "192.168.1.20".parse().expect("ip");
        Self {
            host_name: "node-1".into(),
            hosts: HashMap::from([("node-1".to_string(), ip)]),
            interfaces: HashMap::from([("eth1".to_string(), eth1)]),
            canonical: HashMap::from([
                (ip, "node-1.rack.example".to_string()),
                (eth1, "node-1-eth1.rack.example".to_string()),
            ]),
        }
    }

    fn loopback() -> Self {
        let mut resolver = Self::new();
        resolver
            .hosts
            .insert("node-1".into(), "127.0.0.1".parse().expect("ip"));
        resolver
    }
}

fn not_found(what: &str) -> io::Error {
    io::Error::new(io::ErrorKind::NotFound, what.to_string())
}

impl HostResolver for TableResolver {
    fn local_host_name(&self) -> io::Result<String> {
        Ok(self.host_name.clone())
    }

    fn interface_address(&self, interface: &str) -> io::Result<IpAddr> {
        self.interfaces
            .get(interface)
            .copied()
            .ok_or_else(|| not_found(interface))
    }

    fn resolve(&self, host: &str) -> io::Result<IpAddr> {
        self.hosts.get(host).copied().ok_or_else(|| not_found(host))
    }

    fn canonical_host_name(&self, ip: IpAddr) -> io::Result<String> {
        Ok(self
            .canonical
            .get(&ip)
            .cloned()
            .unwrap_or_else(|| ip.to_string()))
    }
}

fn id_for(config: &ServerConfig, resolver: &TableResolver) -> Result<String, IdentityError> {
    get_bookie_id(config, resolver).map(|id| id.as_str().to_string())
}

#[test]
fn configured_id_wins() {
    let config = ServerConfig {
        bookie_id: Some("custom-node:4000".into()),
        bookie_port: -1,
        ..ServerConfig::default()
    };
    assert_eq!(
        id_for(&config, &TableResolver::new()).expect("id"),
        "custom-node:4000"
    );
    let reserved = ServerConfig {
        bookie_id: Some("readonly".into()),
        ..ServerConfig::default()
    };
    assert_eq!(
        id_for(&reserved, &TableResolver::new()),
        Err(IdentityError::InvalidBookieId("readonly".into()))
    );
}

#[test]
fn default_identity_uses_resolved_ip() {
    let config = ServerConfig::default();
    assert_eq!(
        id_for(&config, &TableResolver::new()).expect("id"),
        "10.0.0.5:3181"
    );
}

#[test]
fn host_name_identity_can_be_shortened() {
    let mut config = ServerConfig {
        use_host_name_as_bookie_id: true,
        bookie_port: 3200,
        ..ServerConfig::default()
    };
    assert_eq!(
        id_for(&config, &TableResolver::new()).expect("id"),
        "node-1.rack.example:3200"
    );
    config.use_short_host_name = true;
    assert_eq!(
        id_for(&config, &TableResolver::new()).expect("id"),
        "node-1:3200"
    );
}

#[test]
fn listening_interface_selects_address() {
    let config = ServerConfig {
        listening_interface: Some("eth1".into()),
        ..ServerConfig::default()
    };
    assert_eq!(
        get_bookie_address(&config, &TableResolver::new()).expect("address"),
        BookieSocketAddress {
            host: "192.168.1.20".into(),
            port: 3181
        }
    );
    let missing = ServerConfig {
        listening_interface: Some("eth9".into()),
        ..ServerConfig::default()
    };
    assert!(matches!(
        get_bookie_address(&missing, &TableResolver::new()),
        Err(IdentityError::UnknownHost(reason)) if reason.contains("eth9")
    ));
}

#[test]
fn advertised_address_is_used_verbatim() {
    let config = ServerConfig {
        advertised_address: Some(" public.example ".into()),
        use_host_name_as_bookie_id: true,
        ..ServerConfig::default()
    };
    assert_eq!(
        id_for(&config, &TableResolver::new()).expect("id"),
        "public.example:3181"
    );
}

#[test]
fn loopback_requires_opt_in() {
    let config = ServerConfig::default();
    assert!(matches!(
        id_for(&config, &TableResolver::loopback()),
        Err(IdentityError::UnknownHost(_))
    ));
    let allowed = ServerConfig {
        allow_loopback: true,
        ..ServerConfig::default()
    };
    assert_eq!(
        id_for(&allowed, &TableResolver::loopback()).expect("id"),
        "127.0.0.1:3181"
    );
}

#[test]
fn out_of_range_port_is_rejected() {
    let config = ServerConfig {
        bookie_port: 70_000,
        ..ServerConfig::default()
    };
    assert_eq!(
        get_bookie_address(&config, &TableResolver::new()),
        Err(IdentityError::InvalidPort(70_000))
    );
}

#[test]
fn builder_resolves_identity_when_none_is_given() {
    let temp = TempDir::new().expect("tempdir");
    let bookie = BookieBuilder::new(ServerConfig::with_base_dir(temp.path()))
        .resolver(Arc::new(TableResolver::new()))
        .build()
        .expect("bookie builds");
    assert_eq!(
        bookie.id(),
        &BookieId::parse("10.0.0.5:3181").expect("id")
    );

    let pinned = node_fixture::builder(&temp.path().join("pinned"))
        .resolver(Arc::new(TableResolver::loopback()))
        .build()
        .expect("explicit id skips resolution");
    assert_eq!(pinned.id().as_str(), "bookie-0:3181");
}
