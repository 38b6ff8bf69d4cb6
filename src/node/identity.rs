use crate::config::{port_in_range, ServerConfig};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::fs;
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, ToSocketAddrs};
use thiserror::Error;

const RESERVED_BOOKIE_IDS: &[&str] = &["readonly"];

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdentityError {
    #[error("invalid bookie id {0:?}")]
    InvalidBookieId(String),
    #[error("invalid bookie port {0}")]
    InvalidPort(i32),
    #[error("unknown host: {0}")]
    UnknownHost(String),
}

/// Opaque node identity, usually `host:port`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BookieId(String);

impl BookieId {
    pub fn parse(raw: &str) -> Result<Self, IdentityError> {
        let valid_chars = raw
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | ':' | '-'));
        if raw.is_empty() || !valid_chars || RESERVED_BOOKIE_IDS.contains(&raw) {
            return Err(IdentityError::InvalidBookieId(raw.to_string()));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BookieId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BookieSocketAddress {
    pub host: String,
    pub port: u16,
}

impl BookieSocketAddress {
    pub fn to_bookie_id(&self) -> Result<BookieId, IdentityError> {
        BookieId::parse(&self.to_string())
    }
}

impl fmt::Display for BookieSocketAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Name and address lookups needed to work out a node's identity.
pub trait HostResolver: Send + Sync {
    fn local_host_name(&self) -> io::Result<String>;
    /// Address bound to a named network interface.
    fn interface_address(&self, interface: &str) -> io::Result<IpAddr>;
    fn resolve(&self, host: &str) -> io::Result<IpAddr>;
    fn canonical_host_name(&self, ip: IpAddr) -> io::Result<String>;
}

/// Resolver backed by the local system: procfs/hostname files, `/etc/hosts`
/// and the platform resolver.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemResolver;

impl HostResolver for SystemResolver {
    fn local_host_name(&self) -> io::Result<String> {
        for source in ["/proc/sys/kernel/hostname", "/etc/hostname"] {
            if let Ok(raw) = fs::read_to_string(source) {
                let name = raw.trim();
                if !name.is_empty() {
                    return Ok(name.to_string());
                }
            }
        }
        env::var("HOSTNAME")
            .ok()
            .filter(|name| !name.trim().is_empty())
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "local host name unavailable"))
    }

    /// Prefers the interface's IPv4 address, falling back to its first IPv6 one.
    fn interface_address(&self, interface: &str) -> io::Result<IpAddr> {
        let addrs = interface_addresses(interface)?.ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("no such interface {interface}"),
            )
        })?;
        addrs
            .iter()
            .find(|addr| addr.is_ipv4())
            .or_else(|| addrs.first())
            .copied()
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::AddrNotAvailable,
                    format!("interface {interface} has no address"),
                )
            })
    }

    fn resolve(&self, host: &str) -> io::Result<IpAddr> {
        if let Ok(ip) = host.parse::<IpAddr>() {
            return Ok(ip);
        }
        (host, 0)
            .to_socket_addrs()?
            .next()
            .map(|addr| addr.ip())
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("{host} has no address")))
    }

    fn canonical_host_name(&self, ip: IpAddr) -> io::Result<String> {
        let hosts = fs::read_to_string("/etc/hosts").unwrap_or_default();
        for line in hosts.lines() {
            let line = line.split('#').next().unwrap_or_default();
            let mut fields = line.split_whitespace();
            let matches = fields
                .next()
                .and_then(|addr| addr.parse::<IpAddr>().ok())
                .map(|addr| addr == ip)
                .unwrap_or(false);
            if let (true, Some(name)) = (matches, fields.next()) {
                return Ok(name.to_string());
            }
        }
        Ok(ip.to_string())
    }
}

/// Addresses bound to `interface`, or `None` when no such interface exists.
#[cfg(unix)]
fn interface_addresses(interface: &str) -> io::Result<Option<Vec<IpAddr>>> {
    use std::ffi::CStr;

    let mut head: *mut libc::ifaddrs = std::ptr::null_mut();
    // SAFETY: getifaddrs initialises `head` on success; the list is released
    // with freeifaddrs below and not touched afterwards.
    #[allow(unsafe_code)]
    let rc = unsafe { libc::getifaddrs(&mut head) };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    let mut found = false;
    let mut addrs = Vec::new();
    let mut cursor = head;
    while !cursor.is_null() {
        // SAFETY: `cursor` is a node of the live list returned by getifaddrs.
        // Its name is NUL-terminated, and `ifa_addr`, when set, points at a
        // sockaddr whose family selects the concrete layout.
        #[allow(unsafe_code)]
        unsafe {
            let entry = &*cursor;
            cursor = entry.ifa_next;
            if entry.ifa_name.is_null()
                || CStr::from_ptr(entry.ifa_name).to_bytes() != interface.as_bytes()
            {
                continue;
            }
            found = true;
            if entry.ifa_addr.is_null() {
                continue;
            }
            match i32::from((*entry.ifa_addr).sa_family) {
                libc::AF_INET => {
                    let sin = &*(entry.ifa_addr as *const libc::sockaddr_in);
                    addrs.push(IpAddr::V4(Ipv4Addr::from(u32::from_be(
                        sin.sin_addr.s_addr,
                    ))));
                }
                libc::AF_INET6 => {
                    let sin6 = &*(entry.ifa_addr as *const libc::sockaddr_in6);
                    addrs.push(IpAddr::V6(Ipv6Addr::from(sin6.sin6_addr.s6_addr)));
                }
                _ => {}
            }
        }
    }
    // SAFETY: `head` came from a successful getifaddrs and is freed once.
    #[allow(unsafe_code)]
    unsafe {
        libc::freeifaddrs(head);
    }
    Ok(found.then_some(addrs))
}

#[cfg(not(unix))]
fn interface_addresses(_interface: &str) -> io::Result<Option<Vec<IpAddr>>> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "interface lookup is only available on unix",
    ))
}

/// Resolves the identity a node registers under. An explicit `bookie_id`
/// wins; otherwise the id is derived from the advertised socket address.
pub fn get_bookie_id(
    config: &ServerConfig,
    resolver: &dyn HostResolver,
) -> Result<BookieId, IdentityError> {
    if let Some(raw) = config.bookie_id.as_deref() {
        return BookieId::parse(raw);
    }
    get_bookie_address(config, resolver)?.to_bookie_id()
}

pub fn get_bookie_address(
    config: &ServerConfig,
    resolver: &dyn HostResolver,
) -> Result<BookieSocketAddress, IdentityError> {
    if !port_in_range(config.bookie_port) {
        return Err(IdentityError::InvalidPort(config.bookie_port));
    }
    let port = config.bookie_port as u16;

    let advertised = config
        .advertised_address
        .as_deref()
        .map(str::trim)
        .filter(|addr| !addr.is_empty());
    let (host, ip) = match advertised {
        Some(addr) => (addr.to_string(), resolver.resolve(addr).ok()),
        None => {
            let ip = match config.listening_interface.as_deref() {
                Some(interface) => resolver.interface_address(interface).map_err(|err| {
                    IdentityError::UnknownHost(format!("interface {interface}: {err}"))
                })?,
                None => {
                    let name = resolver
                        .local_host_name()
                        .map_err(|err| IdentityError::UnknownHost(err.to_string()))?;
                    resolver
                        .resolve(&name)
                        .map_err(|err| IdentityError::UnknownHost(format!("{name}: {err}")))?
                }
            };
            let host = if config.use_host_name_as_bookie_id {
                let name = resolver
                    .canonical_host_name(ip)
                    .map_err(|err| IdentityError::UnknownHost(err.to_string()))?;
                if config.use_short_host_name {
                    short_host_name(&name)
                } else {
                    name
                }
            } else {
                ip.to_string()
            };
            (host, Some(ip))
        }
    };

    if let Some(ip) = ip {
        if ip.is_loopback() && !config.allow_loopback {
            warn!(
                "event=bookie_loopback_rejected host={} ip={}",
                host, ip
            );
            return Err(IdentityError::UnknownHost(format!(
                "{host} resolves to loopback address {ip}; set allow_loopback to use it"
            )));
        }
    }
    debug!("event=bookie_address_resolved host={} port={}", host, port);
    Ok(BookieSocketAddress { host, port })
}

fn short_host_name(name: &str) -> String {
    name.split('.').next().unwrap_or(name).to_string()
}
