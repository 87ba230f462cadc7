use crate::error::RelayError;
use crate::v4::tracker::{DEFAULT_CAPACITY, DEFAULT_TTL};
use clap::Parser;
use std::{net::Ipv4Addr, time::Duration};

pub const DHCP_SERVER_PORT: u16 = 67;
pub const DHCP_CLIENT_PORT: u16 = 68;
pub const BROADCAST_ADDRESS: Ipv4Addr = Ipv4Addr::BROADCAST;

#[derive(Parser, Debug)]
#[command(version, about = "DHCPv4/BOOTP relay agent", long_about = None)]
pub struct Args {
    /// Interface to listen for DHCPv4/BOOTP queries on
    #[arg(long = "in", default_value = "eth0")]
    pub in_interface: String,

    /// Outgoing interface, toward the DHCP servers
    #[arg(long = "out", default_value = "eth1")]
    pub out_interface: String,

    /// DHCP server addresses, separated by whitespace (e.g. "10.0.0.2 10.0.0.3")
    #[arg(long, default_value = "")]
    pub destination: String,

    /// Relay agent address: stamped as GIADDR and used as the source of relayed packets
    #[arg(long)]
    pub giaddr: Option<String>,

    /// Seconds a relayed request stays eligible for a reply
    #[arg(long, default_value_t = DEFAULT_TTL.as_secs())]
    pub transaction_ttl: u64,

    /// Maximum number of in-flight transactions remembered
    #[arg(long, default_value_t = DEFAULT_CAPACITY)]
    pub transaction_capacity: usize,
}

#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub client_interface: String,
    pub server_interface: String,
    pub relay_address: Ipv4Addr,
    pub servers: Vec<Ipv4Addr>,
    pub transaction_ttl: Duration,
    pub transaction_capacity: usize,
}

impl RelayConfig {
    pub fn new(client_interface: String, server_interface: String, relay_address: Ipv4Addr) -> Self {
        Self {
            client_interface,
            server_interface,
            relay_address,
            servers: Vec::new(),
            transaction_ttl: DEFAULT_TTL,
            transaction_capacity: DEFAULT_CAPACITY,
        }
    }

    pub fn with_servers(mut self, servers: Vec<Ipv4Addr>) -> Self {
        self.servers = servers;
        self
    }

    pub fn with_transaction_ttl(mut self, ttl: Duration) -> Self {
        self.transaction_ttl = ttl;
        self
    }

    pub fn with_transaction_capacity(mut self, capacity: usize) -> Self {
        self.transaction_capacity = capacity;
        self
    }
}

impl TryFrom<Args> for RelayConfig {
    type Error = RelayError;

    fn try_from(args: Args) -> Result<Self, Self::Error> {
        let relay_address = parse_relay_address(args.giaddr.as_deref())?;
        let servers = parse_servers(&args.destination)?;
        Ok(RelayConfig::new(args.in_interface, args.out_interface, relay_address)
            .with_servers(servers)
            .with_transaction_ttl(Duration::from_secs(args.transaction_ttl))
            .with_transaction_capacity(args.transaction_capacity))
    }
}

fn parse_ipv4(value: &str) -> Result<Ipv4Addr, RelayError> {
    value.parse().map_err(|source| RelayError::InvalidAddress {
        value: value.to_string(),
        source,
    })
}

/// The relay address is mandatory and must be a usable unicast address.
pub fn parse_relay_address(value: Option<&str>) -> Result<Ipv4Addr, RelayError> {
    let value = value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or(RelayError::MissingRelayAddress)?;
    let addr = parse_ipv4(value)?;
    if addr.is_unspecified() || addr.is_broadcast() {
        return Err(RelayError::UnusableRelayAddress(addr));
    }
    Ok(addr)
}

/// Parses a whitespace-separated list of server addresses, keeping their order.
pub fn parse_servers(list: &str) -> Result<Vec<Ipv4Addr>, RelayError> {
    list.split_whitespace().map(parse_ipv4).collect()
}
