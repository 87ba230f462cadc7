//! Interface-aware UDP transport.
//!
//! The relay listens on two interfaces at once. Sockets are bound to the wildcard
//! address rather than to a device, because replies have to leave through the
//! *other* interface; the interface split is enforced per datagram instead, using
//! the ingress index reported by `IP_PKTINFO`.

#[cfg(target_os = "linux")]
mod pktinfo;

use crate::config::{DHCP_CLIENT_PORT, DHCP_SERVER_PORT};
use std::{
    ffi::CString,
    fmt, io,
    net::{Ipv4Addr, SocketAddrV4, UdpSocket as StdUdpSocket},
};
use thiserror::Error;
use tokio::net::UdpSocket as TokioUdpSocket;

/// Defines all possible errors for socket operations.
#[derive(Error, Debug)]
pub enum SocketError {
    #[error("Failed to create a new socket")]
    CreateSocket(#[source] io::Error),

    #[error("Failed to enable broadcast on socket")]
    SetBroadcast(#[source] io::Error),

    #[error("Failed to set SO_REUSEADDR on socket")]
    SetReuseAddress(#[source] io::Error),

    #[error("Failed to enable IP_PKTINFO on socket")]
    SetPacketInfo(#[source] io::Error),

    #[error("Failed to bind socket to {addr}")]
    BindSocket {
        addr: SocketAddrV4,
        #[source]
        source: io::Error,
    },

    #[error("Failed to set socket to non-blocking mode")]
    SetNonBlocking(#[source] io::Error),

    #[error("Failed to convert socket to TokioUdpSocket")]
    ConvertToTokio(#[source] io::Error),

    #[error("Network interface '{interface}' not found")]
    InterfaceNotFound {
        interface: String,
        #[source]
        source: io::Error,
    },

    #[allow(dead_code)]
    #[error("Per-datagram interface control is not implemented on this platform")]
    NotImplemented,
}

/// Which side of the relay an interface faces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Faces the clients; listens on the BOOTP server port.
    ClientFacing,
    /// Faces the DHCP servers; listens on the BOOTP client port.
    ServerFacing,
}

impl Role {
    pub fn port(self) -> u16 {
        match self {
            Role::ClientFacing => DHCP_SERVER_PORT,
            Role::ServerFacing => DHCP_CLIENT_PORT,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::ClientFacing => f.write_str("client-facing"),
            Role::ServerFacing => f.write_str("server-facing"),
        }
    }
}

/// Resolves an interface name to its OS index.
pub fn interface_index(name: &str) -> Result<u32, SocketError> {
    let not_found = |source| SocketError::InterfaceNotFound {
        interface: name.to_string(),
        source,
    };
    let c_name = CString::new(name)
        .map_err(|e| not_found(io::Error::new(io::ErrorKind::InvalidInput, e)))?;

    let index = unsafe { libc::if_nametoindex(c_name.as_ptr()) };
    if index == 0 {
        return Err(not_found(io::Error::last_os_error()));
    }
    Ok(index)
}

/// Creates a `tokio::net::UdpSocket` on `0.0.0.0:port` that reports the ingress
/// interface of each datagram and may send broadcasts.
#[cfg(target_os = "linux")]
pub fn new_tokio_socket_with_pktinfo(port: u16) -> Result<TokioUdpSocket, SocketError> {
    use socket2::{Domain, Protocol, Socket, Type};
    use std::os::fd::AsRawFd;

    let socket2 = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
        .map_err(SocketError::CreateSocket)?;

    // Replies to clients go to 255.255.255.255.
    socket2
        .set_broadcast(true)
        .map_err(SocketError::SetBroadcast)?;

    socket2
        .set_reuse_address(true)
        .map_err(SocketError::SetReuseAddress)?;

    pktinfo::enable(socket2.as_raw_fd()).map_err(SocketError::SetPacketInfo)?;

    let addr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port);
    socket2
        .bind(&addr.into())
        .map_err(|source| SocketError::BindSocket { addr, source })?;

    let std_socket: StdUdpSocket = socket2.into();
    std_socket
        .set_nonblocking(true)
        .map_err(SocketError::SetNonBlocking)?;
    TokioUdpSocket::from_std(std_socket).map_err(SocketError::ConvertToTokio)
}

/// Fallback for systems without `IP_PKTINFO`.
#[cfg(not(target_os = "linux"))]
pub fn new_tokio_socket_with_pktinfo(_port: u16) -> Result<TokioUdpSocket, SocketError> {
    Err(SocketError::NotImplemented)
}

/// Whether a datagram reported on `ifindex` belongs to one of the relay's interfaces.
///
/// Datagrams without an index are accepted; the kernel only omits it when
/// `IP_PKTINFO` is unavailable, and then there is nothing to filter on.
pub fn accepts_ingress(ifindex: Option<u32>, bound: [u32; 2]) -> bool {
    ifindex.map_or(true, |index| bound.contains(&index))
}

/// One named interface and the socket listening for it.
#[derive(Debug)]
pub struct InterfaceBinding {
    name: String,
    index: u32,
    socket: TokioUdpSocket,
}

impl InterfaceBinding {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    #[cfg(target_os = "linux")]
    async fn recv(&self, buf: &mut [u8]) -> io::Result<(usize, Option<u32>)> {
        use std::os::fd::AsRawFd;
        use tokio::io::Interest;

        let fd = self.socket.as_raw_fd();
        self.socket
            .async_io(Interest::READABLE, || pktinfo::recv_with_ifindex(fd, &mut *buf))
            .await
    }

    #[cfg(not(target_os = "linux"))]
    async fn recv(&self, buf: &mut [u8]) -> io::Result<(usize, Option<u32>)> {
        let (len, _) = self.socket.recv_from(buf).await?;
        Ok((len, None))
    }

    /// Sends with an explicit source address and egress interface index.
    #[cfg(target_os = "linux")]
    pub async fn send_from(
        &self,
        payload: &[u8],
        destination: SocketAddrV4,
        source: Ipv4Addr,
        ifindex: u32,
    ) -> io::Result<usize> {
        use std::os::fd::AsRawFd;
        use tokio::io::Interest;

        let fd = self.socket.as_raw_fd();
        self.socket
            .async_io(Interest::WRITABLE, || {
                pktinfo::send_from(fd, payload, destination, source, ifindex)
            })
            .await
    }

    #[cfg(not(target_os = "linux"))]
    pub async fn send_from(
        &self,
        _payload: &[u8],
        _destination: SocketAddrV4,
        _source: Ipv4Addr,
        _ifindex: u32,
    ) -> io::Result<usize> {
        Err(io::Error::from(io::ErrorKind::Unsupported))
    }
}

/// The relay's two interfaces: one toward the clients, one toward the servers.
#[derive(Debug)]
pub struct InterfaceTransport {
    client: InterfaceBinding,
    server: InterfaceBinding,
}

impl InterfaceTransport {
    /// Resolves both interface names, then binds one socket per role.
    ///
    /// Both names are resolved before any socket is opened.
    pub fn bind(client_interface: &str, server_interface: &str) -> Result<Self, SocketError> {
        let client_index = interface_index(client_interface)?;
        let server_index = interface_index(server_interface)?;

        let client = InterfaceBinding {
            name: client_interface.to_string(),
            index: client_index,
            socket: new_tokio_socket_with_pktinfo(Role::ClientFacing.port())?,
        };
        tracing::info!(
            interface = client_interface,
            index = client_index,
            port = Role::ClientFacing.port(),
            "Bound client-facing interface"
        );

        let server = InterfaceBinding {
            name: server_interface.to_string(),
            index: server_index,
            socket: new_tokio_socket_with_pktinfo(Role::ServerFacing.port())?,
        };
        tracing::info!(
            interface = server_interface,
            index = server_index,
            port = Role::ServerFacing.port(),
            "Bound server-facing interface"
        );

        Ok(Self { client, server })
    }

    pub fn binding(&self, role: Role) -> &InterfaceBinding {
        match role {
            Role::ClientFacing => &self.client,
            Role::ServerFacing => &self.server,
        }
    }

    /// Waits for a datagram on `role`'s socket.
    ///
    /// A datagram that arrived on an interface other than the relay's two is
    /// consumed and reported as zero bytes long.
    pub async fn recv(&self, role: Role, buf: &mut [u8]) -> io::Result<(usize, Option<u32>)> {
        let (len, ingress) = self.binding(role).recv(buf).await?;
        if !accepts_ingress(ingress, [self.client.index, self.server.index]) {
            tracing::debug!(%role, ?ingress, "Dropping datagram from foreign interface");
            return Ok((0, ingress));
        }
        Ok((len, ingress))
    }

    /// Sends through `egress`'s socket and interface, sourced from `source`.
    pub async fn send(
        &self,
        egress: Role,
        payload: &[u8],
        destination: SocketAddrV4,
        source: Ipv4Addr,
    ) -> io::Result<usize> {
        let binding = self.binding(egress);
        tracing::debug!(
            %destination,
            %source,
            interface = binding.name(),
            index = binding.index(),
            "Writing datagram"
        );
        binding
            .send_from(payload, destination, source, binding.index())
            .await
    }
}
