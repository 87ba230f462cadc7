//! `IP_PKTINFO` ancillary data on IPv4 datagram sockets.
//!
//! On receive the kernel reports the ingress interface index; on send the same
//! control message selects the source address and the egress interface,
//! overriding the routing table.

use std::{
    io, mem,
    net::{Ipv4Addr, SocketAddrV4},
    os::fd::RawFd,
    ptr,
};

// Large enough for one in_pktinfo control message, aligned for cmsghdr.
#[repr(C, align(8))]
struct ControlBuffer([u8; 64]);

impl ControlBuffer {
    fn new() -> Self {
        Self([0; 64])
    }
}

/// Asks the kernel to attach `IP_PKTINFO` to every received datagram.
pub fn enable(fd: RawFd) -> io::Result<()> {
    let on: libc::c_int = 1;
    // Raw setsockopt with a valid fd and a c_int option value.
    let ret = unsafe {
        libc::setsockopt(
            fd,
            libc::IPPROTO_IP,
            libc::IP_PKTINFO,
            &on as *const libc::c_int as *const libc::c_void,
            mem::size_of::<libc::c_int>() as libc::socklen_t,
        )
    };
    if ret < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Receives one datagram, returning its length and the ingress interface index
/// when the kernel supplied one.
pub fn recv_with_ifindex(fd: RawFd, buf: &mut [u8]) -> io::Result<(usize, Option<u32>)> {
    let mut iov = libc::iovec {
        iov_base: buf.as_mut_ptr().cast(),
        iov_len: buf.len(),
    };
    let mut control = ControlBuffer::new();

    let mut hdr: libc::msghdr = unsafe { mem::zeroed() };
    hdr.msg_iov = &mut iov;
    hdr.msg_iovlen = 1;
    hdr.msg_control = control.0.as_mut_ptr().cast();
    hdr.msg_controllen = control.0.len() as _;

    let received = unsafe { libc::recvmsg(fd, &mut hdr, 0) };
    if received < 0 {
        return Err(io::Error::last_os_error());
    }

    let mut ifindex = None;
    // The kernel filled `control` and set msg_controllen; the CMSG_* walk stays within it.
    unsafe {
        let mut cmsg = libc::CMSG_FIRSTHDR(&hdr);
        while !cmsg.is_null() {
            if (*cmsg).cmsg_level == libc::IPPROTO_IP && (*cmsg).cmsg_type == libc::IP_PKTINFO {
                let info =
                    ptr::read_unaligned(libc::CMSG_DATA(cmsg) as *const libc::in_pktinfo);
                ifindex = u32::try_from(info.ipi_ifindex).ok();
            }
            cmsg = libc::CMSG_NXTHDR(&hdr, cmsg);
        }
    }

    Ok((received as usize, ifindex))
}

/// Sends `payload` to `destination` with `source` as the IP source address,
/// leaving through interface `ifindex`.
pub fn send_from(
    fd: RawFd,
    payload: &[u8],
    destination: SocketAddrV4,
    source: Ipv4Addr,
    ifindex: u32,
) -> io::Result<usize> {
    let mut addr: libc::sockaddr_in = unsafe { mem::zeroed() };
    addr.sin_family = libc::AF_INET as libc::sa_family_t;
    addr.sin_port = destination.port().to_be();
    addr.sin_addr = libc::in_addr {
        s_addr: u32::from(*destination.ip()).to_be(),
    };

    let mut iov = libc::iovec {
        iov_base: payload.as_ptr() as *mut libc::c_void,
        iov_len: payload.len(),
    };
    let mut control = ControlBuffer::new();
    let info_len = mem::size_of::<libc::in_pktinfo>() as libc::c_uint;

    let mut hdr: libc::msghdr = unsafe { mem::zeroed() };
    hdr.msg_name = (&mut addr as *mut libc::sockaddr_in).cast();
    hdr.msg_namelen = mem::size_of::<libc::sockaddr_in>() as libc::socklen_t;
    hdr.msg_iov = &mut iov;
    hdr.msg_iovlen = 1;
    hdr.msg_control = control.0.as_mut_ptr().cast();
    hdr.msg_controllen = unsafe { libc::CMSG_SPACE(info_len) } as _;

    // msg_controllen covers exactly one in_pktinfo message inside `control`.
    unsafe {
        let cmsg = libc::CMSG_FIRSTHDR(&hdr);
        (*cmsg).cmsg_level = libc::IPPROTO_IP;
        (*cmsg).cmsg_type = libc::IP_PKTINFO;
        (*cmsg).cmsg_len = libc::CMSG_LEN(info_len) as _;
        let info = libc::in_pktinfo {
            ipi_ifindex: ifindex as libc::c_int,
            ipi_spec_dst: libc::in_addr {
                s_addr: u32::from(source).to_be(),
            },
            ipi_addr: libc::in_addr { s_addr: 0 },
        };
        ptr::write_unaligned(libc::CMSG_DATA(cmsg) as *mut libc::in_pktinfo, info);
    }

    let sent = unsafe { libc::sendmsg(fd, &hdr, 0) };
    if sent < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(sent as usize)
}
