// src/net.rs
use crate::tx::LinkWriter;
use anyhow::Context;
use nix::errno::Errno;
use std::ffi::CString;
use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};

/// Raw AF_PACKET socket bound to one interface. Frames are written
/// verbatim, Ethernet header included.
pub struct LinkSocket {
    fd: OwnedFd,
    name: String,
}

impl LinkSocket {
    pub fn open(interface: &str) -> anyhow::Result<Self> {
        let ifindex = ifindex(interface)?;
        let proto = (libc::ETH_P_ALL as u16).to_be();

        let raw = unsafe { libc::socket(libc::AF_PACKET, libc::SOCK_RAW, proto as i32) };
        if raw < 0 {
            return Err(io::Error::last_os_error())
                .with_context(|| format!("packet socket for {} (needs CAP_NET_RAW)", interface));
        }
        let fd = unsafe { OwnedFd::from_raw_fd(raw) };

        let sll = libc::sockaddr_ll {
            sll_family: libc::AF_PACKET as u16,
            sll_protocol: proto,
            sll_ifindex: ifindex,
            sll_hatype: 0,
            sll_pkttype: 0,
            sll_halen: 0,
            sll_addr: [0; 8],
        };
        let ret = unsafe {
            libc::bind(
                fd.as_raw_fd(),
                &sll as *const _ as *const libc::sockaddr,
                std::mem::size_of::<libc::sockaddr_ll>() as libc::socklen_t,
            )
        };
        if ret < 0 {
            return Err(io::Error::last_os_error()).with_context(|| format!("bind to {}", interface));
        }

        Ok(Self { fd, name: interface.to_string() })
    }
}

fn ifindex(name: &str) -> anyhow::Result<i32> {
    let c = CString::new(name).with_context(|| format!("bad interface name {:?}", name))?;
    let idx = unsafe { libc::if_nametoindex(c.as_ptr()) };
    if idx == 0 {
        anyhow::bail!("interface {} not found", name);
    }
    Ok(idx as i32)
}

impl LinkWriter for LinkSocket {
    fn name(&self) -> &str { &self.name }

    fn write_frame(&mut self, frame: &[u8]) -> io::Result<()> {
        let n = unsafe {
            libc::send(self.fd.as_raw_fd(), frame.as_ptr() as *const libc::c_void, frame.len(), 0)
        };
        if n < 0 {
            return Err(Errno::last().into());
        }
        if (n as usize) != frame.len() {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                format!("short write on {}: {} of {} bytes", self.name, n, frame.len()),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_interface_is_rejected() {
        let err = LinkSocket::open("no-such-if0").err().expect("must fail");
        let msg = format!("{err:#}");
        assert!(msg.contains("no-such-if0"), "{msg}");
    }

    #[test]
    fn interface_name_with_nul_is_rejected() {
        assert!(ifindex("eth\00").is_err());
    }
}
