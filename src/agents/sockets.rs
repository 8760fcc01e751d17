//! Established-connection lookup for a single process.
//!
//! Linux only: socket inodes are read from `/proc/<pid>/fd` and matched
//! against the process's view of `net/tcp` and `net/tcp6`. Elsewhere the
//! lookup reports no connections.

use std::net::SocketAddr;

use super::probe::ProbeError;

#[cfg(target_os = "linux")]
pub fn established_remotes(pid: u32) -> Result<Vec<SocketAddr>, ProbeError> {
    use std::collections::HashSet;
    use std::io::ErrorKind;

    let fd_dir = format!("/proc/{pid}/fd");
    let entries = match std::fs::read_dir(&fd_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Err(ProbeError::Gone(pid)),
        Err(e) if e.kind() == ErrorKind::PermissionDenied => return Err(ProbeError::AccessDenied(pid)),
        Err(e) => return Err(e.into()),
    };

    let mut inodes = HashSet::new();
    for entry in entries.flatten() {
        // Descriptors can close between readdir and readlink.
        if let Ok(target) = std::fs::read_link(entry.path()) {
            if let Some(inode) = socket_inode(&target.to_string_lossy()) {
                inodes.insert(inode);
            }
        }
    }
    if inodes.is_empty() {
        return Ok(Vec::new());
    }

    let mut remotes = Vec::new();
    for table in ["tcp", "tcp6"] {
        let path = format!("/proc/{pid}/net/{table}");
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => continue,
            Err(e) => return Err(e.into()),
        };
        for line in content.lines().skip(1) {
            if let Some((inode, remote)) = parse_established(line) {
                if inodes.contains(&inode) {
                    remotes.push(remote);
                }
            }
        }
    }
    Ok(remotes)
}

#[cfg(not(target_os = "linux"))]
pub fn established_remotes(_pid: u32) -> Result<Vec<SocketAddr>, ProbeError> {
    Ok(Vec::new())
}

/// `socket:[12345]` -> `12345`.
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn socket_inode(link: &str) -> Option<u64> {
    link.strip_prefix("socket:[")?.strip_suffix(']')?.parse().ok()
}

const TCP_ESTABLISHED: &str = "01";

/// One row of `/proc/net/tcp{,6}`. Returns the socket inode and remote
/// endpoint when the row is an established connection with a real peer.
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn parse_established(line: &str) -> Option<(u64, SocketAddr)> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() < 10 || fields[3] != TCP_ESTABLISHED {
        return None;
    }
    let remote = parse_hex_endpoint(fields[2])?;
    if remote.ip().is_unspecified() {
        return None;
    }
    let inode = fields[9].parse().ok()?;
    Some((inode, remote))
}

/// Kernel hex endpoint: address words in host byte order, port big-endian.
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn parse_hex_endpoint(field: &str) -> Option<SocketAddr> {
    use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

    let (addr, port) = field.split_once(':')?;
    let port = u16::from_str_radix(port, 16).ok()?;

    let ip = match addr.len() {
        8 => {
            let word = u32::from_str_radix(addr, 16).ok()?;
            IpAddr::V4(Ipv4Addr::from(word.to_le_bytes()))
        }
        32 => {
            let mut octets = [0u8; 16];
            for (i, chunk) in octets.chunks_mut(4).enumerate() {
                let word = u32::from_str_radix(&addr[i * 8..i * 8 + 8], 16).ok()?;
                chunk.copy_from_slice(&word.to_le_bytes());
            }
            IpAddr::V6(Ipv6Addr::from(octets))
        }
        _ => return None,
    };
    Some(SocketAddr::new(ip, port))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ipv4_endpoint() {
        let addr = parse_hex_endpoint("0100007F:1F90").unwrap();
        assert_eq!(addr.to_string(), "127.0.0.1:8080");
    }

    #[test]
    fn parses_ipv6_loopback() {
        let addr = parse_hex_endpoint("00000000000000000000000001000000:01BB").unwrap();
        assert_eq!(addr.to_string(), "[::1]:443");
    }

    #[test]
    fn keeps_only_established_rows_with_a_peer() {
        let established = "   1: 0100007F:A1B2 0101A8C0:01BB 01 00000000:00000000 00:00000000 00000000  1000        0 44321 1 0000000000000000 20 4 30 10 -1";
        let listening = "   0: 00000000:1F90 00000000:0000 0A 00000000:00000000 00:00000000 00000000  1000        0 12345 1 0000000000000000 100 0 0 10 0";

        let (inode, remote) = parse_established(established).unwrap();
        assert_eq!(inode, 44321);
        assert_eq!(remote.to_string(), "192.168.1.1:443");
        assert!(parse_established(listening).is_none());
    }

    #[test]
    fn reads_socket_inode_from_fd_link() {
        assert_eq!(socket_inode("socket:[98765]"), Some(98765));
        assert_eq!(socket_inode("/dev/null"), None);
    }
}
