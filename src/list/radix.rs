//! Binary radix trie of IP networks
//!
//! IPv4 networks are stored as IPv4-mapped IPv6 prefixes so one trie serves
//! both families. Lookups answer "is this address covered by any network".

use std::net::IpAddr;
use tracing::warn;

/// Separators accepted between addresses in a single list element
pub const IPLIST_SEPARATORS: &[char] = &[' ', ',', ';'];

const NO_CHILD: u32 = u32::MAX;

#[derive(Debug, Clone)]
struct Node {
    children: [u32; 2],
    terminal: bool,
}

impl Node {
    fn new() -> Self {
        Node {
            children: [NO_CHILD; 2],
            terminal: false,
        }
    }
}

/// Radix trie keyed by address bits, most significant first
#[derive(Debug, Clone)]
pub struct RadixTree {
    nodes: Vec<Node>,
    networks: usize,
}

impl Default for RadixTree {
    fn default() -> Self {
        Self::new()
    }
}

fn to_bits(addr: IpAddr, prefix: u8) -> (u128, u8) {
    match addr {
        IpAddr::V4(v4) => (u128::from(v4.to_ipv6_mapped()), prefix + 96),
        IpAddr::V6(v6) => (u128::from(v6), prefix),
    }
}

impl RadixTree {
    pub fn new() -> Self {
        RadixTree {
            nodes: vec![Node::new()],
            networks: 0,
        }
    }

    /// Insert a network; returns false if it was already present
    pub fn insert(&mut self, addr: IpAddr, prefix: u8) -> bool {
        let max = if addr.is_ipv4() { 32 } else { 128 };
        let (bits, depth) = to_bits(addr, prefix.min(max));

        let mut idx = 0usize;
        for i in 0..depth {
            let bit = ((bits >> (127 - i as u32)) & 1) as usize;
            let next = self.nodes[idx].children[bit];
            idx = if next == NO_CHILD {
                self.nodes.push(Node::new());
                let created = (self.nodes.len() - 1) as u32;
                self.nodes[idx].children[bit] = created;
                created as usize
            } else {
                next as usize
            };
        }

        if self.nodes[idx].terminal {
            return false;
        }
        self.nodes[idx].terminal = true;
        self.networks += 1;
        true
    }

    /// Whether any stored network covers `addr`
    pub fn contains(&self, addr: IpAddr) -> bool {
        let bits = match addr {
            IpAddr::V4(v4) => u128::from(v4.to_ipv6_mapped()),
            IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
                Some(v4) => u128::from(v4.to_ipv6_mapped()),
                None => u128::from(v6),
            },
        };

        let mut idx = 0usize;
        for i in 0..=128u32 {
            if self.nodes[idx].terminal {
                return true;
            }
            if i == 128 {
                break;
            }
            let bit = ((bits >> (127 - i)) & 1) as usize;
            match self.nodes[idx].children[bit] {
                NO_CHILD => return false,
                next => idx = next as usize,
            }
        }
        false
    }

    /// Parse `addr[/prefix]` and insert it
    pub fn insert_str(&mut self, entry: &str) -> Option<bool> {
        let (addr_part, prefix_part) = match entry.split_once('/') {
            Some((a, p)) => (a, Some(p)),
            None => (entry, None),
        };

        let addr: IpAddr = addr_part.trim().parse().ok()?;
        let max = if addr.is_ipv4() { 32 } else { 128 };
        let prefix = match prefix_part {
            Some(p) => {
                let p: u8 = p.trim().parse().ok()?;
                if p > max {
                    return None;
                }
                p
            }
            None => max,
        };

        Some(self.insert(addr, prefix))
    }

    /// Insert every address of a `" ,;"` separated list, returns how many parsed
    pub fn add_iplist(&mut self, list: &str) -> usize {
        let mut added = 0;
        for entry in list.split(IPLIST_SEPARATORS).filter(|e| !e.is_empty()) {
            match self.insert_str(entry) {
                Some(_) => added += 1,
                None => warn!(entry = %entry, "cannot parse network"),
            }
        }
        added
    }

    /// Number of distinct networks
    pub fn len(&self) -> usize {
        self.networks
    }

    pub fn is_empty(&self) -> bool {
        self.networks == 0
    }

    /// Short description of the trie shape for load logs
    pub fn info(&self) -> String {
        format!("{} networks, {} nodes", self.networks, self.nodes.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_ipv4_network_match() {
        let mut tree = RadixTree::new();
        assert_eq!(tree.insert_str("10.0.0.0/8"), Some(true));

        assert!(tree.contains(ip("10.1.2.3")));
        assert!(!tree.contains(ip("11.0.0.1")));
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn test_host_address_and_mapped_lookup() {
        let mut tree = RadixTree::new();
        tree.insert_str("192.168.1.10");

        assert!(tree.contains(ip("192.168.1.10")));
        assert!(tree.contains(ip("::ffff:192.168.1.10")));
        assert!(!tree.contains(ip("192.168.1.11")));
    }

    #[test]
    fn test_ipv6() {
        let mut tree = RadixTree::new();
        tree.insert_str("2001:db8::/32");

        assert!(tree.contains(ip("2001:db8::1")));
        assert!(!tree.contains(ip("2001:db9::1")));
        assert!(!tree.contains(ip("10.0.0.1")));
    }

    #[test]
    fn test_iplist_separators() {
        let mut tree = RadixTree::new();
        assert_eq!(tree.add_iplist("1.1.1.1, 2.2.2.0/24;3.3.3.3 bogus"), 3);
        assert!(tree.contains(ip("2.2.2.200")));
        assert!(tree.contains(ip("3.3.3.3")));
    }

    #[test]
    fn test_duplicates_and_bad_prefix() {
        let mut tree = RadixTree::new();
        assert_eq!(tree.insert_str("1.2.3.4/32"), Some(true));
        assert_eq!(tree.insert_str("1.2.3.4"), Some(false));
        assert_eq!(tree.insert_str("1.2.3.4/33"), None);
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn test_default_route_covers_everything() {
        let mut tree = RadixTree::new();
        tree.insert_str("::/0");
        assert!(tree.contains(ip("8.8.8.8")));
        assert!(tree.contains(ip("fe80::1")));
    }
}
