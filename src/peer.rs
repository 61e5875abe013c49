/// Observed reachability of a registered peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Ready,
    Failing,
    Closed,
}

#[derive(Debug, Clone)]
pub struct Peer {
    pub addr: String,
    pub state: ConnectionState,
    pub consecutive_failures: u32,
}

impl Peer {
    #[must_use]
    pub const fn new(addr: String) -> Self {
        Self {
            addr,
            state: ConnectionState::Ready,
            consecutive_failures: 0,
        }
    }
}

/// The set of peers a node knows about. Reads and writes are serialized
/// by the single reader-writer lock the server holds over peers, the
/// out-of-sync failure counter and the syncing flag together.
#[derive(Debug, Clone, Default)]
pub struct PeerRegistry {
    peers: Vec<Peer>,
}

impl PeerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self { peers: Vec::new() }
    }

    #[must_use]
    pub fn contains(&self, addr: &str) -> bool {
        self.peers.iter().any(|p| p.addr == addr)
    }

    /// Adds `addr`, returning `false` if it was already registered.
    pub fn add(&mut self, addr: String) -> bool {
        if self.contains(&addr) {
            return false;
        }
        self.peers.push(Peer::new(addr));
        true
    }

    pub fn remove(&mut self, addr: &str) -> Option<Peer> {
        let index = self.peers.iter().position(|p| p.addr == addr)?;
        Some(self.peers.remove(index))
    }

    pub fn get_mut(&mut self, addr: &str) -> Option<&mut Peer> {
        self.peers.iter_mut().find(|p| p.addr == addr)
    }

    #[must_use]
    pub fn addresses(&self) -> Vec<String> {
        self.peers.iter().map(|p| p.addr.clone()).collect()
    }

    /// Addresses currently believed reachable, in registry order. Used
    /// both for broadcast and for the round-robin sync loop.
    #[must_use]
    pub fn ready_addresses(&self) -> Vec<String> {
        self.peers
            .iter()
            .filter(|p| p.state == ConnectionState::Ready)
            .map(|p| p.addr.clone())
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.peers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_rejects_duplicate() {
        let mut registry = PeerRegistry::new();
        assert!(registry.add("127.0.0.1:9000".to_string()));
        assert!(!registry.add("127.0.0.1:9000".to_string()));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn remove_drops_the_peer() {
        let mut registry = PeerRegistry::new();
        registry.add("127.0.0.1:9000".to_string());
        assert!(registry.remove("127.0.0.1:9000").is_some());
        assert!(registry.is_empty());
    }

    #[test]
    fn ready_addresses_filters_by_state() {
        let mut registry = PeerRegistry::new();
        registry.add("127.0.0.1:9000".to_string());
        registry.add("127.0.0.1:9001".to_string());
        registry.get_mut("127.0.0.1:9001").unwrap().state = ConnectionState::Failing;

        assert_eq!(registry.ready_addresses(), vec!["127.0.0.1:9000".to_string()]);
    }
}
