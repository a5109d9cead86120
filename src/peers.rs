//! Peer table and address-to-slot resolution
//!
//! All peers share the first three octets of the coordinator's address; a
//! peer's identity is the fourth octet, which maps one-to-one onto a table
//! slot. Slot 0 is reserved for the listening socket, so peer slots run
//! `1..=C` for a configured octet range of size `C`. A slot's index doubles
//! as its mio registration token.

use crate::config::NetworkConfig;
use crate::error::{Error, Result};
use mio::net::TcpStream;
use std::net::{IpAddr, Ipv4Addr};

/// Fixed-size table mapping peer slots to live sockets
pub struct PeerTable {
    slots: Vec<Option<TcpStream>>,
    /// First three octets shared by every peer on the link
    subnet: [u8; 3],
    min_octet: u8,
    max_octet: u8,
    connected: usize,
}

impl PeerTable {
    /// Allocate a table sized to the configured octet range, all slots empty
    pub fn new(config: &NetworkConfig) -> Result<Self> {
        config.validate()?;
        let base: Ipv4Addr = config.server_addr.parse().map_err(|e| {
            Error::Config(format!(
                "Invalid server address {}: {}",
                config.server_addr, e
            ))
        })?;
        let octets = base.octets();
        Ok(Self {
            slots: (0..config.peer_count() + 1).map(|_| None).collect(),
            subnet: [octets[0], octets[1], octets[2]],
            min_octet: config.min_peer_octet,
            max_octet: config.max_peer_octet,
            connected: 0,
        })
    }

    /// Map a peer address to its reserved slot
    ///
    /// Addresses outside the configured contiguous range (including any
    /// non-IPv4 address) are a configuration violation: the caller must
    /// reject the connection, never index with an unchecked value.
    pub fn resolve_slot(&self, addr: IpAddr) -> Result<usize> {
        let out_of_range = || Error::AddressOutOfRange {
            addr: addr.to_string(),
            min: self.min_octet,
            max: self.max_octet,
        };

        let IpAddr::V4(v4) = addr else {
            return Err(out_of_range());
        };
        let octet = v4.octets()[3];
        if octet < self.min_octet || octet > self.max_octet {
            return Err(out_of_range());
        }
        Ok((octet - self.min_octet) as usize + 1)
    }

    /// Install a live socket at `slot`; the slot must come from
    /// `resolve_slot` (slot 0 belongs to the listener)
    pub fn register(&mut self, slot: usize, stream: TcpStream) -> Result<()> {
        if slot == 0 || slot >= self.slots.len() {
            return Err(Error::Config(format!("peer slot {} outside table", slot)));
        }
        let entry = &mut self.slots[slot];
        if entry.is_some() {
            return Err(Error::SlotOccupied(slot));
        }
        *entry = Some(stream);
        self.connected += 1;
        Ok(())
    }

    /// Clear `slot`, handing back the socket (if any) so the caller can
    /// deregister and close it; the slot is immediately reusable
    pub fn deregister(&mut self, slot: usize) -> Option<TcpStream> {
        let stream = self.slots.get_mut(slot)?.take();
        if stream.is_some() {
            self.connected -= 1;
        }
        stream
    }

    /// Live socket at `slot`, if connected
    pub fn get(&self, slot: usize) -> Option<&TcpStream> {
        self.slots.get(slot)?.as_ref()
    }

    /// Live socket at `slot` for reading and writing, if connected
    pub fn get_mut(&mut self, slot: usize) -> Option<&mut TcpStream> {
        self.slots.get_mut(slot)?.as_mut()
    }

    /// Dotted-decimal address reserved for `slot`, the inverse of
    /// `resolve_slot`; `None` for slot 0 and anything outside the table
    pub fn addr_for_slot(&self, slot: usize) -> Option<String> {
        if slot == 0 || slot > self.peer_count() {
            return None;
        }
        let octet = self.min_octet + (slot - 1) as u8;
        Some(format!(
            "{}.{}.{}.{}",
            self.subnet[0], self.subnet[1], self.subnet[2], octet
        ))
    }

    /// True if a live socket occupies `slot`
    pub fn is_occupied(&self, slot: usize) -> bool {
        self.get(slot).is_some()
    }

    /// Number of currently connected peers; always equals the number of
    /// occupied slots
    pub fn connected(&self) -> usize {
        self.connected
    }

    /// Number of peer slots `C` (excluding the reserved listener slot)
    pub fn peer_count(&self) -> usize {
        self.slots.len() - 1
    }

    /// Remove and return every live socket, emptying the table
    pub fn drain(&mut self) -> Vec<TcpStream> {
        self.connected = 0;
        self.slots.iter_mut().filter_map(Option::take).collect()
    }
}
