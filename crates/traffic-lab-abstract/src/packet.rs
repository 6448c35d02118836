use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddrV4;

/// Transport protocol label used by the flow classifier.
///
/// The simulator does not model congestion control, so the label only
/// separates otherwise identical flows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Udp,
    Tcp,
}

impl Protocol {
    /// IANA protocol number, as reported in a five-tuple.
    pub fn number(self) -> u8 {
        match self {
            Protocol::Tcp => 6,
            Protocol::Udp => 17,
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Udp => f.write_str("UDP"),
            Protocol::Tcp => f.write_str("TCP"),
        }
    }
}

/// A unit of application payload handed to the transport.
///
/// Only the size matters to the flow statistics, so no bytes are carried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Datagram {
    pub destination: SocketAddrV4,
    pub protocol: Protocol,
    pub size: u32,
}

impl Datagram {
    pub fn new(destination: SocketAddrV4, protocol: Protocol, size: u32) -> Self {
        Self {
            destination,
            protocol,
            size,
        }
    }

    pub fn len(&self) -> usize {
        self.size as usize
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }
}
