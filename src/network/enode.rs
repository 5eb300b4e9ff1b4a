use std::fmt;
use std::str::FromStr;

use crate::crypto::NodeId;
use crate::utils::ConformanceError;

const SCHEME: &str = "enode://";

/// Dial address of a remote node: `enode://<hex node id>@<host>:<port>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeRecord {
    pub id: NodeId,
    pub host: String,
    pub port: u16,
}

impl NodeRecord {
    /// `host:port` suitable for `TcpStream::connect`.
    pub fn socket_addr(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

impl FromStr for NodeRecord {
    type Err = ConformanceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| ConformanceError::InvalidNodeRecord(format!("{s:?}: {reason}"));

        let rest = s.trim().strip_prefix(SCHEME).ok_or_else(|| invalid("missing enode:// scheme"))?;
        let (id_hex, addr) = rest.split_once('@').ok_or_else(|| invalid("missing '@'"))?;
        // discovery query parameters are irrelevant for dialing
        let addr = addr.split_once('?').map_or(addr, |(a, _)| a);

        let raw = hex::decode(id_hex).map_err(|e| invalid(&format!("node id is not hex: {e}")))?;
        let id = NodeId::from_slice(&raw).map_err(|e| invalid(&e.to_string()))?;

        let (host, port) = addr.rsplit_once(':').ok_or_else(|| invalid("missing port"))?;
        let host = host.trim_start_matches('[').trim_end_matches(']');
        if host.is_empty() {
            return Err(invalid("missing host"));
        }
        let port = port.parse::<u16>().map_err(|e| invalid(&format!("bad port: {e}")))?;

        Ok(NodeRecord { id, host: host.to_string(), port })
    }
}

impl fmt::Display for NodeRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{SCHEME}{}@{}", hex::encode(self.id.as_bytes()), self.socket_addr())
    }
}
