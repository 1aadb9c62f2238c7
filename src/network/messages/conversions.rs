use crate::chord::types::Identifier;
use crate::error::ChordError;
use crate::network::messages::overlay::{Address, Hash, KvMap};
use crate::storage::TransferPayload;

impl From<Identifier> for Hash {
    fn from(hash: Identifier) -> Self {
        Hash { hash }
    }
}

impl From<Hash> for Identifier {
    fn from(msg: Hash) -> Self {
        msg.hash
    }
}

impl From<&str> for Address {
    fn from(address: &str) -> Self {
        Address {
            address: address.to_string(),
        }
    }
}

impl From<TransferPayload> for KvMap {
    fn from(entries: TransferPayload) -> Self {
        KvMap { entries }
    }
}

impl From<KvMap> for TransferPayload {
    fn from(msg: KvMap) -> Self {
        msg.entries
    }
}

/// Extracts a peer address from the wire, rejecting anything that is not `host:port`.
pub fn parse_address(msg: Address) -> Result<String, ChordError> {
    let address = msg.address.trim();
    let valid = match address.rsplit_once(':') {
        Some((host, port)) => !host.is_empty() && port.parse::<u16>().is_ok(),
        None => false,
    };
    if !valid {
        return Err(ChordError::InvalidRequest(format!(
            "malformed peer address {:?}",
            msg.address
        )));
    }
    Ok(address.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_address() {
        assert_eq!(parse_address("127.0.0.1:8081".into()).unwrap(), "127.0.0.1:8081");
        assert_eq!(parse_address(" node-a:9000 ".into()).unwrap(), "node-a:9000");
        assert_eq!(parse_address("[::1]:9000".into()).unwrap(), "[::1]:9000");

        for bad in ["", "127.0.0.1", ":8081", "host:port", "host:70000"] {
            assert!(
                matches!(parse_address(bad.into()), Err(ChordError::InvalidRequest(_))),
                "{:?} should be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_kv_map_carries_payload_unchanged() {
        let mut payload = TransferPayload::new();
        payload.insert("k".into(), b"{\"Val\":1}".to_vec());
        let msg = KvMap::from(payload.clone());
        assert_eq!(TransferPayload::from(msg), payload);
    }
}
