use crate::error::ChordError;
use sha2::{Digest, Sha256};
use std::fmt;

/*
An Identifier is a position on the ring. Node addresses and keys are hashed
into the same m-bit space, so ownership of a key is decided purely by
comparing identifiers with the interval predicates below.
*/

/// Position on the ring, always reduced mod 2^m.
pub type Identifier = u64;

/// Ring geometry for an identifier space of `2^bits` positions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Ring {
    bits: u32,
}

impl Ring {
    pub fn new(bits: u32) -> Result<Self, ChordError> {
        if bits == 0 || bits > 64 {
            return Err(ChordError::InvalidCapacity(bits));
        }
        Ok(Self { bits })
    }

    /// Number of bits m; also the finger table length.
    pub fn bits(&self) -> u32 {
        self.bits
    }

    pub fn finger_count(&self) -> usize {
        self.bits as usize
    }

    /// Largest identifier on the ring, 2^m - 1.
    pub fn max_id(&self) -> Identifier {
        if self.bits == 64 {
            u64::MAX
        } else {
            (1u64 << self.bits) - 1
        }
    }

    /// Hashes an address or key onto the ring.
    /// The first eight bytes of the SHA-256 digest are read big-endian and reduced mod 2^m.
    pub fn hash(&self, input: &str) -> Identifier {
        let digest = Sha256::digest(input.as_bytes());
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&digest[..8]);
        u64::from_be_bytes(prefix) & self.max_id()
    }

    /// Start of the i-th finger interval: (id + 2^i) mod 2^m.
    pub fn finger_start(&self, id: Identifier, index: usize) -> Identifier {
        debug_assert!(index < self.finger_count());
        id.wrapping_add(1u64 << index) & self.max_id()
    }

    /// Right-inclusive membership: candidate in (start, end] on the ring.
    ///
    /// When `start == end` the interval is empty except for `end` itself.
    pub fn is_between(&self, candidate: Identifier, start: Identifier, end: Identifier) -> bool {
        if start < end {
            candidate > start && candidate <= end
        } else if start > end {
            candidate > start || candidate <= end
        } else {
            candidate == end
        }
    }

    /// Open membership: candidate in (start, end) on the ring.
    ///
    /// When `start == end` the open interval covers the whole ring except `start`,
    /// which is what a node that is its own successor needs.
    pub fn is_strictly_between(
        &self,
        candidate: Identifier,
        start: Identifier,
        end: Identifier,
    ) -> bool {
        if start == end {
            candidate != start
        } else {
            candidate != end && self.is_between(candidate, start, end)
        }
    }
}

/// A ring member: its address and the identifier derived from it.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Node {
    pub address: String,
    pub id: Identifier,
}

impl Node {
    pub fn new(ring: &Ring, address: impl Into<String>) -> Self {
        let address = address.into();
        let id = ring.hash(&address);
        Self { address, id }
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Node({}@{})", self.address, self.id)
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.address, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Walks clockwise from start and reports whether candidate is reached before passing end.
    fn reference_between(candidate: u64, start: u64, end: u64, size: u64) -> bool {
        let mut pos = (start + 1) % size;
        loop {
            if pos == candidate {
                return true;
            }
            if pos == end {
                return false;
            }
            pos = (pos + 1) % size;
        }
    }

    #[test]
    fn test_is_between_matches_clockwise_walk() {
        let ring = Ring::new(3).unwrap();
        for start in 0..8 {
            for end in 0..8 {
                if start == end {
                    continue;
                }
                for candidate in 0..8 {
                    assert_eq!(
                        ring.is_between(candidate, start, end),
                        reference_between(candidate, start, end, 8),
                        "candidate={} start={} end={}",
                        candidate,
                        start,
                        end
                    );
                }
            }
        }
    }

    #[test]
    fn test_degenerate_interval() {
        let ring = Ring::new(3).unwrap();
        for point in 0..8 {
            for candidate in 0..8 {
                assert_eq!(ring.is_between(candidate, point, point), candidate == point);
                assert_eq!(ring.is_strictly_between(candidate, point, point), candidate != point);
            }
        }
    }

    #[test]
    fn test_strictly_between_excludes_end() {
        let ring = Ring::new(3).unwrap();
        assert!(ring.is_strictly_between(4, 2, 5));
        assert!(!ring.is_strictly_between(5, 2, 5));
        assert!(!ring.is_strictly_between(2, 2, 5));
        // wraps through zero
        assert!(ring.is_strictly_between(0, 6, 1));
        assert!(ring.is_strictly_between(7, 6, 1));
        assert!(!ring.is_strictly_between(1, 6, 1));
    }

    #[test]
    fn test_hash_is_deterministic_and_in_range() {
        let ring = Ring::new(3).unwrap();
        for port in 8000..8100 {
            let addr = format!("127.0.0.1:{}", port);
            let h = ring.hash(&addr);
            assert!(h < 8);
            assert_eq!(h, ring.hash(&addr));
        }

        let wide = Ring::new(64).unwrap();
        assert_eq!(wide.max_id(), u64::MAX);
        assert_eq!(wide.hash("foo"), wide.hash("foo"));
    }

    #[test]
    fn test_finger_start_wraps() {
        let ring = Ring::new(3).unwrap();
        assert_eq!(ring.finger_start(6, 0), 7);
        assert_eq!(ring.finger_start(6, 1), 0);
        assert_eq!(ring.finger_start(6, 2), 2);

        let wide = Ring::new(64).unwrap();
        assert_eq!(wide.finger_start(u64::MAX, 0), 0);
        assert_eq!(wide.finger_start(1, 63), (1u64 << 63) + 1);
    }

    #[test]
    fn test_invalid_capacity() {
        assert!(matches!(Ring::new(0), Err(ChordError::InvalidCapacity(0))));
        assert!(matches!(Ring::new(65), Err(ChordError::InvalidCapacity(65))));
    }

    #[test]
    fn test_node_identifier_comes_from_address() {
        let ring = Ring::new(16).unwrap();
        let node = Node::new(&ring, "10.0.0.1:8081");
        assert_eq!(node.id, ring.hash("10.0.0.1:8081"));
        assert_eq!(node.to_string(), format!("10.0.0.1:8081[{}]", node.id));
    }
}
