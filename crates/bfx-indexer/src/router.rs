/// Horizontal partitioning of storage keys across sub-databases ("shards").
///
/// A key's shard is derived from its second byte: for a Big5 group key
/// that's the trailing byte of the leading pair; for a Latin word key
/// that's its second character. Routing is explicitly disabled rather than
/// left to fall out of a modulus-by-zero: a process with `subcount == 0`,
/// or whose `submax` doesn't fit inside `[0, subcount)`, owns every key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Routing {
    Disabled,
    Active { subcount: u32, submin: u32, submax: u32 },
}

impl Routing {
    pub fn new(subcount: u32, submin: u32, submax: u32) -> Self {
        if subcount == 0 || submax >= subcount || submin > submax {
            Routing::Disabled
        } else {
            Routing::Active { subcount, submin, submax }
        }
    }

    pub fn from_config(config: &bfx_core::config::EngineConfig) -> Self {
        Self::new(config.subcount, config.submin, config.submax)
    }

    /// The shard index `key` routes to, or `None` if routing is disabled
    /// (there is only one shard: this one).
    pub fn shard_for(&self, key: &[u8]) -> Option<u32> {
        match self {
            Routing::Disabled => None,
            Routing::Active { subcount, .. } => {
                let byte = key.get(1).copied().unwrap_or(0);
                Some(u32::from(byte) % subcount)
            }
        }
    }

    /// Whether this process's shard range owns `key`.
    pub fn owns(&self, key: &[u8]) -> bool {
        match self {
            Routing::Disabled => true,
            Routing::Active { submin, submax, .. } => {
                let shard = self.shard_for(key).expect("Active routing always yields Some");
                shard >= *submin && shard <= *submax
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_subcount_disables_routing() {
        assert_eq!(Routing::new(0, 0, 0), Routing::Disabled);
    }

    #[test]
    fn submax_out_of_range_disables_routing() {
        assert_eq!(Routing::new(4, 0, 4), Routing::Disabled);
        assert_eq!(Routing::new(4, 0, 10), Routing::Disabled);
    }

    #[test]
    fn disabled_routing_owns_everything() {
        let r = Routing::Disabled;
        assert!(r.owns(b"zz\x00"));
        assert_eq!(r.shard_for(b"zz\x00"), None);
    }

    #[test]
    fn active_routing_partitions_by_second_byte() {
        let r = Routing::new(4, 1, 2);
        // second byte 0x05 -> shard 1 (owned), 0x04 -> shard 0 (not owned)
        assert_eq!(r.shard_for(&[0xA4, 0x05]), Some(1));
        assert!(r.owns(&[0xA4, 0x05]));
        assert_eq!(r.shard_for(&[0xA4, 0x04]), Some(0));
        assert!(!r.owns(&[0xA4, 0x04]));
    }

    #[test]
    fn submin_equal_submax_is_a_single_shard_slice() {
        let r = Routing::new(8, 3, 3);
        assert!(matches!(r, Routing::Active { .. }));
    }
}
