use bfx_storage::error::StorageError;
use bfx_storage::store::DupStore;

use crate::router::Routing;

/// Which physical store a key routes to.
enum Dest {
    Primary,
    Shard(usize),
    Dropped,
}

/// Wraps a primary store plus one store per shard this process owns,
/// routing posting operations ([`DupStore::insert`], `get`, `get_first`,
/// `delete_key`) to the physical file [`Routing`] assigns a key to.
/// Doc-identity and caller metadata (`set_meta`/`get_meta`/`delete_meta`)
/// always go to the primary store regardless of routing, per the data
/// model: the primary store is the one place doc ids, `_idxcount`,
/// `_subcount`, `_deleted`, and vars live.
///
/// `shards[i]` holds shard index `submin + i`. With routing disabled (or
/// no shard stores supplied) every posting operation falls through to
/// `primary`, matching a single unsharded engine.
pub struct ShardedStore<S: DupStore> {
    primary: S,
    shards: Vec<S>,
    routing: Routing,
}

impl<S: DupStore> ShardedStore<S> {
    pub fn new(primary: S, shards: Vec<S>, routing: Routing) -> Self {
        Self { primary, shards, routing }
    }

    fn dest(&self, key: &[u8]) -> Dest {
        match self.routing {
            Routing::Disabled => Dest::Primary,
            Routing::Active { submin, submax, .. } => {
                let shard = self.routing.shard_for(key).expect("active routing always yields Some");
                if shard < submin || shard > submax {
                    Dest::Dropped
                } else {
                    Dest::Shard((shard - submin) as usize)
                }
            }
        }
    }
}

impl<S: DupStore> DupStore for ShardedStore<S> {
    fn insert(&mut self, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        match self.dest(key) {
            Dest::Primary => self.primary.insert(key, value),
            Dest::Shard(i) => match self.shards.get_mut(i) {
                Some(store) => store.insert(key, value),
                None => Ok(()),
            },
            Dest::Dropped => Ok(()),
        }
    }

    fn get(&self, key: &[u8]) -> Result<Vec<Vec<u8>>, StorageError> {
        match self.dest(key) {
            Dest::Primary => self.primary.get(key),
            Dest::Shard(i) => match self.shards.get(i) {
                Some(store) => store.get(key),
                None => Ok(Vec::new()),
            },
            Dest::Dropped => Ok(Vec::new()),
        }
    }

    fn get_first(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        match self.dest(key) {
            Dest::Primary => self.primary.get_first(key),
            Dest::Shard(i) => match self.shards.get(i) {
                Some(store) => store.get_first(key),
                None => Ok(None),
            },
            Dest::Dropped => Ok(None),
        }
    }

    fn delete_key(&mut self, key: &[u8]) -> Result<(), StorageError> {
        match self.dest(key) {
            Dest::Primary => self.primary.delete_key(key),
            Dest::Shard(i) => match self.shards.get_mut(i) {
                Some(store) => store.delete_key(key),
                None => Ok(()),
            },
            Dest::Dropped => Ok(()),
        }
    }

    fn keys(&self) -> Result<Vec<Vec<u8>>, StorageError> {
        let mut out = self.primary.keys()?;
        for shard in &self.shards {
            out.extend(shard.keys()?);
        }
        out.sort();
        out.dedup();
        Ok(out)
    }

    fn keys_with_prefix(&self, prefix: &[u8]) -> Result<Vec<Vec<u8>>, StorageError> {
        Ok(self.keys()?.into_iter().filter(|k| k.starts_with(prefix)).collect())
    }

    fn set_meta(&mut self, name: &str, value: &[u8]) -> Result<(), StorageError> {
        self.primary.set_meta(name, value)
    }

    fn get_meta(&self, name: &str) -> Result<Option<Vec<u8>>, StorageError> {
        self.primary.get_meta(name)
    }

    fn delete_meta(&mut self, name: &str) -> Result<(), StorageError> {
        self.primary.delete_meta(name)
    }

    fn flush(&mut self) -> Result<(), StorageError> {
        self.primary.flush()?;
        for shard in &mut self.shards {
            shard.flush()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bfx_storage::store::MemDupStore;

    #[test]
    fn disabled_routing_writes_everything_to_primary() {
        let mut store = ShardedStore::new(MemDupStore::new(), Vec::new(), Routing::Disabled);
        store.insert(b"hello", b"1").unwrap();
        assert_eq!(store.get(b"hello").unwrap(), vec![b"1".to_vec()]);
    }

    #[test]
    fn active_routing_writes_into_the_owned_shard_store() {
        let routing = Routing::new(4, 1, 2);
        let shards = vec![MemDupStore::new(), MemDupStore::new()];
        let mut store = ShardedStore::new(MemDupStore::new(), shards, routing);

        // second byte 0x05 -> shard 1 (owned, shards[0])
        store.insert(&[0xA4, 0x05], b"one").unwrap();
        assert_eq!(store.get(&[0xA4, 0x05]).unwrap(), vec![b"one".to_vec()]);
    }

    #[test]
    fn active_routing_drops_postings_outside_the_owned_range() {
        let routing = Routing::new(4, 1, 2);
        let mut store = ShardedStore::new(MemDupStore::new(), vec![MemDupStore::new()], routing);

        // second byte 0x04 -> shard 0, outside [1,2]: dropped, not primary.
        store.insert(&[0xA4, 0x04], b"one").unwrap();
        assert_eq!(store.get(&[0xA4, 0x04]).unwrap(), Vec::<Vec<u8>>::new());
        assert_eq!(store.primary.get(&[0xA4, 0x04]).unwrap(), Vec::<Vec<u8>>::new());
    }

    #[test]
    fn meta_always_targets_primary_regardless_of_routing() {
        let routing = Routing::new(4, 1, 2);
        let mut store = ShardedStore::new(MemDupStore::new(), vec![MemDupStore::new()], routing);
        store.set_meta("_idxcount", b"\x00\x00\x00\x01").unwrap();
        assert_eq!(store.get_meta("_idxcount").unwrap(), Some(b"\x00\x00\x00\x01".to_vec()));
        store.delete_meta("_idxcount").unwrap();
        assert_eq!(store.get_meta("_idxcount").unwrap(), None);
    }
}
