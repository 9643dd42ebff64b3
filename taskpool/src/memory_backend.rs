use crate::{PoolConfig, TaskStore};
use lazy_static::lazy_static;
use lru::LruCache;
use redis::{RedisError, RedisResult};
use serde::Serialize;
use serde_json::{json, Value};
use std::{
    collections::{BTreeMap, HashMap},
    num::NonZeroUsize,
    sync::{Arc, Mutex},
};

struct MemoryStorage {
    kv: LruCache<Value, Value>,
    /// member -> score, per sorted-set key; ordering derived on read.
    zsets: HashMap<String, BTreeMap<String, i64>>,
}

impl MemoryStorage {
    fn new(kv_capacity: usize) -> Self {
        Self {
            kv: LruCache::new(NonZeroUsize::new(kv_capacity).unwrap()),
            zsets: HashMap::new(),
        }
    }
}

type SingleStorage = Arc<Mutex<MemoryStorage>>;
type GlobalStorage = Mutex<HashMap<String, SingleStorage>>;

lazy_static! {
    // #{redis_url => single_storage}
    //
    // We use redis_url to distinguish different redis databases for tests, to
    // prevent data race problems when running multiple tests.
    static ref GLOBAL_STORAGE: GlobalStorage = Mutex::new(HashMap::new());
}

pub struct MemoryBackend {
    storage: SingleStorage,
}

impl MemoryBackend {
    pub fn new(redis_url: String) -> Self {
        let mut global = GLOBAL_STORAGE.lock().unwrap();

        let mem_capacity = std::env::var("MEMORY_BACKEND_SIZE")
            .unwrap_or("2048".to_string())
            .parse::<usize>()
            .unwrap_or(2048);
        Self {
            storage: global
                .entry(redis_url)
                .or_insert_with(|| Arc::new(Mutex::new(MemoryStorage::new(mem_capacity))))
                .clone(),
        }
    }

    pub fn set_ex<K: Serialize, V: Serialize>(
        &mut self,
        key: K,
        val: V,
        _ttl: u64,
    ) -> RedisResult<()> {
        let mut lock = self.storage.lock().unwrap();
        lock.kv.put(json!(key), json!(val));
        Ok(())
    }

    pub fn get<K: Serialize, V: serde::de::DeserializeOwned>(&mut self, key: &K) -> RedisResult<V> {
        let mut lock = self.storage.lock().unwrap();
        match lock.kv.get(&json!(key)) {
            None => Err(RedisError::from((redis::ErrorKind::TypeError, "not found"))),
            Some(v) => serde_json::from_value(v.clone()).map_err(|e| {
                RedisError::from((
                    redis::ErrorKind::TypeError,
                    "deserialization error",
                    e.to_string(),
                ))
            }),
        }
    }

    pub fn del<K: Serialize>(&mut self, key: K) -> RedisResult<usize> {
        let mut lock = self.storage.lock().unwrap();
        if lock.kv.pop(&json!(key)).is_none() {
            Ok(0)
        } else {
            Ok(1)
        }
    }

    pub fn zadd(&mut self, key: &str, member: &str, score: i64) -> RedisResult<()> {
        let mut lock = self.storage.lock().unwrap();
        lock.zsets
            .entry(key.to_string())
            .or_default()
            .insert(member.to_string(), score);
        Ok(())
    }

    pub fn zrem(&mut self, key: &str, member: &str) -> RedisResult<usize> {
        let mut lock = self.storage.lock().unwrap();
        let removed = lock
            .zsets
            .get_mut(key)
            .map(|set| set.remove(member).is_some())
            .unwrap_or(false);
        Ok(removed as usize)
    }

    pub fn zfirst(&mut self, key: &str) -> RedisResult<Option<String>> {
        let lock = self.storage.lock().unwrap();
        Ok(lock.zsets.get(key).and_then(|set| {
            set.iter()
                .min_by_key(|(member, score)| (**score, (*member).clone()))
                .map(|(member, _)| member.clone())
        }))
    }

    pub fn zrangebyscore_upto(&mut self, key: &str, max: i64) -> RedisResult<Vec<String>> {
        let lock = self.storage.lock().unwrap();
        let mut due: Vec<(i64, String)> = lock
            .zsets
            .get(key)
            .map(|set| {
                set.iter()
                    .filter(|(_, score)| **score <= max)
                    .map(|(member, score)| (*score, member.clone()))
                    .collect()
            })
            .unwrap_or_default();
        due.sort();
        Ok(due.into_iter().map(|(_, member)| member).collect())
    }

    pub fn zcard(&mut self, key: &str) -> RedisResult<u64> {
        let lock = self.storage.lock().unwrap();
        Ok(lock.zsets.get(key).map(|set| set.len() as u64).unwrap_or(0))
    }
}

/// Return a memory-backed task store with the given id.
///
/// This is used for testing. Please use the test case name as the id to
/// prevent data races between concurrently running tests.
pub fn memory_store<S: ToString>(id: S) -> TaskStore {
    let config = PoolConfig {
        redis_ttl: 111,
        redis_url: format!("redis://{}:6379", id.to_string()),
        enable_redis: false,
    };
    TaskStore::open(config).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;
    use redis::RedisResult;

    #[test]
    fn test_memory_store_kv() {
        let mut store = memory_store("test_memory_store_kv");
        let mut conn = store.conn().expect("memory conn");

        let key = "hello".to_string();
        let val = "world".to_string();
        conn.set_ex(key.clone(), val.clone(), 111)
            .expect("memory set_ex");

        let actual: RedisResult<String> = conn.get(&key);
        assert_eq!(actual, Ok(val));

        let _ = conn.del(&key);
        let actual: RedisResult<String> = conn.get(&key);
        assert!(actual.is_err());
    }

    #[test]
    fn test_memory_stores_are_isolated() {
        let mut store1 = memory_store("test_memory_stores_are_isolated_1");
        let mut store2 = memory_store("test_memory_stores_are_isolated_2");
        let mut conn1 = store1.conn().expect("memory conn");
        let mut conn2 = store2.conn().expect("memory conn");

        conn1
            .set_ex("hello".to_string(), "world".to_string(), 111)
            .expect("memory set_ex");

        let actual: RedisResult<String> = conn2.get(&"hello".to_string());
        assert!(actual.is_err());
    }

    #[test]
    fn test_zset_ordering() {
        let mut store = memory_store("test_zset_ordering");
        let mut conn = store.conn().expect("memory conn");

        conn.zadd("band", "c", 30).unwrap();
        conn.zadd("band", "a", 10).unwrap();
        conn.zadd("band", "b", 20).unwrap();

        assert_eq!(conn.zfirst("band").unwrap(), Some("a".to_string()));
        assert_eq!(conn.zcard("band").unwrap(), 3);

        assert_eq!(
            conn.zrangebyscore_upto("band", 20).unwrap(),
            vec!["a".to_string(), "b".to_string()]
        );

        assert_eq!(conn.zrem("band", "a").unwrap(), 1);
        assert_eq!(conn.zrem("band", "a").unwrap(), 0);
        assert_eq!(conn.zfirst("band").unwrap(), Some("b".to_string()));
    }

    #[test]
    fn test_zset_ties_break_by_member() {
        let mut store = memory_store("test_zset_ties_break_by_member");
        let mut conn = store.conn().expect("memory conn");

        conn.zadd("band", "z2", 10).unwrap();
        conn.zadd("band", "z1", 10).unwrap();

        assert_eq!(conn.zfirst("band").unwrap(), Some("z1".to_string()));
    }
}
