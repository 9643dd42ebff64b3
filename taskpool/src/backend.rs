use crate::MemoryBackend;
use redis::{Commands, FromRedisValue, RedisResult, ToRedisArgs};
use serde::Serialize;

/// A connection wrapper that integrates both Redis and the memory backend.
///
/// Besides the plain key/value surface the pool relies on sorted sets: one
/// per (source, priority) band plus the shared retry set, with epoch-millis
/// scores providing FIFO-within-band and due-time ordering.
pub enum Backend {
    Redis(redis::Connection),
    Memory(MemoryBackend),
}

impl Backend {
    pub fn set_ex<K: Serialize + ToRedisArgs, V: Serialize + ToRedisArgs>(
        &mut self,
        key: K,
        val: V,
        ttl: u64,
    ) -> RedisResult<()> {
        match self {
            Backend::Redis(conn) => conn.set_ex(key, val, ttl),
            Backend::Memory(conn) => conn.set_ex(key, val, ttl),
        }
    }

    pub fn get<
        K: Serialize + ToRedisArgs,
        V: serde::de::DeserializeOwned + FromRedisValue,
    >(
        &mut self,
        key: &K,
    ) -> RedisResult<V> {
        match self {
            Backend::Redis(conn) => conn.get(key),
            Backend::Memory(conn) => conn.get(key),
        }
    }

    pub fn del<K: Serialize + ToRedisArgs>(&mut self, key: K) -> RedisResult<usize> {
        match self {
            Backend::Redis(conn) => conn.del(key),
            Backend::Memory(conn) => conn.del(key),
        }
    }

    pub fn zadd(&mut self, key: &str, member: &str, score: i64) -> RedisResult<()> {
        match self {
            Backend::Redis(conn) => conn.zadd(key, member, score),
            Backend::Memory(conn) => conn.zadd(key, member, score),
        }
    }

    pub fn zrem(&mut self, key: &str, member: &str) -> RedisResult<usize> {
        match self {
            Backend::Redis(conn) => conn.zrem(key, member),
            Backend::Memory(conn) => conn.zrem(key, member),
        }
    }

    /// The member with the lowest (score, member) pair, if any.
    pub fn zfirst(&mut self, key: &str) -> RedisResult<Option<String>> {
        match self {
            Backend::Redis(conn) => {
                let members: Vec<String> = conn.zrange(key, 0, 0)?;
                Ok(members.into_iter().next())
            }
            Backend::Memory(conn) => conn.zfirst(key),
        }
    }

    /// All members whose score is at most `max`, ascending.
    pub fn zrangebyscore_upto(&mut self, key: &str, max: i64) -> RedisResult<Vec<String>> {
        match self {
            Backend::Redis(conn) => conn.zrangebyscore(key, "-inf", max),
            Backend::Memory(conn) => conn.zrangebyscore_upto(key, max),
        }
    }

    pub fn zcard(&mut self, key: &str) -> RedisResult<u64> {
        match self {
            Backend::Redis(conn) => conn.zcard(key),
            Backend::Memory(conn) => conn.zcard(key),
        }
    }
}
