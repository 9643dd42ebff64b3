use backoff::{exponential::ExponentialBackoff, SystemClock};
use garimpo_lib::Task;
use redis::{Client, RedisResult};
use std::time::Duration;

use crate::{Backend, MemoryBackend, PoolConfig, PoolError, PoolResult};

/// Key/value store of canonical task records, plus the shared connection
/// factory for every other pool component.
///
/// Records are written with the retention TTL; all state transitions go
/// through [`TaskStore::mutate`] so a transition always works on the latest
/// snapshot of the record.
#[derive(Debug, Clone)]
pub struct TaskStore {
    client: Client,
    config: PoolConfig,
}

impl TaskStore {
    pub fn open(config: PoolConfig) -> Result<Self, redis::RedisError> {
        let client = Client::open(config.redis_url.as_str())?;
        tracing::info!(
            redis = config.enable_redis,
            url = %config.redis_url,
            ttl_secs = config.redis_ttl,
            "task store opened"
        );
        Ok(Self { client, config })
    }

    pub fn conn(&mut self) -> Result<Backend, redis::RedisError> {
        if !self.config.enable_redis {
            return Ok(Backend::Memory(MemoryBackend::new(
                self.config.redis_url.clone(),
            )));
        }
        self.redis_conn().map(Backend::Redis)
    }

    /// Establish a redis connection, backing off while the store is
    /// unreachable. Only connection-level failures are retried; anything
    /// else (bad URL, auth) surfaces immediately. The window is kept short
    /// so a worker stuck here returns to its loop within a couple of
    /// minutes and the fault reaches the caller.
    fn redis_conn(&mut self) -> Result<redis::Connection, redis::RedisError> {
        let policy = ExponentialBackoff::<SystemClock> {
            initial_interval: Duration::from_secs(2),
            max_interval: Duration::from_secs(30),
            max_elapsed_time: Some(Duration::from_secs(120)),
            ..Default::default()
        };

        let mut attempt = 0u32;
        backoff::retry(policy, || {
            attempt += 1;
            let error = match self.client.get_connection() {
                Ok(conn) => return Ok(conn),
                Err(e) => e,
            };

            if !(error.is_connection_refusal() || error.is_io_error() || error.is_timeout()) {
                return Err(backoff::Error::permanent(error));
            }

            tracing::warn!(attempt, error = %error, "redis unreachable, backing off");
            // A client can hold on to a stale resolved address; rebuild it
            // before the next try.
            if let Ok(fresh) = Client::open(self.config.redis_url.as_str()) {
                self.client = fresh;
            }
            Err(backoff::Error::transient(error))
        })
        .map_err(|e| match e {
            backoff::Error::Permanent(err) | backoff::Error::Transient { err, .. } => err,
        })
    }

    /// Record TTL in seconds, shared by task and progress records.
    pub fn ttl(&self) -> u64 {
        self.config.redis_ttl
    }

    fn task_key(task_id: &str) -> String {
        format!("task:{task_id}")
    }

    /// Insert or overwrite a task record.
    pub fn put(&mut self, task: &Task) -> PoolResult<()> {
        let serialized =
            serde_json::to_string(task).map_err(|e| PoolError::Storage(e.to_string()))?;
        self.conn()?
            .set_ex(Self::task_key(&task.id), serialized, self.config.redis_ttl)?;
        Ok(())
    }

    pub fn get(&mut self, task_id: &str) -> PoolResult<Option<Task>> {
        let result: RedisResult<String> = self.conn()?.get(&Self::task_key(task_id));
        match result {
            Ok(serialized) => Ok(Some(
                serde_json::from_str(&serialized).map_err(|e| PoolError::Storage(e.to_string()))?,
            )),
            Err(e) if e.kind() == redis::ErrorKind::TypeError => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn remove(&mut self, task_id: &str) -> PoolResult<usize> {
        tracing::info!("TaskStore.remove: {task_id}");
        let removed: usize = self.conn()?.del(Self::task_key(task_id))?;
        Ok(removed)
    }

    /// Read-modify-write on one record: the closure sees the latest stored
    /// snapshot and its post-image becomes authoritative.
    pub fn mutate<F>(&mut self, task_id: &str, f: F) -> PoolResult<Task>
    where
        F: FnOnce(&mut Task),
    {
        let mut task = self
            .get(task_id)?
            .ok_or_else(|| PoolError::NotFound(task_id.to_string()))?;
        f(&mut task);
        self.put(&task)?;
        Ok(task)
    }
}
