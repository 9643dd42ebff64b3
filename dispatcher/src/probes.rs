use std::collections::{HashMap, VecDeque};
use std::sync::{
    atomic::{AtomicU32, Ordering},
    Arc, Mutex,
};
use std::time::Duration;

use garimpo_lib::{Probe, ProbeError, ProbeResult, Source};

/// The probe implementations wired at startup, one per source.
///
/// Sources without a registered probe simply get no worker; their queues
/// accumulate until an operator deploys the missing integration.
#[derive(Clone, Default)]
pub struct ProbeSet {
    probes: HashMap<Source, Arc<dyn Probe>>,
}

impl ProbeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, source: Source, probe: Arc<dyn Probe>) {
        self.probes.insert(source, probe);
    }

    pub fn get(&self, source: Source) -> Option<Arc<dyn Probe>> {
        self.probes.get(&source).cloned()
    }

    /// Register one probe instance per source, built by `make`.
    pub fn uniform<P, F>(make: F) -> Self
    where
        P: Probe + 'static,
        F: Fn(Source) -> P,
    {
        let mut set = Self::new();
        for source in Source::all() {
            set.insert(source, Arc::new(make(source)));
        }
        set
    }
}

/// One scripted probe reaction.
#[derive(Debug, Clone)]
pub enum MockOutcome {
    Succeed(serde_json::Value),
    Fail(String),
    /// Sleep past any reasonable deadline; used to exercise timeouts.
    Hang(Duration),
}

/// Scriptable probe used across the test suites: plays back a queue of
/// outcomes, then repeats its fallback forever.
#[derive(Clone)]
pub struct MockProbe {
    script: Arc<Mutex<VecDeque<MockOutcome>>>,
    fallback: MockOutcome,
    invocations: Arc<AtomicU32>,
}

impl MockProbe {
    pub fn scripted(outcomes: Vec<MockOutcome>, fallback: MockOutcome) -> Self {
        Self {
            script: Arc::new(Mutex::new(outcomes.into())),
            fallback,
            invocations: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn always_succeeding(result: serde_json::Value) -> Self {
        Self::scripted(Vec::new(), MockOutcome::Succeed(result))
    }

    pub fn always_failing(message: &str) -> Self {
        Self::scripted(Vec::new(), MockOutcome::Fail(message.to_string()))
    }

    pub fn always_hanging(duration: Duration) -> Self {
        Self::scripted(Vec::new(), MockOutcome::Hang(duration))
    }

    pub fn invocations(&self) -> u32 {
        self.invocations.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Probe for MockProbe {
    async fn probe(
        &self,
        _params: &HashMap<String, serde_json::Value>,
    ) -> ProbeResult<serde_json::Value> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        let outcome = {
            let mut script = self.script.lock().unwrap();
            script.pop_front().unwrap_or_else(|| self.fallback.clone())
        };

        match outcome {
            MockOutcome::Succeed(value) => Ok(value),
            MockOutcome::Fail(message) => Err(ProbeError::Upstream(message)),
            MockOutcome::Hang(duration) => {
                tokio::time::sleep(duration).await;
                Ok(serde_json::Value::Null)
            }
        }
    }
}
