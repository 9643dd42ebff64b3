use std::collections::HashMap;

use chrono::Utc;
use garimpo_dispatcher::ProbeSet;
use garimpo_lib::{Probe, ProbeResult, Source};

/// Placeholder probe wired when a real integration is not deployed: answers
/// with an empty result set after a short pause, like the stubbed bureau
/// integrations do. Keeps the pipeline exercisable end to end without
/// touching any government endpoint.
pub struct StubProbe {
    source: Source,
}

impl StubProbe {
    pub fn new(source: Source) -> Self {
        Self { source }
    }
}

#[async_trait::async_trait]
impl Probe for StubProbe {
    async fn probe(
        &self,
        params: &HashMap<String, serde_json::Value>,
    ) -> ProbeResult<serde_json::Value> {
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        Ok(serde_json::json!({
            "source": self.source.as_str(),
            "query": params,
            "results": [],
            "count": 0,
            "timestamp": Utc::now().to_rfc3339(),
        }))
    }
}

/// One stub probe per source.
pub fn stub_probes() -> ProbeSet {
    ProbeSet::uniform(StubProbe::new)
}
