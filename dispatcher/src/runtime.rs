use garimpo_lib::Source;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::{Dispatcher, ProbeSet, RetryPump, Worker};

/// Wire the background half of the pipeline: one worker task per source
/// with a registered probe, plus the retry pump. Everything winds down
/// cooperatively when `cancel` fires; in-flight probes finish or time out
/// first.
pub fn spawn(
    dispatcher: &Dispatcher,
    probes: &ProbeSet,
    cancel: CancellationToken,
) -> Vec<JoinHandle<()>> {
    let mut handles = Vec::new();

    for source in Source::all() {
        let Some(probe) = probes.get(source) else {
            tracing::warn!("no probe registered for {source}, worker not started");
            continue;
        };
        let worker = Worker::new(source, probe, dispatcher);
        handles.push(tokio::spawn(worker.run(cancel.clone())));
    }

    handles.push(tokio::spawn(RetryPump::new(dispatcher).run(cancel)));
    handles
}
