use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::Utc;
use reportflow::{ReportFlow, ReportKind};
use tokio::sync::Mutex;
use tracing::{debug, error, info, Instrument};
use uuid::Uuid;

use crate::types::RunRecord;

/// Settled runs kept for polling before the oldest are dropped
pub const DEFAULT_RETAINED_RUNS: usize = 500;

#[derive(Default)]
struct Registry {
    records: HashMap<Uuid, RunRecord>,
    /// Finished and aborted runs, oldest first
    settled: VecDeque<Uuid>,
}

impl Registry {
    fn settle(&mut self, run_id: Uuid, record: RunRecord, retain: usize) {
        self.records.insert(run_id, record);
        self.settled.push_back(run_id);
        while self.settled.len() > retain {
            let Some(oldest) = self.settled.pop_front() else {
                break;
            };
            self.records.remove(&oldest);
            debug!(%oldest, "dropped settled run record");
        }
    }
}

/// Starts extractions in the background and remembers how they ended.
pub struct RunManager {
    flow: Arc<ReportFlow>,
    runs: Arc<Mutex<Registry>>,
    retain: usize,
}

impl RunManager {
    pub fn new(flow: Arc<ReportFlow>) -> Self {
        info!("🔧 Initializing RunManager");
        Self {
            flow,
            runs: Arc::new(Mutex::new(Registry::default())),
            retain: DEFAULT_RETAINED_RUNS,
        }
    }

    /// Keep at most `retain` finished or aborted records. Running ones are
    /// never dropped.
    pub fn with_retention(mut self, retain: usize) -> Self {
        self.retain = retain;
        self
    }

    /// Register a run and spawn it; returns the id callers poll with.
    pub async fn start(&self, kind: ReportKind, reference_id: Option<String>) -> Uuid {
        let run_id = Uuid::new_v4();
        self.runs.lock().await.records.insert(
            run_id,
            RunRecord::Running {
                run_id,
                kind,
                reference_id: reference_id.clone(),
                accepted_at: Utc::now(),
            },
        );

        let flow = self.flow.clone();
        let runs = self.runs.clone();
        let retain = self.retain;
        let span = tracing::info_span!("triggered_run", %run_id, %kind);
        tokio::spawn(
            async move {
                let record = match flow.run(kind).await {
                    Ok(result) => {
                        info!("✅ Run finished: {}", result.message());
                        RunRecord::Finished {
                            run_id,
                            reference_id,
                            result,
                        }
                    }
                    Err(e) => {
                        error!("❌ Run aborted: {}", e);
                        RunRecord::Aborted {
                            run_id,
                            kind,
                            reference_id,
                            error: e.to_string(),
                        }
                    }
                };
                runs.lock().await.settle(run_id, record, retain);
            }
            .instrument(span),
        );

        run_id
    }

    pub async fn get(&self, run_id: Uuid) -> Option<RunRecord> {
        self.runs.lock().await.records.get(&run_id).cloned()
    }

    pub async fn running(&self) -> usize {
        self.runs
            .lock()
            .await
            .records
            .values()
            .filter(|r| r.is_running())
            .count()
    }
}
