//! Batch dispatcher.
//!
//! Operations go out in contiguous batches of `batch_size`, strictly one
//! after another. A failed batch is recorded and the run moves on; the
//! report carries exact success and failure totals.

use chrono::{DateTime, Utc};
use serde::Serialize;

use rbxtree_core::Operation;

use crate::error::SyncError;
use crate::host::{Command, HostReply, RemoteHost, TransportError, STATUS_NOT_ATTACHED};

/// What happened to one batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum BatchOutcome {
    /// 200 with `success: true`.
    Succeeded,
    /// 200 with `success: false`; `succeeded` counts per-operation successes.
    Partial { succeeded: usize, failed: usize },
    /// 504: no plugin attached to the server.
    NotAttached,
    /// Any other non-2xx status.
    Rejected { status: u16 },
    TimedOut,
    TransportFailed { reason: String },
}

impl BatchOutcome {
    /// Classify the host's answer to a batch of `len` operations.
    pub fn classify(len: usize, result: &Result<HostReply, TransportError>) -> Self {
        let reply = match result {
            Ok(reply) => reply,
            Err(TransportError::Timeout { .. }) => return Self::TimedOut,
            Err(e) => {
                return Self::TransportFailed {
                    reason: e.to_string(),
                }
            }
        };
        match reply.status {
            200 if reply.body.success => Self::Succeeded,
            200 => {
                let succeeded = reply
                    .body
                    .data
                    .as_ref()
                    .map(|d| d.results.iter().filter(|r| r.success).count())
                    .unwrap_or(0)
                    .min(len);
                Self::Partial {
                    succeeded,
                    failed: len - succeeded,
                }
            }
            STATUS_NOT_ATTACHED => Self::NotAttached,
            status => Self::Rejected { status },
        }
    }

    pub fn succeeded(&self, len: usize) -> usize {
        match self {
            Self::Succeeded => len,
            Self::Partial { succeeded, .. } => *succeeded,
            _ => 0,
        }
    }

    pub fn failed(&self, len: usize) -> usize {
        len - self.succeeded(len)
    }
}

/// One batch in a [`DispatchReport`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    /// 1-based.
    pub index: usize,
    pub len: usize,
    #[serde(flatten)]
    pub outcome: BatchOutcome,
    /// Error text the host sent back, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Totals for a dispatch run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    pub succeeded: usize,
    pub failed: usize,
    pub batches: Vec<BatchReport>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl DispatchReport {
    /// A report for a run that sent nothing.
    pub fn empty() -> Self {
        let now = Utc::now();
        Self {
            succeeded: 0,
            failed: 0,
            batches: Vec::new(),
            started_at: now,
            finished_at: now,
        }
    }

    pub fn total(&self) -> usize {
        self.succeeded + self.failed
    }

    fn record(&mut self, batch: BatchReport) {
        self.succeeded += batch.outcome.succeeded(batch.len);
        self.failed += batch.outcome.failed(batch.len);
        self.batches.push(batch);
    }
}

/// Sends operations to a [`RemoteHost`] in fixed-size batches.
pub struct Dispatcher<H> {
    host: H,
    batch_size: usize,
}

impl<H: RemoteHost> Dispatcher<H> {
    pub fn new(host: H, batch_size: usize) -> Result<Self, SyncError> {
        if batch_size == 0 {
            return Err(SyncError::InvalidBatchSize);
        }
        Ok(Self { host, batch_size })
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn into_host(self) -> H {
        self.host
    }

    /// Send every operation; never stops early.
    pub fn dispatch(&mut self, operations: &[Operation]) -> DispatchReport {
        let mut report = DispatchReport::empty();
        let total = operations.len().div_ceil(self.batch_size);
        for (i, batch) in operations.chunks(self.batch_size).enumerate() {
            let index = i + 1;
            tracing::info!("sending batch {index}/{total} ({} operations)", batch.len());
            let result = self.host.apply_batch(batch);
            let entry = batch_report(index, batch.len(), &result);
            log_outcome(&entry);
            report.record(entry);
        }
        report.finished_at = Utc::now();
        tracing::info!(
            "dispatch complete: {} succeeded, {} failed",
            report.succeeded,
            report.failed
        );
        report
    }

    /// Send one operation as a `sync:update` command.
    pub fn send_single(&mut self, op: &Operation) -> DispatchReport {
        let mut report = DispatchReport::empty();
        tracing::info!("syncing {}", op.path);
        let result = self.host.run_command(&Command::update(op));
        let entry = batch_report(1, 1, &result);
        log_outcome(&entry);
        report.record(entry);
        report.finished_at = Utc::now();
        report
    }
}

fn batch_report(index: usize, len: usize, result: &Result<HostReply, TransportError>) -> BatchReport {
    BatchReport {
        index,
        len,
        outcome: BatchOutcome::classify(len, result),
        error: result.as_ref().ok().and_then(|r| r.body.error.clone()),
    }
}

fn log_outcome(batch: &BatchReport) {
    let i = batch.index;
    match &batch.outcome {
        BatchOutcome::Succeeded => tracing::debug!("batch {i} succeeded"),
        BatchOutcome::Partial { succeeded, .. } => {
            tracing::warn!("batch {i} partial: {succeeded}/{} succeeded", batch.len)
        }
        BatchOutcome::NotAttached => {
            tracing::warn!("batch {i} timed out on the server; plugin may not be connected")
        }
        BatchOutcome::Rejected { status } => tracing::warn!(
            "batch {i} failed: HTTP {status}{}",
            batch.error.as_deref().map(|e| format!(" ({e})")).unwrap_or_default()
        ),
        BatchOutcome::TimedOut => tracing::warn!("batch {i} timed out waiting for a reply"),
        BatchOutcome::TransportFailed { reason } => tracing::warn!("batch {i} error: {reason}"),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use rbxtree_core::{InstanceData, ServiceSet};
    use rstest::rstest;

    use super::*;
    use crate::host::{MemoryHost, OpResult, ReplyBody, ReplyData};

    /// Host that answers from a script, one entry per call.
    struct ScriptedHost {
        replies: VecDeque<Result<HostReply, TransportError>>,
        seen: Vec<usize>,
    }

    impl ScriptedHost {
        fn new(replies: Vec<Result<HostReply, TransportError>>) -> Self {
            Self {
                replies: replies.into(),
                seen: Vec::new(),
            }
        }

        fn next(&mut self) -> Result<HostReply, TransportError> {
            self.replies.pop_front().expect("scripted reply")
        }
    }

    impl RemoteHost for ScriptedHost {
        fn location(&self) -> String {
            "scripted".to_string()
        }

        fn check_health(&mut self) -> Result<HostReply, TransportError> {
            Ok(reply(200, ReplyBody::ok()))
        }

        fn apply_batch(&mut self, operations: &[Operation]) -> Result<HostReply, TransportError> {
            self.seen.push(operations.len());
            self.next()
        }

        fn run_command(&mut self, _command: &Command) -> Result<HostReply, TransportError> {
            self.seen.push(1);
            self.next()
        }
    }

    fn reply(status: u16, body: ReplyBody) -> HostReply {
        HostReply { status, body }
    }

    fn partial(flags: &[bool]) -> HostReply {
        reply(
            200,
            ReplyBody {
                success: false,
                data: Some(ReplyData {
                    results: flags
                        .iter()
                        .map(|&success| OpResult {
                            success,
                            error: None,
                        })
                        .collect(),
                }),
                error: None,
            },
        )
    }

    fn ops(n: usize) -> Vec<Operation> {
        (0..n)
            .map(|i| Operation::update(format!("Workspace.P{i}"), InstanceData::default()))
            .collect()
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        assert!(matches!(
            Dispatcher::new(MemoryHost::default(), 0),
            Err(SyncError::InvalidBatchSize)
        ));
    }

    #[test]
    fn partial_batch_counts_missing_results_as_failed() {
        let host = ScriptedHost::new(vec![Ok(partial(&[true, false, true]))]);
        let mut dispatcher = Dispatcher::new(host, 5).unwrap();
        let report = dispatcher.dispatch(&ops(5));
        assert_eq!(report.succeeded, 2);
        assert_eq!(report.failed, 3);
        assert_eq!(
            report.batches[0].outcome,
            BatchOutcome::Partial {
                succeeded: 2,
                failed: 3
            }
        );
    }

    #[test]
    fn not_attached_batch_fails_and_run_continues() {
        let host = ScriptedHost::new(vec![
            Ok(reply(200, ReplyBody::ok())),
            Ok(reply(504, ReplyBody::default())),
            Ok(reply(200, ReplyBody::ok())),
        ]);
        let mut dispatcher = Dispatcher::new(host, 2).unwrap();
        let report = dispatcher.dispatch(&ops(5));

        assert_eq!(dispatcher.host().seen, vec![2, 2, 1]);
        assert_eq!(report.succeeded, 3);
        assert_eq!(report.failed, 2);
        assert_eq!(report.batches[1].outcome, BatchOutcome::NotAttached);
        assert_eq!(report.total(), 5);
    }

    #[rstest]
    #[case(Ok(reply(500, ReplyBody::default())), BatchOutcome::Rejected { status: 500 })]
    #[case(Ok(reply(404, ReplyBody::default())), BatchOutcome::Rejected { status: 404 })]
    #[case(Ok(reply(504, ReplyBody::default())), BatchOutcome::NotAttached)]
    #[case(Err(TransportError::Timeout { url: "u".into() }), BatchOutcome::TimedOut)]
    #[case(
        Err(TransportError::Unreachable { url: "u".into(), reason: "refused".into() }),
        BatchOutcome::TransportFailed { reason: "cannot connect to u: refused".into() }
    )]
    fn failures_count_whole_batch(
        #[case] result: Result<HostReply, TransportError>,
        #[case] expected: BatchOutcome,
    ) {
        let outcome = BatchOutcome::classify(3, &result);
        assert_eq!(outcome, expected);
        assert_eq!(outcome.succeeded(3), 0);
        assert_eq!(outcome.failed(3), 3);
    }

    #[test]
    fn rejected_batch_keeps_server_error_text() {
        let body = ReplyBody {
            error: Some("bad payload".to_string()),
            ..ReplyBody::default()
        };
        let host = ScriptedHost::new(vec![Ok(reply(400, body))]);
        let mut dispatcher = Dispatcher::new(host, 10).unwrap();
        let report = dispatcher.dispatch(&ops(1));
        assert_eq!(report.batches[0].error.as_deref(), Some("bad payload"));
    }

    #[test]
    fn send_single_uses_command_endpoint() {
        let mut dispatcher = Dispatcher::new(MemoryHost::new(ServiceSet::default()), 50).unwrap();
        let report = dispatcher.send_single(&ops(1)[0]);
        assert_eq!(report.succeeded, 1);
        assert_eq!(dispatcher.host().commands_received(), 1);
        assert_eq!(dispatcher.host().batches_received(), 0);
    }

    #[test]
    fn report_serializes_outcome_tag() {
        let host = ScriptedHost::new(vec![Ok(reply(504, ReplyBody::default()))]);
        let mut dispatcher = Dispatcher::new(host, 10).unwrap();
        let report = dispatcher.dispatch(&ops(2));
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["batches"][0]["outcome"], "not_attached");
        assert_eq!(value["failed"], 2);
    }
}
