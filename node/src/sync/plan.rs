//! Which RPC methods enrich a block, decided once per request.

use super::{DataRequest, ReceiptsApi};

/// Source of per-transaction call traces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceSource {
    /// `trace_block`, grouped by transaction.
    TraceBlock,
    /// `debug_traceBlockByHash` with `callTracer`.
    DebugCallTracer,
}

/// Tracers requested from `trace_replayBlockTransactions`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReplayTracers {
    pub trace: bool,
    pub state_diff: bool,
}

impl ReplayTracers {
    pub fn names(&self) -> Vec<&'static str> {
        let mut names = Vec::with_capacity(2);
        if self.trace {
            names.push("trace");
        }
        if self.state_diff {
            names.push("stateDiff");
        }
        names
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EnrichmentPlan {
    pub receipts: Option<ReceiptsApi>,
    /// Standalone trace fetch. `None` when traces ride along with the replay.
    pub traces: Option<TraceSource>,
    pub debug_state_diffs: bool,
    pub replay: Option<ReplayTracers>,
}

impl EnrichmentPlan {
    /// State diffs come from the prestate tracer or from a replay; traces from
    /// the call tracer, or from the trace API, sharing the replay when one is
    /// already needed for state diffs.
    pub fn from_request(request: &DataRequest) -> Self {
        let replay_state_diff = request.state_diffs && !request.use_debug_api_for_state_diffs;
        let replay_trace = request.traces && request.use_trace_api && replay_state_diff;

        let traces = match (request.traces, request.use_trace_api) {
            (false, _) => None,
            (true, false) => Some(TraceSource::DebugCallTracer),
            (true, true) if replay_trace => None,
            (true, true) => Some(TraceSource::TraceBlock),
        };

        Self {
            receipts: request.receipts.then_some(request.receipts_api),
            traces,
            debug_state_diffs: request.state_diffs && request.use_debug_api_for_state_diffs,
            replay: replay_state_diff.then_some(ReplayTracers {
                trace: replay_trace,
                state_diff: true,
            }),
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}
