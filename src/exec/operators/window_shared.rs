// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.
//! Shared window-operator state for sink/source split execution.
//!
//! Responsibilities:
//! - Owns the global input store filled by combining per-sink local stores
//!   under one mutex, the only ingestion synchronization point.
//! - Runs finalization exactly once, on the worker whose sink finishes last:
//!   NULL-prefills one result column per window expression, evaluates the
//!   select list in declaration order, and assembles output chunks as the
//!   positional concatenation of input and result batches.
//! - Coordinates readiness and output visibility for window source operators.
//!
//! Key exported interfaces:
//! - Types: `WindowSharedState`.
//!
//! Output ordering: the operator is a pipeline breaker and does not preserve
//! upstream row order. After finalization the output order is the sort order
//! of the first evaluated expression with sort keys; with no sort keys it is
//! the combine order, which is non-deterministic under parallel sinks.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, OnceLock};

use arrow::array::{ArrayRef, RecordBatch, new_null_array};
use arrow::datatypes::{Field, Schema};

use crate::common::config::operator_buffer_chunks;
use crate::exec::chunk::Chunk;
use crate::exec::chunk::store::ChunkedStore;
use crate::exec::expr::ExprArena;
use crate::exec::node::window::BoundWindowExpr;
use crate::exec::operators::window_evaluator::compute_window_expr;
use crate::exec::pipeline::observer::Observable;
use crate::overstone_logging::debug;
use crate::runtime::mem_tracker::MemTracker;
use crate::runtime::runtime_state::RuntimeState;

struct WindowState {
    input: ChunkedStore,
    output: VecDeque<Chunk>,
    pending: VecDeque<Chunk>,
    active_sinks: usize,
    sink_complete: bool,
    computed: bool,
}

/// Global sink state shared by the window sink and source operators of one
/// pipeline-breaker pair.
#[derive(Clone)]
pub struct WindowSharedState {
    inner: Arc<Mutex<WindowState>>,
    arena: Arc<ExprArena>,
    select_list: Arc<Vec<BoundWindowExpr>>,
    buffer_limit: usize,
    observable: Arc<Observable>,
    label: String,
    queue_tracker: Arc<OnceLock<Arc<MemTracker>>>,
}

impl WindowSharedState {
    pub fn new(arena: Arc<ExprArena>, select_list: Vec<BoundWindowExpr>, node_id: i32) -> Self {
        let buffer_limit = operator_buffer_chunks().max(1);
        let label = if node_id >= 0 {
            format!("window_queue_{node_id}")
        } else {
            "window_queue".to_string()
        };
        Self {
            inner: Arc::new(Mutex::new(WindowState {
                input: ChunkedStore::default(),
                output: VecDeque::new(),
                pending: VecDeque::new(),
                active_sinks: 0,
                sink_complete: false,
                computed: false,
            })),
            arena,
            select_list: Arc::new(select_list),
            buffer_limit,
            observable: Arc::new(Observable::new()),
            label,
            queue_tracker: Arc::new(OnceLock::new()),
        }
    }

    pub(crate) fn register_sink(&self) {
        let mut guard = self.inner.lock().expect("window state lock");
        guard.active_sinks += 1;
    }

    /// Merge one sink's local store into the global store. The combine mutex
    /// is the only cross-worker synchronization during ingestion.
    pub(crate) fn combine(&self, local: ChunkedStore) -> Result<(), String> {
        if local.is_empty() {
            return Ok(());
        }
        let mut guard = self.inner.lock().expect("window state lock");
        guard.input.merge(local)
    }

    /// Report one sink as finished; the last one runs finalization.
    pub(crate) fn sink_finished(&self, state: &RuntimeState) -> Result<(), String> {
        let notify = self.observable.defer_notify();
        let mut guard = self.inner.lock().expect("window state lock");
        guard.active_sinks = guard.active_sinks.saturating_sub(1);
        if guard.active_sinks > 0 {
            return Ok(());
        }

        if !guard.computed {
            let mut outputs = self.compute_outputs(&mut guard, state)?;
            if let Some(tracker) = self.queue_mem_tracker(state).as_ref() {
                for chunk in outputs.iter_mut() {
                    chunk.transfer_to(tracker);
                }
            }
            guard.pending = outputs.into();
            guard.computed = true;
        }

        while guard.output.len() < self.buffer_limit {
            let Some(chunk) = guard.pending.pop_front() else {
                break;
            };
            guard.output.push_back(chunk);
        }

        guard.sink_complete = true;
        drop(guard);
        notify.arm();
        Ok(())
    }

    pub(crate) fn has_output(&self) -> bool {
        let guard = self.inner.lock().expect("window state lock");
        guard.sink_complete && (!guard.output.is_empty() || !guard.pending.is_empty())
    }

    pub(crate) fn pop_output(&self) -> Option<Chunk> {
        let mut guard = self.inner.lock().expect("window state lock");
        if !guard.sink_complete {
            return None;
        }
        if guard.output.is_empty() && !guard.pending.is_empty() {
            while guard.output.len() < self.buffer_limit {
                let Some(chunk) = guard.pending.pop_front() else {
                    break;
                };
                guard.output.push_back(chunk);
            }
        }
        guard.output.pop_front()
    }

    pub(crate) fn is_done(&self) -> bool {
        let guard = self.inner.lock().expect("window state lock");
        guard.sink_complete && guard.output.is_empty() && guard.pending.is_empty()
    }

    pub(crate) fn observable(&self) -> Arc<Observable> {
        Arc::clone(&self.observable)
    }

    /// Finalize: evaluate every window expression over the combined input and
    /// assemble output chunks. Runs on exactly one worker, under the state
    /// mutex.
    fn compute_outputs(
        &self,
        guard: &mut WindowState,
        state: &RuntimeState,
    ) -> Result<Vec<Chunk>, String> {
        if guard.input.count() == 0 {
            return Ok(Vec::new());
        }
        debug!(
            "window finalize: rows={} chunks={} exprs={}",
            guard.input.count(),
            guard.input.chunk_count(),
            self.select_list.len()
        );

        let window_fields: Vec<Field> = self
            .select_list
            .iter()
            .enumerate()
            .map(|(idx, w)| Field::new(format!("window_{idx}"), w.return_type.clone(), true))
            .collect();

        // Result columns start as NULL so rows untouched by a failed or
        // partial evaluation stay well-defined.
        let result_schema = Arc::new(Schema::new(window_fields.clone()));
        let mut results = ChunkedStore::new(guard.input.capacity());
        for chunk_idx in 0..guard.input.chunk_count() {
            let rows = guard
                .input
                .chunk(chunk_idx)
                .expect("input chunk")
                .num_rows();
            let columns: Vec<ArrayRef> = self
                .select_list
                .iter()
                .map(|w| new_null_array(&w.return_type, rows))
                .collect();
            let batch = RecordBatch::try_new(Arc::clone(&result_schema), columns)
                .map_err(|e| format!("prefill window results: {}", e))?;
            results.append(&Chunk::new(batch))?;
        }

        for (idx, wexpr) in self.select_list.iter().enumerate() {
            compute_window_expr(&self.arena, wexpr, &mut guard.input, &mut results, idx, state)
                .map_err(|e| format!("window expression #{}: {}", idx, e))?;
        }

        let input_schema = guard
            .input
            .schema()
            .ok_or_else(|| "window input store lost its schema".to_string())?;
        let mut fields: Vec<Field> = input_schema
            .fields()
            .iter()
            .map(|f| f.as_ref().clone())
            .collect();
        fields.extend(window_fields);
        let out_schema = Arc::new(Schema::new(fields));

        let mut out = Vec::with_capacity(guard.input.chunk_count());
        for chunk_idx in 0..guard.input.chunk_count() {
            let in_batch = guard.input.chunk(chunk_idx).expect("input chunk");
            let res_batch = results
                .chunk(chunk_idx)
                .ok_or_else(|| "window result chunking mismatch".to_string())?;
            let mut columns: Vec<ArrayRef> = in_batch.columns().to_vec();
            columns.extend(res_batch.columns().iter().cloned());
            let batch = RecordBatch::try_new(Arc::clone(&out_schema), columns)
                .map_err(|e| format!("assemble window output: {}", e))?;
            out.push(Chunk::new(batch));
        }
        Ok(out)
    }

    fn queue_mem_tracker(&self, state: &RuntimeState) -> Option<Arc<MemTracker>> {
        let root = state.mem_tracker()?;
        let label = self.label.clone();
        let tracker = self
            .queue_tracker
            .get_or_init(|| MemTracker::new_child(label, &root));
        Some(Arc::clone(tracker))
    }
}
