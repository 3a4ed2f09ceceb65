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
//! Sink side of window execution.
//!
//! Responsibilities:
//! - Buffers input chunks in a per-operator local store with no locking.
//! - On finishing, combines the local store into shared window state under
//!   the combine mutex and reports sink completion; the last sink to finish
//!   triggers finalization.
//!
//! Key exported interfaces:
//! - Types: `WindowSinkFactory`.

use crate::common::config;
use crate::exec::chunk::Chunk;
use crate::exec::chunk::store::ChunkedStore;
use crate::exec::operators::window_shared::WindowSharedState;
use crate::exec::pipeline::operator::{Operator, ProcessorOperator};
use crate::exec::pipeline::operator_factory::OperatorFactory;
use crate::runtime::runtime_state::RuntimeState;

/// Factory that builds window sink operators over one shared state.
pub struct WindowSinkFactory {
    name: String,
    state: WindowSharedState,
}

impl WindowSinkFactory {
    pub fn new(state: WindowSharedState) -> Self {
        Self {
            name: "WindowSink".to_string(),
            state,
        }
    }
}

impl OperatorFactory for WindowSinkFactory {
    fn name(&self) -> &str {
        &self.name
    }

    fn create(&self, _dop: i32, _driver_id: i32) -> Box<dyn Operator> {
        self.state.register_sink();
        Box::new(WindowSinkOperator {
            name: self.name.clone(),
            state: self.state.clone(),
            local: ChunkedStore::new(config::vector_chunk_size()),
            finished: false,
        })
    }

    fn is_sink(&self) -> bool {
        true
    }
}

struct WindowSinkOperator {
    name: String,
    state: WindowSharedState,
    local: ChunkedStore,
    finished: bool,
}

impl Operator for WindowSinkOperator {
    fn name(&self) -> &str {
        &self.name
    }

    fn as_processor_mut(&mut self) -> Option<&mut dyn ProcessorOperator> {
        Some(self)
    }

    fn as_processor_ref(&self) -> Option<&dyn ProcessorOperator> {
        Some(self)
    }

    fn is_finished(&self) -> bool {
        self.finished
    }
}

impl ProcessorOperator for WindowSinkOperator {
    fn need_input(&self) -> bool {
        !self.is_finished()
    }

    fn has_output(&self) -> bool {
        false
    }

    fn push_chunk(&mut self, _state: &RuntimeState, chunk: Chunk) -> Result<(), String> {
        if self.finished || chunk.is_empty() {
            return Ok(());
        }
        self.local.append(&chunk)
    }

    fn pull_chunk(&mut self, _state: &RuntimeState) -> Result<Option<Chunk>, String> {
        Ok(None)
    }

    fn set_finishing(&mut self, state: &RuntimeState) -> Result<(), String> {
        if self.finished {
            return Ok(());
        }
        let capacity = self.local.capacity();
        let local = std::mem::replace(&mut self.local, ChunkedStore::new(capacity));
        self.state.combine(local)?;
        self.state.sink_finished(state)?;
        self.finished = true;
        Ok(())
    }
}
