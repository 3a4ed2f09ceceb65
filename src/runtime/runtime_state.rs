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
use std::sync::{Arc, Mutex};

use crate::common::config;
use crate::runtime::mem_tracker::MemTracker;

/// Per-query execution context shared by the operators of one pipeline.
///
/// Carries the chunk size, the first-error slot used for cooperative
/// cancellation, and an optional memory tracker for operator queues.
#[derive(Debug)]
pub struct RuntimeState {
    batch_size: usize,
    error_state: Arc<RuntimeErrorState>,
    mem_tracker: Option<Arc<MemTracker>>,
}

#[derive(Debug, Default)]
pub struct RuntimeErrorState {
    error: Mutex<Option<String>>,
}

impl RuntimeErrorState {
    pub fn set_error(&self, err: String) {
        let mut guard = self.error.lock().expect("runtime error lock");
        if guard.is_none() {
            *guard = Some(err);
        }
    }

    pub fn error(&self) -> Option<String> {
        self.error.lock().expect("runtime error lock").clone()
    }
}

impl Default for RuntimeState {
    fn default() -> Self {
        Self {
            batch_size: config::vector_chunk_size(),
            error_state: Arc::new(RuntimeErrorState::default()),
            mem_tracker: None,
        }
    }
}

impl Clone for RuntimeState {
    fn clone(&self) -> Self {
        Self {
            batch_size: self.batch_size,
            error_state: Arc::clone(&self.error_state),
            mem_tracker: self.mem_tracker.clone(),
        }
    }
}

impl RuntimeState {
    pub fn new(batch_size: usize, mem_tracker: Option<Arc<MemTracker>>) -> Self {
        Self {
            batch_size: batch_size.max(1),
            error_state: Arc::new(RuntimeErrorState::default()),
            mem_tracker,
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn error_state(&self) -> Arc<RuntimeErrorState> {
        Arc::clone(&self.error_state)
    }

    pub fn is_cancelled(&self) -> bool {
        self.error_state.error().is_some()
    }

    pub fn mem_tracker(&self) -> Option<Arc<MemTracker>> {
        self.mem_tracker.clone()
    }
}
