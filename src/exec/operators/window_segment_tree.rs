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
//! Segment tree over a window aggregate payload.
//!
//! Answers arbitrary `[lo, hi)` frame aggregation queries in O(log N)
//! combines instead of re-scanning the frame per row. See the approach in
//! "Efficient Processing of Window Functions in Analytical SQL Queries"
//! (VLDB 2015).

use std::sync::Arc;

use arrow::array::ArrayRef;
use arrow::datatypes::DataType;

use crate::exec::chunk::scalar::ScalarValue;
use crate::exec::expr::agg::{AggStateArena, AggStatePtr, AggregateDescriptor};
use crate::runtime::mem_tracker::MemTracker;

/// Rows covered by one leaf state, and children combined per internal node.
const TREE_FANOUT: usize = 16;

/// Complete tree of partial-aggregate states in level order. Level 0 holds
/// one state per fan-out block of payload rows; every higher node is the
/// combine of its children, computed bottom-up at construction.
#[derive(Debug)]
pub struct WindowSegmentTree {
    descriptor: AggregateDescriptor,
    return_type: DataType,
    inputs: Vec<ArrayRef>,
    row_count: usize,
    levels: Vec<Vec<AggStatePtr>>,
    /// Reused across queries; always holds an initialized state.
    query_state: AggStatePtr,
    arena: AggStateArena,
}

impl WindowSegmentTree {
    pub fn try_new(
        descriptor: AggregateDescriptor,
        return_type: DataType,
        inputs: Vec<ArrayRef>,
        tracker: Option<&Arc<MemTracker>>,
    ) -> Result<Self, String> {
        if !descriptor.associative {
            return Err(format!(
                "window aggregate {} declares a non-associative combine; segment tree \
                 aggregation requires associativity",
                descriptor.name
            ));
        }
        if inputs.is_empty() {
            return Err("window aggregate requires at least one argument".to_string());
        }
        let row_count = inputs[0].len();
        let mut arena = AggStateArena::new(8 * 1024);
        if let Some(tracker) = tracker {
            arena.set_mem_tracker(Arc::clone(tracker));
        }
        let query_state = arena.alloc(descriptor.state_size, descriptor.state_align);
        (descriptor.init)(query_state);

        let mut tree = Self {
            descriptor,
            return_type,
            inputs,
            row_count,
            levels: Vec::new(),
            query_state,
            arena,
        };
        tree.build()?;
        Ok(tree)
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    fn alloc_state(&mut self) -> AggStatePtr {
        let ptr = self
            .arena
            .alloc(self.descriptor.state_size, self.descriptor.state_align);
        (self.descriptor.init)(ptr);
        ptr
    }

    fn build(&mut self) -> Result<(), String> {
        if self.row_count == 0 {
            return Ok(());
        }

        let mut leaves = Vec::with_capacity(self.row_count.div_ceil(TREE_FANOUT));
        let mut start = 0usize;
        while start < self.row_count {
            let len = TREE_FANOUT.min(self.row_count - start);
            let state = self.alloc_state();
            let block: Vec<ArrayRef> = self.inputs.iter().map(|a| a.slice(start, len)).collect();
            (self.descriptor.update)(state, &block)?;
            leaves.push(state);
            start += len;
        }
        self.levels.push(leaves);

        while self.levels.last().expect("tree level").len() > 1 {
            let children = self.levels.last().expect("tree level").clone();
            let mut parents = Vec::with_capacity(children.len().div_ceil(TREE_FANOUT));
            for group in children.chunks(TREE_FANOUT) {
                let state = self.alloc_state();
                for child in group {
                    (self.descriptor.combine)(state, *child)?;
                }
                parents.push(state);
            }
            self.levels.push(parents);
        }
        Ok(())
    }

    /// Aggregate the half-open row range `[lo, hi)` and finalize.
    ///
    /// Walks from the boundary leaves toward the root, combining complete
    /// subtrees and re-aggregating only the partially covered boundary
    /// blocks from the payload itself.
    pub fn compute(&self, lo: usize, hi: usize) -> Result<ScalarValue, String> {
        if lo >= hi || hi > self.row_count {
            return Err(format!(
                "invalid window aggregate range [{}, {}) over {} rows",
                lo, hi, self.row_count
            ));
        }

        let state = self.query_state;
        (self.descriptor.drop_state)(state);
        (self.descriptor.init)(state);

        let mut begin = lo;
        let mut end = hi;
        let mut level = 0usize;
        loop {
            let mut parent_begin = begin / TREE_FANOUT;
            let parent_end = end / TREE_FANOUT;
            if parent_begin == parent_end {
                self.aggregate_range(state, level, begin, end)?;
                break;
            }
            let group_begin = parent_begin * TREE_FANOUT;
            if begin != group_begin {
                self.aggregate_range(state, level, begin, group_begin + TREE_FANOUT)?;
                parent_begin += 1;
            }
            let group_end = parent_end * TREE_FANOUT;
            if end != group_end {
                self.aggregate_range(state, level, group_end, end)?;
            }
            begin = parent_begin;
            end = parent_end;
            level += 1;
        }

        (self.descriptor.finalize)(state, &self.return_type)
    }

    fn aggregate_range(
        &self,
        state: AggStatePtr,
        level: usize,
        begin: usize,
        end: usize,
    ) -> Result<(), String> {
        if begin >= end {
            return Ok(());
        }
        if level == 0 {
            let block: Vec<ArrayRef> = self
                .inputs
                .iter()
                .map(|a| a.slice(begin, end - begin))
                .collect();
            (self.descriptor.update)(state, &block)
        } else {
            let states = self
                .levels
                .get(level - 1)
                .ok_or_else(|| format!("segment tree level out of range: {}", level))?;
            for idx in begin..end {
                (self.descriptor.combine)(state, states[idx])?;
            }
            Ok(())
        }
    }
}

impl Drop for WindowSegmentTree {
    fn drop(&mut self) {
        for level in &self.levels {
            for state in level {
                (self.descriptor.drop_state)(*state);
            }
        }
        (self.descriptor.drop_state)(self.query_state);
    }
}
