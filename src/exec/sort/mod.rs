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
//! Sort facility for window evaluation.
//!
//! Produces a stable permutation over a store of sort-key columns; the caller
//! applies it to every parallel store. Stability matters: sorting an already
//! sorted store must return the identity permutation so repeated window
//! expressions over the same keys do not reshuffle peers.

use std::sync::Arc;

use arrow::array::{ArrayRef, UInt32Array};
use arrow::compute::{SortColumn, SortOptions, lexsort_to_indices};

use crate::exec::chunk::store::ChunkedStore;

/// Per-key ordering declaration.
#[derive(Clone, Copy, Debug)]
pub struct SortKeyDesc {
    pub asc: bool,
    pub nulls_first: bool,
}

/// Compute a stable permutation that sorts `store` by its columns under the
/// per-key directions. Returns `None` when there is nothing to sort.
pub fn sort_permutation(
    store: &ChunkedStore,
    keys: &[SortKeyDesc],
) -> Result<Option<UInt32Array>, String> {
    if keys.is_empty() || store.count() == 0 {
        return Ok(None);
    }
    if keys.len() != store.column_count() {
        return Err(format!(
            "sort key count mismatch: keys={} columns={}",
            keys.len(),
            store.column_count()
        ));
    }

    let mut sort_columns = Vec::with_capacity(keys.len() + 1);
    for (idx, key) in keys.iter().enumerate() {
        let values = store.concat_column(idx)?;
        sort_columns.push(SortColumn {
            values,
            options: Some(SortOptions {
                descending: !key.asc,
                nulls_first: key.nulls_first,
            }),
        });
    }
    // lexsort_to_indices does not guarantee a stable order between equal
    // rows; a trailing row-index key pins ties to input order.
    let row_ids: ArrayRef = Arc::new(UInt32Array::from_iter_values(0..store.count() as u32));
    sort_columns.push(SortColumn {
        values: row_ids,
        options: Some(SortOptions {
            descending: false,
            nulls_first: true,
        }),
    });

    lexsort_to_indices(&sort_columns, None)
        .map(Some)
        .map_err(|e| e.to_string())
}
