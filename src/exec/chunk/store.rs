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
//! Chunked columnar store backing window evaluation.
//!
//! Responsibilities:
//! - Accumulates row batches of a fixed capacity so that `row / capacity`
//!   addresses the batch and `row % capacity` the offset inside it.
//! - Supports cross-batch row access, in-place reorder by a sort permutation,
//!   and batched column replacement for window result columns.
//!
//! Key exported interfaces:
//! - Types: `ChunkedStore`.

use std::sync::Arc;

use arrow::array::{ArrayRef, RecordBatch};
use arrow::compute::{concat, concat_batches, take};
use arrow::datatypes::{Field, Schema, SchemaRef};

use crate::common::config;
use crate::exec::chunk::Chunk;
use crate::exec::chunk::scalar::{ScalarValue, scalar_from_array};

/// Ordered sequence of fixed-capacity row batches over one schema.
///
/// Invariant: every batch except possibly the last holds exactly
/// `capacity` rows, so global row indices map to `(batch, offset)` by
/// division. Appends re-pack incoming batches to preserve this.
#[derive(Debug)]
pub struct ChunkedStore {
    schema: Option<SchemaRef>,
    batches: Vec<RecordBatch>,
    count: usize,
    capacity: usize,
}

impl Default for ChunkedStore {
    fn default() -> Self {
        Self::new(config::vector_chunk_size())
    }
}

impl ChunkedStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            schema: None,
            batches: Vec::new(),
            count: 0,
            capacity: capacity.max(1),
        }
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn column_count(&self) -> usize {
        self.schema.as_ref().map(|s| s.fields().len()).unwrap_or(0)
    }

    pub fn chunk_count(&self) -> usize {
        self.batches.len()
    }

    pub fn chunk(&self, idx: usize) -> Option<&RecordBatch> {
        self.batches.get(idx)
    }

    pub fn schema(&self) -> Option<SchemaRef> {
        self.schema.clone()
    }

    /// Append one row batch, re-packing so all batches except the last stay
    /// full. Column types must agree with the stored schema.
    pub fn append(&mut self, chunk: &Chunk) -> Result<(), String> {
        let batch = &chunk.batch;
        let schema = match self.schema.as_ref() {
            Some(schema) => {
                check_types_match(schema, batch.schema().as_ref())?;
                Arc::clone(schema)
            }
            None => {
                let schema = nullable_schema(batch.schema().as_ref());
                self.schema = Some(Arc::clone(&schema));
                schema
            }
        };
        let rows = batch.num_rows();
        if rows == 0 {
            return Ok(());
        }

        let mut offset = 0usize;
        while offset < rows {
            let room = match self.batches.last() {
                Some(last) if last.num_rows() < self.capacity => self.capacity - last.num_rows(),
                _ => 0,
            };
            let len = if room > 0 {
                room.min(rows - offset)
            } else {
                self.capacity.min(rows - offset)
            };
            let head = rebatch(&schema, &batch.slice(offset, len))?;
            if room > 0 {
                let last = self.batches.pop().expect("last batch");
                let merged = concat_batches(&schema, &[last, head])
                    .map_err(|e| format!("append to chunked store: {}", e))?;
                self.batches.push(merged);
            } else {
                self.batches.push(head);
            }
            offset += len;
        }
        self.count += rows;
        Ok(())
    }

    /// Append all batches of `other`, consuming it.
    pub fn merge(&mut self, other: ChunkedStore) -> Result<(), String> {
        for batch in other.batches {
            self.append(&Chunk::new(batch))?;
        }
        Ok(())
    }

    pub fn get_row(&self, row: usize) -> Result<Vec<ScalarValue>, String> {
        let (batch_idx, offset) = self.locate(row)?;
        let batch = &self.batches[batch_idx];
        let mut out = Vec::with_capacity(batch.num_columns());
        for column in batch.columns() {
            out.push(scalar_from_array(column.as_ref(), offset)?);
        }
        Ok(out)
    }

    pub fn get_value(&self, column: usize, row: usize) -> Result<ScalarValue, String> {
        let (batch_idx, offset) = self.locate(row)?;
        let batch = &self.batches[batch_idx];
        let array = batch
            .columns()
            .get(column)
            .ok_or_else(|| format!("column index out of range: {}", column))?;
        scalar_from_array(array.as_ref(), offset)
    }

    /// Reorder rows in place so new row `i` holds old row `perm[i]`.
    /// Rebuilds the batches via `take` rather than mutating buffers.
    pub fn reorder(&mut self, perm: &arrow::array::UInt32Array) -> Result<(), String> {
        if perm.len() != self.count {
            return Err(format!(
                "sort permutation length mismatch: perm={} rows={}",
                perm.len(),
                self.count
            ));
        }
        if self.count <= 1 {
            return Ok(());
        }
        let schema = self
            .schema
            .clone()
            .ok_or_else(|| "reorder on store without schema".to_string())?;
        let merged = concat_batches(&schema, &self.batches)
            .map_err(|e| format!("reorder chunked store: {}", e))?;
        let mut columns = Vec::with_capacity(merged.num_columns());
        for column in merged.columns() {
            let taken = take(column.as_ref(), perm, None).map_err(|e| e.to_string())?;
            columns.push(taken);
        }
        let reordered = RecordBatch::try_new(Arc::clone(&schema), columns)
            .map_err(|e| format!("rebuild reordered store: {}", e))?;
        self.batches = split_batch(&reordered, self.capacity);
        Ok(())
    }

    /// One contiguous array for a single column, used for sort keys and
    /// segment-tree payloads.
    pub fn concat_column(&self, column: usize) -> Result<ArrayRef, String> {
        if column >= self.column_count() {
            return Err(format!("column index out of range: {}", column));
        }
        if self.batches.is_empty() {
            return Err("chunked store is empty".to_string());
        }
        if self.batches.len() == 1 {
            return Ok(Arc::clone(self.batches[0].column(column)));
        }
        let parts: Vec<&dyn arrow::array::Array> = self
            .batches
            .iter()
            .map(|b| b.column(column).as_ref())
            .collect();
        concat(&parts).map_err(|e| e.to_string())
    }

    /// Replace one column across all batches with `values` (batched write of
    /// a computed window result column).
    pub fn replace_column(&mut self, column: usize, values: ArrayRef) -> Result<(), String> {
        if column >= self.column_count() {
            return Err(format!("column index out of range: {}", column));
        }
        if values.len() != self.count {
            return Err(format!(
                "replacement column length mismatch: values={} rows={}",
                values.len(),
                self.count
            ));
        }
        let schema = self.schema.clone().expect("store schema");
        let mut offset = 0usize;
        let mut rebuilt = Vec::with_capacity(self.batches.len());
        for batch in &self.batches {
            let len = batch.num_rows();
            let mut columns = batch.columns().to_vec();
            columns[column] = values.slice(offset, len);
            let out = RecordBatch::try_new(Arc::clone(&schema), columns)
                .map_err(|e| format!("replace store column: {}", e))?;
            rebuilt.push(out);
            offset += len;
        }
        self.batches = rebuilt;
        Ok(())
    }

    fn locate(&self, row: usize) -> Result<(usize, usize), String> {
        if row >= self.count {
            return Err(format!(
                "row index out of range: {} (rows={})",
                row, self.count
            ));
        }
        Ok((row / self.capacity, row % self.capacity))
    }
}

fn nullable_schema(schema: &Schema) -> SchemaRef {
    let fields: Vec<Field> = schema
        .fields()
        .iter()
        .map(|f| f.as_ref().clone().with_nullable(true))
        .collect();
    Arc::new(Schema::new(fields))
}

fn check_types_match(expected: &Schema, actual: &Schema) -> Result<(), String> {
    let expected_types: Vec<_> = expected.fields().iter().map(|f| f.data_type()).collect();
    let actual_types: Vec<_> = actual.fields().iter().map(|f| f.data_type()).collect();
    if expected_types != actual_types {
        return Err(format!(
            "chunked store schema mismatch: expected {:?}, got {:?}",
            expected_types, actual_types
        ));
    }
    Ok(())
}

fn rebatch(schema: &SchemaRef, batch: &RecordBatch) -> Result<RecordBatch, String> {
    RecordBatch::try_new(Arc::clone(schema), batch.columns().to_vec())
        .map_err(|e| format!("normalize batch schema: {}", e))
}

fn split_batch(batch: &RecordBatch, capacity: usize) -> Vec<RecordBatch> {
    let rows = batch.num_rows();
    let mut out = Vec::with_capacity(rows.div_ceil(capacity));
    let mut offset = 0usize;
    while offset < rows {
        let len = capacity.min(rows - offset);
        out.push(batch.slice(offset, len));
        offset += len;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Int64Array, StringArray, UInt32Array};
    use arrow::datatypes::DataType;

    fn int_chunk(values: &[Option<i64>]) -> Chunk {
        let schema = Arc::new(Schema::new(vec![Field::new("x", DataType::Int64, true)]));
        let array = Arc::new(Int64Array::from(values.to_vec()));
        Chunk::new(RecordBatch::try_new(schema, vec![array]).expect("batch"))
    }

    #[test]
    fn append_keeps_all_but_last_batch_full() {
        let mut store = ChunkedStore::new(4);
        store
            .append(&int_chunk(&[Some(1), Some(2), Some(3)]))
            .unwrap();
        store
            .append(&int_chunk(&[Some(4), Some(5), Some(6)]))
            .unwrap();
        assert_eq!(store.count(), 6);
        assert_eq!(store.chunk_count(), 2);
        assert_eq!(store.chunk(0).unwrap().num_rows(), 4);
        assert_eq!(store.chunk(1).unwrap().num_rows(), 2);
    }

    #[test]
    fn get_row_crosses_batch_boundaries() {
        let mut store = ChunkedStore::new(2);
        store
            .append(&int_chunk(&[Some(10), Some(20), Some(30), Some(40), Some(50)]))
            .unwrap();
        assert_eq!(store.chunk_count(), 3);
        for (idx, expected) in [10i64, 20, 30, 40, 50].iter().enumerate() {
            assert_eq!(
                store.get_row(idx).unwrap(),
                vec![ScalarValue::Int64(*expected)]
            );
        }
        assert!(store.get_row(5).is_err());
    }

    #[test]
    fn append_rejects_mismatched_column_types() {
        let mut store = ChunkedStore::new(4);
        store.append(&int_chunk(&[Some(1)])).unwrap();

        let schema = Arc::new(Schema::new(vec![Field::new("x", DataType::Utf8, true)]));
        let array = Arc::new(StringArray::from(vec!["a"]));
        let chunk = Chunk::new(RecordBatch::try_new(schema, vec![array]).expect("batch"));
        let err = store.append(&chunk).expect_err("schema mismatch");
        assert!(err.contains("schema mismatch"), "err={}", err);
    }

    #[test]
    fn reorder_applies_permutation_in_place() {
        let mut store = ChunkedStore::new(2);
        store
            .append(&int_chunk(&[Some(30), Some(10), Some(20)]))
            .unwrap();
        let perm = UInt32Array::from(vec![1u32, 2, 0]);
        store.reorder(&perm).unwrap();
        assert_eq!(store.get_value(0, 0).unwrap(), ScalarValue::Int64(10));
        assert_eq!(store.get_value(0, 1).unwrap(), ScalarValue::Int64(20));
        assert_eq!(store.get_value(0, 2).unwrap(), ScalarValue::Int64(30));
        // invariant survives the rebuild
        assert_eq!(store.chunk(0).unwrap().num_rows(), 2);
        assert_eq!(store.chunk(1).unwrap().num_rows(), 1);
    }

    #[test]
    fn merge_consumes_other_store() {
        let mut left = ChunkedStore::new(4);
        left.append(&int_chunk(&[Some(1), Some(2)])).unwrap();
        let mut right = ChunkedStore::new(4);
        right.append(&int_chunk(&[Some(3)])).unwrap();
        left.merge(right).unwrap();
        assert_eq!(left.count(), 3);
        assert_eq!(left.chunk_count(), 1);
        assert_eq!(left.get_value(0, 2).unwrap(), ScalarValue::Int64(3));
    }

    #[test]
    fn replace_column_slices_to_batch_boundaries() {
        let mut store = ChunkedStore::new(2);
        store
            .append(&int_chunk(&[Some(1), Some(2), Some(3)]))
            .unwrap();
        let replacement: ArrayRef = Arc::new(Int64Array::from(vec![Some(7), None, Some(9)]));
        store.replace_column(0, replacement).unwrap();
        assert_eq!(store.get_value(0, 0).unwrap(), ScalarValue::Int64(7));
        assert_eq!(store.get_value(0, 1).unwrap(), ScalarValue::Null);
        assert_eq!(store.get_value(0, 2).unwrap(), ScalarValue::Int64(9));
    }
}
