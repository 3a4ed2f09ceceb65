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
//! Row-by-row window expression evaluation over a partition-sorted store.
//!
//! One `compute_window_expr` call sorts the shared stores by the
//! expression's keys, materializes its argument/offset/boundary columns,
//! then walks every row maintaining partition, peer-group and frame
//! boundaries and dispatching on the function kind.

use std::sync::Arc;

use arrow::array::{ArrayRef, RecordBatch};
use arrow::compute::cast;
use arrow::datatypes::{DataType, Field, Schema};

use crate::exec::chunk::Chunk;
use crate::exec::chunk::scalar::{ScalarValue, build_scalar_array, scalar_values_equal};
use crate::exec::chunk::store::ChunkedStore;
use crate::exec::expr::{ExprArena, ExprId};
use crate::exec::node::window::{BoundWindowExpr, FrameBoundKind, WindowFunctionKind};
use crate::exec::operators::window_segment_tree::WindowSegmentTree;
use crate::exec::sort::{SortKeyDesc, sort_permutation};
use crate::runtime::runtime_state::RuntimeState;

/// Boundary state carried across consecutive rows of one evaluation pass.
///
/// `partition_start <= peer_start <= r < peer_end <= partition_end` holds
/// whenever the peer bounds are maintained for the current function;
/// `window_start`/`window_end` stay signed until clamped to the partition.
#[derive(Debug)]
pub(crate) struct WindowBoundsState {
    pub partition_start: usize,
    pub partition_end: usize,
    pub peer_start: usize,
    pub peer_end: usize,
    pub window_start: i64,
    pub window_end: i64,
    pub is_same_partition: bool,
    pub is_peer: bool,
    pub row_prev: Vec<ScalarValue>,
}

impl Default for WindowBoundsState {
    fn default() -> Self {
        Self {
            partition_start: 0,
            partition_end: 0,
            peer_start: 0,
            peer_end: 0,
            window_start: -1,
            window_end: -1,
            is_same_partition: false,
            is_peer: false,
            row_prev: Vec::new(),
        }
    }
}

/// A materialized offset/default column. Scalar expressions were evaluated
/// for a single row, so reads always consult index 0.
struct MaterializedColumn {
    store: ChunkedStore,
    scalar: bool,
}

impl MaterializedColumn {
    fn scalar_at(&self, row: usize) -> Result<ScalarValue, String> {
        let idx = if self.scalar { 0 } else { row };
        self.store.get_value(0, idx)
    }

    fn int_at(&self, row: usize) -> Result<i64, String> {
        self.scalar_at(row)?
            .to_i64()
            .ok_or_else(|| "window offset must be a non-null integer".to_string())
    }
}

fn rows_equal_subset(a: &[ScalarValue], b: &[ScalarValue], start: usize, end: usize) -> bool {
    if a.len() < end || b.len() < end {
        return false;
    }
    (start..end).all(|idx| scalar_values_equal(&a[idx], &b[idx]))
}

/// Right-open upper bound of the run of rows in `[l, r)` whose first
/// `comp_cols` sort-key columns equal `row`. The run starts at `l`, so the
/// equality predicate is monotonic and binary search applies regardless of
/// the declared order-key directions.
fn upper_bound_equal_prefix(
    store: &ChunkedStore,
    row: &[ScalarValue],
    l: usize,
    r: usize,
    comp_cols: usize,
) -> Result<usize, String> {
    if comp_cols == 0 {
        return Ok(r);
    }
    let mut lo = l;
    let mut hi = r;
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        let candidate = store.get_row(mid)?;
        if rows_equal_subset(&candidate, row, 0, comp_cols) {
            lo = mid + 1;
        } else {
            hi = mid;
        }
    }
    Ok(lo)
}

fn update_window_bounds(
    wexpr: &BoundWindowExpr,
    sort_store: &ChunkedStore,
    input_count: usize,
    row_idx: usize,
    boundary_start: Option<&MaterializedColumn>,
    boundary_end: Option<&MaterializedColumn>,
    bounds: &mut WindowBoundsState,
) -> Result<(), String> {
    if sort_store.column_count() > 0 {
        let row_cur = sort_store.get_row(row_idx)?;
        let partition_cols = wexpr.partitions.len();
        let sort_col_count = wexpr.sort_key_count();

        bounds.is_same_partition =
            rows_equal_subset(&bounds.row_prev, &row_cur, 0, partition_cols);
        bounds.is_peer = bounds.is_same_partition
            && rows_equal_subset(&bounds.row_prev, &row_cur, partition_cols, sort_col_count);

        // The first row always opens a partition; afterwards only a
        // partition-key change does.
        if !bounds.is_same_partition || row_idx == 0 {
            bounds.partition_start = row_idx;
            bounds.peer_start = row_idx;
            bounds.partition_end = upper_bound_equal_prefix(
                sort_store,
                &row_cur,
                row_idx,
                input_count,
                partition_cols,
            )?;
        } else if !bounds.is_peer {
            bounds.peer_start = row_idx;
        }

        if wexpr.end == FrameBoundKind::CurrentRowRange
            || wexpr.kind == WindowFunctionKind::CumeDist
        {
            bounds.peer_end = upper_bound_equal_prefix(
                sort_store,
                &row_cur,
                row_idx,
                bounds.partition_end,
                sort_col_count,
            )?;
        }

        bounds.row_prev = row_cur;
    } else {
        // OVER (): the whole input is a single partition of peers.
        bounds.is_same_partition = false;
        bounds.is_peer = true;
        bounds.partition_end = input_count;
        bounds.peer_end = input_count;
    }

    bounds.window_start = -1;
    bounds.window_end = -1;

    match wexpr.start {
        FrameBoundKind::UnboundedPreceding => {
            bounds.window_start = bounds.partition_start as i64;
        }
        FrameBoundKind::CurrentRowRows => {
            bounds.window_start = row_idx as i64;
        }
        FrameBoundKind::CurrentRowRange => {
            bounds.window_start = bounds.peer_start as i64;
        }
        FrameBoundKind::ExprPreceding => {
            let offset = boundary_offset(boundary_start, row_idx)?;
            bounds.window_start = row_idx as i64 - offset;
        }
        FrameBoundKind::ExprFollowing => {
            let offset = boundary_offset(boundary_start, row_idx)?;
            bounds.window_start = row_idx as i64 + offset;
        }
        FrameBoundKind::UnboundedFollowing => {
            return Err(
                "unsupported window boundary: UNBOUNDED FOLLOWING cannot start a frame"
                    .to_string(),
            );
        }
    }

    match wexpr.end {
        FrameBoundKind::CurrentRowRows => {
            bounds.window_end = row_idx as i64 + 1;
        }
        FrameBoundKind::CurrentRowRange => {
            bounds.window_end = bounds.peer_end as i64;
        }
        FrameBoundKind::UnboundedFollowing => {
            bounds.window_end = bounds.partition_end as i64;
        }
        FrameBoundKind::ExprPreceding => {
            let offset = boundary_offset(boundary_end, row_idx)?;
            bounds.window_end = row_idx as i64 - offset + 1;
        }
        FrameBoundKind::ExprFollowing => {
            let offset = boundary_offset(boundary_end, row_idx)?;
            bounds.window_end = row_idx as i64 + offset + 1;
        }
        FrameBoundKind::UnboundedPreceding => {
            return Err(
                "unsupported window boundary: UNBOUNDED PRECEDING cannot end a frame".to_string(),
            );
        }
    }

    // Clamp to the partition; a frame reaching past either end is truncated,
    // and a bound landing before the frame start leaves an empty frame.
    if bounds.window_start < bounds.partition_start as i64 {
        bounds.window_start = bounds.partition_start as i64;
    }
    if bounds.window_end > bounds.partition_end as i64 {
        bounds.window_end = bounds.partition_end as i64;
    }
    if bounds.window_end < bounds.window_start {
        bounds.window_end = bounds.window_start;
    }
    if bounds.window_start < 0 || bounds.window_end < 0 {
        // Not reachable through the clamps above; retained as a hard stop for
        // planner-produced bounds that escape them.
        return Err("failed to compute window boundaries".to_string());
    }
    Ok(())
}

fn boundary_offset(column: Option<&MaterializedColumn>, row: usize) -> Result<i64, String> {
    column
        .ok_or_else(|| "window frame bound is missing its offset expression".to_string())?
        .int_at(row)
}

/// Evaluate expressions against every chunk of `input` into a parallel store.
/// With `scalar` set only the first chunk is evaluated; readers then address
/// row 0.
fn materialize_exprs(
    arena: &ExprArena,
    exprs: &[ExprId],
    input: &ChunkedStore,
    scalar: bool,
) -> Result<ChunkedStore, String> {
    let mut out = ChunkedStore::new(input.capacity());
    if exprs.is_empty() {
        return Ok(out);
    }

    let mut fields = Vec::with_capacity(exprs.len());
    let mut types = Vec::with_capacity(exprs.len());
    for (idx, id) in exprs.iter().enumerate() {
        let data_type = arena
            .data_type(*id)
            .cloned()
            .ok_or_else(|| "invalid ExprId".to_string())?;
        fields.push(Field::new(format!("expr_{idx}"), data_type.clone(), true));
        types.push(data_type);
    }
    let schema = Arc::new(Schema::new(fields));

    for chunk_idx in 0..input.chunk_count() {
        let batch = input.chunk(chunk_idx).expect("input chunk");
        let chunk = Chunk::new(batch.clone());
        let mut columns: Vec<ArrayRef> = Vec::with_capacity(exprs.len());
        for (e_idx, id) in exprs.iter().enumerate() {
            let mut column = arena.eval(*id, &chunk)?;
            if column.data_type() != &types[e_idx] {
                column = cast(&column, &types[e_idx]).map_err(|e| e.to_string())?;
            }
            columns.push(column);
        }
        let out_batch = RecordBatch::try_new(Arc::clone(&schema), columns)
            .map_err(|e| format!("materialize window expressions: {}", e))?;
        out.append(&Chunk::new(out_batch))?;
        if scalar {
            break;
        }
    }
    Ok(out)
}

fn materialize_column(
    arena: &ExprArena,
    expr: ExprId,
    input: &ChunkedStore,
) -> Result<MaterializedColumn, String> {
    let scalar = arena.is_scalar(expr);
    let store = materialize_exprs(arena, &[expr], input, scalar)?;
    Ok(MaterializedColumn { store, scalar })
}

/// Evaluate one bound window expression and write its result column into
/// `output` at `output_col`. Sorting happens in place on both shared stores,
/// so the output order after this call is the expression's sort order.
pub(crate) fn compute_window_expr(
    arena: &ExprArena,
    wexpr: &BoundWindowExpr,
    input: &mut ChunkedStore,
    output: &mut ChunkedStore,
    output_col: usize,
    state: &RuntimeState,
) -> Result<(), String> {
    let count = input.count();
    if count == 0 {
        return Ok(());
    }

    let mut sort_store = ChunkedStore::new(input.capacity());
    if wexpr.needs_sorting() {
        let mut key_exprs: Vec<ExprId> = wexpr.partitions.clone();
        let mut key_descs: Vec<SortKeyDesc> = wexpr
            .partitions
            .iter()
            .map(|_| SortKeyDesc {
                asc: true,
                nulls_first: true,
            })
            .collect();
        for key in &wexpr.orders {
            key_exprs.push(key.expr);
            key_descs.push(SortKeyDesc {
                asc: key.asc,
                nulls_first: key.nulls_first,
            });
        }
        sort_store = materialize_exprs(arena, &key_exprs, input, false)?;
        if let Some(perm) = sort_permutation(&sort_store, &key_descs)? {
            input.reorder(&perm)?;
            output.reorder(&perm)?;
            sort_store.reorder(&perm)?;
        }
    }

    let payload = materialize_exprs(arena, &wexpr.children, input, false)?;

    let is_lead_lag = matches!(
        wexpr.kind,
        WindowFunctionKind::Lead | WindowFunctionKind::Lag
    );
    let leadlag_offset = match wexpr.offset_expr {
        Some(expr) if is_lead_lag => Some(materialize_column(arena, expr, input)?),
        _ => None,
    };
    let leadlag_default = match wexpr.default_expr {
        Some(expr) if is_lead_lag => Some(materialize_column(arena, expr, input)?),
        _ => None,
    };

    let boundary_start = match wexpr.start_expr {
        Some(expr)
            if matches!(
                wexpr.start,
                FrameBoundKind::ExprPreceding | FrameBoundKind::ExprFollowing
            ) =>
        {
            Some(materialize_column(arena, expr, input)?)
        }
        _ => None,
    };
    let boundary_end = match wexpr.end_expr {
        Some(expr)
            if matches!(
                wexpr.end,
                FrameBoundKind::ExprPreceding | FrameBoundKind::ExprFollowing
            ) =>
        {
            Some(materialize_column(arena, expr, input)?)
        }
        _ => None,
    };

    let segment_tree = if wexpr.kind == WindowFunctionKind::Aggregate {
        let descriptor = wexpr
            .aggregate
            .ok_or_else(|| "aggregate window expression missing its descriptor".to_string())?;
        if payload.column_count() == 0 {
            return Err("aggregate window function requires at least one argument".to_string());
        }
        let inputs = (0..payload.column_count())
            .map(|c| payload.concat_column(c))
            .collect::<Result<Vec<_>, _>>()?;
        let tracker = state.mem_tracker();
        Some(WindowSegmentTree::try_new(
            descriptor,
            wexpr.return_type.clone(),
            inputs,
            tracker.as_ref(),
        )?)
    } else {
        None
    };

    let mut bounds = WindowBoundsState::default();
    let mut dense_rank: u64 = 1;
    let mut rank: u64 = 1;
    let mut rank_equal: u64 = 0;
    if wexpr.needs_sorting() {
        bounds.row_prev = sort_store.get_row(0)?;
    }

    let mut results: Vec<ScalarValue> = Vec::with_capacity(count);
    for row_idx in 0..count {
        update_window_bounds(
            wexpr,
            &sort_store,
            count,
            row_idx,
            boundary_start.as_ref(),
            boundary_end.as_ref(),
            &mut bounds,
        )?;

        if wexpr.needs_rank() {
            if !bounds.is_same_partition || row_idx == 0 {
                dense_rank = 1;
                rank = 1;
                rank_equal = 0;
            } else if !bounds.is_peer {
                dense_rank += 1;
                rank += rank_equal;
                rank_equal = 0;
            }
            rank_equal += 1;
        }

        // Nothing in the frame: SQL NULL, never an error.
        if bounds.window_start >= bounds.window_end {
            results.push(ScalarValue::Null);
            continue;
        }
        let window_start = bounds.window_start as usize;
        let window_end = bounds.window_end as usize;

        let value = match wexpr.kind {
            WindowFunctionKind::Aggregate => segment_tree
                .as_ref()
                .ok_or_else(|| "window aggregate state missing".to_string())?
                .compute(window_start, window_end)?,
            WindowFunctionKind::RowNumber => ScalarValue::numeric(
                &wexpr.return_type,
                (row_idx - bounds.partition_start + 1) as i64,
            )?,
            WindowFunctionKind::Rank => ScalarValue::numeric(&wexpr.return_type, rank as i64)?,
            WindowFunctionKind::DenseRank => {
                ScalarValue::numeric(&wexpr.return_type, dense_rank as i64)?
            }
            WindowFunctionKind::PercentRank => {
                let denom = bounds.partition_end as i64 - bounds.partition_start as i64 - 1;
                let value = if denom > 0 {
                    (rank as f64 - 1.0) / denom as f64
                } else {
                    0.0
                };
                ScalarValue::Float64(value)
            }
            WindowFunctionKind::CumeDist => {
                let denom = bounds.partition_end as i64 - bounds.partition_start as i64;
                let value = if denom > 0 {
                    (bounds.peer_end - bounds.partition_start) as f64 / denom as f64
                } else {
                    0.0
                };
                ScalarValue::Float64(value)
            }
            WindowFunctionKind::Ntile => {
                if payload.column_count() != 1 {
                    return Err("ntile requires exactly one parameter".to_string());
                }
                let n_param = payload
                    .get_value(0, row_idx)?
                    .to_i64()
                    .ok_or_else(|| "ntile parameter must be a non-null integer".to_string())?;
                if n_param <= 0 {
                    return Err(format!("ntile parameter must be positive, got {}", n_param));
                }
                let n_total = (bounds.partition_end - bounds.partition_start) as i64;
                let n_param = n_param.min(n_total);
                let n_size = n_total / n_param;
                let n_large = n_total - n_param * n_size;
                let i_small = n_large * (n_size + 1);
                let adjusted = (row_idx - bounds.partition_start) as i64;
                let bucket = if adjusted < i_small {
                    1 + adjusted / (n_size + 1)
                } else {
                    1 + n_large + (adjusted - i_small) / n_size
                };
                ScalarValue::numeric(&wexpr.return_type, bucket)?
            }
            WindowFunctionKind::Lead | WindowFunctionKind::Lag => {
                if payload.column_count() == 0 {
                    return Err("lead/lag missing value argument".to_string());
                }
                let offset = match leadlag_offset.as_ref() {
                    None => 1i64,
                    Some(column) => {
                        let v = column.int_at(row_idx)?;
                        if v < 0 {
                            return Err(format!(
                                "lead/lag offset must be non-negative, got {}",
                                v
                            ));
                        }
                        v
                    }
                };
                let default_value = match leadlag_default.as_ref() {
                    None => ScalarValue::Null,
                    Some(column) => column.scalar_at(row_idx)?,
                };
                if wexpr.kind == WindowFunctionKind::Lead {
                    let target = row_idx as i64 + offset;
                    if target < bounds.partition_end as i64 {
                        payload.get_value(0, target as usize)?
                    } else {
                        default_value
                    }
                } else {
                    let target = row_idx as i64 - offset;
                    if target >= bounds.partition_start as i64 {
                        payload.get_value(0, target as usize)?
                    } else {
                        default_value
                    }
                }
            }
            WindowFunctionKind::FirstValue => {
                if payload.column_count() == 0 {
                    return Err("first_value missing value argument".to_string());
                }
                payload.get_value(0, window_start)?
            }
            WindowFunctionKind::LastValue => {
                if payload.column_count() == 0 {
                    return Err("last_value missing value argument".to_string());
                }
                payload.get_value(0, window_end - 1)?
            }
        };
        results.push(value);
    }

    let column = build_scalar_array(&wexpr.return_type, &results)?;
    output.replace_column(output_col, column)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::expr::{ExprNode, LiteralValue};
    use crate::exec::expr::agg::resolve_aggregate;
    use crate::exec::node::window::OrderKey;
    use arrow::array::{Int64Array, new_null_array};

    fn input_store(values: &[i64], capacity: usize) -> ChunkedStore {
        let schema = Arc::new(Schema::new(vec![Field::new("x", DataType::Int64, true)]));
        let array = Arc::new(Int64Array::from(values.to_vec())) as ArrayRef;
        let batch = RecordBatch::try_new(schema, vec![array]).expect("batch");
        let mut store = ChunkedStore::new(capacity);
        store.append(&Chunk::new(batch)).expect("append");
        store
    }

    fn output_store(input: &ChunkedStore, types: &[DataType]) -> ChunkedStore {
        let fields: Vec<Field> = types
            .iter()
            .enumerate()
            .map(|(idx, dt)| Field::new(format!("window_{idx}"), dt.clone(), true))
            .collect();
        let schema = Arc::new(Schema::new(fields));
        let mut out = ChunkedStore::new(input.capacity());
        for chunk_idx in 0..input.chunk_count() {
            let len = input.chunk(chunk_idx).unwrap().num_rows();
            let columns: Vec<ArrayRef> =
                types.iter().map(|dt| new_null_array(dt, len)).collect();
            let batch = RecordBatch::try_new(Arc::clone(&schema), columns).expect("batch");
            out.append(&Chunk::new(batch)).expect("append");
        }
        out
    }

    fn column_expr(arena: &mut ExprArena) -> ExprId {
        arena.push_typed(ExprNode::Column(0), DataType::Int64)
    }

    fn int_literal(arena: &mut ExprArena, v: i64) -> ExprId {
        arena.push_typed(ExprNode::Literal(LiteralValue::Int64(v)), DataType::Int64)
    }

    fn order_by_x(arena: &mut ExprArena) -> OrderKey {
        OrderKey {
            expr: column_expr(arena),
            asc: true,
            nulls_first: true,
        }
    }

    fn collected(output: &ChunkedStore, col: usize) -> Vec<ScalarValue> {
        (0..output.count())
            .map(|row| output.get_value(col, row).unwrap())
            .collect()
    }

    #[test]
    fn sum_over_sliding_rows_frame() {
        // SELECT sum(x) OVER (ORDER BY x ROWS BETWEEN 1 PRECEDING AND 1 FOLLOWING)
        let mut arena = ExprArena::default();
        let mut wexpr =
            BoundWindowExpr::new(WindowFunctionKind::Aggregate, DataType::Int64);
        wexpr.orders = vec![order_by_x(&mut arena)];
        wexpr.children = vec![column_expr(&mut arena)];
        wexpr.start = FrameBoundKind::ExprPreceding;
        wexpr.end = FrameBoundKind::ExprFollowing;
        wexpr.start_expr = Some(int_literal(&mut arena, 1));
        wexpr.end_expr = Some(int_literal(&mut arena, 1));
        wexpr.aggregate = Some(resolve_aggregate("sum", &DataType::Int64).unwrap());

        let mut input = input_store(&[1, 2, 3, 4, 5], 2);
        let mut output = output_store(&input, &[DataType::Int64]);
        compute_window_expr(
            &arena,
            &wexpr,
            &mut input,
            &mut output,
            0,
            &RuntimeState::default(),
        )
        .unwrap();

        let expected: Vec<ScalarValue> = [3i64, 6, 9, 12, 9]
            .iter()
            .map(|v| ScalarValue::Int64(*v))
            .collect();
        assert_eq!(collected(&output, 0), expected);
    }

    #[test]
    fn frame_entirely_before_partition_yields_null() {
        // ROWS BETWEEN 3 PRECEDING AND 2 PRECEDING over two rows: both frames
        // are empty, both results NULL.
        let mut arena = ExprArena::default();
        let mut wexpr =
            BoundWindowExpr::new(WindowFunctionKind::Aggregate, DataType::Int64);
        wexpr.orders = vec![order_by_x(&mut arena)];
        wexpr.children = vec![column_expr(&mut arena)];
        wexpr.start = FrameBoundKind::ExprPreceding;
        wexpr.end = FrameBoundKind::ExprPreceding;
        wexpr.start_expr = Some(int_literal(&mut arena, 3));
        wexpr.end_expr = Some(int_literal(&mut arena, 2));
        wexpr.aggregate = Some(resolve_aggregate("sum", &DataType::Int64).unwrap());

        let mut input = input_store(&[1, 2], 4);
        let mut output = output_store(&input, &[DataType::Int64]);
        compute_window_expr(
            &arena,
            &wexpr,
            &mut input,
            &mut output,
            0,
            &RuntimeState::default(),
        )
        .unwrap();
        assert_eq!(
            collected(&output, 0),
            vec![ScalarValue::Null, ScalarValue::Null]
        );
    }

    #[test]
    fn lead_with_offset_and_default() {
        // SELECT lead(x, 2, -1) OVER (ORDER BY x)
        let mut arena = ExprArena::default();
        let mut wexpr = BoundWindowExpr::new(WindowFunctionKind::Lead, DataType::Int64);
        wexpr.orders = vec![order_by_x(&mut arena)];
        wexpr.children = vec![column_expr(&mut arena)];
        wexpr.offset_expr = Some(int_literal(&mut arena, 2));
        wexpr.default_expr = Some(int_literal(&mut arena, -1));

        let mut input = input_store(&[10, 20, 30, 40], 2);
        let mut output = output_store(&input, &[DataType::Int64]);
        compute_window_expr(
            &arena,
            &wexpr,
            &mut input,
            &mut output,
            0,
            &RuntimeState::default(),
        )
        .unwrap();

        let expected: Vec<ScalarValue> = [30i64, 40, -1, -1]
            .iter()
            .map(|v| ScalarValue::Int64(*v))
            .collect();
        assert_eq!(collected(&output, 0), expected);
    }

    #[test]
    fn lag_runs_out_at_partition_start() {
        let mut arena = ExprArena::default();
        let mut wexpr = BoundWindowExpr::new(WindowFunctionKind::Lag, DataType::Int64);
        wexpr.orders = vec![order_by_x(&mut arena)];
        wexpr.children = vec![column_expr(&mut arena)];

        let mut input = input_store(&[10, 20, 30], 4);
        let mut output = output_store(&input, &[DataType::Int64]);
        compute_window_expr(
            &arena,
            &wexpr,
            &mut input,
            &mut output,
            0,
            &RuntimeState::default(),
        )
        .unwrap();
        assert_eq!(
            collected(&output, 0),
            vec![
                ScalarValue::Null,
                ScalarValue::Int64(10),
                ScalarValue::Int64(20)
            ]
        );
    }

    #[test]
    fn ntile_distributes_remainder_to_leading_buckets() {
        // SELECT ntile(3) OVER (ORDER BY x) over seven rows
        let mut arena = ExprArena::default();
        let mut wexpr = BoundWindowExpr::new(WindowFunctionKind::Ntile, DataType::Int64);
        wexpr.orders = vec![order_by_x(&mut arena)];
        wexpr.children = vec![int_literal(&mut arena, 3)];

        let mut input = input_store(&[1, 2, 3, 4, 5, 6, 7], 3);
        let mut output = output_store(&input, &[DataType::Int64]);
        compute_window_expr(
            &arena,
            &wexpr,
            &mut input,
            &mut output,
            0,
            &RuntimeState::default(),
        )
        .unwrap();

        let expected: Vec<ScalarValue> = [1i64, 1, 1, 2, 2, 3, 3]
            .iter()
            .map(|v| ScalarValue::Int64(*v))
            .collect();
        assert_eq!(collected(&output, 0), expected);
    }

    #[test]
    fn ntile_rejects_non_positive_parameter() {
        let mut arena = ExprArena::default();
        let mut wexpr = BoundWindowExpr::new(WindowFunctionKind::Ntile, DataType::Int64);
        wexpr.orders = vec![order_by_x(&mut arena)];
        wexpr.children = vec![int_literal(&mut arena, 0)];

        let mut input = input_store(&[1, 2], 4);
        let mut output = output_store(&input, &[DataType::Int64]);
        let err = compute_window_expr(
            &arena,
            &wexpr,
            &mut input,
            &mut output,
            0,
            &RuntimeState::default(),
        )
        .expect_err("ntile(0)");
        assert!(err.contains("must be positive"), "err={}", err);
    }

    #[test]
    fn unbounded_following_cannot_start_a_frame() {
        let mut arena = ExprArena::default();
        let mut wexpr =
            BoundWindowExpr::new(WindowFunctionKind::RowNumber, DataType::Int64);
        wexpr.orders = vec![order_by_x(&mut arena)];
        wexpr.start = FrameBoundKind::UnboundedFollowing;
        wexpr.end = FrameBoundKind::UnboundedFollowing;

        let mut input = input_store(&[1], 4);
        let mut output = output_store(&input, &[DataType::Int64]);
        let err = compute_window_expr(
            &arena,
            &wexpr,
            &mut input,
            &mut output,
            0,
            &RuntimeState::default(),
        )
        .expect_err("bad frame");
        assert!(err.contains("unsupported window boundary"), "err={}", err);
    }

    #[test]
    fn first_and_last_value_respect_partitions() {
        // Two partitions keyed by x / 10: first_value picks the partition head.
        let mut arena = ExprArena::default();
        let x = column_expr(&mut arena);
        let ten = int_literal(&mut arena, 10);
        let bucket = arena.push_typed(ExprNode::Div(x, ten), DataType::Int64);

        let mut wexpr =
            BoundWindowExpr::new(WindowFunctionKind::FirstValue, DataType::Int64);
        wexpr.partitions = vec![bucket];
        wexpr.orders = vec![order_by_x(&mut arena)];
        wexpr.children = vec![column_expr(&mut arena)];

        let mut input = input_store(&[12, 25, 11, 23, 21], 2);
        let mut output = output_store(&input, &[DataType::Int64]);
        compute_window_expr(
            &arena,
            &wexpr,
            &mut input,
            &mut output,
            0,
            &RuntimeState::default(),
        )
        .unwrap();

        // Sorted layout: partition 1 -> [11, 12], partition 2 -> [21, 23, 25].
        let expected: Vec<ScalarValue> = [11i64, 11, 21, 21, 21]
            .iter()
            .map(|v| ScalarValue::Int64(*v))
            .collect();
        assert_eq!(collected(&output, 0), expected);
    }

    #[test]
    fn boundary_invariants_hold_across_partitions() {
        let mut arena = ExprArena::default();
        let x = column_expr(&mut arena);
        let ten = int_literal(&mut arena, 10);
        let bucket = arena.push_typed(ExprNode::Div(x, ten), DataType::Int64);

        let mut wexpr = BoundWindowExpr::new(WindowFunctionKind::CumeDist, DataType::Float64);
        wexpr.partitions = vec![bucket];
        wexpr.orders = vec![order_by_x(&mut arena)];

        let mut input = input_store(&[12, 25, 11, 23, 21, 11, 37], 2);
        let mut output = output_store(&input, &[DataType::Float64]);
        // Sort once through the public path, then replay bounds row by row.
        compute_window_expr(
            &arena,
            &wexpr,
            &mut input,
            &mut output,
            0,
            &RuntimeState::default(),
        )
        .unwrap();

        let key_exprs: Vec<ExprId> = wexpr
            .partitions
            .iter()
            .copied()
            .chain(wexpr.orders.iter().map(|k| k.expr))
            .collect();
        let sort_store = materialize_exprs(&arena, &key_exprs, &input, false).unwrap();
        let count = input.count();
        let mut bounds = WindowBoundsState::default();
        bounds.row_prev = sort_store.get_row(0).unwrap();
        for row_idx in 0..count {
            update_window_bounds(&wexpr, &sort_store, count, row_idx, None, None, &mut bounds)
                .unwrap();
            assert!(bounds.partition_start <= bounds.peer_start);
            assert!(bounds.peer_start <= row_idx);
            assert!(row_idx < bounds.peer_end);
            assert!(bounds.peer_end <= bounds.partition_end);
            assert!(bounds.partition_end <= count);
            assert!(bounds.window_start >= 0);
            assert!(bounds.window_start <= bounds.window_end);
            assert!(bounds.window_end <= count as i64);
        }
    }
}
