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
//! End-to-end tests for the window operator pair: sink chunks in, combine,
//! finalize, pull concatenated input+result chunks out.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use arrow::array::{Array, ArrayRef, Float64Array, Int64Array, RecordBatch};
use arrow::datatypes::{DataType, Field, Schema};

use overstone::exec::chunk::Chunk;
use overstone::exec::expr::agg::resolve_aggregate;
use overstone::exec::expr::{ExprArena, ExprId, ExprNode, LiteralValue};
use overstone::exec::node::window::{
    BoundWindowExpr, FrameBoundKind, OrderKey, WindowFunctionKind,
};
use overstone::exec::operators::{WindowSharedState, WindowSinkFactory, WindowSourceFactory};
use overstone::exec::pipeline::operator::{Operator, ProcessorOperator};
use overstone::exec::pipeline::operator_factory::OperatorFactory;
use overstone::runtime::runtime_state::RuntimeState;

fn int_chunk(values: &[i64]) -> Chunk {
    let schema = Arc::new(Schema::new(vec![Field::new("x", DataType::Int64, true)]));
    let array = Arc::new(Int64Array::from(values.to_vec())) as ArrayRef;
    Chunk::new(RecordBatch::try_new(schema, vec![array]).expect("batch"))
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

/// Drive the operator pair: distribute `chunks` round-robin over `sinks`
/// sink operators, finish them all, then drain the source operator.
fn run_window(
    arena: ExprArena,
    select_list: Vec<BoundWindowExpr>,
    chunks: Vec<Chunk>,
    sinks: usize,
) -> Vec<RecordBatch> {
    let state = RuntimeState::default();
    let shared = WindowSharedState::new(Arc::new(arena), select_list, 1);
    let sink_factory = WindowSinkFactory::new(shared.clone());
    let source_factory = WindowSourceFactory::new(shared);

    let mut sink_ops: Vec<_> = (0..sinks)
        .map(|driver| sink_factory.create(sinks as i32, driver as i32))
        .collect();
    for (idx, chunk) in chunks.into_iter().enumerate() {
        let sink = &mut sink_ops[idx % sinks];
        let processor = sink.as_processor_mut().expect("sink processor");
        assert!(processor.need_input());
        processor.push_chunk(&state, chunk).expect("push");
    }
    for sink in sink_ops.iter_mut() {
        let processor = sink.as_processor_mut().expect("sink processor");
        processor.set_finishing(&state).expect("finish");
    }

    let mut source = source_factory.create(1, 0);
    let processor = source.as_processor_mut().expect("source processor");
    let mut out = Vec::new();
    while let Some(chunk) = processor.pull_chunk(&state).expect("pull") {
        out.push(chunk.batch);
    }
    assert!(source.is_finished());
    out
}

fn int_column(batches: &[RecordBatch], col: usize) -> Vec<Option<i64>> {
    let mut out = Vec::new();
    for batch in batches {
        let array = batch
            .column(col)
            .as_any()
            .downcast_ref::<Int64Array>()
            .expect("int64 column");
        for row in 0..array.len() {
            out.push(if array.is_null(row) {
                None
            } else {
                Some(array.value(row))
            });
        }
    }
    out
}

fn float_column(batches: &[RecordBatch], col: usize) -> Vec<Option<f64>> {
    let mut out = Vec::new();
    for batch in batches {
        let array = batch
            .column(col)
            .as_any()
            .downcast_ref::<Float64Array>()
            .expect("float64 column");
        for row in 0..array.len() {
            out.push(if array.is_null(row) {
                None
            } else {
                Some(array.value(row))
            });
        }
    }
    out
}

#[test]
fn row_number_sorts_input_and_numbers_rows() {
    // SELECT row_number() OVER (ORDER BY x) FROM (VALUES 30, 10, 20, 10)
    let mut arena = ExprArena::default();
    let mut wexpr = BoundWindowExpr::new(WindowFunctionKind::RowNumber, DataType::Int64);
    wexpr.orders = vec![order_by_x(&mut arena)];

    let out = run_window(arena, vec![wexpr], vec![int_chunk(&[30, 10, 20, 10])], 1);
    assert_eq!(
        int_column(&out, 0),
        vec![Some(10), Some(10), Some(20), Some(30)]
    );
    assert_eq!(
        int_column(&out, 1),
        vec![Some(1), Some(2), Some(3), Some(4)]
    );
}

#[test]
fn rank_and_dense_rank_share_the_sorted_store() {
    // SELECT rank() OVER (ORDER BY x), dense_rank() OVER (ORDER BY x)
    // FROM (VALUES 5, 5, 7, 9)
    let mut arena = ExprArena::default();
    let mut rank_expr = BoundWindowExpr::new(WindowFunctionKind::Rank, DataType::Int64);
    rank_expr.orders = vec![order_by_x(&mut arena)];
    let mut dense_expr = BoundWindowExpr::new(WindowFunctionKind::DenseRank, DataType::Int64);
    dense_expr.orders = vec![order_by_x(&mut arena)];

    let out = run_window(
        arena,
        vec![rank_expr, dense_expr],
        vec![int_chunk(&[5, 5, 7, 9])],
        1,
    );
    assert_eq!(
        int_column(&out, 1),
        vec![Some(1), Some(1), Some(3), Some(4)]
    );
    assert_eq!(
        int_column(&out, 2),
        vec![Some(1), Some(1), Some(2), Some(3)]
    );
}

#[test]
fn cume_dist_over_peers() {
    // SELECT cume_dist() OVER (ORDER BY x) FROM (VALUES 1, 2, 2, 3)
    let mut arena = ExprArena::default();
    let mut wexpr = BoundWindowExpr::new(WindowFunctionKind::CumeDist, DataType::Float64);
    wexpr.orders = vec![order_by_x(&mut arena)];

    let out = run_window(arena, vec![wexpr], vec![int_chunk(&[1, 2, 2, 3])], 1);
    assert_eq!(
        float_column(&out, 1),
        vec![Some(0.25), Some(0.75), Some(0.75), Some(1.0)]
    );
}

#[test]
fn percent_rank_is_zero_for_single_row_partition() {
    let mut arena = ExprArena::default();
    let mut wexpr = BoundWindowExpr::new(WindowFunctionKind::PercentRank, DataType::Float64);
    wexpr.orders = vec![order_by_x(&mut arena)];

    let out = run_window(arena, vec![wexpr], vec![int_chunk(&[42])], 1);
    assert_eq!(float_column(&out, 1), vec![Some(0.0)]);
}

#[test]
fn sliding_sum_combined_from_two_sinks() {
    // SELECT sum(x) OVER (ORDER BY x ROWS BETWEEN 1 PRECEDING AND 1 FOLLOWING)
    // with input split across two parallel sinks.
    let mut arena = ExprArena::default();
    let mut wexpr = BoundWindowExpr::new(WindowFunctionKind::Aggregate, DataType::Int64);
    wexpr.orders = vec![order_by_x(&mut arena)];
    wexpr.children = vec![column_expr(&mut arena)];
    wexpr.start = FrameBoundKind::ExprPreceding;
    wexpr.end = FrameBoundKind::ExprFollowing;
    wexpr.start_expr = Some(int_literal(&mut arena, 1));
    wexpr.end_expr = Some(int_literal(&mut arena, 1));
    wexpr.aggregate = Some(resolve_aggregate("sum", &DataType::Int64).unwrap());

    let out = run_window(
        arena,
        vec![wexpr],
        vec![int_chunk(&[4, 1]), int_chunk(&[3]), int_chunk(&[2, 5])],
        2,
    );
    assert_eq!(
        int_column(&out, 0),
        vec![Some(1), Some(2), Some(3), Some(4), Some(5)]
    );
    assert_eq!(
        int_column(&out, 1),
        vec![Some(3), Some(6), Some(9), Some(12), Some(9)]
    );
}

#[test]
fn aggregate_over_empty_over_clause_sees_whole_input() {
    // SELECT sum(x) OVER () — one partition, default full frame up to peers;
    // with no order keys every row is a peer of every other.
    let mut arena = ExprArena::default();
    let mut wexpr = BoundWindowExpr::new(WindowFunctionKind::Aggregate, DataType::Int64);
    wexpr.children = vec![column_expr(&mut arena)];
    wexpr.aggregate = Some(resolve_aggregate("sum", &DataType::Int64).unwrap());

    let out = run_window(
        arena,
        vec![wexpr],
        vec![int_chunk(&[1, 2]), int_chunk(&[3, 4])],
        1,
    );
    assert_eq!(
        int_column(&out, 1),
        vec![Some(10), Some(10), Some(10), Some(10)]
    );
}

#[test]
fn empty_frame_produces_null_not_error() {
    // SELECT sum(x) OVER (ORDER BY x ROWS BETWEEN 3 PRECEDING AND 2 PRECEDING)
    // FROM (VALUES 1, 2)
    let mut arena = ExprArena::default();
    let mut wexpr = BoundWindowExpr::new(WindowFunctionKind::Aggregate, DataType::Int64);
    wexpr.orders = vec![order_by_x(&mut arena)];
    wexpr.children = vec![column_expr(&mut arena)];
    wexpr.start = FrameBoundKind::ExprPreceding;
    wexpr.end = FrameBoundKind::ExprPreceding;
    wexpr.start_expr = Some(int_literal(&mut arena, 3));
    wexpr.end_expr = Some(int_literal(&mut arena, 2));
    wexpr.aggregate = Some(resolve_aggregate("sum", &DataType::Int64).unwrap());

    let out = run_window(arena, vec![wexpr], vec![int_chunk(&[1, 2])], 1);
    assert_eq!(int_column(&out, 1), vec![None, None]);
}

#[test]
fn ntile_buckets_through_operators() {
    // SELECT ntile(3) OVER (ORDER BY x) FROM (VALUES 1..7)
    let mut arena = ExprArena::default();
    let mut wexpr = BoundWindowExpr::new(WindowFunctionKind::Ntile, DataType::Int64);
    wexpr.orders = vec![order_by_x(&mut arena)];
    wexpr.children = vec![int_literal(&mut arena, 3)];

    let out = run_window(
        arena,
        vec![wexpr],
        vec![int_chunk(&[1, 2, 3, 4, 5, 6, 7])],
        1,
    );
    assert_eq!(
        int_column(&out, 1),
        vec![Some(1), Some(1), Some(1), Some(2), Some(2), Some(3), Some(3)]
    );
}

#[test]
fn lead_with_default_through_operators() {
    // SELECT lead(x, 2, -1) OVER (ORDER BY x) FROM (VALUES 10, 20, 30, 40)
    let mut arena = ExprArena::default();
    let mut wexpr = BoundWindowExpr::new(WindowFunctionKind::Lead, DataType::Int64);
    wexpr.orders = vec![order_by_x(&mut arena)];
    wexpr.children = vec![column_expr(&mut arena)];
    wexpr.offset_expr = Some(int_literal(&mut arena, 2));
    wexpr.default_expr = Some(int_literal(&mut arena, -1));

    let out = run_window(arena, vec![wexpr], vec![int_chunk(&[10, 20, 30, 40])], 1);
    assert_eq!(
        int_column(&out, 1),
        vec![Some(30), Some(40), Some(-1), Some(-1)]
    );
}

#[test]
fn output_schema_appends_one_typed_column_per_expression() {
    let mut arena = ExprArena::default();
    let mut row_number = BoundWindowExpr::new(WindowFunctionKind::RowNumber, DataType::Int64);
    row_number.orders = vec![order_by_x(&mut arena)];
    let mut percent = BoundWindowExpr::new(WindowFunctionKind::PercentRank, DataType::Float64);
    percent.orders = vec![order_by_x(&mut arena)];

    let out = run_window(
        arena,
        vec![row_number, percent],
        vec![int_chunk(&[2, 1])],
        1,
    );
    let schema = out[0].schema();
    assert_eq!(schema.fields().len(), 3);
    assert_eq!(schema.field(0).name(), "x");
    assert_eq!(schema.field(1).name(), "window_0");
    assert_eq!(schema.field(1).data_type(), &DataType::Int64);
    assert_eq!(schema.field(2).name(), "window_1");
    assert_eq!(schema.field(2).data_type(), &DataType::Float64);
}

#[test]
fn empty_input_finishes_without_output() {
    let arena = ExprArena::default();
    let mut wexpr = BoundWindowExpr::new(WindowFunctionKind::RowNumber, DataType::Int64);
    wexpr.orders = vec![OrderKey {
        expr: ExprId(0),
        asc: true,
        nulls_first: true,
    }];
    // No chunks pushed at all.
    let out = run_window(arena, vec![wexpr], Vec::new(), 1);
    assert!(out.is_empty());
}

#[test]
fn finalized_chunks_are_accounted_against_the_query_tracker() {
    use overstone::runtime::mem_tracker::MemTracker;

    let mut arena = ExprArena::default();
    let mut wexpr = BoundWindowExpr::new(WindowFunctionKind::Aggregate, DataType::Int64);
    wexpr.orders = vec![order_by_x(&mut arena)];
    wexpr.children = vec![column_expr(&mut arena)];
    wexpr.aggregate = Some(resolve_aggregate("sum", &DataType::Int64).unwrap());

    let tracker = MemTracker::new_root("query");
    let state = RuntimeState::new(1024, Some(Arc::clone(&tracker)));
    let shared = WindowSharedState::new(Arc::new(arena), vec![wexpr], 3);
    let sink_factory = WindowSinkFactory::new(shared.clone());
    let source_factory = WindowSourceFactory::new(shared);

    let mut sink = sink_factory.create(1, 0);
    let sink_processor = sink.as_processor_mut().expect("sink processor");
    sink_processor
        .push_chunk(&state, int_chunk(&[2, 3, 1]))
        .expect("push");
    sink_processor.set_finishing(&state).expect("finish");

    // Finalized output chunks are held by the shared queue under a child
    // tracker of the query tracker.
    assert!(tracker.peak() > 0);
    assert!(tracker.current() > 0);

    let mut source = source_factory.create(1, 0);
    let processor = source.as_processor_mut().expect("source processor");
    let chunk = processor.pull_chunk(&state).expect("pull").expect("chunk");
    drop(chunk);
    assert!(processor.pull_chunk(&state).expect("pull").is_none());
}

#[test]
fn source_reports_readiness_through_observable() {
    let mut arena = ExprArena::default();
    let mut wexpr = BoundWindowExpr::new(WindowFunctionKind::RowNumber, DataType::Int64);
    wexpr.orders = vec![order_by_x(&mut arena)];

    let state = RuntimeState::default();
    let shared = WindowSharedState::new(Arc::new(arena), vec![wexpr], 7);
    let sink_factory = WindowSinkFactory::new(shared.clone());
    let source_factory = WindowSourceFactory::new(shared);

    let mut source = source_factory.create(1, 0);
    let notified = Arc::new(AtomicBool::new(false));
    {
        let processor = source.as_processor_ref().expect("source processor");
        let observable = processor.source_observable().expect("observable");
        let flag = Arc::clone(&notified);
        observable.add_observer(Arc::new(move || {
            flag.store(true, Ordering::Release);
        }));
        assert!(!processor.has_output());
    }

    let mut sink = sink_factory.create(1, 0);
    let sink_processor = sink.as_processor_mut().expect("sink processor");
    sink_processor
        .push_chunk(&state, int_chunk(&[3, 1, 2]))
        .expect("push");
    assert!(!notified.load(Ordering::Acquire));
    sink_processor.set_finishing(&state).expect("finish");
    assert!(notified.load(Ordering::Acquire));

    let processor = source.as_processor_mut().expect("source processor");
    assert!(processor.has_output());
    let chunk = processor.pull_chunk(&state).expect("pull").expect("chunk");
    assert_eq!(chunk.len(), 3);
}
