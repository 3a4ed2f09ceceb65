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
use arrow::datatypes::DataType;

use crate::exec::expr::ExprId;
use crate::exec::expr::agg::AggregateDescriptor;

/// Window function families dispatched by the evaluator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WindowFunctionKind {
    Aggregate,
    RowNumber,
    Rank,
    DenseRank,
    PercentRank,
    CumeDist,
    Ntile,
    Lead,
    Lag,
    FirstValue,
    LastValue,
}

/// One endpoint of a SQL frame specification.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameBoundKind {
    UnboundedPreceding,
    UnboundedFollowing,
    CurrentRowRows,
    CurrentRowRange,
    ExprPreceding,
    ExprFollowing,
}

#[derive(Clone, Copy, Debug)]
pub struct OrderKey {
    pub expr: ExprId,
    pub asc: bool,
    pub nulls_first: bool,
}

/// Bound window expression as produced by the planner. Read-only during
/// evaluation.
#[derive(Clone, Debug)]
pub struct BoundWindowExpr {
    pub kind: WindowFunctionKind,
    pub return_type: DataType,
    pub partitions: Vec<ExprId>,
    pub orders: Vec<OrderKey>,
    /// Direct arguments of the window function.
    pub children: Vec<ExprId>,
    /// LEAD/LAG only.
    pub offset_expr: Option<ExprId>,
    pub default_expr: Option<ExprId>,
    pub start: FrameBoundKind,
    pub end: FrameBoundKind,
    /// Present when the matching bound is EXPR_PRECEDING / EXPR_FOLLOWING.
    pub start_expr: Option<ExprId>,
    pub end_expr: Option<ExprId>,
    /// Present when `kind` is `Aggregate`.
    pub aggregate: Option<AggregateDescriptor>,
}

impl BoundWindowExpr {
    /// New expression with the SQL default frame
    /// (RANGE BETWEEN UNBOUNDED PRECEDING AND CURRENT ROW).
    pub fn new(kind: WindowFunctionKind, return_type: DataType) -> Self {
        Self {
            kind,
            return_type,
            partitions: Vec::new(),
            orders: Vec::new(),
            children: Vec::new(),
            offset_expr: None,
            default_expr: None,
            start: FrameBoundKind::UnboundedPreceding,
            end: FrameBoundKind::CurrentRowRange,
            start_expr: None,
            end_expr: None,
            aggregate: None,
        }
    }

    pub fn sort_key_count(&self) -> usize {
        self.partitions.len() + self.orders.len()
    }

    pub fn needs_sorting(&self) -> bool {
        self.sort_key_count() > 0
    }

    /// Ranking functions share the rank counter protocol.
    pub fn needs_rank(&self) -> bool {
        matches!(
            self.kind,
            WindowFunctionKind::Rank
                | WindowFunctionKind::DenseRank
                | WindowFunctionKind::PercentRank
                | WindowFunctionKind::CumeDist
        )
    }
}
