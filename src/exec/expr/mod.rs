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
pub mod agg;

use std::sync::Arc;

use arrow::array::{
    ArrayRef, BooleanArray, Float64Array, Int32Array, Int64Array, NullArray, StringArray,
};
use arrow::compute::cast;
use arrow::compute::kernels::numeric::{add, div, mul, sub};
use arrow::datatypes::DataType;

use crate::exec::chunk::Chunk;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct ExprId(pub usize);

#[derive(Clone, Debug)]
pub enum LiteralValue {
    Null,
    Bool(bool),
    Int32(i32),
    Int64(i64),
    Float64(f64),
    Utf8(String),
}

/// Scalar expressions evaluated against one chunk at a time. Window
/// partition keys, order keys, function arguments, frame offsets and
/// lead/lag defaults are all materialized through these nodes.
#[derive(Clone, Debug)]
pub enum ExprNode {
    Literal(LiteralValue),
    /// Input column by position.
    Column(usize),
    Add(ExprId, ExprId),
    Sub(ExprId, ExprId),
    Mul(ExprId, ExprId),
    Div(ExprId, ExprId),
    Cast(ExprId),
}

#[derive(Clone, Debug, Default)]
pub struct ExprArena {
    nodes: Vec<ExprNode>,
    types: Vec<DataType>,
}

impl ExprArena {
    pub fn push_typed(&mut self, node: ExprNode, data_type: DataType) -> ExprId {
        let id = ExprId(self.nodes.len());
        self.nodes.push(node);
        self.types.push(data_type);
        id
    }

    pub fn node(&self, id: ExprId) -> Option<&ExprNode> {
        self.nodes.get(id.0)
    }

    pub fn data_type(&self, id: ExprId) -> Option<&DataType> {
        self.types.get(id.0)
    }

    /// A scalar expression is row-independent: it reads no input column, so
    /// one materialized row stands for every row of the input.
    pub fn is_scalar(&self, id: ExprId) -> bool {
        match self.nodes.get(id.0) {
            None => false,
            Some(ExprNode::Literal(_)) => true,
            Some(ExprNode::Column(_)) => false,
            Some(ExprNode::Add(a, b))
            | Some(ExprNode::Sub(a, b))
            | Some(ExprNode::Mul(a, b))
            | Some(ExprNode::Div(a, b)) => self.is_scalar(*a) && self.is_scalar(*b),
            Some(ExprNode::Cast(child)) => self.is_scalar(*child),
        }
    }

    pub fn eval(&self, id: ExprId, chunk: &Chunk) -> Result<ArrayRef, String> {
        let node = self
            .nodes
            .get(id.0)
            .ok_or_else(|| "invalid ExprId".to_string())?;
        match node {
            ExprNode::Literal(v) => {
                let out = eval_literal(v, chunk.len())?;
                let target = self.data_type(id).cloned().unwrap_or(DataType::Null);
                if !matches!(target, DataType::Null) && out.data_type() != &target {
                    return cast(&out, &target)
                        .map_err(|e| format!("literal cast to {:?}: {}", target, e));
                }
                Ok(out)
            }
            ExprNode::Column(idx) => chunk
                .columns()
                .get(*idx)
                .cloned()
                .ok_or_else(|| format!("column index out of range: {}", idx)),
            ExprNode::Add(a, b) => self.eval_numeric_binop(*a, *b, chunk, BinOp::Add),
            ExprNode::Sub(a, b) => self.eval_numeric_binop(*a, *b, chunk, BinOp::Sub),
            ExprNode::Mul(a, b) => self.eval_numeric_binop(*a, *b, chunk, BinOp::Mul),
            ExprNode::Div(a, b) => self.eval_numeric_binop(*a, *b, chunk, BinOp::Div),
            ExprNode::Cast(child) => {
                let input = self.eval(*child, chunk)?;
                let target = self
                    .data_type(id)
                    .cloned()
                    .ok_or_else(|| "cast expression without target type".to_string())?;
                if input.data_type() == &target {
                    return Ok(input);
                }
                cast(&input, &target).map_err(|e| format!("cast to {:?}: {}", target, e))
            }
        }
    }

    fn eval_numeric_binop(
        &self,
        a: ExprId,
        b: ExprId,
        chunk: &Chunk,
        op: BinOp,
    ) -> Result<ArrayRef, String> {
        let lhs = self.eval(a, chunk)?;
        let rhs = self.eval(b, chunk)?;
        let is_float = |dt: &DataType| matches!(dt, DataType::Float32 | DataType::Float64);
        let target = if is_float(lhs.data_type()) || is_float(rhs.data_type()) {
            DataType::Float64
        } else {
            DataType::Int64
        };
        let lhs = cast_if_needed(lhs, &target)?;
        let rhs = cast_if_needed(rhs, &target)?;
        let out = match op {
            BinOp::Add => add(&lhs, &rhs),
            BinOp::Sub => sub(&lhs, &rhs),
            BinOp::Mul => mul(&lhs, &rhs),
            BinOp::Div => div(&lhs, &rhs),
        };
        out.map_err(|e| e.to_string())
    }
}

#[derive(Copy, Clone)]
enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
}

fn cast_if_needed(array: ArrayRef, target: &DataType) -> Result<ArrayRef, String> {
    if array.data_type() == target {
        return Ok(array);
    }
    cast(&array, target).map_err(|e| e.to_string())
}

fn eval_literal(value: &LiteralValue, len: usize) -> Result<ArrayRef, String> {
    match value {
        LiteralValue::Null => Ok(Arc::new(NullArray::new(len))),
        LiteralValue::Bool(v) => Ok(Arc::new(BooleanArray::from(vec![*v; len]))),
        LiteralValue::Int32(v) => Ok(Arc::new(Int32Array::from(vec![*v; len]))),
        LiteralValue::Int64(v) => Ok(Arc::new(Int64Array::from(vec![*v; len]))),
        LiteralValue::Float64(v) => Ok(Arc::new(Float64Array::from(vec![*v; len]))),
        LiteralValue::Utf8(v) => Ok(Arc::new(StringArray::from(vec![v.as_str(); len]))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::RecordBatch;
    use arrow::datatypes::{Field, Schema};

    fn chunk_of(values: Vec<i64>) -> Chunk {
        let schema = Arc::new(Schema::new(vec![Field::new("x", DataType::Int64, true)]));
        let array = Arc::new(Int64Array::from(values)) as ArrayRef;
        Chunk::new(RecordBatch::try_new(schema, vec![array]).expect("batch"))
    }

    #[test]
    fn column_plus_literal() {
        let mut arena = ExprArena::default();
        let col = arena.push_typed(ExprNode::Column(0), DataType::Int64);
        let one = arena.push_typed(
            ExprNode::Literal(LiteralValue::Int64(1)),
            DataType::Int64,
        );
        let sum = arena.push_typed(ExprNode::Add(col, one), DataType::Int64);

        let out = arena.eval(sum, &chunk_of(vec![10, 20])).unwrap();
        let out = out.as_any().downcast_ref::<Int64Array>().unwrap();
        assert_eq!(out.values().to_vec(), vec![11, 21]);
        assert!(!arena.is_scalar(sum));
        assert!(arena.is_scalar(one));
    }

    #[test]
    fn null_literal_takes_declared_type() {
        let mut arena = ExprArena::default();
        let null = arena.push_typed(
            ExprNode::Literal(LiteralValue::Null),
            DataType::Int64,
        );
        let out = arena.eval(null, &chunk_of(vec![1, 2, 3])).unwrap();
        assert_eq!(out.data_type(), &DataType::Int64);
        assert_eq!(out.null_count(), 3);
    }
}
