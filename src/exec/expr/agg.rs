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
//! Aggregate descriptors consumed by the window segment tree.
//!
//! A descriptor is a record of function pointers over raw, arena-allocated
//! states. Keeping the record shape (instead of an enum of kinds) preserves
//! runtime extensibility: callers can register descriptors the registry does
//! not know about, as long as the combine step is associative.

use std::sync::Arc;

use arrow::array::{
    Array, ArrayRef, Decimal128Array, Float32Array, Float64Array, Int8Array, Int16Array,
    Int32Array, Int64Array,
};
use arrow::datatypes::DataType;

use crate::exec::chunk::scalar::{ScalarValue, compare_scalar_values, scalar_from_array};
use crate::runtime::mem_tracker::MemTracker;

pub type AggStatePtr = usize;

/// State lifecycle contract: `init` writes a fresh state into uninitialized
/// memory, `update` folds payload rows in, `combine` folds another state in,
/// `finalize` is a pure projection, `drop_state` tears the state down.
#[derive(Clone, Copy, Debug)]
pub struct AggregateDescriptor {
    pub name: &'static str,
    pub state_size: usize,
    pub state_align: usize,
    /// Segment trees require an associative combine; descriptors declaring
    /// `false` are rejected at tree construction.
    pub associative: bool,
    pub init: fn(AggStatePtr),
    pub update: fn(AggStatePtr, &[ArrayRef]) -> Result<(), String>,
    pub combine: fn(AggStatePtr, AggStatePtr) -> Result<(), String>,
    pub finalize: fn(AggStatePtr, &DataType) -> Result<ScalarValue, String>,
    pub drop_state: fn(AggStatePtr),
}

/// Bump arena for aggregate states. States are raw bytes; the descriptor owns
/// their lifecycle, the arena only owns the storage.
#[derive(Debug)]
pub struct AggStateArena {
    blocks: Vec<Box<[u8]>>,
    cursor: usize,
    block_size: usize,
    mem_tracker: Option<Arc<MemTracker>>,
    accounted_bytes: i64,
}

impl AggStateArena {
    pub fn new(block_size: usize) -> Self {
        Self {
            blocks: Vec::new(),
            cursor: 0,
            block_size: block_size.max(1),
            mem_tracker: None,
            accounted_bytes: 0,
        }
    }

    pub fn set_mem_tracker(&mut self, tracker: Arc<MemTracker>) {
        if let Some(current) = self.mem_tracker.as_ref() {
            if Arc::ptr_eq(current, &tracker) {
                return;
            }
            current.release(self.accounted_bytes);
        }
        let bytes = self.blocks.iter().map(|b| b.len()).sum::<usize>();
        let bytes = i64::try_from(bytes).unwrap_or(i64::MAX);
        tracker.consume(bytes);
        self.mem_tracker = Some(tracker);
        self.accounted_bytes = bytes;
    }

    pub fn alloc(&mut self, size: usize, align: usize) -> AggStatePtr {
        let needed = size.max(1);
        let align = align.max(1);
        loop {
            if let Some(block) = self.blocks.last_mut() {
                let len = block.len();
                let base = block.as_mut_ptr() as usize;
                let start = (base + self.cursor + align - 1) & !(align - 1);
                let end = start - base + needed;
                if end <= len {
                    self.cursor = end;
                    return start;
                }
            }
            // The fresh block leaves room for worst-case base misalignment.
            let block_size = self.block_size.max(needed + align);
            self.blocks.push(vec![0u8; block_size].into_boxed_slice());
            self.block_size = self.block_size.max(block_size);
            self.cursor = 0;
            if let Some(tracker) = self.mem_tracker.as_ref() {
                let bytes = i64::try_from(block_size).unwrap_or(i64::MAX);
                tracker.consume(bytes);
                self.accounted_bytes = self.accounted_bytes.saturating_add(bytes);
            }
        }
    }
}

impl Drop for AggStateArena {
    fn drop(&mut self) {
        if let Some(tracker) = self.mem_tracker.as_ref() {
            tracker.release(self.accounted_bytes);
        }
    }
}

/// Look up a descriptor for `(function, input type)`. The registry binds the
/// descriptor to the input column type, mirroring how aggregate functions are
/// resolved at plan time.
pub fn resolve_aggregate(
    name: &str,
    input_type: &DataType,
) -> Result<AggregateDescriptor, String> {
    match name {
        "count" => Ok(COUNT),
        "sum" => match input_type {
            DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::Decimal128(_, _) => Ok(SUM_INT),
            DataType::Float32 | DataType::Float64 => Ok(SUM_FLOAT),
            other => Err(format!("sum does not support input type {:?}", other)),
        },
        "avg" => match input_type {
            DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::Decimal128(_, _) => Ok(AVG_INT),
            DataType::Float32 | DataType::Float64 => Ok(AVG_FLOAT),
            other => Err(format!("avg does not support input type {:?}", other)),
        },
        "min" => Ok(MIN),
        "max" => Ok(MAX),
        other => Err(format!("unknown window aggregate function: {}", other)),
    }
}

#[repr(C)]
struct CountState {
    count: i64,
}

#[repr(C)]
struct SumIntState {
    sum: i128,
    count: i64,
}

#[repr(C)]
struct SumFloatState {
    sum: f64,
    count: i64,
}

struct MinMaxState {
    value: Option<ScalarValue>,
}

fn state<'a, T>(ptr: AggStatePtr) -> &'a mut T {
    unsafe { &mut *(ptr as *mut T) }
}

fn first_input<'a>(inputs: &'a [ArrayRef], name: &str) -> Result<&'a ArrayRef, String> {
    inputs
        .first()
        .ok_or_else(|| format!("{} missing value argument", name))
}

pub const COUNT: AggregateDescriptor = AggregateDescriptor {
    name: "count",
    state_size: size_of::<CountState>(),
    state_align: align_of::<CountState>(),
    associative: true,
    init: |p| unsafe { std::ptr::write(p as *mut CountState, CountState { count: 0 }) },
    update: |p, inputs| {
        let array = first_input(inputs, "count")?;
        let s = state::<CountState>(p);
        s.count += (array.len() - array.null_count()) as i64;
        Ok(())
    },
    combine: |dst, src| {
        state::<CountState>(dst).count += state::<CountState>(src).count;
        Ok(())
    },
    finalize: |p, out_type| {
        let s = state::<CountState>(p);
        ScalarValue::numeric(out_type, s.count)
    },
    drop_state: drop_pod,
};

pub const SUM_INT: AggregateDescriptor = AggregateDescriptor {
    name: "sum",
    state_size: size_of::<SumIntState>(),
    state_align: align_of::<SumIntState>(),
    associative: true,
    init: sum_int_init,
    update: sum_int_update,
    combine: sum_int_combine,
    finalize: |p, out_type| {
        let s = state::<SumIntState>(p);
        if s.count == 0 {
            return Ok(ScalarValue::Null);
        }
        match out_type {
            DataType::Int64 => i64::try_from(s.sum)
                .map(ScalarValue::Int64)
                .map_err(|_| "sum overflow".to_string()),
            DataType::Float64 => Ok(ScalarValue::Float64(s.sum as f64)),
            DataType::Decimal128(precision, scale) => Ok(ScalarValue::Decimal128 {
                value: s.sum,
                precision: *precision,
                scale: *scale,
            }),
            other => Err(format!("sum does not support output type {:?}", other)),
        }
    },
    drop_state: drop_pod,
};

pub const AVG_INT: AggregateDescriptor = AggregateDescriptor {
    name: "avg",
    state_size: size_of::<SumIntState>(),
    state_align: align_of::<SumIntState>(),
    associative: true,
    init: sum_int_init,
    update: sum_int_update,
    combine: sum_int_combine,
    finalize: |p, _out_type| {
        let s = state::<SumIntState>(p);
        if s.count == 0 {
            return Ok(ScalarValue::Null);
        }
        Ok(ScalarValue::Float64(s.sum as f64 / s.count as f64))
    },
    drop_state: drop_pod,
};

pub const SUM_FLOAT: AggregateDescriptor = AggregateDescriptor {
    name: "sum",
    state_size: size_of::<SumFloatState>(),
    state_align: align_of::<SumFloatState>(),
    associative: true,
    init: sum_float_init,
    update: sum_float_update,
    combine: sum_float_combine,
    finalize: |p, _out_type| {
        let s = state::<SumFloatState>(p);
        if s.count == 0 {
            return Ok(ScalarValue::Null);
        }
        Ok(ScalarValue::Float64(s.sum))
    },
    drop_state: drop_pod,
};

pub const AVG_FLOAT: AggregateDescriptor = AggregateDescriptor {
    name: "avg",
    state_size: size_of::<SumFloatState>(),
    state_align: align_of::<SumFloatState>(),
    associative: true,
    init: sum_float_init,
    update: sum_float_update,
    combine: sum_float_combine,
    finalize: |p, _out_type| {
        let s = state::<SumFloatState>(p);
        if s.count == 0 {
            return Ok(ScalarValue::Null);
        }
        Ok(ScalarValue::Float64(s.sum / s.count as f64))
    },
    drop_state: drop_pod,
};

pub const MIN: AggregateDescriptor = AggregateDescriptor {
    name: "min",
    state_size: size_of::<MinMaxState>(),
    state_align: align_of::<MinMaxState>(),
    associative: true,
    init: minmax_init,
    update: |p, inputs| minmax_update(p, inputs, true),
    combine: |dst, src| minmax_combine(dst, src, true),
    finalize: minmax_finalize,
    drop_state: |p| unsafe { std::ptr::drop_in_place(p as *mut MinMaxState) },
};

pub const MAX: AggregateDescriptor = AggregateDescriptor {
    name: "max",
    state_size: size_of::<MinMaxState>(),
    state_align: align_of::<MinMaxState>(),
    associative: true,
    init: minmax_init,
    update: |p, inputs| minmax_update(p, inputs, false),
    combine: |dst, src| minmax_combine(dst, src, false),
    finalize: minmax_finalize,
    drop_state: |p| unsafe { std::ptr::drop_in_place(p as *mut MinMaxState) },
};

fn drop_pod(_state: AggStatePtr) {}

fn sum_int_init(p: AggStatePtr) {
    unsafe { std::ptr::write(p as *mut SumIntState, SumIntState { sum: 0, count: 0 }) }
}

fn sum_int_update(p: AggStatePtr, inputs: &[ArrayRef]) -> Result<(), String> {
    let array = first_input(inputs, "sum")?;
    let s = state::<SumIntState>(p);
    for_each_int(array.as_ref(), |v| {
        s.sum += v;
        s.count += 1;
    })
}

fn sum_int_combine(dst: AggStatePtr, src: AggStatePtr) -> Result<(), String> {
    let src = state::<SumIntState>(src);
    let dst = state::<SumIntState>(dst);
    dst.sum += src.sum;
    dst.count += src.count;
    Ok(())
}

fn sum_float_init(p: AggStatePtr) {
    unsafe {
        std::ptr::write(
            p as *mut SumFloatState,
            SumFloatState { sum: 0.0, count: 0 },
        )
    }
}

fn sum_float_update(p: AggStatePtr, inputs: &[ArrayRef]) -> Result<(), String> {
    let array = first_input(inputs, "sum")?;
    let s = state::<SumFloatState>(p);
    for_each_float(array.as_ref(), |v| {
        s.sum += v;
        s.count += 1;
    })
}

fn sum_float_combine(dst: AggStatePtr, src: AggStatePtr) -> Result<(), String> {
    let src = state::<SumFloatState>(src);
    let dst = state::<SumFloatState>(dst);
    dst.sum += src.sum;
    dst.count += src.count;
    Ok(())
}

fn minmax_init(p: AggStatePtr) {
    unsafe { std::ptr::write(p as *mut MinMaxState, MinMaxState { value: None }) }
}

fn minmax_update(p: AggStatePtr, inputs: &[ArrayRef], is_min: bool) -> Result<(), String> {
    let array = first_input(inputs, "min/max")?;
    let s = state::<MinMaxState>(p);
    for row in 0..array.len() {
        if array.is_null(row) {
            continue;
        }
        let v = scalar_from_array(array.as_ref(), row)?;
        merge_minmax(s, v, is_min)?;
    }
    Ok(())
}

fn minmax_combine(dst: AggStatePtr, src: AggStatePtr, is_min: bool) -> Result<(), String> {
    let src = state::<MinMaxState>(src);
    let dst = state::<MinMaxState>(dst);
    if let Some(v) = src.value.clone() {
        merge_minmax(dst, v, is_min)?;
    }
    Ok(())
}

fn merge_minmax(s: &mut MinMaxState, v: ScalarValue, is_min: bool) -> Result<(), String> {
    match s.value.as_ref() {
        None => s.value = Some(v),
        Some(current) => {
            let ord = compare_scalar_values(&v, current)?;
            if (is_min && ord.is_lt()) || (!is_min && ord.is_gt()) {
                s.value = Some(v);
            }
        }
    }
    Ok(())
}

fn minmax_finalize(p: AggStatePtr, _out_type: &DataType) -> Result<ScalarValue, String> {
    let s = state::<MinMaxState>(p);
    Ok(s.value.clone().unwrap_or(ScalarValue::Null))
}

fn for_each_int(array: &dyn Array, mut f: impl FnMut(i128)) -> Result<(), String> {
    macro_rules! walk {
        ($ty:ty) => {{
            let a = array
                .as_any()
                .downcast_ref::<$ty>()
                .ok_or_else(|| format!("failed to downcast {}", stringify!($ty)))?;
            for row in 0..a.len() {
                if !a.is_null(row) {
                    f(a.value(row) as i128);
                }
            }
            Ok(())
        }};
    }
    match array.data_type() {
        DataType::Int8 => walk!(Int8Array),
        DataType::Int16 => walk!(Int16Array),
        DataType::Int32 => walk!(Int32Array),
        DataType::Int64 => walk!(Int64Array),
        DataType::Decimal128(_, _) => walk!(Decimal128Array),
        other => Err(format!("unsupported integer sum input: {:?}", other)),
    }
}

fn for_each_float(array: &dyn Array, mut f: impl FnMut(f64)) -> Result<(), String> {
    macro_rules! walk {
        ($ty:ty) => {{
            let a = array
                .as_any()
                .downcast_ref::<$ty>()
                .ok_or_else(|| format!("failed to downcast {}", stringify!($ty)))?;
            for row in 0..a.len() {
                if !a.is_null(row) {
                    f(a.value(row) as f64);
                }
            }
            Ok(())
        }};
    }
    match array.data_type() {
        DataType::Float32 => walk!(Float32Array),
        DataType::Float64 => walk!(Float64Array),
        other => Err(format!("unsupported float sum input: {:?}", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_one(
        desc: &AggregateDescriptor,
        input: ArrayRef,
        out_type: &DataType,
    ) -> ScalarValue {
        let mut arena = AggStateArena::new(1024);
        let p = arena.alloc(desc.state_size, desc.state_align);
        (desc.init)(p);
        (desc.update)(p, &[input]).unwrap();
        let out = (desc.finalize)(p, out_type).unwrap();
        (desc.drop_state)(p);
        out
    }

    #[test]
    fn sum_skips_nulls_and_counts() {
        let input: ArrayRef = Arc::new(Int64Array::from(vec![Some(1), None, Some(5)]));
        assert_eq!(
            run_one(&SUM_INT, input, &DataType::Int64),
            ScalarValue::Int64(6)
        );
    }

    #[test]
    fn sum_of_all_nulls_is_null() {
        let input: ArrayRef = Arc::new(Int64Array::from(vec![None::<i64>, None]));
        assert_eq!(run_one(&SUM_INT, input, &DataType::Int64), ScalarValue::Null);
    }

    #[test]
    fn min_combines_across_states() {
        let mut arena = AggStateArena::new(1024);
        let a = arena.alloc(MIN.state_size, MIN.state_align);
        let b = arena.alloc(MIN.state_size, MIN.state_align);
        (MIN.init)(a);
        (MIN.init)(b);
        let left: ArrayRef = Arc::new(Int64Array::from(vec![Some(4), Some(9)]));
        let right: ArrayRef = Arc::new(Int64Array::from(vec![Some(2)]));
        (MIN.update)(a, &[left]).unwrap();
        (MIN.update)(b, &[right]).unwrap();
        (MIN.combine)(a, b).unwrap();
        assert_eq!(
            (MIN.finalize)(a, &DataType::Int64).unwrap(),
            ScalarValue::Int64(2)
        );
        (MIN.drop_state)(a);
        (MIN.drop_state)(b);
    }

    #[test]
    fn unknown_function_is_rejected() {
        let err = resolve_aggregate("median", &DataType::Int64).unwrap_err();
        assert!(err.contains("unknown window aggregate"), "err={}", err);
    }
}
