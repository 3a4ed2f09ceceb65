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
//! Row-level boxed values for chunked stores.
//!
//! Window evaluation is a per-row algorithm over a columnar layout: sort-key
//! comparisons, boundary searches, and result emission all read or produce one
//! value at a time. `ScalarValue` is that box. Columns are still written back
//! in batches via `build_scalar_array`.

use std::cmp::Ordering;
use std::sync::Arc;

use arrow::array::{
    Array, ArrayRef, BooleanArray, Date32Array, Decimal128Array, Float32Array, Float64Array,
    Int8Array, Int16Array, Int32Array, Int64Array, StringArray, TimestampMicrosecondArray,
    UInt32Array,
};
use arrow::datatypes::{DataType, TimeUnit};

#[derive(Clone, Debug, PartialEq)]
pub enum ScalarValue {
    Null,
    Boolean(bool),
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    UInt32(u32),
    Float32(f32),
    Float64(f64),
    Utf8(String),
    Date32(i32),
    TimestampMicros(i64),
    Decimal128 {
        value: i128,
        precision: u8,
        scale: i8,
    },
}

impl ScalarValue {
    pub fn is_null(&self) -> bool {
        matches!(self, ScalarValue::Null)
    }

    /// Integer view used for frame offsets and the ntile parameter.
    pub fn to_i64(&self) -> Option<i64> {
        match self {
            ScalarValue::Int8(v) => Some(*v as i64),
            ScalarValue::Int16(v) => Some(*v as i64),
            ScalarValue::Int32(v) => Some(*v as i64),
            ScalarValue::Int64(v) => Some(*v),
            ScalarValue::UInt32(v) => Some(*v as i64),
            _ => None,
        }
    }

    /// Build a numeric value of the declared output type, like the typed
    /// counters produced by ranking functions.
    pub fn numeric(data_type: &DataType, v: i64) -> Result<ScalarValue, String> {
        match data_type {
            DataType::Int8 => i8::try_from(v)
                .map(ScalarValue::Int8)
                .map_err(|_| format!("numeric overflow casting {} to Int8", v)),
            DataType::Int16 => i16::try_from(v)
                .map(ScalarValue::Int16)
                .map_err(|_| format!("numeric overflow casting {} to Int16", v)),
            DataType::Int32 => i32::try_from(v)
                .map(ScalarValue::Int32)
                .map_err(|_| format!("numeric overflow casting {} to Int32", v)),
            DataType::Int64 => Ok(ScalarValue::Int64(v)),
            DataType::UInt32 => u32::try_from(v)
                .map(ScalarValue::UInt32)
                .map_err(|_| format!("numeric overflow casting {} to UInt32", v)),
            DataType::Float32 => Ok(ScalarValue::Float32(v as f32)),
            DataType::Float64 => Ok(ScalarValue::Float64(v as f64)),
            other => Err(format!("unsupported numeric output type: {:?}", other)),
        }
    }
}

/// NULL sorts first and two NULLs compare equal, matching the partition-key
/// ordering the sort step declares.
pub fn compare_scalar_values(left: &ScalarValue, right: &ScalarValue) -> Result<Ordering, String> {
    use ScalarValue::*;
    match (left, right) {
        (Null, Null) => Ok(Ordering::Equal),
        (Null, _) => Ok(Ordering::Less),
        (_, Null) => Ok(Ordering::Greater),
        (Boolean(a), Boolean(b)) => Ok(a.cmp(b)),
        (Int8(a), Int8(b)) => Ok(a.cmp(b)),
        (Int16(a), Int16(b)) => Ok(a.cmp(b)),
        (Int32(a), Int32(b)) => Ok(a.cmp(b)),
        (Int64(a), Int64(b)) => Ok(a.cmp(b)),
        (UInt32(a), UInt32(b)) => Ok(a.cmp(b)),
        (Float32(a), Float32(b)) => Ok(cmp_f64(*a as f64, *b as f64)),
        (Float64(a), Float64(b)) => Ok(cmp_f64(*a, *b)),
        (Utf8(a), Utf8(b)) => Ok(a.cmp(b)),
        (Date32(a), Date32(b)) => Ok(a.cmp(b)),
        (TimestampMicros(a), TimestampMicros(b)) => Ok(a.cmp(b)),
        (Decimal128 { value: a, .. }, Decimal128 { value: b, .. }) => Ok(a.cmp(b)),
        (l, r) => Err(format!(
            "cannot compare values of different kinds: {:?} vs {:?}",
            l, r
        )),
    }
}

pub fn scalar_values_equal(left: &ScalarValue, right: &ScalarValue) -> bool {
    matches!(compare_scalar_values(left, right), Ok(Ordering::Equal))
}

pub fn cmp_f64(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
    }
}

pub fn scalar_from_array(array: &dyn Array, row: usize) -> Result<ScalarValue, String> {
    if row >= array.len() {
        return Err(format!(
            "row index out of range: {} (len={})",
            row,
            array.len()
        ));
    }
    if array.is_null(row) {
        return Ok(ScalarValue::Null);
    }
    match array.data_type() {
        DataType::Boolean => {
            let a = downcast::<BooleanArray>(array, "BooleanArray")?;
            Ok(ScalarValue::Boolean(a.value(row)))
        }
        DataType::Int8 => {
            let a = downcast::<Int8Array>(array, "Int8Array")?;
            Ok(ScalarValue::Int8(a.value(row)))
        }
        DataType::Int16 => {
            let a = downcast::<Int16Array>(array, "Int16Array")?;
            Ok(ScalarValue::Int16(a.value(row)))
        }
        DataType::Int32 => {
            let a = downcast::<Int32Array>(array, "Int32Array")?;
            Ok(ScalarValue::Int32(a.value(row)))
        }
        DataType::Int64 => {
            let a = downcast::<Int64Array>(array, "Int64Array")?;
            Ok(ScalarValue::Int64(a.value(row)))
        }
        DataType::UInt32 => {
            let a = downcast::<UInt32Array>(array, "UInt32Array")?;
            Ok(ScalarValue::UInt32(a.value(row)))
        }
        DataType::Float32 => {
            let a = downcast::<Float32Array>(array, "Float32Array")?;
            Ok(ScalarValue::Float32(a.value(row)))
        }
        DataType::Float64 => {
            let a = downcast::<Float64Array>(array, "Float64Array")?;
            Ok(ScalarValue::Float64(a.value(row)))
        }
        DataType::Utf8 => {
            let a = downcast::<StringArray>(array, "StringArray")?;
            Ok(ScalarValue::Utf8(a.value(row).to_string()))
        }
        DataType::Date32 => {
            let a = downcast::<Date32Array>(array, "Date32Array")?;
            Ok(ScalarValue::Date32(a.value(row)))
        }
        DataType::Timestamp(TimeUnit::Microsecond, _) => {
            let a = downcast::<TimestampMicrosecondArray>(array, "TimestampMicrosecondArray")?;
            Ok(ScalarValue::TimestampMicros(a.value(row)))
        }
        DataType::Decimal128(precision, scale) => {
            let a = downcast::<Decimal128Array>(array, "Decimal128Array")?;
            Ok(ScalarValue::Decimal128 {
                value: a.value(row),
                precision: *precision,
                scale: *scale,
            })
        }
        other => Err(format!("unsupported value type: {:?}", other)),
    }
}

/// Build a typed column from boxed row values. `Null` maps to a null slot;
/// any other variant must match the requested type.
pub fn build_scalar_array(data_type: &DataType, values: &[ScalarValue]) -> Result<ArrayRef, String> {
    match data_type {
        DataType::Boolean => {
            let out: BooleanArray = collect_values(values, |v| match v {
                ScalarValue::Boolean(b) => Some(*b),
                _ => None,
            })?
            .into_iter()
            .collect();
            Ok(Arc::new(out))
        }
        DataType::Int8 => {
            let out: Int8Array = collect_values(values, |v| v.to_i64().map(|x| x as i8))?
                .into_iter()
                .collect();
            Ok(Arc::new(out))
        }
        DataType::Int16 => {
            let out: Int16Array = collect_values(values, |v| v.to_i64().map(|x| x as i16))?
                .into_iter()
                .collect();
            Ok(Arc::new(out))
        }
        DataType::Int32 => {
            let out: Int32Array = collect_values(values, |v| v.to_i64().map(|x| x as i32))?
                .into_iter()
                .collect();
            Ok(Arc::new(out))
        }
        DataType::Int64 => {
            let out: Int64Array = collect_values(values, |v| v.to_i64())?.into_iter().collect();
            Ok(Arc::new(out))
        }
        DataType::UInt32 => {
            let out: UInt32Array = collect_values(values, |v| match v {
                ScalarValue::UInt32(x) => Some(*x),
                _ => None,
            })?
            .into_iter()
            .collect();
            Ok(Arc::new(out))
        }
        DataType::Float32 => {
            let out: Float32Array = collect_values(values, |v| match v {
                ScalarValue::Float32(x) => Some(*x),
                _ => None,
            })?
            .into_iter()
            .collect();
            Ok(Arc::new(out))
        }
        DataType::Float64 => {
            let out: Float64Array = collect_values(values, |v| match v {
                ScalarValue::Float64(x) => Some(*x),
                ScalarValue::Float32(x) => Some(*x as f64),
                _ => None,
            })?
            .into_iter()
            .collect();
            Ok(Arc::new(out))
        }
        DataType::Utf8 => {
            let out: StringArray = collect_values(values, |v| match v {
                ScalarValue::Utf8(s) => Some(s.clone()),
                _ => None,
            })?
            .into_iter()
            .collect();
            Ok(Arc::new(out))
        }
        DataType::Date32 => {
            let out: Date32Array = collect_values(values, |v| match v {
                ScalarValue::Date32(d) => Some(*d),
                _ => None,
            })?
            .into_iter()
            .collect();
            Ok(Arc::new(out))
        }
        DataType::Timestamp(TimeUnit::Microsecond, _) => {
            let out: TimestampMicrosecondArray = collect_values(values, |v| match v {
                ScalarValue::TimestampMicros(t) => Some(*t),
                _ => None,
            })?
            .into_iter()
            .collect();
            Ok(Arc::new(out))
        }
        DataType::Decimal128(precision, scale) => {
            let raw = collect_values(values, |v| match v {
                ScalarValue::Decimal128 { value, .. } => Some(*value),
                _ => None,
            })?;
            let out = Decimal128Array::from(raw)
                .with_precision_and_scale(*precision, *scale)
                .map_err(|e| e.to_string())?;
            Ok(Arc::new(out))
        }
        other => Err(format!("unsupported output column type: {:?}", other)),
    }
}

fn collect_values<T, F>(values: &[ScalarValue], f: F) -> Result<Vec<Option<T>>, String>
where
    F: Fn(&ScalarValue) -> Option<T>,
{
    let mut out = Vec::with_capacity(values.len());
    for v in values {
        if v.is_null() {
            out.push(None);
            continue;
        }
        match f(v) {
            Some(x) => out.push(Some(x)),
            None => return Err(format!("value {:?} does not fit output column", v)),
        }
    }
    Ok(out)
}

fn downcast<'a, T: 'static>(array: &'a dyn Array, name: &str) -> Result<&'a T, String> {
    array
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| format!("failed to downcast {}", name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_sorts_first_and_equals_null() {
        let null = ScalarValue::Null;
        let one = ScalarValue::Int64(1);
        assert_eq!(compare_scalar_values(&null, &null), Ok(Ordering::Equal));
        assert_eq!(compare_scalar_values(&null, &one), Ok(Ordering::Less));
        assert_eq!(compare_scalar_values(&one, &null), Ok(Ordering::Greater));
    }

    #[test]
    fn round_trip_int64_column() {
        let values = vec![
            ScalarValue::Int64(3),
            ScalarValue::Null,
            ScalarValue::Int64(-7),
        ];
        let arr = build_scalar_array(&DataType::Int64, &values).unwrap();
        assert_eq!(scalar_from_array(arr.as_ref(), 0).unwrap(), values[0]);
        assert_eq!(scalar_from_array(arr.as_ref(), 1).unwrap(), ScalarValue::Null);
        assert_eq!(scalar_from_array(arr.as_ref(), 2).unwrap(), values[2]);
    }
}
