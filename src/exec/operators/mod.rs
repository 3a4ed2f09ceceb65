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
//! Execution operator module exports.
//!
//! Responsibilities:
//! - Registers the window operator factories and their supporting
//!   evaluation machinery.
//! - Provides a stable import surface for operator construction.

pub(crate) mod window_evaluator;
pub mod window_segment_tree;
pub mod window_shared;
mod window_sink;
mod window_source;

pub use window_segment_tree::WindowSegmentTree;
pub use window_shared::WindowSharedState;
pub use window_sink::WindowSinkFactory;
pub use window_source::WindowSourceFactory;
