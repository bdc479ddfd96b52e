// Copyright 2025 Caseboard (https://github.com/caseboard)
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use thiserror::Error;

/// Rejections at the mutation boundary. These are surfaced to the caller
/// synchronously; no mutation record is emitted for a rejected operation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GraphError {
    #[error("node {id} already exists")]
    DuplicateNode { id: String },

    #[error("node {id} not found")]
    UnknownNode { id: String },

    #[error("edge endpoint {id} not found")]
    MissingEndpoint { id: String },

    #[error("edge endpoints belong to different cases ({source_case} vs {target_case})")]
    CrossCaseEdge {
        source_case: String,
        target_case: String,
    },
}
