// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Dotted-path access to [serde_json::Value] trees.
//!
//! Page descriptors name request and response fields by path, e.g.
//! `"response.nextPageToken"` names `value["response"]["nextPageToken"]`.

use serde_json::Value;

/// Returns the value at `path`, if every segment exists.
pub(crate) fn get<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(value, |v, key| v.as_object()?.get(key))
}

/// Sets the value at `path`, creating intermediate objects as needed.
///
/// Non-object values along the path are replaced by objects.
pub(crate) fn set(value: &mut Value, path: &str, new: Value) {
    match path.split_once('.') {
        Some((head, rest)) => set(entry(value, head), rest, new),
        None => *entry(value, path) = new,
    }
}

fn entry<'a>(value: &'a mut Value, key: &str) -> &'a mut Value {
    if !value.is_object() {
        *value = Value::Object(serde_json::Map::new());
    }
    value
        .as_object_mut()
        .expect("value was just replaced with an object")
        .entry(key.to_string())
        .or_insert(Value::Null)
}
