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

//! Behavior tests for the page engine.

use callstream::Result;
use callstream::call_settings::CallSettings;
use callstream::paginator::{PageDescriptor, PageEvent};
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};

fn descriptor() -> PageDescriptor {
    PageDescriptor::new("pageToken", "nextPageToken", "items")
}

fn settings() -> CallSettings<Value> {
    let mut settings = CallSettings::default();
    settings.set_auto_paginate(false);
    settings
}

/// A stub that answers every request with the same page shape, recording
/// the requests it saw.
fn repeating_stub(
    response: Value,
) -> (
    impl FnMut(Value) -> std::future::Ready<Result<Value>> + Send + 'static,
    Arc<Mutex<Vec<Value>>>,
) {
    let requests = Arc::new(Mutex::new(Vec::new()));
    let recorded = requests.clone();
    let call = move |request: Value| {
        recorded.lock().expect("requests lock").push(request);
        std::future::ready(Ok(response.clone()))
    };
    (call, requests)
}

#[tokio::test]
async fn item_sequence_breaks_out_of_endless_empty_pages() -> anyhow::Result<()> {
    // Every page is empty but carries a next-page token; the sequence must
    // terminate cleanly after the eleventh consecutive empty page.
    let (call, requests) = repeating_stub(json!({"items": [], "nextPageToken": "again"}));
    let mut items = descriptor().items(call, json!({}), &settings());
    assert!(items.next().await.is_none());
    assert_eq!(requests.lock().expect("requests lock").len(), 11);
    Ok(())
}

#[tokio::test]
async fn item_sequence_recovers_after_an_empty_page() -> anyhow::Result<()> {
    // A lone empty page in the middle of the collection does not count
    // against later runs of empty pages.
    let responses = vec![
        json!({"items": ["a"], "nextPageToken": "t2"}),
        json!({"items": [], "nextPageToken": "t3"}),
        json!({"items": ["b"], "nextPageToken": ""}),
    ];
    let mut remaining = std::collections::VecDeque::from(responses);
    let call = move |_request: Value| std::future::ready(Result::Ok(remaining.pop_front().expect("a page")));
    let mut items = descriptor().items(call, json!({}), &settings());
    let mut got = Vec::new();
    while let Some(item) = items.next().await {
        got.push(item?);
    }
    assert_eq!(got, vec![json!("a"), json!("b")]);
    Ok(())
}

#[tokio::test]
async fn stream_stops_at_max_results() -> anyhow::Result<()> {
    // Three pages of two resources each, but only three results wanted:
    // exactly three data events, then end, even though a fourth resource
    // was fetched.
    let responses = vec![
        json!({"items": ["a", "b"], "nextPageToken": "t2"}),
        json!({"items": ["c", "d"], "nextPageToken": "t3"}),
        json!({"items": ["e", "f"], "nextPageToken": ""}),
    ];
    let mut remaining = std::collections::VecDeque::from(responses);
    let call = move |_request: Value| std::future::ready(Result::Ok(remaining.pop_front().expect("a page")));
    let mut paging = settings();
    paging.set_max_results(3);
    let mut stream = descriptor().pages(call, json!({}), &paging);
    let mut data = Vec::new();
    let mut ended = false;
    while let Some(event) = stream.next().await {
        match event? {
            PageEvent::Data(item) => data.push(item),
            PageEvent::End => ended = true,
            PageEvent::Response(_) => {}
        }
    }
    assert_eq!(data, vec![json!("a"), json!("b"), json!("c")]);
    assert!(ended);
    Ok(())
}

#[tokio::test]
async fn initial_page_token_applies_to_the_first_request_only() -> anyhow::Result<()> {
    let responses = vec![
        json!({"items": ["a"], "nextPageToken": "fresh"}),
        json!({"items": ["b"], "nextPageToken": ""}),
    ];
    let requests = Arc::new(Mutex::new(Vec::new()));
    let recorded = requests.clone();
    let mut remaining = std::collections::VecDeque::from(responses);
    let call = move |request: Value| {
        recorded.lock().expect("requests lock").push(request);
        std::future::ready(Result::Ok(remaining.pop_front().expect("a page")))
    };
    let mut paging = settings();
    paging.set_page_token("x");
    let got = descriptor().collect(call, json!({}), &paging).await?;
    assert_eq!(got, vec![json!("a"), json!("b")]);
    let requests = requests.lock().expect("requests lock");
    assert_eq!(requests[0], json!({"pageToken": "x"}));
    // Later requests carry the token from the previous page, never the
    // initial one.
    assert_eq!(requests[1], json!({"pageToken": "fresh"}));
    Ok(())
}

#[tokio::test]
async fn stream_emits_one_response_per_page() -> anyhow::Result<()> {
    let responses = vec![
        json!({"items": ["a"], "nextPageToken": "t2"}),
        json!({"items": ["b"], "nextPageToken": ""}),
    ];
    let mut remaining = std::collections::VecDeque::from(responses);
    let call = move |_request: Value| std::future::ready(Result::Ok(remaining.pop_front().expect("a page")));
    let mut stream = descriptor().pages(call, json!({}), &settings());
    let mut responses_seen = 0;
    while let Some(event) = stream.next().await {
        if matches!(event?, PageEvent::Response(_)) {
            responses_seen += 1;
        }
    }
    assert_eq!(responses_seen, 2);
    Ok(())
}
