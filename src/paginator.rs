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

//! Turns page-token RPCs into lists, item sequences, and event streams.
//!
//! When listing large collections, services break the response into
//! "pages". Each page contains a limited number of resources and a token to
//! request the next page; the caller repeats the RPC with the token from
//! the previous page until the token runs out.
//!
//! A [PageDescriptor] names the token and resource fields of a paged RPC by
//! dotted path, and offers three ways to consume the pages given a unary
//! call (an async function from request to response, both
//! [serde_json::Value] trees):
//!
//! - [collect][PageDescriptor::collect] gathers every resource eagerly;
//! - [items][PageDescriptor::items] yields one resource per `next()`,
//!   fetching pages lazily;
//! - [pages][PageDescriptor::pages] is an event stream, one
//!   [PageEvent::Response] per page and one [PageEvent::Data] per resource,
//!   terminated by [PageEvent::End].
//!
//! # Example: iterate over each item of a list operation
//! ```
//! # use callstream::{paginator::PageDescriptor, call_settings::CallSettings, Result};
//! use serde_json::json;
//! # tokio_test::block_on(async {
//! let descriptor = PageDescriptor::new("pageToken", "nextPageToken", "items");
//! let call = |_request| async move {
//!     Result::Ok(json!({"items": ["a", "b"], "nextPageToken": ""}))
//! };
//! let settings = CallSettings::default();
//! let mut items = descriptor.items(call, json!({}), &settings);
//! while let Some(item) = items.next().await {
//!     let item = item?;
//!     println!("  item = {item}");
//! }
//! # Result::<()>::Ok(()) });
//! ```

use crate::Result;
use crate::call_settings::CallSettings;
use crate::field_path;
use crate::warnings::{Warning, WarningCategory, warn_once};
use futures::stream::unfold;
use futures::{Stream, StreamExt};
use pin_project::pin_project;
use serde_json::Value;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;

/// Consecutive zero-resource pages tolerated before giving up.
///
/// A conforming service may return empty pages with a next-page token, but
/// an endless run of them would poll forever. The sequence ends cleanly
/// once this bound is passed.
pub const MAX_EMPTY_PAGES: u32 = 10;

/// An event produced by [PageDescriptor::pages].
#[derive(Clone, Debug, PartialEq)]
pub enum PageEvent {
    /// The raw response for one page.
    Response(Value),
    /// One resource out of the current page.
    Data(Value),
    /// The end of the sequence; emitted exactly once.
    End,
}

type BoxCall = Box<dyn FnMut(Value) -> Pin<Box<dyn Future<Output = Result<Value>> + Send>> + Send>;

fn autopaginate_warning() -> Warning {
    Warning::new(
        "autopaginate_true",
        WarningCategory::Behavior,
        "autoPaginate is always disabled for lazy paging surfaces; iterate the returned sequence instead.",
    )
}

/// Describes the paging fields of one RPC method.
///
/// Descriptors are built per method at stub initialization, and shared
/// across calls.
#[derive(Clone, Debug, PartialEq)]
pub struct PageDescriptor {
    request_page_token_field: String,
    response_page_token_field: String,
    resource_field: String,
}

impl PageDescriptor {
    /// Creates a descriptor from the three field paths.
    pub fn new<A, B, C>(
        request_page_token_field: A,
        response_page_token_field: B,
        resource_field: C,
    ) -> Self
    where
        A: Into<String>,
        B: Into<String>,
        C: Into<String>,
    {
        Self {
            request_page_token_field: request_page_token_field.into(),
            response_page_token_field: response_page_token_field.into(),
            resource_field: resource_field.into(),
        }
    }

    /// The resources of one page.
    ///
    /// An array field yields its elements. A map field yields one
    /// `[key, value]` pair per entry. A missing field yields nothing.
    fn resources(&self, response: &Value) -> Vec<Value> {
        match field_path::get(response, &self.resource_field) {
            Some(Value::Array(items)) => items.clone(),
            Some(Value::Object(map)) => map
                .iter()
                .map(|(k, v)| Value::Array(vec![Value::String(k.clone()), v.clone()]))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// The request for the page after `response`, if there is one.
    fn next_request(&self, request: &Value, response: &Value) -> Option<Value> {
        let token = field_path::get(response, &self.response_page_token_field)?.as_str()?;
        if token.is_empty() {
            return None;
        }
        let mut next = request.clone();
        field_path::set(
            &mut next,
            &self.request_page_token_field,
            Value::String(token.to_string()),
        );
        Some(next)
    }

    /// Seeds the first request from the call settings.
    ///
    /// The settings' page token applies to the first page only; every later
    /// request carries the token from the previous response.
    fn seed_request(&self, mut request: Value, settings: &CallSettings<Value>) -> Value {
        if let Some(token) = settings.page_token() {
            field_path::set(
                &mut request,
                &self.request_page_token_field,
                Value::String(token.to_string()),
            );
        }
        request
    }

    /// Gathers every resource across all pages into one list.
    pub async fn collect<F, Fut>(
        &self,
        mut call: F,
        request: Value,
        settings: &CallSettings<Value>,
    ) -> Result<Vec<Value>>
    where
        F: FnMut(Value) -> Fut,
        Fut: Future<Output = Result<Value>>,
    {
        let mut items = Vec::new();
        let mut next = Some(self.seed_request(request, settings));
        while let Some(request) = next {
            let response = call(request.clone()).await?;
            items.extend(self.resources(&response));
            if let Some(limit) = settings.max_results() {
                if items.len() >= limit {
                    items.truncate(limit);
                    break;
                }
            }
            next = self.next_request(&request, &response);
        }
        Ok(items)
    }

    /// Returns a sequence yielding one resource per `next()`.
    pub fn items<F, Fut>(
        &self,
        mut call: F,
        request: Value,
        settings: &CallSettings<Value>,
    ) -> ItemIterator
    where
        F: FnMut(Value) -> Fut + Send + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        if settings.auto_paginate() {
            warn_once(&autopaginate_warning());
        }
        ItemIterator {
            descriptor: self.clone(),
            call: Box::new(move |request| Box::pin(call(request))),
            cache: VecDeque::new(),
            next_request: Some(self.seed_request(request, settings)),
            empty_pages: 0,
            done: false,
        }
    }

    /// Returns the event stream over pages and resources.
    ///
    /// The stream is lazy: the first upstream call is issued when the
    /// stream is first polled, and a consumer that stops polling holds the
    /// next page request without dispatching it.
    pub fn pages<F, Fut>(
        &self,
        mut call: F,
        request: Value,
        settings: &CallSettings<Value>,
    ) -> PageStream
    where
        F: FnMut(Value) -> Fut + Send + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        if settings.auto_paginate() {
            warn_once(&autopaginate_warning());
        }
        let state = PageStreamState {
            descriptor: self.clone(),
            call: Box::new(move |request| Box::pin(call(request))),
            next_request: Some(self.seed_request(request, settings)),
            buffered: VecDeque::new(),
            remaining: settings.max_results(),
            done: false,
        };
        let stream = unfold(state, |mut s| async move {
            loop {
                if let Some(event) = s.buffered.pop_front() {
                    return Some((Ok(event), s));
                }
                if s.done {
                    return None;
                }
                let Some(request) = s.next_request.take() else {
                    s.done = true;
                    return Some((Ok(PageEvent::End), s));
                };
                let response = match (s.call)(request.clone()).await {
                    Ok(response) => response,
                    Err(e) => {
                        s.done = true;
                        return Some((Err(e), s));
                    }
                };
                s.buffered.push_back(PageEvent::Response(response.clone()));
                for item in s.descriptor.resources(&response) {
                    if item.is_null() {
                        continue;
                    }
                    if let Some(remaining) = s.remaining.as_mut() {
                        if *remaining == 0 {
                            break;
                        }
                        *remaining -= 1;
                    }
                    s.buffered.push_back(PageEvent::Data(item));
                }
                s.next_request = if s.remaining == Some(0) {
                    None
                } else {
                    s.descriptor.next_request(&request, &response)
                };
            }
        });
        PageStream {
            stream: Box::pin(stream),
        }
    }
}

struct PageStreamState {
    descriptor: PageDescriptor,
    call: BoxCall,
    next_request: Option<Value>,
    buffered: VecDeque<PageEvent>,
    remaining: Option<usize>,
    done: bool,
}

/// Yields one resource per `next()`, fetching pages as needed.
pub struct ItemIterator {
    descriptor: PageDescriptor,
    call: BoxCall,
    cache: VecDeque<Value>,
    next_request: Option<Value>,
    empty_pages: u32,
    done: bool,
}

impl ItemIterator {
    /// Returns the next resource, or `None` at the end of the collection.
    pub async fn next(&mut self) -> Option<Result<Value>> {
        loop {
            if let Some(item) = self.cache.pop_front() {
                return Some(Ok(item));
            }
            if self.done {
                return None;
            }
            let Some(request) = self.next_request.take() else {
                self.done = true;
                return None;
            };
            let response = match (self.call)(request.clone()).await {
                Ok(response) => response,
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            };
            let items = self.descriptor.resources(&response);
            if items.is_empty() {
                self.empty_pages += 1;
                if self.empty_pages > MAX_EMPTY_PAGES {
                    self.done = true;
                    return None;
                }
            } else {
                self.empty_pages = 0;
            }
            self.next_request = self.descriptor.next_request(&request, &response);
            self.cache.extend(items);
        }
    }
}

impl std::fmt::Debug for ItemIterator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ItemIterator")
            .field("descriptor", &self.descriptor)
            .field("cached", &self.cache.len())
            .field("done", &self.done)
            .finish()
    }
}

/// The event stream returned by [PageDescriptor::pages].
#[pin_project]
pub struct PageStream {
    #[pin]
    stream: Pin<Box<dyn Stream<Item = Result<PageEvent>> + Send>>,
}

impl PageStream {
    /// Returns the next event of the wrapped stream.
    pub async fn next(&mut self) -> Option<Result<PageEvent>> {
        self.stream.next().await
    }
}

impl Stream for PageStream {
    type Item = Result<PageEvent>;

    fn poll_next(
        self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Option<Self::Item>> {
        self.project().stream.poll_next(cx)
    }
}

impl std::fmt::Debug for PageStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageStream").finish()
    }
}
