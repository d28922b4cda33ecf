// SPDX-License-Identifier: MPL-2.0

mod controller;
mod source;

pub use controller::{Operation, PagingController, PagingError, PagingEvent};
pub use source::FeedSource;
