// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Engine module - flow engine adapters.

pub mod http;
pub mod mock;
mod traits;

pub use http::HttpEngine;
pub use mock::MockEngine;
pub use traits::*;
