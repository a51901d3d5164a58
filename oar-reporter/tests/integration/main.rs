// Copyright (c) The oar Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

mod client;
mod fake_service;
mod logs;
mod session;
