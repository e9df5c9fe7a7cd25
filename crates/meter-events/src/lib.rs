// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod api_client;
pub mod backend;
pub mod buffer;
pub mod config;
pub mod errors;
pub mod event;
pub mod factory;
pub mod key;
pub mod local_dir;
pub mod logger;
pub mod payload;
pub mod retry;
pub mod writer;
