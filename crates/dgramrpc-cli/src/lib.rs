// Copyright 2025 dgramrpc Authors
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

//! # dgramrpc CLI
//!
//! Command-line interface for the dgramrpc UDP RPC system.
//!
//! The `dgramrpc` binary uses `argh` for argument parsing and dispatches to
//! `dgramrpc-server` and `dgramrpc-client`. This library holds the parts of
//! the binary worth testing on their own.
//!
//! ## Key Commands
//!
//! - `dgramrpc serve`: Start a server with the builtin methods
//! - `dgramrpc call`: Make one RPC call (prints the response envelope as JSON)
//! - `dgramrpc smoke`: Exercise every builtin method against a server

pub mod config;
pub mod smoke;
