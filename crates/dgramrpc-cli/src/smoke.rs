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

//! Smoke test
//!
//! Runs every builtin method once against a live server, plus two calls that
//! must fail (division by zero and an unknown method), and reports which
//! ones behaved.

use std::fmt;

use dgramrpc_client::Client;
use dgramrpc_common::{Params, Status, Value};
use serde_json::json;

/// What a smoke case must get back.
#[derive(Debug, Clone, PartialEq)]
pub enum Expectation {
    /// OK with exactly this result
    Result(Value),
    /// OK with a non-negative integer result
    Timestamp,
    /// ERROR whose message contains this text
    Error(&'static str),
}

#[derive(Debug, Clone)]
pub struct SmokeCase {
    pub method: &'static str,
    pub params: Params,
    pub expect: Expectation,
}

impl SmokeCase {
    fn new(method: &'static str, params: Params, expect: Expectation) -> Self {
        Self {
            method,
            params,
            expect,
        }
    }
}

/// The fixed set of calls made by `dgramrpc smoke`.
pub fn cases() -> Vec<SmokeCase> {
    let ab = |a: i64, b: i64| Params::new().with("a", a).with("b", b);

    vec![
        SmokeCase::new("add", ab(5, 7), Expectation::Result(json!(12))),
        SmokeCase::new("subtract", ab(10, 3), Expectation::Result(json!(7))),
        SmokeCase::new("multiply", ab(4, 6), Expectation::Result(json!(24))),
        SmokeCase::new("divide", ab(15, 3), Expectation::Result(json!(5))),
        SmokeCase::new("divide", ab(5, 0), Expectation::Error("division by zero")),
        SmokeCase::new("get_time", Params::new(), Expectation::Timestamp),
        SmokeCase::new(
            "reverse_string",
            Params::new().with("s", "hello"),
            Expectation::Result(json!("olleh")),
        ),
        SmokeCase::new(
            "echo",
            Params::new().with("test", "data").with("number", 42),
            Expectation::Result(json!({"test": "data", "number": 42})),
        ),
        SmokeCase::new(
            "nonexistent",
            Params::new(),
            Expectation::Error("unknown method: nonexistent"),
        ),
    ]
}

#[derive(Debug, Clone)]
pub struct SmokeOutcome {
    pub method: &'static str,
    pub passed: bool,
    pub detail: String,
}

#[derive(Debug, Clone, Default)]
pub struct SmokeReport {
    pub outcomes: Vec<SmokeOutcome>,
}

impl SmokeReport {
    pub fn passed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.passed).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.passed()
    }

    pub fn all_passed(&self) -> bool {
        self.failed() == 0
    }
}

impl fmt::Display for SmokeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for outcome in &self.outcomes {
            writeln!(
                f,
                "[{}] {:<16} {}",
                if outcome.passed { "PASS" } else { "FAIL" },
                outcome.method,
                outcome.detail
            )?;
        }
        write!(f, "{} passed, {} failed", self.passed(), self.failed())
    }
}

/// Runs every case in order against `client`.
pub async fn run_smoke(client: &Client) -> SmokeReport {
    let mut report = SmokeReport::default();

    for case in cases() {
        let outcome = match client.call(case.method, case.params.clone()).await {
            Ok(response) => judge(
                &case.expect,
                response.status,
                response.result.as_ref(),
                response.error_message.as_deref(),
            ),
            Err(e) => Err(format!("call failed: {}", e)),
        };

        tracing::debug!("smoke {} -> {:?}", case.method, outcome);

        report.outcomes.push(match outcome {
            Ok(detail) => SmokeOutcome {
                method: case.method,
                passed: true,
                detail,
            },
            Err(detail) => SmokeOutcome {
                method: case.method,
                passed: false,
                detail,
            },
        });
    }

    report
}

fn judge(
    expect: &Expectation,
    status: Status,
    result: Option<&Value>,
    error: Option<&str>,
) -> Result<String, String> {
    match (expect, status) {
        (Expectation::Result(want), Status::Ok) => match result {
            Some(got) if got == want => Ok(format!("= {}", got)),
            Some(got) => Err(format!("expected {}, got {}", want, got)),
            None => Err("OK without a result".to_string()),
        },
        (Expectation::Timestamp, Status::Ok) => match result.and_then(Value::as_u64) {
            Some(secs) => Ok(format!("= {}", secs)),
            None => Err(format!("expected Unix seconds, got {:?}", result)),
        },
        (Expectation::Error(want), Status::Error) => match error {
            Some(msg) if msg.contains(want) => Ok(format!("error: {}", msg)),
            other => Err(format!("expected error '{}', got {:?}", want, other)),
        },
        (_, status) => Err(format!(
            "unexpected {} response ({})",
            status,
            error.unwrap_or("no message")
        )),
    }
}
