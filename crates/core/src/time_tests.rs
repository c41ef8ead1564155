// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[parameterized(
    bare_number = { "30", 30_000 },
    seconds = { "30s", 30_000 },
    millis = { "250ms", 250 },
    minutes = { "5m", 300_000 },
    hours = { "2h", 7_200_000 },
    days = { "1d", 86_400_000 },
    whitespace = { " 10 s ", 10_000 },
    zero = { "0s", 0 },
)]
fn parses(input: &str, expected_ms: u64) {
    assert_eq!(
        parse_duration(input).unwrap(),
        Duration::from_millis(expected_ms)
    );
}

#[parameterized(
    empty = { "" },
    suffix_only = { "s" },
    bad_suffix = { "10parsecs" },
    negative = { "-5s" },
)]
fn rejects(input: &str) {
    assert!(parse_duration(input).is_err());
}
