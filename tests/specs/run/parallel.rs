//! Independent steps run concurrently: three one-second sleeps joined by a
//! fourth step finish well under their serial sum.

use crate::prelude::MeowHome;
use serial_test::serial;
use std::time::{Duration, Instant};

#[test]
#[serial]
fn three_parallel_sleeps_beat_serial_time() {
    let home = MeowHome::new();
    home.workflow(
        "sleepy",
        r#"
[main]
name = "sleepy"

[[main.steps]]
id = "one"
executor = "shell"
command = "sleep 1"

[[main.steps]]
id = "two"
executor = "shell"
command = "sleep 1"

[[main.steps]]
id = "three"
executor = "shell"
command = "sleep 1"

[[main.steps]]
id = "join"
executor = "shell"
command = "true"
needs = ["one", "two", "three"]
"#,
    );

    let started = Instant::now();
    home.meow().args(["run", "sleepy"]).assert().success();
    let elapsed = started.elapsed();

    assert!(
        elapsed < Duration::from_millis(1500),
        "three parallel 1s sleeps took {:?}",
        elapsed
    );
}
