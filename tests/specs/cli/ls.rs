//! `meow ls` discovery specs.

use crate::prelude::MeowHome;

#[test]
fn empty_dir_lists_nothing_json() {
    let home = MeowHome::new();
    let assert = home.meow().args(["ls", "--json"]).assert().success();
    let stdout = String::from_utf8_lossy(&assert.get_output().stdout).to_string();
    assert_eq!(stdout.trim(), "[]");
}

#[test]
fn lists_workflows_and_collections() {
    let home = MeowHome::new();
    home.workflow("deploy", "[main]\nname = \"deploy\"\n");

    let coll = home.path().join("workflows/backfill");
    std::fs::create_dir_all(&coll).unwrap();
    std::fs::write(coll.join("collection.toml"), "entrypoint = \"entry\"\n").unwrap();
    std::fs::write(coll.join("entry.toml"), "[main]\nname = \"bf\"\n").unwrap();

    let assert = home.meow().args(["ls", "--json"]).assert().success();
    let stdout = String::from_utf8_lossy(&assert.get_output().stdout).to_string();
    let listings: serde_json::Value = serde_json::from_str(&stdout).unwrap();

    assert_eq!(listings.as_array().unwrap().len(), 2);
    assert_eq!(listings[0]["workflow"], "backfill");
    assert_eq!(listings[0]["isCollection"], true);
    assert_eq!(listings[0]["entrypoint"], "entry");
    assert_eq!(listings[1]["workflow"], "deploy");
    assert_eq!(listings[1]["isCollection"], false);
}

#[test]
fn plain_listing_is_human_readable() {
    let home = MeowHome::new();
    home.workflow("deploy", "[main]\nname = \"deploy\"\n");

    let assert = home.meow().arg("ls").assert().success();
    let stdout = String::from_utf8_lossy(&assert.get_output().stdout).to_string();
    assert_eq!(stdout.trim(), "deploy");
}
