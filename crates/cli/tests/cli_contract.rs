use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use std::path::Path;

fn json_lines(stdout: &[u8]) -> Vec<Value> {
    String::from_utf8_lossy(stdout)
        .lines()
        .map(|line| serde_json::from_str(line).expect("each line should be valid json"))
        .collect()
}

fn renders(events: &[Value]) -> Vec<(u64, String)> {
    events
        .iter()
        .filter(|event| event["event"] == "render")
        .map(|event| {
            (
                event["index"].as_u64().expect("index should be a number"),
                event["priority"].as_str().expect("priority should be a string").to_owned(),
            )
        })
        .collect()
}

fn feature(data_dir: &Path, args: &[&str]) -> Value {
    let output = cargo_bin_cmd!("pdf-render-cli")
        .arg("feature")
        .args(args)
        .arg("--data-dir")
        .arg(data_dir)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    serde_json::from_slice(&output).expect("stdout should contain valid json")
}

#[test]
fn window_emits_stable_json_contract() {
    let output = cargo_bin_cmd!("pdf-render-cli")
        .args(["window", "--scroll-offset", "320", "--total-items", "1000"])
        .args(["--item-extent", "150", "--container-extent", "600", "--overscan", "3"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let value: Value = serde_json::from_slice(&output).expect("stdout should contain valid json");
    assert_eq!(value["start"], 0);
    assert_eq!(value["end"], 10);
    assert_eq!(value["count"], 11);
    assert_eq!(value["offset"], 0.0);
    assert_eq!(value["total_extent"], 150_000.0);
}

#[test]
fn window_reports_empty_list_as_null_range() {
    let output = cargo_bin_cmd!("pdf-render-cli")
        .args(["window", "--scroll-offset", "0", "--total-items", "0"])
        .args(["--item-extent", "150", "--container-extent", "600"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let value: Value = serde_json::from_slice(&output).expect("stdout should contain valid json");
    assert_eq!(value["start"], Value::Null);
    assert_eq!(value["count"], 0);
}

#[test]
fn window_fails_for_zero_item_extent() {
    cargo_bin_cmd!("pdf-render-cli")
        .args(["window", "--scroll-offset", "0", "--total-items", "10"])
        .args(["--item-extent", "0", "--container-extent", "600"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("item extent must be finite and positive"));
}

#[test]
fn window_reads_overscan_from_config_file() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let config = temp.path().join("scheduler.toml");
    fs::write(&config, "overscan = 0\n").expect("config should be written");

    let output = cargo_bin_cmd!("pdf-render-cli")
        .arg("--config")
        .arg(&config)
        .args(["window", "--scroll-offset", "1500", "--total-items", "1000"])
        .args(["--item-extent", "150", "--container-extent", "600"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let value: Value = serde_json::from_slice(&output).expect("stdout should contain valid json");
    assert_eq!(value["start"], 10);
    assert_eq!(value["end"], 14);
}

#[test]
fn invalid_config_file_is_rejected() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let config = temp.path().join("scheduler.toml");
    fs::write(&config, "chunk_size = 0\n").expect("config should be written");

    cargo_bin_cmd!("pdf-render-cli")
        .arg("--config")
        .arg(&config)
        .args(["window", "--scroll-offset", "0", "--total-items", "10"])
        .args(["--item-extent", "100", "--container-extent", "300"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to load config"));
}

#[test]
fn simulate_renders_visible_items_before_prefetch() {
    let output = cargo_bin_cmd!("pdf-render-cli")
        .args(["simulate", "--total-items", "20", "--item-extent", "100"])
        .args(["--container-extent", "300", "--overscan", "1", "--scroll", "1000"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let events = json_lines(&output);
    let renders = renders(&events);

    let initial: Vec<(u64, String)> =
        (0..=5).map(|index| (index, "high".to_owned())).chain([(6, "low".to_owned())]).collect();
    assert_eq!(renders[..7], initial[..]);

    let after_scroll: Vec<(u64, String)> = (9..=14)
        .map(|index| (index, "high".to_owned()))
        .chain([(8, "low".to_owned()), (15, "low".to_owned())])
        .collect();
    assert_eq!(renders[7..], after_scroll[..]);

    assert!(events.iter().any(|event| event["event"] == "scroll" && event["offset"] == 1000.0));
}

#[test]
fn simulate_reports_failed_renders() {
    let output = cargo_bin_cmd!("pdf-render-cli")
        .args(["simulate", "--total-items", "10", "--item-extent", "100"])
        .args(["--container-extent", "300", "--overscan", "1", "--scroll", "0"])
        .args(["--fail-item", "2"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let events = json_lines(&output);
    let failure = events
        .iter()
        .find(|event| event["event"] == "failure")
        .expect("a failure event should be emitted");

    assert_eq!(failure["priority"], "high");
    let error = failure["error"].as_str().expect("error should be a string");
    assert!(error.contains("item 2 failed to render"));
    assert!(!renders(&events).iter().any(|(index, _)| *index == 2));
}

#[test]
fn simulate_fails_for_zero_item_extent() {
    cargo_bin_cmd!("pdf-render-cli")
        .args(["simulate", "--total-items", "10", "--item-extent", "0"])
        .args(["--container-extent", "300", "--scroll", "100"])
        .assert()
        .failure()
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("item extent must be finite and positive"));
}

#[test]
fn simulate_builds_thumbnails_on_request() {
    let output = cargo_bin_cmd!("pdf-render-cli")
        .args(["simulate", "--total-items", "25", "--item-extent", "100"])
        .args(["--container-extent", "300", "--scroll", "0,400", "--thumbnails"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let events = json_lines(&output);
    let last = events.last().expect("events should not be empty");
    assert_eq!(last["event"], "thumbnails");
    assert_eq!(last["count"], 25);
}

#[test]
fn feature_switch_persists_in_data_dir() {
    let temp = tempfile::tempdir().expect("temp dir should be created");

    assert_eq!(feature(temp.path(), &["get", "cloudSync"])["enabled"], true);

    let set = feature(temp.path(), &["set", "cloudSync", "--enabled", "false"]);
    assert_eq!(set["feature"], "cloudSync");
    assert_eq!(set["enabled"], false);

    assert_eq!(feature(temp.path(), &["get", "cloudSync"])["enabled"], false);
    assert_eq!(feature(temp.path(), &["get", "ocr"])["enabled"], true);
}

#[test]
fn version_prints_package_version() {
    cargo_bin_cmd!("pdf-render-cli")
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}
