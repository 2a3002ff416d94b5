//! End-to-end tests for the hopstats binary.
//!
//! These run the built binary with records on stdin and verify the JSON it
//! writes to stdout.

use serde_json::Value;
use std::io::Write;
use std::process::{Command, Stdio};

const LIVE_INPUT: &str = r#"{"iteration":1,"ttl":1,"success":false}
{"iteration":1,"ttl":1,"success":false}
{"iteration":1,"ttl":1,"success":false}
{"iteration":1,"ttl":1,"success":true,"ip":"1.1.1.1","host":"one.one.one.one","rtt_ms":5}
not a record
{"iteration":2,"ttl":0,"success":true,"ip":"9.9.9.9","rtt_ms":1}
{"iteration":2,"ttl":2,"success":false}
{"iteration":2,"ttl":2,"success":false}
{"iteration":2,"ttl":2,"success":true,"ip":"2.2.2.2","rtt_ms":3}
{"iteration":2,"ttl":2,"success":true,"ip":"2.2.2.3","rtt_ms":4}
"#;

fn run_hopstats(args: &[&str], stdin: &str) -> Result<String, String> {
    let mut child = Command::new(env!("CARGO_BIN_EXE_hopstats"))
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| format!("Failed to spawn hopstats: {}", e))?;

    child
        .stdin
        .take()
        .ok_or("stdin not captured")?
        .write_all(stdin.as_bytes())
        .map_err(|e| format!("Failed to write stdin: {}", e))?;

    let output = child
        .wait_with_output()
        .map_err(|e| format!("Failed to wait for hopstats: {}", e))?;
    if !output.status.success() {
        return Err(format!(
            "hopstats exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr)
        ));
    }
    String::from_utf8(output.stdout).map_err(|e| e.to_string())
}

#[test]
fn test_live_final_snapshot() {
    let stdout = run_hopstats(&["live", "--min-interval-ms", "60000"], LIVE_INPUT).unwrap();
    let snapshots: Vec<Value> = stdout
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();

    // One immediate emission for the first record, one forced on completion.
    assert_eq!(snapshots.len(), 2);
    let last = snapshots.last().unwrap();
    assert_eq!(last["iteration"], 2);

    let stats = last["stats"].as_array().unwrap();
    assert_eq!(stats.len(), 4);

    assert_eq!(stats[0]["hop"], 1);
    assert_eq!(stats[0]["address"], "1.1.1.1");
    assert_eq!(stats[0]["sent"], 4);
    assert_eq!(stats[0]["loss_count"], 3);
    assert_eq!(stats[0]["received"], 1);
    assert_eq!(stats[0]["failure_type"], "all_timeout");

    assert_eq!(stats[1]["hop"], 2);
    assert_eq!(stats[1]["address"], "");
    assert_eq!(stats[1]["sent"], 2);
    assert_eq!(stats[2]["address"], "2.2.2.2");
    assert_eq!(stats[3]["address"], "2.2.2.3");
}

#[test]
fn test_group_summary() {
    let input = r#"[
        {"ttl":3,"success":false},
        {"ttl":3,"ip":"10.0.3.1","host":"a.example","success":true,"rtt_ms":2},
        {"ttl":3,"ip":"10.0.3.9","host":"A.example","success":true,"rtt_ms":4},
        {"ttl":3,"ip":"10.0.3.7","success":true,"rtt_ms":6}
    ]"#;
    let stdout = run_hopstats(&["group", "--summary"], input).unwrap();
    let hops: Value = serde_json::from_str(&stdout).unwrap();
    let hops = hops.as_array().unwrap();
    assert_eq!(hops.len(), 1);
    assert_eq!(hops[0]["hop"], 3);

    let groups = hops[0]["groups"].as_array().unwrap();
    assert_eq!(groups.len(), 2);
    assert_eq!(groups[0]["address"], "10.0.3.1");
    assert_eq!(groups[0]["sent"], 3);
    assert_eq!(groups[0]["received"], 2);
    assert_eq!(groups[1]["address"], "10.0.3.7");
}

#[test]
fn test_group_attempts() {
    let input = "{\"ttl\":1,\"success\":false}\n{\"ttl\":1,\"success\":false}\n";
    let stdout = run_hopstats(&["group"], input).unwrap();
    let hops: Value = serde_json::from_str(&stdout).unwrap();
    let groups = hops[0]["groups"].as_array().unwrap();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0]["address"], "");
    assert_eq!(groups[0]["attempts"].as_array().unwrap().len(), 2);
}

#[test]
fn test_rejects_zero_interval() {
    let err = run_hopstats(&["live", "--min-interval-ms", "0"], "").unwrap_err();
    assert!(err.contains("Invalid minimum render interval"));
}
