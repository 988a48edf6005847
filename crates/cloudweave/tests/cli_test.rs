mod common;

use common::Workspace;
use predicates::prelude::*;

const DNS_REMOTE: &str = r#"[
  {"dns_name": "@", "dns_type": "NS", "dns_value": "ns1.example.net", "ttl": 600, "external_id": "r-1"},
  {"dns_name": "@", "dns_type": "NS", "dns_value": "ns2.example.net", "ttl": 600, "external_id": "r-2"},
  {"dns_name": "@", "dns_type": "MX", "dns_value": "mx1.example.net", "ttl": 600, "mx_priority": 10, "external_id": "r-3"},
  {"dns_name": "@", "dns_type": "MX", "dns_value": "mx2.example.net", "ttl": 600, "mx_priority": 20, "external_id": "r-4"},
  {"dns_name": "www", "dns_type": "CNAME", "dns_value": "web.example.net", "ttl": 600, "external_id": "r-5"}
]"#;

const DNS_LOCAL: &str = r#"[
  {"dns_name": "@", "dns_type": "NS", "dns_value": "ns1.example.net", "ttl": 600},
  {"dns_name": "@", "dns_type": "NS", "dns_value": "ns2.example.net", "ttl": 600},
  {"dns_name": "@", "dns_type": "MX", "dns_value": "mx1.example.net", "ttl": 600, "mx_priority": 10},
  {"dns_name": "www", "dns_type": "CNAME", "dns_value": "web.example.net", "ttl": 600}
]"#;

#[test]
fn test_cli_help() {
    let ws = Workspace::new();
    ws.weave()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("diff"))
        .stdout(predicate::str::contains("reconcile"))
        .stdout(predicate::str::contains("providers"));
}

#[test]
fn test_cli_version() {
    let ws = Workspace::new();
    ws.weave()
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains("cloudweave"));
}

#[test]
fn test_invalid_command() {
    let ws = Workspace::new();
    ws.weave().arg("invalid-command").assert().failure();
}

#[test]
fn test_providers_lists_builtins() {
    let ws = Workspace::new();
    ws.weave()
        .arg("providers")
        .assert()
        .success()
        .stdout(predicate::str::contains("aliyun (Alibaba Cloud)"))
        .stdout(predicate::str::contains("priority 100..4096 ascending"))
        .stdout(predicate::str::contains("allow rules only"));
}

#[test]
fn test_providers_reads_profile_file() {
    let ws = Workspace::new();
    ws.write(
        "weave.kdl",
        r#"
provider "lab" {
    display-name "Lab Cloud"
    security-group min=1 max=10
}
provider "azure" {
    security-group max=2000
}
"#,
    );
    ws.weave()
        .arg("providers")
        .assert()
        .success()
        .stdout(predicate::str::contains("lab (Lab Cloud)"))
        .stdout(predicate::str::contains("priority 100..2000 ascending"));
}

#[test]
fn test_broken_profile_file_fails() {
    let ws = Workspace::new();
    ws.write("weave.kdl", "provider \"lab\" {");
    ws.weave()
        .arg("providers")
        .assert()
        .failure()
        .stderr(predicate::str::contains("weave.kdl"));
}

#[test]
fn test_diff_secgroup_adds_rule() {
    let ws = Workspace::new();
    ws.write("local.yaml", "- in:allow 10.0.0.0/8 tcp 22\n");
    ws.write("sg-1.json", "[]");

    ws.weave()
        .args(["diff", "secgroup", "--provider", "aliyun"])
        .args(["--local", "local.yaml", "--remote", "sg-1.json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("security-group sg-1 on aliyun"))
        .stdout(predicate::str::contains("+ in:allow 10.0.0.0/8 tcp 22"))
        .stdout(predicate::str::contains("1 to create, 0 to update, 0 to delete"));
}

#[test]
fn test_diff_secgroup_json() {
    let ws = Workspace::new();
    ws.write("local.json", r#"["in:allow 10.0.0.0/8 tcp 22"]"#);
    ws.write(
        "remote.json",
        r#"[{"rule": "in:allow tcp 3389", "priority": 10, "external_id": "r-7"}]"#,
    );

    let output = ws
        .weave()
        .args(["diff", "secgroup", "-p", "aliyun", "-l", "local.json", "-r", "remote.json"])
        .arg("--json")
        .output()
        .unwrap();
    assert!(output.status.success());

    let diff: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let adds = diff["in_adds"].as_array().unwrap();
    assert_eq!(adds.len(), 1);
    let priority = adds[0]["priority"].as_i64().unwrap();
    assert!((1..=100).contains(&priority));
    assert_eq!(diff["in_dels"][0]["external_id"], "r-7");
    assert!(diff["out_adds"].as_array().unwrap().is_empty());
}

#[test]
fn test_diff_secgroup_requires_provider() {
    let ws = Workspace::new();
    ws.write("local.json", "[]");
    ws.write("remote.json", "[]");
    ws.weave()
        .args(["diff", "secgroup", "--local", "local.json", "--remote", "remote.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--provider is required"));
}

#[test]
fn test_diff_unknown_provider() {
    let ws = Workspace::new();
    ws.write("local.json", "[]");
    ws.write("remote.json", "[]");
    ws.weave()
        .args(["diff", "secgroup", "--provider", "nowhere"])
        .args(["--local", "local.json", "--remote", "remote.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Provider not found: nowhere"));
}

#[test]
fn test_diff_rejects_unknown_format() {
    let ws = Workspace::new();
    ws.write("local.toml", "");
    ws.write("remote.json", "[]");
    ws.weave()
        .args(["diff", "dns", "--local", "local.toml", "--remote", "remote.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unsupported snapshot format"));
}

#[test]
fn test_diff_dns_removes_stale_record() {
    let ws = Workspace::new();
    ws.write("local.json", DNS_LOCAL);
    ws.write("example.com.json", DNS_REMOTE);

    ws.weave()
        .args(["diff", "dns", "--local", "local.json", "--remote", "example.com.json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("dns-zone example.com"))
        .stdout(predicate::str::contains("- MX-@-mx2.example.net"))
        .stdout(predicate::str::contains("0 to create, 0 to update, 1 to delete, 4 unchanged"));
}

#[test]
fn test_diff_access_group() {
    let ws = Workspace::new();
    ws.write(
        "local.json",
        r#"[
  {"rw_access_type": "RW", "user_access_type": "no_root_squash", "source": "10.0.0.0/8"},
  {"rw_access_type": "R", "user_access_type": "all_squash", "source": "0.0.0.0/0"}
]"#,
    );
    ws.write("nas-1.json", "[]");

    let output = ws
        .weave()
        .args(["diff", "access-group", "--provider", "huawei"])
        .args(["--local", "local.json", "--remote", "nas-1.json", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    // huawei has no all_squash
    let diff: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let added = diff["added"].as_array().unwrap();
    assert_eq!(added.len(), 1);
    assert_eq!(added[0]["source"], "10.0.0.0/8");
}

#[test]
fn test_diff_access_group_caps_snapshot_types() {
    let ws = Workspace::new();
    ws.write(
        "local.json",
        r#"[
  {"rw_access_type": "RW", "user_access_type": "no_root_squash", "source": "10.0.0.0/8"},
  {"rw_access_type": "R", "user_access_type": "all_squash", "source": "0.0.0.0/0"}
]"#,
    );
    ws.write(
        "nas-1.json",
        r#"{"min_priority": 1, "max_priority": 400,
  "supported_user_access_types": ["all_squash", "root_squash", "no_root_squash"],
  "rules": []}"#,
    );

    let output = ws
        .weave()
        .args(["diff", "access-group", "--provider", "huawei"])
        .args(["--local", "local.json", "--remote", "nas-1.json", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let diff: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let added = diff["added"].as_array().unwrap();
    assert_eq!(added.len(), 1);
    assert_eq!(added[0]["user_access_type"], "no_root_squash");
}

#[test]
fn test_reconcile_then_in_sync() {
    let ws = Workspace::new();
    ws.write(
        "local.yaml",
        "- in:allow 10.0.0.0/8 tcp 22\n- in:allow tcp 443\n- out:deny udp 53\n",
    );
    ws.write(
        "sg-1.yaml",
        "- rule: in:allow tcp 3389\n  priority: 10\n  external_id: r-7\n",
    );

    ws.weave()
        .args(["reconcile", "secgroup", "--provider", "qcloud"])
        .args(["--local", "local.yaml", "--remote", "sg-1.yaml"])
        .args(["--write", "converged.json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("3 to create, 0 to update, 1 to delete"))
        .stdout(predicate::str::contains("4 applied, 0 failed after 1 attempt(s)"));

    assert!(ws.path("converged.json").exists());

    ws.weave()
        .args(["diff", "secgroup", "--provider", "qcloud"])
        .args(["--local", "local.yaml", "--remote", "converged.json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("In sync"))
        .stdout(predicate::str::contains("3 unchanged"));
}

#[test]
fn test_reconcile_dns_fits_ttl() {
    let ws = Workspace::new();
    ws.write(
        "local.json",
        r#"[{"dns_name": "www", "dns_type": "A", "dns_value": "10.0.0.1", "ttl": 30}]"#,
    );
    ws.write("zone.json", "[]");

    ws.weave()
        .args(["reconcile", "dns", "--provider", "aliyun"])
        .args(["--local", "local.json", "--remote", "zone.json", "--write", "zone.json"])
        .assert()
        .success();

    let zone: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(ws.path("zone.json")).unwrap()).unwrap();
    assert_eq!(zone[0]["ttl"], 600);
    assert_eq!(zone[0]["external_id"], "dns-zone-1");
}
