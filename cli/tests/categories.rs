use anyhow::Result;
use assert_cmd::Command;
use predicates::str::contains;
use pretty_assertions::assert_eq;
use serde_json::Value as JsonValue;

#[test]
fn categories_table_lists_limits_in_order() -> Result<()> {
    Command::cargo_bin("docintake")?
        .arg("categories")
        .assert()
        .success()
        .stdout(contains("1. identity"))
        .stdout(contains("Passport-size Photo"))
        .stdout(contains("up to 2 MiB"))
        .stdout(contains("4. signature"));
    Ok(())
}

#[test]
fn categories_json_exposes_constraints() -> Result<()> {
    let output = Command::cargo_bin("docintake")?
        .args(["categories", "--json"])
        .output()?;
    assert!(output.status.success(), "categories failed: {output:?}");

    let json: JsonValue = serde_json::from_slice(&output.stdout)?;
    let rows = json.as_array().expect("array of categories");
    let ids: Vec<&str> = rows
        .iter()
        .filter_map(|row| row["id"].as_str())
        .collect();
    assert_eq!(ids, vec!["identity", "address", "photo", "signature"]);
    assert_eq!(rows[2]["max_size_bytes"], 2 * 1024 * 1024);
    assert_eq!(
        rows[3]["accepted_media_types"],
        serde_json::json!(["image/jpeg", "image/png"])
    );
    Ok(())
}
