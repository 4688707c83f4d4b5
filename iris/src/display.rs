//! Text renderings of API results for terminal output.

use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use serde_json::Value;

use crate::date::usecs_to_date;
use crate::error::Result;
use crate::session::ClusterRef;
use crate::versions::SnapshotDescriptor;

fn pretty(value: &Value) -> Result<String> {
    let mut buf = Vec::new();
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, PrettyFormatter::with_indent(b"    "));
    value.serialize(&mut ser)?;
    // serde_json only ever emits UTF-8
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Pretty JSON with sorted keys; arrays render one element after the other.
pub fn display(value: &Value) -> Result<String> {
    match value {
        Value::Array(items) => {
            let rendered = items.iter().map(pretty).collect::<Result<Vec<_>>>()?;
            Ok(rendered.join("\n"))
        }
        other => pretty(other),
    }
}

/// Flattens `value` into `path = leaf` lines, e.g. `doc['versions'][0]['snapshotTimestampUsecs'] = 1`.
///
/// With `search`, only lines whose path or string value contains it (ignoring case) are kept.
pub fn show_props(value: &Value, parent: &str, search: Option<&str>) -> Vec<String> {
    let needle = search.map(str::to_lowercase);
    let mut lines = Vec::new();
    collect_props(value, parent.to_string(), needle.as_deref(), &mut lines);
    lines
}

fn collect_props(value: &Value, path: String, needle: Option<&str>, lines: &mut Vec<String>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                collect_props(child, format!("{path}['{key}']"), needle, lines);
            }
        }
        Value::Array(items) => {
            for (i, child) in items.iter().enumerate() {
                collect_props(child, format!("{path}[{i}]"), needle, lines);
            }
        }
        leaf => {
            let text = match leaf {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            let keep = match needle {
                None => true,
                Some(needle) => {
                    path.to_lowercase().contains(needle)
                        || (leaf.is_string() && text.to_lowercase().contains(needle))
                }
            };
            if keep {
                lines.push(format!("{path} = {text}"));
            }
        }
    }
}

pub fn cluster_table(clusters: &[&ClusterRef]) -> String {
    let mut out = format!("\n{:<20}{:<36}{}\n", "ClusterID", "SoftwareVersion", "ClusterName");
    out.push_str(&format!("{:<20}{:<36}{}\n", "---------", "---------------", "-----------"));
    for cluster in clusters {
        out.push_str(&format!(
            "{:<20}{:<36}{}\n",
            cluster.id, cluster.software_version, cluster.name
        ));
    }
    out
}

pub fn version_table(snapshots: &[SnapshotDescriptor]) -> String {
    let mut out = format!("{:>10}  {}\n", "runId", "runDate");
    out.push_str(&format!("{:>10}  {}\n", "-----", "-------"));
    for snapshot in snapshots {
        out.push_str(&format!(
            "{:>10}  {}\n",
            snapshot.run_instance_id,
            usecs_to_date(snapshot.job_start_time_usecs)
        ));
    }
    out
}

/// Banner printed before the file list of one run.
pub fn run_header(snapshot: &SnapshotDescriptor) -> String {
    format!(
        "\n==============================\n   runId: {}\n runDate: {}\n==============================\n",
        snapshot.run_instance_id,
        usecs_to_date(snapshot.job_start_time_usecs)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn display_sorts_keys_and_indents() {
        let text = display(&json!({"b": 1, "a": [true]})).unwrap();
        assert_eq!(text, "{\n    \"a\": [\n        true\n    ],\n    \"b\": 1\n}");
    }

    #[test]
    fn display_splits_arrays() {
        let text = display(&json!([{"x": 1}, {"y": 2}])).unwrap();
        assert_eq!(text, "{\n    \"x\": 1\n}\n{\n    \"y\": 2\n}");
    }

    #[test]
    fn show_props_flattens_and_filters() {
        let value = json!({"name": "vm1", "versions": [{"runId": 5}], "job": "Nightly"});
        assert_eq!(
            show_props(&value, "doc", None),
            vec![
                "doc['job'] = Nightly",
                "doc['name'] = vm1",
                "doc['versions'][0]['runId'] = 5",
            ]
        );
        assert_eq!(show_props(&value, "doc", Some("RUNID")), vec!["doc['versions'][0]['runId'] = 5"]);
        assert_eq!(show_props(&value, "doc", Some("night")), vec!["doc['job'] = Nightly"]);
    }

    #[test]
    fn cluster_table_layout() {
        let c = ClusterRef {
            id: "123".into(),
            name: "alpha".into(),
            software_version: "6.5".into(),
            connected: true,
        };
        let table = cluster_table(&[&c]);
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines[0], "");
        assert!(lines[1].starts_with("ClusterID           SoftwareVersion"));
        assert!(lines[3].starts_with("123                 6.5"));
        assert!(lines[3].ends_with("alpha"));
    }
}
