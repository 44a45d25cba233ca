//! Region report: the persisted artifact and its text summary
//!
//! The artifact is one JSON object keyed by region name:
//!
//! ```json
//! {
//!   "R": {
//!     "length": 400,
//!     "start": 0,
//!     "tree": { "f": { "length": 50, "children": {} } }
//!   }
//! }
//! ```

use crate::call_tree::{CallTree, CallTreeNode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write as _;

/// Output record for one region name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionRecord {
    /// Absolute end minus absolute start
    pub length: i64,
    /// Offset of the region start from the workflow start
    pub start: i64,
    /// Inclusive-time call tree of everything completed inside the region
    pub tree: CallTree,
}

/// Every region's record, keyed by region name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegionReport {
    regions: BTreeMap<String, RegionRecord>,
}

impl RegionReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, record: RegionRecord) {
        self.regions.insert(name.into(), record);
    }

    pub fn get(&self, name: &str) -> Option<&RegionRecord> {
        self.regions.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &RegionRecord)> {
        self.regions.iter().map(|(name, record)| (name.as_str(), record))
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Pretty-printed JSON, as written to disk
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Render an indented per-region tree summary
    pub fn render_summary(&self) -> String {
        let mut out = String::new();

        if self.regions.is_empty() {
            out.push_str("\nNo regions declared.\n");
            return out;
        }

        out.push_str("\n╔════════════════════════════════════════════════════════════════════════════════╗\n");
        out.push_str("║  Region Call Trees (inclusive time)                                           ║\n");
        out.push_str("╚════════════════════════════════════════════════════════════════════════════════╝\n");

        for (name, record) in &self.regions {
            let _ = writeln!(
                out,
                "\nRegion {}  (start {}, length {})",
                name, record.start, record.length
            );
            let _ = writeln!(out, "{:<60} {:>12} {:>8}", "Call", "Time", "Share");
            let _ = writeln!(out, "{}", "─".repeat(82));

            if record.tree.is_empty() {
                out.push_str("  (no completed calls)\n");
                continue;
            }

            for (label, node) in record.tree.roots() {
                render_node(&mut out, label, node, 0, record.length);
            }
        }

        out
    }

    /// Print the summary to stderr
    pub fn print_summary(&self) {
        eprint!("{}", self.render_summary());
    }
}

fn render_node(out: &mut String, label: &str, node: &CallTreeNode, depth: usize, region_length: i64) {
    let indented = format!("{}{}", "  ".repeat(depth + 1), label);
    let share = if region_length > 0 {
        format!("{:.1}%", node.length as f64 * 100.0 / region_length as f64)
    } else {
        "-".to_string()
    };
    let _ = writeln!(out, "{:<60} {:>12} {:>8}", indented, node.length, share);

    // Children ordered by time, largest first
    let mut children: Vec<_> = node.children.iter().collect();
    children.sort_by(|a, b| b.1.length.cmp(&a.1.length).then_with(|| a.0.cmp(b.0)));
    for (child_label, child) in children {
        render_node(out, child_label, child, depth + 1, region_length);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_report() -> RegionReport {
        let mut tree = CallTree::new();
        tree.record(&["a", "b"], 10);
        tree.record(&["a", "c"], 20);
        tree.record(&["a"], 30);

        let mut report = RegionReport::new();
        report.insert(
            "R",
            RegionRecord {
                length: 100,
                start: 5,
                tree,
            },
        );
        report.insert("empty", RegionRecord::default());
        report
    }

    #[test]
    fn test_json_shape() {
        let report = sample_report();
        let value: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();

        assert_eq!(value["R"]["length"], 100);
        assert_eq!(value["R"]["start"], 5);
        assert_eq!(value["R"]["tree"]["a"]["length"], 60);
        assert_eq!(value["R"]["tree"]["a"]["children"]["c"]["length"], 20);
        assert_eq!(
            value["empty"],
            serde_json::json!({ "length": 0, "start": 0, "tree": {} })
        );
    }

    #[test]
    fn test_json_parses_back() {
        let report = sample_report();
        let parsed: RegionReport = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(parsed, report);
    }

    #[test]
    fn test_summary_orders_children_by_time() {
        let summary = sample_report().render_summary();
        let b = summary.find("    b").unwrap();
        let c = summary.find("    c").unwrap();
        assert!(c < b, "larger child should be listed first:\n{}", summary);
        assert!(summary.contains("Region R  (start 5, length 100)"));
        assert!(summary.contains("60.0%"));
        assert!(summary.contains("(no completed calls)"));
    }

    #[test]
    fn test_summary_empty_report() {
        let summary = RegionReport::new().render_summary();
        assert!(summary.contains("No regions declared."));
        // Should not panic
        RegionReport::new().print_summary();
    }
}
