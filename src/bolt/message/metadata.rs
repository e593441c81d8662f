//! Typed views over SUCCESS metadata used in result summaries.

use std::collections::HashMap;

use serde::Serialize;

use crate::bolt::packstream::PackStreamValue;

/// Update counters from the `stats` entry of a stream's final SUCCESS.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueryStats {
    /// Nodes created
    pub nodes_created: i64,
    /// Nodes deleted
    pub nodes_deleted: i64,
    /// Relationships created
    pub relationships_created: i64,
    /// Relationships deleted
    pub relationships_deleted: i64,
    /// Properties set
    pub properties_set: i64,
    /// Labels added
    pub labels_added: i64,
    /// Labels removed
    pub labels_removed: i64,
    /// Indexes added
    pub indexes_added: i64,
    /// Indexes removed
    pub indexes_removed: i64,
    /// Constraints added
    pub constraints_added: i64,
    /// Constraints removed
    pub constraints_removed: i64,
    /// System updates
    pub system_updates: i64,
}

impl QueryStats {
    /// Parse the server's hyphenated counter map; missing keys are zero.
    pub fn from_map(map: &HashMap<String, PackStreamValue>) -> Self {
        let count = |key: &str| map.get(key).and_then(|v| v.as_int()).unwrap_or(0);
        Self {
            nodes_created: count("nodes-created"),
            nodes_deleted: count("nodes-deleted"),
            relationships_created: count("relationships-created"),
            relationships_deleted: count("relationships-deleted"),
            properties_set: count("properties-set"),
            labels_added: count("labels-added"),
            labels_removed: count("labels-removed"),
            indexes_added: count("indexes-added"),
            indexes_removed: count("indexes-removed"),
            constraints_added: count("constraints-added"),
            constraints_removed: count("constraints-removed"),
            system_updates: count("system-updates"),
        }
    }

    /// Whether the query changed any data.
    pub fn contains_updates(&self) -> bool {
        [
            self.nodes_created,
            self.nodes_deleted,
            self.relationships_created,
            self.relationships_deleted,
            self.properties_set,
            self.labels_added,
            self.labels_removed,
            self.indexes_added,
            self.indexes_removed,
            self.constraints_added,
            self.constraints_removed,
        ]
        .iter()
        .any(|n| *n > 0)
    }

    /// Whether the query changed the system database.
    pub fn contains_system_updates(&self) -> bool {
        self.system_updates > 0
    }
}

/// Severity of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NotificationSeverity {
    /// Warning
    Warning,
    /// Information
    Information,
    /// Anything else the server sends
    Unknown,
}

impl NotificationSeverity {
    fn parse(s: &str) -> Self {
        match s {
            "WARNING" => NotificationSeverity::Warning,
            "INFORMATION" => NotificationSeverity::Information,
            _ => NotificationSeverity::Unknown,
        }
    }
}

/// Position in the query text a notification refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct InputPosition {
    /// Character offset, starting at 0
    pub offset: i64,
    /// Line, starting at 1
    pub line: i64,
    /// Column, starting at 1
    pub column: i64,
}

/// Notification attached to a result summary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    /// Notification code
    pub code: String,
    /// Short title
    pub title: String,
    /// Longer description
    pub description: String,
    /// Severity
    pub severity: NotificationSeverity,
    /// Position in the query
    pub position: Option<InputPosition>,
}

impl Notification {
    /// Parse one entry of the `notifications` list; entries without a code
    /// are skipped.
    pub fn from_value(value: &PackStreamValue) -> Option<Self> {
        let map = value.as_map()?;
        let text = |key: &str| {
            map.get(key)
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string()
        };
        let code = map.get("code")?.as_str()?.to_string();
        let position = map.get("position").and_then(|v| v.as_map()).map(|p| {
            let n = |key: &str| p.get(key).and_then(|v| v.as_int()).unwrap_or(0);
            InputPosition {
                offset: n("offset"),
                line: n("line"),
                column: n("column"),
            }
        });
        Some(Self {
            code,
            title: text("title"),
            description: text("description"),
            severity: NotificationSeverity::parse(&text("severity")),
            position,
        })
    }

    /// Parse a whole `notifications` list.
    pub fn from_list(values: &[PackStreamValue]) -> Vec<Self> {
        values.iter().filter_map(Self::from_value).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_from_map() {
        let mut map = HashMap::new();
        map.insert("nodes-created".to_string(), PackStreamValue::Integer(2));
        map.insert("properties-set".to_string(), PackStreamValue::Integer(4));

        let stats = QueryStats::from_map(&map);
        assert_eq!(stats.nodes_created, 2);
        assert_eq!(stats.properties_set, 4);
        assert_eq!(stats.labels_added, 0);
        assert!(stats.contains_updates());
        assert!(!stats.contains_system_updates());
        assert!(!QueryStats::default().contains_updates());
    }

    #[test]
    fn test_notification_from_value() {
        let value = PackStreamValue::map([
            ("code", "Neo.ClientNotification.Statement.CartesianProduct".into()),
            ("title", "Cartesian product".into()),
            ("description", "Avoid it".into()),
            ("severity", "WARNING".into()),
            (
                "position",
                PackStreamValue::map([
                    ("offset", 0i64.into()),
                    ("line", 1i64.into()),
                    ("column", 1i64.into()),
                ]),
            ),
        ]);

        let n = Notification::from_value(&value).unwrap();
        assert_eq!(n.severity, NotificationSeverity::Warning);
        assert_eq!(n.position, Some(InputPosition { offset: 0, line: 1, column: 1 }));
        assert_eq!(n.title, "Cartesian product");
    }

    #[test]
    fn test_notification_list_skips_garbage() {
        let list = vec![
            PackStreamValue::Integer(1),
            PackStreamValue::map([("code", "X".into())]),
        ];
        let parsed = Notification::from_list(&list);
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].severity, NotificationSeverity::Unknown);
        assert!(parsed[0].position.is_none());
    }
}
