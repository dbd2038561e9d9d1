use std::time::Duration;

// ============================================================================
// Topic Layout
// ============================================================================

const DAY: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicNames {
    pub patient_events: String,
    pub dead_letter: String,
    pub audit: String,
}

impl Default for TopicNames {
    fn default() -> Self {
        Self {
            patient_events: "patient-events".to_string(),
            dead_letter: "patient-events-dlq".to_string(),
            audit: "audit-events".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicSpec {
    pub name: String,
    pub partitions: i32,
    pub replication: i32,
    pub retention: Duration,
    pub cleanup_policy: &'static str,
    pub compression: &'static str,
}

impl TopicSpec {
    /// `(key, value)` topic configuration entries for the admin API
    pub fn config_entries(&self) -> Vec<(&'static str, String)> {
        vec![
            ("retention.ms", self.retention.as_millis().to_string()),
            ("cleanup.policy", self.cleanup_policy.to_string()),
            ("compression.type", self.compression.to_string()),
        ]
    }
}

impl TopicNames {
    pub fn specs(&self) -> Vec<TopicSpec> {
        vec![
            TopicSpec {
                name: self.patient_events.clone(),
                partitions: 3,
                replication: 1,
                retention: DAY * 7,
                cleanup_policy: "delete",
                compression: "snappy",
            },
            TopicSpec {
                name: self.dead_letter.clone(),
                partitions: 1,
                replication: 1,
                retention: DAY * 30,
                cleanup_policy: "delete",
                compression: "producer",
            },
            TopicSpec {
                name: self.audit.clone(),
                partitions: 5,
                replication: 1,
                retention: DAY * 90,
                cleanup_policy: "delete",
                compression: "producer",
            },
        ]
    }
}
