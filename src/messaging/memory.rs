use async_trait::async_trait;
use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, HashSet};
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use super::broker::{
    BrokerError, DeliveryReceipt, InboundMessage, MessageBroker, MessageSource, OutboundMessage, HEADER_EVENT_ID,
};

// ============================================================================
// In-Memory Broker
// ============================================================================
//
// Partitioned append-only logs with consumer-group cursors, for tests and
// broker-less runs.
//
// - Partition = hash(key) % partitions, so one key stays ordered.
// - Idempotent append: a record whose `eventId` header was already stored on
//   the topic is acknowledged again without a second copy.
// - Failure injection: refuse the next N sends (transient), reject them
//   (permanent), or store the next N and then report a lost acknowledgment.
// - Each group keeps a read position (moved by poll/rewind) and a committed
//   offset (moved by commit). Re-subscribing resumes from the committed offset.
//
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRecord {
    pub partition: i32,
    pub offset: i64,
    pub key: String,
    pub payload: String,
    pub headers: Vec<(String, String)>,
}

impl StoredRecord {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Default)]
struct TopicLog {
    partitions: Vec<Vec<StoredRecord>>,
    stored_ids: HashSet<String>,
}

impl TopicLog {
    fn with_partitions(count: usize) -> Self {
        Self {
            partitions: vec![Vec::new(); count.max(1)],
            stored_ids: HashSet::new(),
        }
    }

    fn partition_for(&self, key: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() % self.partitions.len() as u64) as usize
    }
}

#[derive(Default, Clone, Copy)]
struct Cursor {
    position: i64,
    committed: Option<i64>,
}

#[derive(Default)]
struct BrokerState {
    topics: HashMap<String, TopicLog>,
    cursors: HashMap<(String, String, i32), Cursor>,
    refuse_next: u32,
    reject_next: u32,
    lose_next_acks: u32,
    send_attempts: u64,
}

#[derive(Clone, Default)]
pub struct InMemoryBroker {
    state: Arc<Mutex<BrokerState>>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BrokerState> {
        // A panicking test thread must not hide the log from the others
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Declare a topic; unknown topics are created with one partition on first send
    pub fn create_topic(&self, name: &str, partitions: usize) {
        self.lock()
            .topics
            .entry(name.to_string())
            .or_insert_with(|| TopicLog::with_partitions(partitions));
    }

    /// Refuse the next `count` sends with a transient error, storing nothing
    pub fn fail_next_sends(&self, count: u32) {
        self.lock().refuse_next = count;
    }

    /// Reject the next `count` sends with a permanent error, storing nothing
    pub fn reject_next_sends(&self, count: u32) {
        self.lock().reject_next = count;
    }

    /// Store the next `count` records but report their acknowledgments as lost
    pub fn lose_next_acks(&self, count: u32) {
        self.lock().lose_next_acks = count;
    }

    pub fn send_attempts(&self) -> u64 {
        self.lock().send_attempts
    }

    /// All stored records of `topic`, partition by partition
    pub fn records(&self, topic: &str) -> Vec<StoredRecord> {
        self.lock()
            .topics
            .get(topic)
            .map(|log| log.partitions.iter().flatten().cloned().collect())
            .unwrap_or_default()
    }

    pub fn record_count(&self, topic: &str) -> usize {
        self.records(topic).len()
    }

    pub fn committed_offset(&self, group: &str, topic: &str, partition: i32) -> Option<i64> {
        self.lock()
            .cursors
            .get(&(group.to_string(), topic.to_string(), partition))
            .and_then(|cursor| cursor.committed)
    }

    /// Attach `group` to `topic`, resuming every partition at its committed offset
    pub fn subscribe(&self, group: &str, topic: &str) -> InMemorySource {
        let mut state = self.lock();
        let partitions = state
            .topics
            .entry(topic.to_string())
            .or_insert_with(|| TopicLog::with_partitions(1))
            .partitions
            .len();

        for partition in 0..partitions as i32 {
            let cursor = state
                .cursors
                .entry((group.to_string(), topic.to_string(), partition))
                .or_default();
            cursor.position = cursor.committed.unwrap_or(0);
        }

        InMemorySource {
            broker: self.clone(),
            group: group.to_string(),
            topic: topic.to_string(),
            next_partition: Arc::new(Mutex::new(0)),
        }
    }
}

#[async_trait]
impl MessageBroker for InMemoryBroker {
    async fn send(&self, message: OutboundMessage) -> Result<DeliveryReceipt, BrokerError> {
        let mut state = self.lock();
        state.send_attempts += 1;

        if state.refuse_next > 0 {
            state.refuse_next -= 1;
            return Err(BrokerError::Unavailable("injected broker failure".to_string()));
        }
        if state.reject_next > 0 {
            state.reject_next -= 1;
            return Err(BrokerError::Rejected("injected record rejection".to_string()));
        }

        let log = state
            .topics
            .entry(message.topic.clone())
            .or_insert_with(|| TopicLog::with_partitions(1));

        let event_id = message.header(HEADER_EVENT_ID).map(str::to_string);
        let duplicate = event_id.as_ref().is_some_and(|id| log.stored_ids.contains(id));

        let partition = log.partition_for(&message.key);
        let receipt = if duplicate {
            let stored = log.partitions[partition]
                .iter()
                .find(|record| record.header(HEADER_EVENT_ID) == event_id.as_deref());
            DeliveryReceipt {
                topic: message.topic.clone(),
                partition: Some(partition as i32),
                offset: stored.map(|record| record.offset),
            }
        } else {
            let records = &mut log.partitions[partition];
            let offset = records.len() as i64;
            records.push(StoredRecord {
                partition: partition as i32,
                offset,
                key: message.key.clone(),
                payload: message.payload.clone(),
                headers: message.headers.clone(),
            });
            if let Some(id) = event_id {
                log.stored_ids.insert(id);
            }
            DeliveryReceipt {
                topic: message.topic.clone(),
                partition: Some(partition as i32),
                offset: Some(offset),
            }
        };

        if state.lose_next_acks > 0 {
            state.lose_next_acks -= 1;
            return Err(BrokerError::Timeout(Duration::from_millis(0)));
        }
        Ok(receipt)
    }
}

/// One consumer-group subscription to one topic
#[derive(Clone)]
pub struct InMemorySource {
    broker: InMemoryBroker,
    group: String,
    topic: String,
    next_partition: Arc<Mutex<usize>>,
}

impl InMemorySource {
    fn cursor_key(&self, partition: i32) -> (String, String, i32) {
        (self.group.clone(), self.topic.clone(), partition)
    }
}

#[async_trait]
impl MessageSource for InMemorySource {
    async fn poll(&self) -> Result<Option<InboundMessage>, BrokerError> {
        let mut state = self.broker.lock();
        let partitions = state
            .topics
            .get(&self.topic)
            .map_or(0, |log| log.partitions.len());
        if partitions == 0 {
            return Ok(None);
        }

        let mut next = self
            .next_partition
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        // Round-robin so one busy partition cannot starve the others
        for step in 0..partitions {
            let partition = (*next + step) % partitions;
            let key = self.cursor_key(partition as i32);
            let position = state.cursors.get(&key).map_or(0, |cursor| cursor.position);

            let record = state
                .topics
                .get(&self.topic)
                .and_then(|log| log.partitions[partition].get(position as usize))
                .cloned();

            if let Some(record) = record {
                state.cursors.entry(key).or_default().position = position + 1;
                *next = (partition + 1) % partitions;
                return Ok(Some(InboundMessage {
                    topic: self.topic.clone(),
                    partition: record.partition,
                    offset: record.offset,
                    key: Some(record.key),
                    payload: Some(record.payload.into_bytes()),
                    headers: record.headers,
                }));
            }
        }
        Ok(None)
    }

    fn commit(&self, message: &InboundMessage) -> Result<(), BrokerError> {
        let mut state = self.broker.lock();
        let cursor = state.cursors.entry(self.cursor_key(message.partition)).or_default();
        cursor.committed = Some(message.offset + 1);
        Ok(())
    }

    fn rewind(&self, topic: &str, partition: i32, offset: i64) -> Result<(), BrokerError> {
        if topic != self.topic {
            return Err(BrokerError::Offset(format!("not subscribed to topic {}", topic)));
        }
        let mut state = self.broker.lock();
        state.cursors.entry(self.cursor_key(partition)).or_default().position = offset;
        Ok(())
    }
}
