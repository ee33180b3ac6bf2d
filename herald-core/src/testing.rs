//! Scripted channel and notifier doubles shared by the processor tests.

use crate::Engine;
use crate::channels::{
    ChannelAdapter, ChannelError, ChannelRegistry, MessageIdCache, ReminderNotifier,
};
use crate::config::ConfigStore;
use crate::entities::event_records::EventDraft;
use crate::store::{MemoryStore, Store};
use async_trait::async_trait;
use herald_sdk::objects::{
    AttendanceRecord, AttendanceStatus, ChannelId, EventMessage, ReminderConfig, ReminderNotice,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use time::OffsetDateTime;
use time::macros::datetime;
use tokio::sync::Semaphore;

pub const STARTS_AT: OffsetDateTime = datetime!(2030-05-01 19:00 UTC);

/// Holds calls at a checkpoint until the test opens it.
pub struct Gate {
    closed: AtomicBool,
    waiting: AtomicUsize,
    permits: Semaphore,
}

impl Gate {
    fn new() -> Self {
        Self {
            closed: AtomicBool::new(false),
            waiting: AtomicUsize::new(0),
            permits: Semaphore::new(0),
        }
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn open(&self) {
        self.closed.store(false, Ordering::SeqCst);
        self.permits.add_permits(64);
    }

    /// Yield until `count` calls are parked at the gate.
    pub async fn until_waiting(&self, count: usize) {
        while self.waiting.load(Ordering::SeqCst) < count {
            tokio::task::yield_now().await;
        }
    }

    async fn pass(&self) {
        if self.closed.load(Ordering::SeqCst) {
            self.waiting.fetch_add(1, Ordering::SeqCst);
            drop(self.permits.acquire().await.unwrap());
        }
    }
}

pub struct MockChannel {
    id: ChannelId,
    pub delete_gate: Gate,
    pub fetch_gate: Gate,
    pub fail_create: AtomicBool,
    pub fail_update: AtomicBool,
    pub fail_delete: AtomicBool,
    pub fail_fetch: AtomicBool,
    sequence: AtomicUsize,
    pub created: Mutex<Vec<String>>,
    pub updated: Mutex<Vec<String>>,
    pub deleted: Mutex<Vec<String>>,
    pub attendance: Mutex<Vec<AttendanceRecord>>,
}

impl MockChannel {
    pub fn new(id: &str) -> Self {
        Self {
            id: ChannelId::from(id),
            delete_gate: Gate::new(),
            fetch_gate: Gate::new(),
            fail_create: AtomicBool::new(false),
            fail_update: AtomicBool::new(false),
            fail_delete: AtomicBool::new(false),
            fail_fetch: AtomicBool::new(false),
            sequence: AtomicUsize::new(0),
            created: Mutex::new(Vec::new()),
            updated: Mutex::new(Vec::new()),
            deleted: Mutex::new(Vec::new()),
            attendance: Mutex::new(Vec::new()),
        }
    }

    pub fn created(&self) -> Vec<String> {
        self.created.lock().unwrap().clone()
    }

    pub fn updated(&self) -> Vec<String> {
        self.updated.lock().unwrap().clone()
    }

    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }

    pub fn set_attendance(&self, records: Vec<AttendanceRecord>) {
        *self.attendance.lock().unwrap() = records;
    }

    fn rejected() -> ChannelError {
        ChannelError::Rejected {
            status: 500,
            body: "scripted failure".to_string(),
        }
    }
}

#[async_trait]
impl ChannelAdapter for MockChannel {
    fn id(&self) -> &ChannelId {
        &self.id
    }

    fn name(&self) -> &str {
        self.id.as_str()
    }

    async fn create_message(&self, message: &EventMessage) -> Result<String, ChannelError> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(Self::rejected());
        }
        let n = self.sequence.fetch_add(1, Ordering::SeqCst);
        let message_id = format!("{}-{n}", self.id);
        self.created.lock().unwrap().push(message.title.clone());
        Ok(message_id)
    }

    async fn update_message(
        &self,
        message_id: &str,
        _message: &EventMessage,
    ) -> Result<(), ChannelError> {
        if self.fail_update.load(Ordering::SeqCst) {
            return Err(Self::rejected());
        }
        self.updated.lock().unwrap().push(message_id.to_string());
        Ok(())
    }

    async fn delete_message(&self, message_id: &str) -> Result<(), ChannelError> {
        self.delete_gate.pass().await;
        self.deleted.lock().unwrap().push(message_id.to_string());
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(Self::rejected());
        }
        Ok(())
    }

    async fn fetch_attendance(
        &self,
        _message_id: &str,
    ) -> Result<Vec<AttendanceRecord>, ChannelError> {
        self.fetch_gate.pass().await;
        if self.fail_fetch.load(Ordering::SeqCst) {
            return Err(Self::rejected());
        }
        Ok(self.attendance.lock().unwrap().clone())
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub fail: AtomicBool,
    pub notices: Mutex<Vec<ReminderNotice>>,
}

impl RecordingNotifier {
    pub fn notices(&self) -> Vec<ReminderNotice> {
        self.notices.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReminderNotifier for RecordingNotifier {
    async fn deliver(&self, notice: &ReminderNotice) -> Result<(), ChannelError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(MockChannel::rejected());
        }
        self.notices.lock().unwrap().push(notice.clone());
        Ok(())
    }
}

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub channels: Vec<Arc<MockChannel>>,
    pub notifier: Arc<RecordingNotifier>,
    pub engine: Engine,
}

impl Harness {
    pub fn new(channel_ids: &[&str]) -> Self {
        Self::build(channel_ids, None)
    }

    pub fn with_fallback(channel_ids: &[&str], cache: MessageIdCache) -> Self {
        Self::build(channel_ids, Some(Arc::new(cache)))
    }

    fn build(channel_ids: &[&str], cache: Option<Arc<MessageIdCache>>) -> Self {
        let store = Arc::new(MemoryStore::new());
        let channels: Vec<Arc<MockChannel>> = channel_ids
            .iter()
            .map(|id| Arc::new(MockChannel::new(id)))
            .collect();
        let adapters = channels
            .iter()
            .map(|channel| channel.clone() as Arc<dyn ChannelAdapter>)
            .collect();
        let notifier = Arc::new(RecordingNotifier::default());

        let mut builder = Engine::builder(
            store.clone() as Arc<dyn Store>,
            ConfigStore::new(ChannelRegistry::new(adapters)),
        )
        .with_notifier(notifier.clone());
        if let Some(cache) = cache {
            builder = builder.with_fallback_cache(cache);
        }

        Self {
            store,
            channels,
            notifier,
            engine: builder.build(),
        }
    }

    pub fn channel(&self, id: &str) -> &MockChannel {
        self.channels
            .iter()
            .find(|channel| channel.id().as_str() == id)
            .unwrap()
    }
}

pub fn draft(title: &str) -> EventDraft {
    EventDraft {
        title: title.to_string(),
        description: "Bring snacks".to_string(),
        starts_at: STARTS_AT,
        ends_at: STARTS_AT + time::Duration::hours(3),
        cycle_id: None,
        participant_groups: None,
        reminder_config: None,
    }
}

pub fn draft_with_reminders(title: &str, config: ReminderConfig) -> EventDraft {
    EventDraft {
        reminder_config: Some(config),
        ..draft(title)
    }
}

pub fn rsvp(person_id: &str, status: AttendanceStatus) -> AttendanceRecord {
    AttendanceRecord {
        person_id: person_id.to_string(),
        display_name: format!("Person {person_id}"),
        status,
    }
}
