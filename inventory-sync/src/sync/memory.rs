//! In-memory backend for exercising the engine without a network

use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;

use super::normalize::field_table;
use super::types::SourceSystem;
use crate::api::{BackendClient, BackendError, RawRecord};

/// A call made against the backend
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    List,
    Create(RawRecord),
    Update(String, RawRecord),
}

#[derive(Debug, Default)]
struct State {
    records: Vec<RawRecord>,
    calls: Vec<Call>,
    failures: VecDeque<BackendError>,
    next_id: u64,
    cancel_on_mutation: Option<CancellationToken>,
}

/// Stores native records for one system and behaves like its API: ids are
/// assigned on create, a second create for the same identity is rejected as
/// already existing, and updates of unknown ids are not found.
#[derive(Debug)]
pub struct InMemoryBackend {
    system: SourceSystem,
    state: Mutex<State>,
}

impl InMemoryBackend {
    pub fn new(system: SourceSystem) -> Self {
        Self {
            system,
            state: Mutex::new(State {
                next_id: 1,
                ..State::default()
            }),
        }
    }

    /// Store a native record as-is, assigning an id if it has none
    pub fn seed(&self, record: Value) {
        let Value::Object(mut record) = record else {
            panic!("seed records must be JSON objects");
        };
        let mut state = self.state.lock().unwrap();
        let id_field = field_table(self.system).raw_id_field;
        if !record.contains_key(id_field) {
            let id = next_id(&mut state);
            record.insert(id_field.to_string(), Value::String(id));
        }
        state.records.push(record);
    }

    /// Make the next call, of any kind, fail with `err`
    pub fn fail_next(&self, err: BackendError) {
        self.state.lock().unwrap().failures.push_back(err);
    }

    /// Cancel `token` as soon as a create or update reaches the backend
    pub fn cancel_on_mutation(&self, token: CancellationToken) {
        self.state.lock().unwrap().cancel_on_mutation = Some(token);
    }

    pub fn records(&self) -> Vec<RawRecord> {
        self.state.lock().unwrap().records.clone()
    }

    /// Find a stored record by identity key
    pub fn record(&self, identity_key: &str) -> Option<RawRecord> {
        let identity_field = field_table(self.system).identity_field;
        self.records()
            .into_iter()
            .find(|r| r.get(identity_field).and_then(Value::as_str) == Some(identity_key))
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Every create and update attempted, failed attempts included
    pub fn mutation_calls(&self) -> Vec<Call> {
        self.calls().into_iter().filter(|c| *c != Call::List).collect()
    }

    fn begin(&self, call: Call) -> Result<std::sync::MutexGuard<'_, State>, BackendError> {
        let mut state = self.state.lock().unwrap();
        if call != Call::List {
            if let Some(token) = &state.cancel_on_mutation {
                token.cancel();
            }
        }
        state.calls.push(call);
        match state.failures.pop_front() {
            Some(err) => Err(err),
            None => Ok(state),
        }
    }
}

fn next_id(state: &mut State) -> String {
    let id = state.next_id;
    state.next_id += 1;
    format!("mem-{}", id)
}

fn as_key(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[async_trait]
impl BackendClient for InMemoryBackend {
    fn system(&self) -> SourceSystem {
        self.system
    }

    async fn list_items(&self) -> Result<Vec<RawRecord>, BackendError> {
        let state = self.begin(Call::List)?;
        Ok(state.records.clone())
    }

    async fn create_item(&self, fields: &RawRecord) -> Result<String, BackendError> {
        let table = field_table(self.system);
        let mut state = self.begin(Call::Create(fields.clone()))?;

        let identity = as_key(fields.get(table.identity_field));
        let exists = identity.is_some()
            && state
                .records
                .iter()
                .any(|r| as_key(r.get(table.identity_field)) == identity);
        if exists {
            return Err(BackendError::AlreadyExists {
                message: format!("{} already exists", identity.unwrap_or_default()),
            });
        }

        let id = next_id(&mut state);
        let mut record = fields.clone();
        record.insert(table.raw_id_field.to_string(), Value::String(id.clone()));
        state.records.push(record);
        Ok(id)
    }

    async fn update_item(&self, raw_id: &str, fields: &RawRecord) -> Result<(), BackendError> {
        let id_field = field_table(self.system).raw_id_field;
        let mut state = self.begin(Call::Update(raw_id.to_string(), fields.clone()))?;

        let record = state
            .records
            .iter_mut()
            .find(|r| as_key(r.get(id_field)).as_deref() == Some(raw_id))
            .ok_or_else(|| BackendError::NotFound {
                raw_id: raw_id.to_string(),
            })?;
        for (name, value) in fields {
            record.insert(name.clone(), value.clone());
        }
        Ok(())
    }
}
