//! Scripted in-memory driver shared by the integration tests.

#![allow(dead_code)]

use pgmapper::{Connection, Driver, Executor, OrmError, OrmResult, Record, Value};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Everything the query layer asked the driver to do, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Acquire,
    Begin,
    Commit,
    Rollback,
    Abandon,
    Fetch { sql: String, params: Vec<Value> },
    Execute { sql: String, params: Vec<Value> },
}

#[derive(Default)]
struct State {
    calls: Vec<Call>,
    responses: VecDeque<OrmResult<Vec<Record>>>,
    fail_rollback: bool,
    hang_begin: bool,
    hang_fetch: bool,
}

/// Driver that answers fetches from a queue of scripted responses.
///
/// An empty queue answers with zero rows.
#[derive(Clone, Default)]
pub struct MockDriver {
    state: Arc<Mutex<State>>,
}

impl MockDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a result set for the next fetch.
    pub fn push_rows(&self, columns: &[&str], rows: Vec<Vec<Value>>) {
        let columns: Vec<String> = columns.iter().map(|c| c.to_string()).collect();
        let records = rows
            .into_iter()
            .map(|values| Record::new(columns.clone(), values))
            .collect();
        self.lock().responses.push_back(Ok(records));
    }

    /// Queue a failure for the next fetch.
    pub fn push_error(&self, err: OrmError) {
        self.lock().responses.push_back(Err(err));
    }

    pub fn fail_rollback(&self) {
        self.lock().fail_rollback = true;
    }

    /// Make every `BEGIN` wait forever.
    pub fn hang_begin(&self) {
        self.lock().hang_begin = true;
    }

    /// Make every fetch wait forever.
    pub fn hang_fetch(&self) {
        self.lock().hang_fetch = true;
    }

    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    /// `(sql, params)` of every fetch, in order.
    pub fn fetches(&self) -> Vec<(String, Vec<Value>)> {
        self.lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                Call::Fetch { sql, params } => Some((sql.clone(), params.clone())),
                _ => None,
            })
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }
}

impl Driver for MockDriver {
    type Conn = MockConnection;

    async fn acquire(&self) -> OrmResult<MockConnection> {
        self.lock().calls.push(Call::Acquire);
        Ok(MockConnection {
            state: Arc::clone(&self.state),
        })
    }
}

pub struct MockConnection {
    state: Arc<Mutex<State>>,
}

impl MockConnection {
    fn record(&self, call: Call) {
        self.state.lock().unwrap().calls.push(call);
    }
}

impl Executor for MockConnection {
    async fn fetch(&mut self, sql: &str, params: &[Value]) -> OrmResult<Vec<Record>> {
        self.record(Call::Fetch {
            sql: sql.to_string(),
            params: params.to_vec(),
        });
        let hang = self.state.lock().unwrap().hang_fetch;
        if hang {
            std::future::pending::<()>().await;
        }
        let response = self.state.lock().unwrap().responses.pop_front();
        response.unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn execute(&mut self, sql: &str, params: &[Value]) -> OrmResult<u64> {
        self.record(Call::Execute {
            sql: sql.to_string(),
            params: params.to_vec(),
        });
        Ok(0)
    }
}

impl Connection for MockConnection {
    async fn begin(&mut self) -> OrmResult<()> {
        self.record(Call::Begin);
        let hang = self.state.lock().unwrap().hang_begin;
        if hang {
            std::future::pending::<()>().await;
        }
        Ok(())
    }

    async fn commit(&mut self) -> OrmResult<()> {
        self.record(Call::Commit);
        Ok(())
    }

    async fn rollback(&mut self) -> OrmResult<()> {
        self.record(Call::Rollback);
        let fail = self.state.lock().unwrap().fail_rollback;
        if fail {
            return Err(OrmError::Driver("connection reset during rollback".to_string()));
        }
        Ok(())
    }

    fn abandon(&mut self) {
        self.record(Call::Abandon);
    }
}
