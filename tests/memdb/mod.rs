// Not every test crate exercises every helper.
#![allow(dead_code)]

//! In-memory stand-in for the database collaborator: tables held as rows of
//! name/value maps, savepoints as snapshots, stored routines as registered
//! closures. Text statements understand exactly the shapes the entity
//! builder generates.

use anyhow::anyhow;
use marrow::{
    Command, Connection, Cursor, Parameter, Result, RowLabeled, StatementKind, Value,
};
use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex, Once},
};

pub fn init_logger() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = env_logger::builder().is_test(true).try_init();
    });
}

pub type Table = Vec<HashMap<String, Value>>;

#[derive(Default)]
pub struct ProcedureOutcome {
    pub result_sets: Vec<Vec<RowLabeled>>,
    pub outputs: Vec<(String, Value)>,
    pub affected: u64,
    pub scalar: Option<Value>,
}

type Procedure = Arc<dyn Fn(&mut DbState, &[Parameter]) -> Result<ProcedureOutcome> + Send + Sync>;

#[derive(Default)]
pub struct DbState {
    pub tables: HashMap<String, Table>,
    savepoints: Vec<(String, HashMap<String, Table>)>,
    procedures: HashMap<String, Procedure>,
}

#[derive(Default, Clone)]
pub struct MemDb {
    state: Arc<Mutex<DbState>>,
}

impl MemDb {
    pub fn new() -> Self {
        init_logger();
        Self::default()
    }

    pub fn create_table(&self, name: &str) {
        self.state
            .lock()
            .unwrap()
            .tables
            .insert(name.into(), Vec::new());
    }

    pub fn insert_row(&self, table: &str, row: &[(&str, Value)]) {
        self.state
            .lock()
            .unwrap()
            .tables
            .get_mut(table)
            .expect("unknown table")
            .push(row.iter().map(|(k, v)| (k.to_string(), v.clone())).collect());
    }

    pub fn rows(&self, table: &str) -> Table {
        self.state.lock().unwrap().tables[table].clone()
    }

    pub fn register_procedure(
        &self,
        name: &str,
        procedure: impl Fn(&mut DbState, &[Parameter]) -> Result<ProcedureOutcome>
        + Send
        + Sync
        + 'static,
    ) {
        self.state
            .lock()
            .unwrap()
            .procedures
            .insert(name.into(), Arc::new(procedure));
    }
}

impl Connection for MemDb {
    type Command = MemCommand;

    fn command(&mut self, text: &str, kind: StatementKind) -> Result<MemCommand> {
        Ok(MemCommand {
            state: self.state.clone(),
            text: text.into(),
            kind,
            parameters: Arc::new(Mutex::new(Vec::new())),
        })
    }

    async fn savepoint(&mut self, name: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let snapshot = state.tables.clone();
        state.savepoints.push((name.into(), snapshot));
        Ok(())
    }

    async fn rollback_to(&mut self, name: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        while let Some((found, snapshot)) = state.savepoints.pop() {
            if found == name {
                state.tables = snapshot;
                return Ok(());
            }
        }
        Err(anyhow!("unknown savepoint `{name}`").into())
    }

    async fn release_savepoint(&mut self, name: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        while let Some((found, _)) = state.savepoints.pop() {
            if found == name {
                return Ok(());
            }
        }
        Err(anyhow!("unknown savepoint `{name}`").into())
    }
}

pub struct MemCommand {
    state: Arc<Mutex<DbState>>,
    text: String,
    kind: StatementKind,
    parameters: Arc<Mutex<Vec<Parameter>>>,
}

struct TextOutcome {
    affected: u64,
    rows: Vec<RowLabeled>,
}

impl MemCommand {
    fn run_procedure(&self) -> Result<ProcedureOutcome> {
        let parameters = self.parameters.lock().unwrap().clone();
        let mut state = self.state.lock().unwrap();
        let procedure = state
            .procedures
            .get(&self.text)
            .cloned()
            .ok_or_else(|| anyhow!("unknown procedure `{}`", self.text))?;
        procedure(&mut state, &parameters)
    }

    fn run_text(&self) -> Result<TextOutcome> {
        let parameters = self.parameters.lock().unwrap().clone();
        let mut state = self.state.lock().unwrap();
        execute_sql(&mut state, &self.text, &parameters)
    }

    fn apply_outputs(&self, outputs: Vec<(String, Value)>) {
        let mut parameters = self.parameters.lock().unwrap();
        for (name, value) in outputs {
            if let Some(parameter) = parameters.iter_mut().find(|v| v.name == name) {
                parameter.value = value;
            }
        }
    }
}

impl Command for MemCommand {
    type Cursor = MemCursor;

    fn text(&self) -> &str {
        &self.text
    }

    fn kind(&self) -> StatementKind {
        self.kind
    }

    fn add_parameter(&mut self, parameter: Parameter) -> Result<()> {
        let mut parameters = self.parameters.lock().unwrap();
        if parameters.iter().any(|v| v.name == parameter.name) {
            return Err(anyhow!("parameter `{}` is already bound", parameter.name).into());
        }
        parameters.push(parameter);
        Ok(())
    }

    fn parameter_value(&self, name: &str) -> Result<Value> {
        self.parameters
            .lock()
            .unwrap()
            .iter()
            .find(|v| v.name == name)
            .map(|v| v.value.clone())
            .ok_or_else(|| anyhow!("parameter `{name}` is not bound").into())
    }

    fn set_parameter(&mut self, name: &str, value: Value) -> Result<()> {
        let mut parameters = self.parameters.lock().unwrap();
        let parameter = parameters
            .iter_mut()
            .find(|v| v.name == name)
            .ok_or_else(|| anyhow!("parameter `{name}` is not bound"))?;
        parameter.value = value;
        Ok(())
    }

    async fn execute(&mut self) -> Result<u64> {
        match self.kind {
            StatementKind::StoredProcedure => {
                let outcome = self.run_procedure()?;
                self.apply_outputs(outcome.outputs);
                Ok(outcome.affected)
            }
            StatementKind::Text => Ok(self.run_text()?.affected),
        }
    }

    async fn execute_scalar(&mut self) -> Result<Value> {
        match self.kind {
            StatementKind::StoredProcedure => {
                let outcome = self.run_procedure()?;
                let scalar = outcome
                    .scalar
                    .clone()
                    .ok_or_else(|| anyhow!("procedure `{}` produced no scalar", self.text))?;
                self.apply_outputs(outcome.outputs);
                Ok(scalar)
            }
            StatementKind::Text => self
                .run_text()?
                .rows
                .first()
                .and_then(|v| v.values().first().cloned())
                .ok_or_else(|| anyhow!("the statement produced no value").into()),
        }
    }

    async fn execute_reader(&mut self) -> Result<MemCursor> {
        let (sets, outputs) = match self.kind {
            StatementKind::StoredProcedure => {
                let outcome = self.run_procedure()?;
                (outcome.result_sets, outcome.outputs)
            }
            StatementKind::Text => (vec![self.run_text()?.rows], Vec::new()),
        };
        let mut remaining: VecDeque<Vec<RowLabeled>> = sets.into();
        let current = remaining.pop_front().unwrap_or_default();
        Ok(MemCursor {
            current: current.into(),
            remaining,
            // Output parameters materialize only once the cursor closes.
            pending_outputs: outputs,
            parameters: self.parameters.clone(),
            closed: false,
        })
    }
}

pub struct MemCursor {
    current: VecDeque<RowLabeled>,
    remaining: VecDeque<Vec<RowLabeled>>,
    pending_outputs: Vec<(String, Value)>,
    parameters: Arc<Mutex<Vec<Parameter>>>,
    closed: bool,
}

impl Cursor for MemCursor {
    async fn next_record(&mut self) -> Result<Option<RowLabeled>> {
        if self.closed {
            return Err(anyhow!("the cursor is closed").into());
        }
        Ok(self.current.pop_front())
    }

    async fn next_result(&mut self) -> Result<bool> {
        if self.closed {
            return Err(anyhow!("the cursor is closed").into());
        }
        match self.remaining.pop_front() {
            Some(rows) => {
                self.current = rows.into();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let mut parameters = self.parameters.lock().unwrap();
        for (name, value) in self.pending_outputs.drain(..) {
            if let Some(parameter) = parameters.iter_mut().find(|v| v.name == name) {
                parameter.value = value;
            }
        }
        Ok(())
    }
}

pub fn labeled_row(columns: &[(&str, Value)]) -> RowLabeled {
    RowLabeled::new(
        columns.iter().map(|(k, _)| k.to_string()).collect(),
        columns.iter().map(|(_, v)| v.clone()).collect(),
    )
}

fn unquote(ident: &str) -> String {
    ident
        .split('.')
        .map(|v| v.trim().trim_matches('"').replace("\"\"", "\""))
        .collect::<Vec<_>>()
        .join(".")
}

fn param<'a>(parameters: &'a [Parameter], marker: &str) -> Result<&'a Value> {
    let name = marker.trim().trim_start_matches('@');
    parameters
        .iter()
        .find(|v| v.name == name)
        .map(|v| &v.value)
        .ok_or_else(|| anyhow!("parameter `{name}` is not bound").into())
}

fn matches_filter(
    row: &HashMap<String, Value>,
    filters: &[(String, Value)],
) -> bool {
    filters.iter().all(|(column, value)| row.get(column) == Some(value))
}

fn parse_pairs(
    clause: &str,
    separator: &str,
    parameters: &[Parameter],
) -> Result<Vec<(String, Value)>> {
    clause
        .split(separator)
        .map(|term| {
            let (column, marker) = term
                .split_once('=')
                .ok_or_else(|| anyhow!("unsupported filter `{term}`"))?;
            Ok((unquote(column), param(parameters, marker)?.clone()))
        })
        .collect()
}

fn parse_filters(clause: &str, parameters: &[Parameter]) -> Result<Vec<(String, Value)>> {
    parse_pairs(clause, " AND ", parameters)
}

/// Interpret the statement shapes the entity builder generates.
fn execute_sql(state: &mut DbState, text: &str, parameters: &[Parameter]) -> Result<TextOutcome> {
    if let Some(rest) = text.strip_prefix("SELECT ") {
        let (columns, rest) = rest
            .split_once(" FROM ")
            .ok_or_else(|| anyhow!("unsupported statement `{text}`"))?;
        let (table, filters) = match rest.split_once(" WHERE ") {
            Some((table, clause)) => (unquote(table), parse_filters(clause, parameters)?),
            None => (unquote(rest), Vec::new()),
        };
        let columns: Vec<String> = columns.split(", ").map(unquote).collect();
        let table = state
            .tables
            .get(&table)
            .ok_or_else(|| anyhow!("unknown table `{table}`"))?;
        let labels: Arc<[String]> = columns.iter().cloned().collect();
        let rows = table
            .iter()
            .filter(|row| matches_filter(row, &filters))
            .map(|row| {
                RowLabeled::new(
                    labels.clone(),
                    columns
                        .iter()
                        .map(|v| row.get(v).cloned().unwrap_or(Value::Varchar(None)))
                        .collect(),
                )
            })
            .collect::<Vec<_>>();
        Ok(TextOutcome { affected: 0, rows })
    } else if let Some(rest) = text.strip_prefix("INSERT INTO ") {
        let (table, rest) = rest
            .split_once(" (")
            .ok_or_else(|| anyhow!("unsupported statement `{text}`"))?;
        let (columns, values) = rest
            .split_once(") VALUES (")
            .ok_or_else(|| anyhow!("unsupported statement `{text}`"))?;
        let values = values.trim_end_matches(')');
        let mut row = HashMap::new();
        for (column, marker) in columns.split(", ").zip(values.split(", ")) {
            row.insert(unquote(column), param(parameters, marker)?.clone());
        }
        let table = unquote(table);
        state
            .tables
            .get_mut(&table)
            .ok_or_else(|| anyhow!("unknown table `{table}`"))?
            .push(row);
        Ok(TextOutcome {
            affected: 1,
            rows: Vec::new(),
        })
    } else if let Some(rest) = text.strip_prefix("UPDATE ") {
        let (table, rest) = rest
            .split_once(" SET ")
            .ok_or_else(|| anyhow!("unsupported statement `{text}`"))?;
        let (assignments, clause) = rest
            .split_once(" WHERE ")
            .ok_or_else(|| anyhow!("unsupported statement `{text}`"))?;
        let assignments = parse_pairs(assignments, ", ", parameters)?;
        let filters = parse_filters(clause, parameters)?;
        let table = unquote(table);
        let table = state
            .tables
            .get_mut(&table)
            .ok_or_else(|| anyhow!("unknown table `{table}`"))?;
        let mut affected = 0;
        for row in table.iter_mut().filter(|v| matches_filter(v, &filters)) {
            for (column, value) in &assignments {
                row.insert(column.clone(), value.clone());
            }
            affected += 1;
        }
        Ok(TextOutcome {
            affected,
            rows: Vec::new(),
        })
    } else if let Some(rest) = text.strip_prefix("DELETE FROM ") {
        let (table, clause) = rest
            .split_once(" WHERE ")
            .ok_or_else(|| anyhow!("unsupported statement `{text}`"))?;
        let filters = parse_filters(clause, parameters)?;
        let table = unquote(table);
        let table = state
            .tables
            .get_mut(&table)
            .ok_or_else(|| anyhow!("unknown table `{table}`"))?;
        let before = table.len();
        table.retain(|v| !matches_filter(v, &filters));
        Ok(TextOutcome {
            affected: (before - table.len()) as u64,
            rows: Vec::new(),
        })
    } else {
        Err(anyhow!("unsupported statement `{text}`").into())
    }
}
