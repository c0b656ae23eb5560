//! In-memory connector
//!
//! Holds tables as row vectors and evaluates pushed-down commands against
//! them. Column references are resolved by name against the table layout.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::executor::eval::{eval, eval_criteria, NoVariables};
use crate::executor::{Datum, ExecutorError, ExecutorResult, Row};
use crate::sql::{Command, Expr};

use super::connector::Connector;
use super::SourceRequest;

#[derive(Debug, Clone)]
struct MemoryTable {
    columns: Vec<String>,
    rows: Vec<Row>,
}

impl MemoryTable {
    fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.eq_ignore_ascii_case(name))
    }

    /// Point column references at this table's layout
    fn bind(&self, expr: &Expr, source: &str) -> ExecutorResult<Expr> {
        let mut missing = None;
        let bound = expr.clone().transform(&mut |e| match e {
            Expr::Column(mut col) => {
                match self.column_index(&col.name) {
                    Some(idx) => col.index = idx,
                    None => missing = Some(col.name.clone()),
                }
                Expr::Column(col)
            }
            other => other,
        });
        match missing {
            Some(name) => Err(ExecutorError::Source {
                source_name: source.to_string(),
                message: format!("unknown column '{}'", name),
            }),
            None => Ok(bound),
        }
    }

    fn matches(&self, criteria: Option<&Expr>, row: &Row) -> ExecutorResult<bool> {
        match criteria {
            Some(c) => eval_criteria(c, row, &NoVariables),
            None => Ok(true),
        }
    }
}

/// Connector over tables held in memory
#[derive(Debug)]
pub struct MemoryConnector {
    name: String,
    tables: RwLock<HashMap<String, MemoryTable>>,
    executed: RwLock<Vec<Command>>,
    latency: Option<Duration>,
}

impl MemoryConnector {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tables: RwLock::new(HashMap::new()),
            executed: RwLock::new(Vec::new()),
            latency: None,
        }
    }

    /// Delay every request, so access nodes observe Blocked
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Register or replace a table
    #[must_use]
    pub fn with_table<I, S>(self, group: &str, columns: I, rows: Vec<Row>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tables.write().insert(
            group.to_lowercase(),
            MemoryTable {
                columns: columns.into_iter().map(Into::into).collect(),
                rows,
            },
        );
        self
    }

    /// Current contents of a table
    pub fn table_rows(&self, group: &str) -> Option<Vec<Row>> {
        self.tables
            .read()
            .get(&group.to_lowercase())
            .map(|t| t.rows.clone())
    }

    /// Commands received so far, in arrival order
    pub fn executed_commands(&self) -> Vec<Command> {
        self.executed.read().clone()
    }

    fn run(&self, command: &Command, source: &str) -> ExecutorResult<Vec<Row>> {
        if let Command::Batched(commands) = command {
            let mut counts = Vec::with_capacity(commands.len());
            for c in commands {
                counts.extend(self.run(c, source)?);
            }
            return Ok(counts);
        }

        let group = command.group().unwrap_or_default().to_lowercase();
        let mut tables = self.tables.write();
        let table = tables.get_mut(&group).ok_or_else(|| ExecutorError::Source {
            source_name: source.to_string(),
            message: format!("unknown table '{}'", group),
        })?;

        match command {
            Command::Query(q) => {
                let criteria = q.criteria.as_ref().map(|c| table.bind(c, source)).transpose()?;
                let select = q
                    .select
                    .iter()
                    .map(|(e, _)| table.bind(e, source))
                    .collect::<ExecutorResult<Vec<_>>>()?;
                let order = q
                    .order_by
                    .iter()
                    .map(|(e, asc)| Ok((table.bind(e, source)?, *asc)))
                    .collect::<ExecutorResult<Vec<_>>>()?;

                let mut keyed = Vec::new();
                for row in &table.rows {
                    if !table.matches(criteria.as_ref(), row)? {
                        continue;
                    }
                    let keys = order
                        .iter()
                        .map(|(e, _)| eval(e, row))
                        .collect::<ExecutorResult<Vec<Datum>>>()?;
                    let out = select
                        .iter()
                        .map(|e| eval(e, row))
                        .collect::<ExecutorResult<Row>>()?;
                    keyed.push((keys, out));
                }
                if !order.is_empty() {
                    keyed.sort_by(|(a, _), (b, _)| {
                        for (i, (_, asc)) in order.iter().enumerate() {
                            let cmp = a[i].cmp(&b[i]);
                            let cmp = if *asc { cmp } else { cmp.reverse() };
                            if cmp.is_ne() {
                                return cmp;
                            }
                        }
                        std::cmp::Ordering::Equal
                    });
                }
                let limit = q.limit.map(|l| l as usize).unwrap_or(usize::MAX);
                Ok(keyed.into_iter().take(limit).map(|(_, r)| r).collect())
            }
            Command::Insert(ins) => {
                let positions = ins
                    .columns
                    .iter()
                    .map(|c| {
                        table.column_index(c).ok_or_else(|| ExecutorError::Source {
                            source_name: source.to_string(),
                            message: format!("unknown column '{}'", c),
                        })
                    })
                    .collect::<ExecutorResult<Vec<_>>>()?;
                let width = table.columns.len();
                for values in &ins.values {
                    let mut row = vec![Datum::Null; width];
                    for (pos, expr) in positions.iter().zip(values) {
                        row[*pos] = eval(expr, &Row::empty())?;
                    }
                    table.rows.push(Row::new(row));
                }
                Ok(vec![count_row(ins.values.len())])
            }
            Command::Update(u) => {
                let criteria = u.criteria.as_ref().map(|c| table.bind(c, source)).transpose()?;
                let assignments = u
                    .assignments
                    .iter()
                    .map(|(name, e)| {
                        let idx = table.column_index(name).ok_or_else(|| ExecutorError::Source {
                            source_name: source.to_string(),
                            message: format!("unknown column '{}'", name),
                        })?;
                        Ok((idx, table.bind(e, source)?))
                    })
                    .collect::<ExecutorResult<Vec<_>>>()?;

                let mut count = 0;
                let mut updated = Vec::with_capacity(table.rows.len());
                for row in &table.rows {
                    if table.matches(criteria.as_ref(), row)? {
                        let mut values = row.values().to_vec();
                        for (idx, e) in &assignments {
                            values[*idx] = eval(e, row)?;
                        }
                        updated.push(Row::new(values));
                        count += 1;
                    } else {
                        updated.push(row.clone());
                    }
                }
                table.rows = updated;
                Ok(vec![count_row(count)])
            }
            Command::Delete(d) => {
                let criteria = d.criteria.as_ref().map(|c| table.bind(c, source)).transpose()?;
                let mut kept = Vec::with_capacity(table.rows.len());
                for row in &table.rows {
                    if !table.matches(criteria.as_ref(), row)? {
                        kept.push(row.clone());
                    }
                }
                let count = table.rows.len() - kept.len();
                table.rows = kept;
                Ok(vec![count_row(count)])
            }
            Command::Batched(_) => Ok(Vec::new()),
        }
    }
}

fn count_row(count: usize) -> Row {
    Row::single(Datum::Int(count as i64))
}

#[async_trait]
impl Connector for MemoryConnector {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, request: &SourceRequest) -> ExecutorResult<Vec<Row>> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        self.executed.write().push(request.command.clone());
        self.run(&request.command, &request.source)
    }
}
