//! Schema prober.
//!
//! Resolves a table's columns through a fixed plan of catalog lookups that
//! vary the name's case, bracket quoting and schema restriction. The first
//! non-empty answer wins; a lookup that errors only moves on to the next one.

use std::fmt;

use async_trait::async_trait;

use common::errors::{AppError, AppResult};
use common::utils::bracketed;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameCase {
    Original,
    Upper,
    Lower,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quoting {
    Bare,
    /// Lookup value wrapped in `[...]`.
    Bracketed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaScope {
    DefaultSchema(String),
    AnySchema,
}

/// One case/quoting/schema permutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeStrategy {
    pub name_case: NameCase,
    pub quoting: Quoting,
    pub scope: SchemaScope,
}

impl ProbeStrategy {
    /// The ordered plan: every case and quoting form restricted to the default
    /// schema, then the same six forms across all schemas.
    pub fn plan(default_schema: &str) -> Vec<ProbeStrategy> {
        let scopes = [
            SchemaScope::DefaultSchema(default_schema.to_string()),
            SchemaScope::AnySchema,
        ];
        let mut plan = Vec::with_capacity(12);
        for scope in scopes {
            for name_case in [NameCase::Original, NameCase::Upper, NameCase::Lower] {
                for quoting in [Quoting::Bare, Quoting::Bracketed] {
                    plan.push(ProbeStrategy {
                        name_case,
                        quoting,
                        scope: scope.clone(),
                    });
                }
            }
        }
        plan
    }

    /// The catalog lookup value for `table` under this strategy.
    pub fn lookup_name(&self, table: &str) -> String {
        let cased = match self.name_case {
            NameCase::Original => table.to_string(),
            NameCase::Upper => table.to_uppercase(),
            NameCase::Lower => table.to_lowercase(),
        };
        match self.quoting {
            Quoting::Bare => cased,
            Quoting::Bracketed => bracketed(&cased),
        }
    }

    pub fn schema(&self) -> Option<&str> {
        match &self.scope {
            SchemaScope::DefaultSchema(schema) => Some(schema),
            SchemaScope::AnySchema => None,
        }
    }
}

impl fmt::Display for ProbeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let case = match self.name_case {
            NameCase::Original => "original",
            NameCase::Upper => "upper",
            NameCase::Lower => "lower",
        };
        let quoting = match self.quoting {
            Quoting::Bare => "bare",
            Quoting::Bracketed => "bracketed",
        };
        match &self.scope {
            SchemaScope::DefaultSchema(schema) => write!(f, "{case}/{quoting}/schema={schema}"),
            SchemaScope::AnySchema => write!(f, "{case}/{quoting}/any-schema"),
        }
    }
}

/// A catalog row: column name and the schema it was found in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogColumn {
    pub name: String,
    pub schema: Option<String>,
}

/// Backend catalog lookup used by the prober.
#[async_trait]
pub trait CatalogSource: Send {
    /// Columns of the table stored under exactly `name`, in declared order,
    /// restricted to `schema` when given.
    async fn columns_for(&mut self, name: &str, schema: Option<&str>) -> AppResult<Vec<CatalogColumn>>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Empty,
    Error(String),
    Found(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeAttempt {
    pub strategy: ProbeStrategy,
    pub outcome: AttemptOutcome,
}

/// Resolved columns plus the trace of attempts that led there.
#[derive(Debug, Clone)]
pub struct ProbeResult {
    pub columns: Vec<String>,
    pub strategy: ProbeStrategy,
    pub matched_schema: Option<String>,
    pub attempts: Vec<ProbeAttempt>,
}

pub struct SchemaProber {
    default_schema: String,
}

impl SchemaProber {
    pub fn new(default_schema: impl Into<String>) -> Self {
        Self {
            default_schema: default_schema.into(),
        }
    }

    /// Walks the plan until a lookup returns columns.
    ///
    /// # Errors
    /// `AppError::NotFound` once every strategy came back empty or failed.
    pub async fn probe<C>(&self, catalog: &mut C, table: &str) -> AppResult<ProbeResult>
    where
        C: CatalogSource + ?Sized,
    {
        let mut attempts: Vec<ProbeAttempt> = Vec::new();
        let mut tried: Vec<(String, Option<String>)> = Vec::new();

        for strategy in ProbeStrategy::plan(&self.default_schema) {
            let name = strategy.lookup_name(table);
            let schema = strategy.schema().map(str::to_string);
            // Case variants collapse for names without letters of that case
            if tried.contains(&(name.clone(), schema.clone())) {
                continue;
            }
            tried.push((name.clone(), schema.clone()));

            match catalog.columns_for(&name, schema.as_deref()).await {
                Ok(found) if found.is_empty() => attempts.push(ProbeAttempt {
                    strategy,
                    outcome: AttemptOutcome::Empty,
                }),
                Ok(found) => {
                    let matched_schema = found[0].schema.clone().or(schema);
                    let columns: Vec<String> = found
                        .into_iter()
                        .filter(|c| c.schema.is_none() || c.schema == matched_schema)
                        .map(|c| c.name)
                        .collect();
                    tracing::debug!(
                        table,
                        strategy = %strategy,
                        schema = matched_schema.as_deref().unwrap_or(""),
                        columns = columns.len(),
                        "resolved table columns"
                    );
                    attempts.push(ProbeAttempt {
                        strategy: strategy.clone(),
                        outcome: AttemptOutcome::Found(columns.len()),
                    });
                    return Ok(ProbeResult {
                        columns,
                        strategy,
                        matched_schema,
                        attempts,
                    });
                }
                Err(e) => {
                    tracing::debug!(table, strategy = %strategy, error = %e, "catalog lookup failed, trying next");
                    attempts.push(ProbeAttempt {
                        strategy,
                        outcome: AttemptOutcome::Error(e.to_string()),
                    });
                }
            }
        }

        tracing::warn!(table, attempts = attempts.len(), "table not found by any catalog lookup");
        Err(AppError::NotFound(format!("table {table}")))
    }
}
