//! Typed InfluxQL statements.
//!
//! Every identifier that ends up in a statement goes through [Ident::new], which only accepts a
//! conservative character set, and every value is emitted as an escaped string literal. Callers
//! never assemble statement text themselves.

use crate::model::BucketWidth;
use chrono::{DateTime, SecondsFormat, Utc};
use std::fmt::{self, Display, Formatter};

#[derive(Debug, thiserror::Error)]
pub enum QueryBuildError {
    #[error("Invalid identifier: {0:?}")]
    InvalidIdentifier(String),
}

/// A measurement, field, tag or database name that is safe to interpolate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ident(String);

impl Ident {
    pub fn new(name: impl Into<String>) -> Result<Self, QueryBuildError> {
        let name = name.into();
        let allowed = name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | ' '));
        if name.trim().is_empty() || name.trim() != name || !allowed {
            return Err(QueryBuildError::InvalidIdentifier(name));
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Ident {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "\"{}\"", self.0)
    }
}

/// The database a statement runs against.
///
/// Raw samples for a project live in `{lg_type}_{project_id}`, cross-run comparison data in
/// `comparison_{project_id}` and host telemetry in `telegraf_{project_id}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Namespace(Ident);

impl Namespace {
    pub fn raw(lg_type: &str, project_id: u64) -> Result<Self, QueryBuildError> {
        Ok(Self(Ident::new(format!("{lg_type}_{project_id}"))?))
    }

    pub fn comparison(project_id: u64) -> Result<Self, QueryBuildError> {
        Ok(Self(Ident::new(format!("comparison_{project_id}"))?))
    }

    pub fn telegraf(project_id: u64) -> Result<Self, QueryBuildError> {
        Ok(Self(Ident::new(format!("telegraf_{project_id}"))?))
    }

    /// Database name, unquoted.
    pub fn name(&self) -> &str {
        self.0.as_str()
    }
}

impl Display for Namespace {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A rendered statement, ready to send.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Statement(String);

impl Statement {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Statement {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn literal(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
}

fn time_literal(ts: &DateTime<Utc>) -> String {
    literal(&ts.to_rfc3339_opts(SecondsFormat::Secs, true))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    Sum,
    Count,
    Max,
    Mean,
    Percentile(u8),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Projection {
    Wildcard,
    Field {
        field: Ident,
        alias: Option<Ident>,
    },
    Aggregate {
        function: Function,
        field: Ident,
        alias: Option<Ident>,
    },
}

impl Display for Projection {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let alias = match self {
            Projection::Wildcard => return f.write_str("*"),
            Projection::Field { field, alias } => {
                write!(f, "{field}")?;
                alias
            }
            Projection::Aggregate {
                function,
                field,
                alias,
            } => {
                match function {
                    Function::Sum => write!(f, "sum({field})")?,
                    Function::Count => write!(f, "count({field})")?,
                    Function::Max => write!(f, "max({field})")?,
                    Function::Mean => write!(f, "mean({field})")?,
                    Function::Percentile(n) => write!(f, "percentile({field}, {n})")?,
                }
                alias
            }
        };
        if let Some(alias) = alias {
            write!(f, " AS {alias}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    Equals(Ident, String),
    /// Matches any of the values, an OR-disjunction in parentheses
    AnyOf(Ident, Vec<String>),
    TimeFrom(DateTime<Utc>),
    TimeUntil(DateTime<Utc>),
}

impl Condition {
    pub fn tag(tag: &str, value: impl Into<String>) -> Result<Self, QueryBuildError> {
        Ok(Condition::Equals(Ident::new(tag)?, value.into()))
    }

    /// `tag` matching any of `values`. An empty list constrains nothing, so there is no condition.
    pub fn any_of(tag: &str, values: Vec<String>) -> Result<Option<Self>, QueryBuildError> {
        if values.is_empty() {
            return Ok(None);
        }
        Ok(Some(Condition::AnyOf(Ident::new(tag)?, values)))
    }

    fn is_empty(&self) -> bool {
        matches!(self, Condition::AnyOf(_, values) if values.is_empty())
    }
}

impl Display for Condition {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Condition::Equals(key, value) => write!(f, "{key} = {}", literal(value)),
            Condition::AnyOf(key, values) => {
                let alternatives = values
                    .iter()
                    .map(|value| format!("{key} = {}", literal(value)))
                    .collect::<Vec<_>>()
                    .join(" OR ");
                write!(f, "({alternatives})")
            }
            Condition::TimeFrom(ts) => write!(f, "time >= {}", time_literal(ts)),
            Condition::TimeUntil(ts) => write!(f, "time <= {}", time_literal(ts)),
        }
    }
}

fn write_conditions(f: &mut Formatter<'_>, conditions: &[Condition]) -> fmt::Result {
    let conditions = conditions.iter().filter(|condition| !condition.is_empty());
    for (i, condition) in conditions.enumerate() {
        f.write_str(if i == 0 { " WHERE " } else { " AND " })?;
        write!(f, "{condition}")?;
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum GroupBy {
    Time(BucketWidth),
    Tag(Ident),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Source {
    Measurement {
        namespace: Option<Namespace>,
        name: Ident,
    },
    Subquery(Box<Select>),
}

/// `SELECT` statement builder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Select {
    projections: Vec<Projection>,
    source: Source,
    conditions: Vec<Condition>,
    group_by: Vec<GroupBy>,
    descending: bool,
    limit: Option<usize>,
}

impl Select {
    /// Select from `measurement`, qualified with the database when `namespace` is given.
    pub fn from(namespace: Option<&Namespace>, measurement: &str) -> Result<Self, QueryBuildError> {
        Ok(Self::with_source(Source::Measurement {
            namespace: namespace.cloned(),
            name: Ident::new(measurement)?,
        }))
    }

    pub fn from_subquery(inner: Select) -> Self {
        Self::with_source(Source::Subquery(Box::new(inner)))
    }

    fn with_source(source: Source) -> Self {
        Self {
            projections: Vec::new(),
            source,
            conditions: Vec::new(),
            group_by: Vec::new(),
            descending: false,
            limit: None,
        }
    }

    pub fn all_fields(mut self) -> Self {
        self.projections.push(Projection::Wildcard);
        self
    }

    pub fn field(mut self, field: &str, alias: Option<&str>) -> Result<Self, QueryBuildError> {
        self.projections.push(Projection::Field {
            field: Ident::new(field)?,
            alias: alias.map(Ident::new).transpose()?,
        });
        Ok(self)
    }

    pub fn aggregate(
        mut self,
        function: Function,
        field: &str,
        alias: Option<&str>,
    ) -> Result<Self, QueryBuildError> {
        self.projections.push(Projection::Aggregate {
            function,
            field: Ident::new(field)?,
            alias: alias.map(Ident::new).transpose()?,
        });
        Ok(self)
    }

    pub fn filter(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn filter_opt(self, condition: Option<Condition>) -> Self {
        match condition {
            Some(condition) => self.filter(condition),
            None => self,
        }
    }

    pub fn between(self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        self.filter(Condition::TimeFrom(start))
            .filter(Condition::TimeUntil(end))
    }

    pub fn group_by_tag(mut self, tag: &str) -> Result<Self, QueryBuildError> {
        self.group_by.push(GroupBy::Tag(Ident::new(tag)?));
        Ok(self)
    }

    pub fn group_by_time(mut self, width: BucketWidth) -> Self {
        self.group_by.push(GroupBy::Time(width));
        self
    }

    pub fn order_by_time_desc(mut self) -> Self {
        self.descending = true;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn build(&self) -> Statement {
        Statement(self.to_string())
    }
}

impl Display for Select {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str("SELECT ")?;
        for (i, projection) in self.projections.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{projection}")?;
        }
        match &self.source {
            Source::Measurement {
                namespace: Some(namespace),
                name,
            } => write!(f, " FROM \"{namespace}\"..{name}")?,
            Source::Measurement {
                namespace: None,
                name,
            } => write!(f, " FROM {name}")?,
            Source::Subquery(inner) => write!(f, " FROM ({inner})")?,
        }
        write_conditions(f, &self.conditions)?;
        for (i, group) in self.group_by.iter().enumerate() {
            f.write_str(if i == 0 { " GROUP BY " } else { ", " })?;
            match group {
                GroupBy::Time(width) => write!(f, "time({width})")?,
                GroupBy::Tag(tag) => write!(f, "{tag}")?,
            }
        }
        if self.descending {
            f.write_str(" ORDER BY time DESC")?;
        }
        if let Some(limit) = self.limit {
            write!(f, " LIMIT {limit}")?;
        }
        Ok(())
    }
}

/// `DELETE FROM` statement.
pub fn delete(measurement: &str, conditions: Vec<Condition>) -> Result<Statement, QueryBuildError> {
    struct Delete(Ident, Vec<Condition>);

    impl Display for Delete {
        fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
            write!(f, "DELETE FROM {}", self.0)?;
            write_conditions(f, &self.1)
        }
    }

    Ok(Statement(
        Delete(Ident::new(measurement)?, conditions).to_string(),
    ))
}

/// `SHOW TAG VALUES` statement.
pub fn show_tag_values(
    namespace: &Namespace,
    key: &str,
    conditions: Vec<Condition>,
) -> Result<Statement, QueryBuildError> {
    struct ShowTagValues<'a>(&'a Namespace, Ident, Vec<Condition>);

    impl Display for ShowTagValues<'_> {
        fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
            write!(f, "SHOW TAG VALUES ON \"{}\" WITH KEY = {}", self.0, self.1)?;
            write_conditions(f, &self.2)
        }
    }

    Ok(Statement(
        ShowTagValues(namespace, Ident::new(key)?, conditions).to_string(),
    ))
}
