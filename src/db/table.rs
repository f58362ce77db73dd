//! Table helper.
//!
//! [`Table`] pairs a `&mut Db` with a [`TableDescriptor`] and offers the usual
//! CRUD shortcuts keyed on the primary key. Clauses already pending on the
//! `Db` (such as `force_master`) apply to the next helper call.

use crate::db::handle::Db;
use crate::error::DbResult;
use crate::models::{Operand, QueryParam, Record};
use sqlx::FromRow;
use sqlx::mysql::MySqlRow;

/// Table name and key settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDescriptor {
    pub table: String,
    pub primary_key: String,
    pub auto_increment: bool,
}

impl TableDescriptor {
    /// Descriptor with an auto-increment `id` key.
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            primary_key: "id".to_string(),
            auto_increment: true,
        }
    }

    pub fn with_primary_key(mut self, primary_key: impl Into<String>) -> Self {
        self.primary_key = primary_key.into();
        self
    }

    pub fn with_auto_increment(mut self, auto_increment: bool) -> Self {
        self.auto_increment = auto_increment;
        self
    }
}

/// Conditions for the load/count helpers: `(field, operand)` pairs joined with
/// AND plus an optional raw fragment.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    pub conditions: Vec<(String, Operand)>,
    pub raw: Option<(String, Vec<Operand>)>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a condition; the field may carry an operator (`"age >"`).
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Operand>) -> Self {
        self.conditions.push((field.into(), value.into()));
        self
    }

    /// Set the raw WHERE fragment.
    pub fn raw(mut self, sql: impl Into<String>, operands: Vec<Operand>) -> Self {
        self.raw = Some((sql.into(), operands));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty() && self.raw.is_none()
    }

    fn apply(&self, db: &mut Db) -> DbResult<()> {
        db.multi_where(self.conditions.iter().map(|(f, v)| (f.as_str(), v.clone())))?;
        if let Some((sql, operands)) = &self.raw {
            db.where_sql(sql, operands.clone());
        }
        Ok(())
    }
}

pub struct Table<'a> {
    db: &'a mut Db,
    descriptor: TableDescriptor,
}

impl<'a> Table<'a> {
    pub fn new(db: &'a mut Db, descriptor: TableDescriptor) -> Self {
        Self { db, descriptor }
    }

    pub fn descriptor(&self) -> &TableDescriptor {
        &self.descriptor
    }

    pub fn db(&mut self) -> &mut Db {
        &mut *self.db
    }

    /// Insert a row and return its key: the key column from the record when
    /// present, otherwise the generated id for auto-increment tables, else 0.
    pub async fn insert(&mut self, record: Record) -> DbResult<u64> {
        let explicit = record.get(&self.descriptor.primary_key).and_then(key_as_u64);
        self.db.insert(&self.descriptor.table, record).exec().await?;
        Ok(match explicit {
            Some(id) => id,
            None if self.descriptor.auto_increment => self.db.last_insert_id(),
            None => 0,
        })
    }

    /// Update the row with the given key; returns affected rows.
    pub async fn update(&mut self, id: impl Into<Operand>, record: Record) -> DbResult<u64> {
        self.db
            .where_(&self.descriptor.primary_key, id)?
            .update(&self.descriptor.table, record)
            .exec()
            .await
    }

    pub async fn delete(&mut self, id: impl Into<Operand>) -> DbResult<u64> {
        self.db
            .where_(&self.descriptor.primary_key, id)?
            .delete(&self.descriptor.table)
            .exec()
            .await
    }

    pub async fn get_one<T>(&mut self, id: impl Into<Operand>) -> DbResult<Option<T>>
    where
        T: for<'r> FromRow<'r, MySqlRow> + Send + Unpin,
    {
        self.db
            .select("*")
            .from(&self.descriptor.table)
            .where_(&self.descriptor.primary_key, id)?
            .fetch()
            .await
    }

    /// Rows whose key is in `ids`; an empty list matches nothing.
    pub async fn get_multi<T, I>(&mut self, ids: Vec<I>) -> DbResult<Vec<T>>
    where
        T: for<'r> FromRow<'r, MySqlRow> + Send + Unpin,
        I: Into<QueryParam>,
    {
        self.db
            .select("*")
            .from(&self.descriptor.table)
            .where_(&self.descriptor.primary_key, Operand::from(ids))?
            .fetch_all()
            .await
    }

    pub async fn total_count(&mut self, filter: &Filter) -> DbResult<i64> {
        filter.apply(&mut *self.db)?;
        let row: Option<(i64,)> = self
            .db
            .select_count("*")
            .from(&self.descriptor.table)
            .fetch()
            .await?;
        Ok(row.map(|(total,)| total).unwrap_or(0))
    }

    /// One page of rows; `page` is 1-based and `per_page` rows long.
    pub async fn load<T>(
        &mut self,
        filter: &Filter,
        page: i64,
        per_page: u64,
        order: &str,
    ) -> DbResult<Vec<T>>
    where
        T: for<'r> FromRow<'r, MySqlRow> + Send + Unpin,
    {
        filter.apply(&mut *self.db)?;
        self.db
            .select("*")
            .from(&self.descriptor.table)
            .order_by(order)
            .page(page)
            .count(per_page)
            .fetch_all()
            .await
    }

    pub async fn load_all<T>(&mut self, filter: &Filter, order: &str) -> DbResult<Vec<T>>
    where
        T: for<'r> FromRow<'r, MySqlRow> + Send + Unpin,
    {
        filter.apply(&mut *self.db)?;
        self.db
            .select("*")
            .from(&self.descriptor.table)
            .order_by(order)
            .fetch_all()
            .await
    }

    pub async fn load_one<T>(&mut self, filter: &Filter) -> DbResult<Option<T>>
    where
        T: for<'r> FromRow<'r, MySqlRow> + Send + Unpin,
    {
        filter.apply(&mut *self.db)?;
        self.db
            .select("*")
            .from(&self.descriptor.table)
            .limit(1)
            .fetch()
            .await
    }
}

fn key_as_u64(value: &QueryParam) -> Option<u64> {
    match value {
        QueryParam::Int(v) => u64::try_from(*v).ok(),
        QueryParam::UInt(v) => Some(*v),
        QueryParam::String(s) => s.parse().ok(),
        _ => None,
    }
}
