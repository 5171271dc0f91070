//! In-memory store
//!
//! Interprets the same modification documents as the MongoDB store
//! (`$set`, `$setOnInsert`, `$inc`, `$max`, dotted paths) over plain
//! document vectors. Backs unit tests and dev mode when no MongoDB is
//! reachable.

use std::collections::HashMap;
use std::str::FromStr;

use bson::{doc, Bson, DateTime, Document};
use tokio::sync::RwLock;

use crate::db::store::{Entity, Store};
use crate::types::{GazetteError, Result};

/// Parse an integer wei amount out of a store decimal
fn parse_decimal(value: &bson::Decimal128, path: &str) -> Result<i128> {
    value
        .to_string()
        .parse::<i128>()
        .map_err(|e| GazetteError::Store(format!("Non-integer decimal on {path}: {e}")))
}

/// In-memory `Store` implementation
#[derive(Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<&'static str, Vec<Document>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Row count in one collection, for tests and dev-mode reporting
    pub async fn count(&self, entity: Entity) -> usize {
        self.collections
            .read()
            .await
            .get(entity.collection())
            .map(|rows| rows.len())
            .unwrap_or(0)
    }
}

/// Set a possibly-dotted path inside a document, creating subdocuments
fn set_path(target: &mut Document, path: &str, value: Bson) {
    match path.split_once('.') {
        None => {
            target.insert(path, value);
        }
        Some((head, rest)) => {
            if !matches!(target.get(head), Some(Bson::Document(_))) {
                target.insert(head, Document::new());
            }
            let Some(Bson::Document(inner)) = target.get_mut(head) else {
                return;
            };
            set_path(inner, rest, value);
        }
    }
}

fn as_i64(value: &Bson) -> Option<i64> {
    match value {
        Bson::Int32(v) => Some(*v as i64),
        Bson::Int64(v) => Some(*v),
        _ => None,
    }
}

/// Apply a modification document to a row
fn apply_change(row: &mut Document, change: &Document) -> Result<()> {
    for (op, spec) in change {
        let spec = spec.as_document().ok_or_else(|| {
            GazetteError::Store(format!("Malformed {op} specification: expected document"))
        })?;
        match op.as_str() {
            "$set" => {
                for (path, value) in spec {
                    set_path(row, path, value.clone());
                }
            }
            // Only meaningful on the insert path; rows here already exist
            "$setOnInsert" => {}
            "$inc" => {
                for (path, value) in spec {
                    if let Bson::Decimal128(delta) = value {
                        let delta: i128 = parse_decimal(delta, path)?;
                        let current = match row.get(path) {
                            Some(Bson::Decimal128(d)) => parse_decimal(d, path)?,
                            _ => 0,
                        };
                        let sum = bson::Decimal128::from_str(&(current + delta).to_string())
                            .map_err(|e| {
                                GazetteError::Store(format!("Decimal overflow on {path}: {e}"))
                            })?;
                        row.insert(path, Bson::Decimal128(sum));
                        continue;
                    }
                    let delta = as_i64(value).ok_or_else(|| {
                        GazetteError::Store(format!("Non-numeric $inc on {path}"))
                    })?;
                    let current = row.get(path).and_then(as_i64).unwrap_or(0);
                    row.insert(path, Bson::Int64(current + delta));
                }
            }
            "$max" => {
                for (path, value) in spec {
                    let candidate = as_i64(value).ok_or_else(|| {
                        GazetteError::Store(format!("Non-integer $max on {path}"))
                    })?;
                    let current = row.get(path).and_then(as_i64);
                    if current.map(|c| candidate > c).unwrap_or(true) {
                        row.insert(path, Bson::Int64(candidate));
                    }
                }
            }
            "$min" => {
                for (path, value) in spec {
                    let candidate = as_i64(value).ok_or_else(|| {
                        GazetteError::Store(format!("Non-integer $min on {path}"))
                    })?;
                    let current = row.get(path).and_then(as_i64);
                    if current.map(|c| candidate < c).unwrap_or(true) {
                        row.insert(path, Bson::Int64(candidate));
                    }
                }
            }
            other => {
                return Err(GazetteError::Store(format!(
                    "Unsupported modification operator {other}"
                )));
            }
        }
    }
    Ok(())
}

/// Match a row against a filter of equality and `$gte` bounds
fn matches_filter(row: &Document, filter: &Document) -> bool {
    filter.iter().all(|(field, expected)| {
        let actual = row.get(field);
        if let Bson::Document(ops) = expected {
            if let Ok(bound) = ops.get_i64("$gte") {
                return actual.and_then(as_i64).map(|v| v >= bound).unwrap_or(false);
            }
        }
        actual == Some(expected)
    })
}

#[async_trait::async_trait]
impl Store for MemoryStore {
    async fn insert_or_ignore(
        &self,
        entity: Entity,
        key: Document,
        mut doc: Document,
    ) -> Result<bool> {
        let mut collections = self.collections.write().await;
        let rows = collections.entry(entity.collection()).or_default();

        if rows.iter().any(|row| matches_filter(row, &key)) {
            return Ok(false);
        }

        let now = DateTime::now();
        for (field, value) in &key {
            doc.insert(field, value.clone());
        }
        doc.insert("metadata", doc! { "created_at": now, "updated_at": now });
        rows.push(doc);
        Ok(true)
    }

    async fn insert_or_merge(
        &self,
        entity: Entity,
        key: Document,
        fields: Document,
    ) -> Result<()> {
        let mut collections = self.collections.write().await;
        let rows = collections.entry(entity.collection()).or_default();
        let now = DateTime::now();

        if let Some(row) = rows.iter_mut().find(|row| matches_filter(row, &key)) {
            apply_change(row, &doc! { "$set": fields })?;
            set_path(row, "metadata.updated_at", now.into());
            return Ok(());
        }

        let mut row = key;
        apply_change(&mut row, &doc! { "$set": fields })?;
        row.insert("metadata", doc! { "created_at": now, "updated_at": now });
        rows.push(row);
        Ok(())
    }

    async fn update(&self, entity: Entity, key: Document, change: Document) -> Result<bool> {
        let mut collections = self.collections.write().await;
        let rows = collections.entry(entity.collection()).or_default();

        match rows.iter_mut().find(|row| matches_filter(row, &key)) {
            Some(row) => {
                apply_change(row, &change)?;
                set_path(row, "metadata.updated_at", DateTime::now().into());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn find_one(&self, entity: Entity, key: Document) -> Result<Option<Document>> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(entity.collection())
            .and_then(|rows| rows.iter().find(|row| matches_filter(row, &key)).cloned()))
    }

    async fn find_many(&self, entity: Entity, filter: Document) -> Result<Vec<Document>> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(entity.collection())
            .map(|rows| {
                rows.iter()
                    .filter(|row| matches_filter(row, &filter))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_insert_or_ignore_reports_first_insert_only() {
        let store = MemoryStore::new();
        let key = doc! { "id": 1_i64 };
        let inserted = store
            .insert_or_ignore(Entity::Nouns, key.clone(), doc! { "owner": "0xa" })
            .await
            .unwrap();
        assert!(inserted);

        let inserted_again = store
            .insert_or_ignore(Entity::Nouns, key.clone(), doc! { "owner": "0xb" })
            .await
            .unwrap();
        assert!(!inserted_again);

        let row = store.find_one(Entity::Nouns, key).await.unwrap().unwrap();
        assert_eq!(row.get_str("owner").unwrap(), "0xa");
    }

    #[tokio::test]
    async fn test_insert_or_merge_combines_fields() {
        let store = MemoryStore::new();
        let key = doc! { "id": 1_i64 };
        store
            .insert_or_merge(Entity::Nouns, key.clone(), doc! { "owner": "0xa" })
            .await
            .unwrap();
        store
            .insert_or_merge(Entity::Nouns, key.clone(), doc! { "burned": true })
            .await
            .unwrap();

        let row = store.find_one(Entity::Nouns, key).await.unwrap().unwrap();
        assert_eq!(row.get_str("owner").unwrap(), "0xa");
        assert!(row.get_bool("burned").unwrap());
    }

    #[tokio::test]
    async fn test_update_missing_row_is_a_no_op() {
        let store = MemoryStore::new();
        let matched = store
            .update(
                Entity::Nouns,
                doc! { "id": 404_i64 },
                doc! { "$set": { "owner": "0xa" } },
            )
            .await
            .unwrap();
        assert!(!matched);
    }

    #[tokio::test]
    async fn test_inc_and_max_operators() {
        let store = MemoryStore::new();
        let key = doc! { "id": 1_i64 };
        store
            .insert_or_ignore(Entity::Proposals, key.clone(), doc! { "for_votes": 0_i64 })
            .await
            .unwrap();

        store
            .update(Entity::Proposals, key.clone(), doc! { "$inc": { "for_votes": 3_i64 } })
            .await
            .unwrap();
        store
            .update(Entity::Proposals, key.clone(), doc! { "$inc": { "for_votes": 2_i64 } })
            .await
            .unwrap();
        store
            .update(Entity::Proposals, key.clone(), doc! { "$max": { "end_block": 10_i64 } })
            .await
            .unwrap();
        store
            .update(Entity::Proposals, key.clone(), doc! { "$max": { "end_block": 5_i64 } })
            .await
            .unwrap();

        let row = store.find_one(Entity::Proposals, key).await.unwrap().unwrap();
        assert_eq!(row.get_i64("for_votes").unwrap(), 5);
        assert_eq!(row.get_i64("end_block").unwrap(), 10);
    }

    #[tokio::test]
    async fn test_decimal_inc_accumulates_wei() {
        let store = MemoryStore::new();
        let key = doc! { "id": 1_i64 };
        store
            .insert_or_ignore(
                Entity::Clients,
                key.clone(),
                doc! { "rewarded": bson::Decimal128::from_str("0").unwrap() },
            )
            .await
            .unwrap();

        let delta = bson::Decimal128::from_str("1000000000000000000").unwrap();
        for _ in 0..2 {
            store
                .update(Entity::Clients, key.clone(), doc! { "$inc": { "rewarded": delta } })
                .await
                .unwrap();
        }

        let row = store.find_one(Entity::Clients, key).await.unwrap().unwrap();
        let Bson::Decimal128(total) = row.get("rewarded").unwrap() else {
            panic!("expected decimal");
        };
        assert_eq!(total.to_string(), "2000000000000000000");
    }

    #[tokio::test]
    async fn test_find_many_gte_filter() {
        let store = MemoryStore::new();
        for id in [1_i64, 5, 9] {
            store
                .insert_or_ignore(Entity::Proposals, doc! { "id": id }, doc! {})
                .await
                .unwrap();
        }

        let rows = store
            .find_many(Entity::Proposals, doc! { "id": { "$gte": 5_i64 } })
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
    }
}
