//! MongoDB store implementation
//!
//! Maps the `Store` primitives onto MongoDB upserts: `insert_or_ignore`
//! becomes an upsert whose whole document rides in `$setOnInsert`,
//! `insert_or_merge` splits into `$set` (merge fields) plus `$setOnInsert`
//! (key fields), and `update` passes modification documents through
//! without upserting so a missing row degrades to a no-op.

use bson::{doc, DateTime, Document};
use mongodb::{options::IndexOptions, Client, Collection, IndexModel};
use tracing::{error, info};

use crate::db::schemas::{
    AuctionBidDoc, AuctionDoc, ClientDoc, DelegationDoc, NounDoc, ProposalDoc,
    ProposalVersionDoc, RewardCursorDoc, RewardUpdateDoc, VoteDoc, VoterDoc,
};
use crate::db::store::{Entity, Store};
use crate::types::{GazetteError, Result};

/// Trait for schemas that provide index definitions
pub trait IntoIndexes {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)>;
}

/// MongoDB-backed store
#[derive(Clone)]
pub struct MongoStore {
    client: Client,
    db_name: String,
}

impl MongoStore {
    /// Connect, verify with a ping, and apply the schema indexes
    pub async fn connect(uri: &str, db_name: &str) -> Result<Self> {
        info!("Connecting to MongoDB at {}", uri);

        // Use serverSelectionTimeoutMS to avoid hanging on unreachable MongoDB
        let timeout_uri = if uri.contains('?') {
            format!("{}&serverSelectionTimeoutMS=3000&connectTimeoutMS=3000", uri)
        } else {
            format!("{}?serverSelectionTimeoutMS=3000&connectTimeoutMS=3000", uri)
        };

        let client = Client::with_uri_str(&timeout_uri)
            .await
            .map_err(|e| GazetteError::Store(format!("Failed to connect to MongoDB: {}", e)))?;

        client
            .database(db_name)
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| GazetteError::Store(format!("MongoDB ping failed: {}", e)))?;

        info!("Connected to MongoDB database '{}'", db_name);

        let store = Self {
            client,
            db_name: db_name.to_string(),
        };
        store.apply_indexes().await?;

        Ok(store)
    }

    fn collection(&self, entity: Entity) -> Collection<Document> {
        self.client
            .database(&self.db_name)
            .collection::<Document>(entity.collection())
    }

    /// Apply every schema's index definitions
    async fn apply_indexes(&self) -> Result<()> {
        for entity in Entity::all() {
            let indices = match entity {
                Entity::Nouns => NounDoc::into_indices(),
                Entity::Auctions => AuctionDoc::into_indices(),
                Entity::AuctionBids => AuctionBidDoc::into_indices(),
                Entity::Proposals => ProposalDoc::into_indices(),
                Entity::ProposalVersions => ProposalVersionDoc::into_indices(),
                Entity::Votes => VoteDoc::into_indices(),
                Entity::Voters => VoterDoc::into_indices(),
                Entity::Delegations => DelegationDoc::into_indices(),
                Entity::Clients => ClientDoc::into_indices(),
                Entity::RewardUpdates => RewardUpdateDoc::into_indices(),
                Entity::RewardCursors => RewardCursorDoc::into_indices(),
            };

            if indices.is_empty() {
                continue;
            }

            let models: Vec<IndexModel> = indices
                .into_iter()
                .map(|(keys, opts)| IndexModel::builder().keys(keys).options(opts).build())
                .collect();

            self.collection(*entity)
                .create_indexes(models)
                .await
                .map_err(|e| {
                    GazetteError::Store(format!(
                        "Failed to create indexes on {}: {}",
                        entity.collection(),
                        e
                    ))
                })?;
        }

        Ok(())
    }
}

/// Ensure a modification document stamps `metadata.updated_at`
fn stamp_updated(change: &mut Document) {
    let now = DateTime::now();
    match change.get_document_mut("$set") {
        Ok(set) => {
            set.insert("metadata.updated_at", now);
        }
        Err(_) => {
            change.insert("$set", doc! { "metadata.updated_at": now });
        }
    }
}

#[async_trait::async_trait]
impl Store for MongoStore {
    async fn insert_or_ignore(
        &self,
        entity: Entity,
        key: Document,
        mut doc: Document,
    ) -> Result<bool> {
        let now = DateTime::now();
        doc.insert("metadata", doc! { "created_at": now, "updated_at": now });

        let result = self
            .collection(entity)
            .update_one(key, doc! { "$setOnInsert": doc })
            .upsert(true)
            .await
            .map_err(|e| {
                GazetteError::Store(format!("Insert into {} failed: {}", entity.collection(), e))
            })?;

        Ok(result.upserted_id.is_some())
    }

    async fn insert_or_merge(
        &self,
        entity: Entity,
        key: Document,
        fields: Document,
    ) -> Result<()> {
        let now = DateTime::now();
        let mut set = fields;
        set.insert("metadata.updated_at", now);

        let mut set_on_insert = key.clone();
        set_on_insert.insert("metadata.created_at", now);

        self.collection(entity)
            .update_one(
                key,
                doc! { "$set": set, "$setOnInsert": set_on_insert },
            )
            .upsert(true)
            .await
            .map_err(|e| {
                GazetteError::Store(format!("Merge into {} failed: {}", entity.collection(), e))
            })?;

        Ok(())
    }

    async fn update(&self, entity: Entity, key: Document, mut change: Document) -> Result<bool> {
        stamp_updated(&mut change);

        let result = self
            .collection(entity)
            .update_one(key, change)
            .await
            .map_err(|e| {
                GazetteError::Store(format!("Update of {} failed: {}", entity.collection(), e))
            })?;

        Ok(result.matched_count > 0)
    }

    async fn find_one(&self, entity: Entity, key: Document) -> Result<Option<Document>> {
        self.collection(entity)
            .find_one(key)
            .await
            .map_err(|e| {
                GazetteError::Store(format!("Find in {} failed: {}", entity.collection(), e))
            })
    }

    async fn find_many(&self, entity: Entity, filter: Document) -> Result<Vec<Document>> {
        use futures_util::StreamExt;

        let cursor = self
            .collection(entity)
            .find(filter)
            .await
            .map_err(|e| {
                GazetteError::Store(format!("Find in {} failed: {}", entity.collection(), e))
            })?;

        let results: Vec<Document> = cursor
            .filter_map(|doc| async {
                match doc {
                    Ok(d) => Some(d),
                    Err(e) => {
                        error!("Error reading document: {}", e);
                        None
                    }
                }
            })
            .collect()
            .await;

        Ok(results)
    }
}
