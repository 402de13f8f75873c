use std::future::Future;
use std::sync::Arc;

use anyhow::Context as _;
use mongodb::bson::{self, Bson, Document, doc};
use mongodb::error::{ErrorKind, RETRYABLE_WRITE_ERROR, WriteFailure};
use mongodb::options::IndexOptions;
use mongodb::{Client, Collection, Database, IndexModel};
use tokio::sync::OnceCell;
use uuid::Uuid;

use crate::domain::projection::{EntityKind, MirrorDocument, MirrorWrite};
use crate::domain::repository::MirrorStore;
use crate::error::ExternalError;

const DUPLICATE_KEY: i32 = 11000;

/// Mirror store backed by MongoDB: one collection per entity kind, documents keyed by
/// the unique `source_id` field.
///
/// Writes wait for the unique index: without it a version-guarded upsert that matches
/// nothing would insert a second document for the same record.
#[derive(Clone)]
pub struct MongoMirrorStore {
    pub db: Database,
    indexed: Arc<OnceCell<()>>,
}

impl MongoMirrorStore {
    /// The driver connects lazily; this only parses the URI.
    pub async fn connect(uri: &str, database: &str) -> anyhow::Result<Self> {
        let client = Client::with_uri_str(uri)
            .await
            .context("parse mongodb uri")?;
        Ok(Self {
            db: client.database(database),
            indexed: Arc::new(OnceCell::new()),
        })
    }

    /// Make sure the unique `source_id` indexes exist. Once they have been created this
    /// returns immediately; until then every call tries again and fails as transient.
    pub async fn ensure_indexes(&self) -> Result<(), ExternalError> {
        index_gate(&self.indexed, || self.create_indexes()).await
    }

    async fn create_indexes(&self) -> anyhow::Result<()> {
        for kind in EntityKind::ALL {
            let index = IndexModel::builder()
                .keys(doc! { "source_id": 1 })
                .options(IndexOptions::builder().unique(true).build())
                .build();
            self.collection(kind)
                .create_index(index)
                .await
                .with_context(|| format!("create source_id index on {}", kind.collection()))?;
        }
        Ok(())
    }

    pub async fn ping(&self) -> anyhow::Result<()> {
        self.db
            .run_command(doc! { "ping": 1 })
            .await
            .context("ping mongodb")?;
        Ok(())
    }

    fn collection(&self, kind: EntityKind) -> Collection<Document> {
        self.db.collection(kind.collection())
    }
}

impl MirrorStore for MongoMirrorStore {
    async fn upsert(&self, document: &MirrorDocument) -> Result<MirrorWrite, ExternalError> {
        self.ensure_indexes().await?;
        let replacement = encode(document)?;
        let source_id = document.source_id.to_string();

        // Matches only when the stored copy is not newer. Otherwise the upsert collides
        // with the unique index and the write is stale.
        let filter = doc! {
            "source_id": source_id.as_str(),
            "version": { "$lte": document.version },
        };
        let result = self
            .collection(document.kind)
            .replace_one(filter, replacement)
            .upsert(true)
            .await;

        match result {
            Ok(_) => Ok(MirrorWrite::Written),
            Err(e) if is_duplicate_key(&e) => Ok(MirrorWrite::Stale),
            Err(e) => Err(classify(e, "replace mirror document")),
        }
    }

    async fn replace(&self, document: &MirrorDocument) -> Result<(), ExternalError> {
        self.ensure_indexes().await?;
        let replacement = encode(document)?;
        self.collection(document.kind)
            .replace_one(doc! { "source_id": document.source_id.to_string() }, replacement)
            .upsert(true)
            .await
            .map_err(|e| classify(e, "force replace mirror document"))?;
        Ok(())
    }

    async fn remove(&self, kind: EntityKind, id: Uuid) -> Result<bool, ExternalError> {
        let result = self
            .collection(kind)
            .delete_one(doc! { "source_id": id.to_string() })
            .await
            .map_err(|e| classify(e, "delete mirror document"))?;
        Ok(result.deleted_count > 0)
    }

    async fn source_ids(&self, kind: EntityKind) -> Result<Vec<Uuid>, ExternalError> {
        let values = self
            .collection(kind)
            .distinct("source_id", doc! {})
            .await
            .map_err(|e| classify(e, "list mirror source ids"))?;
        Ok(values
            .into_iter()
            .filter_map(|value| match value {
                Bson::String(s) => Uuid::parse_str(&s).ok(),
                _ => None,
            })
            .collect())
    }
}

fn encode(document: &MirrorDocument) -> Result<Document, ExternalError> {
    let mut encoded = bson::to_document(&document.body).map_err(|e| {
        ExternalError::Permanent(anyhow::Error::new(e).context("encode mirror document"))
    })?;
    encoded.insert("source_id", document.source_id.to_string());
    encoded.insert("version", document.version);
    encoded.insert("synced_at", bson::DateTime::now());
    Ok(encoded)
}

/// Run `create` until it succeeds once. Failures are transient so the write that hit
/// them lands in the sync outbox.
async fn index_gate<F, Fut>(cell: &OnceCell<()>, create: F) -> Result<(), ExternalError>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = anyhow::Result<()>>,
{
    cell.get_or_try_init(create)
        .await
        .map(|_| ())
        .map_err(ExternalError::Transient)
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(e)) => e.code == DUPLICATE_KEY,
        ErrorKind::Command(e) => e.code == DUPLICATE_KEY,
        _ => false,
    }
}

fn classify(err: mongodb::error::Error, what: &'static str) -> ExternalError {
    let transient = err.contains_label(RETRYABLE_WRITE_ERROR)
        || matches!(
            err.kind.as_ref(),
            ErrorKind::Io(_)
                | ErrorKind::ServerSelection { .. }
                | ErrorKind::ConnectionPoolCleared { .. }
        );
    let err = anyhow::Error::new(err).context(what);
    if transient {
        ExternalError::Transient(err)
    } else {
        ExternalError::Permanent(err)
    }
}
