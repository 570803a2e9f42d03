//! Metadata store adapter.
//!
//! Wraps the document store's primitives into the four access patterns the
//! repositories need: conditional create, conditional update, conditional
//! delete, and a restartable prefix query. Conditional-check outcomes are
//! ordinary values, never errors — a failed precondition is something callers
//! map to a domain outcome (`NotFound`/`Conflict`), not an exception path.
//!
//! The store has no secondary indexes. Any lookup that is not "all items
//! under one partition with a given sort-key prefix" is a prefix scan plus an
//! in-memory filter, and callers must follow continuation tokens until a
//! match is found or pages run out (see [`MAX_SCAN_PAGES`]). A lookup that
//! stops at the first page silently misses later items.

use async_trait::async_trait;
use aws_sdk_dynamodb::Client;
use aws_sdk_dynamodb::error::SdkError;
use aws_sdk_dynamodb::operation::delete_item::DeleteItemError;
use aws_sdk_dynamodb::operation::put_item::PutItemError;
use aws_sdk_dynamodb::operation::update_item::UpdateItemError;
use aws_sdk_dynamodb::types::AttributeValue;
use base64::{Engine as _, engine::general_purpose};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use thiserror::Error;

/// A record as seen by the repositories: a flat JSON object. The partition
/// and sort key are stored as the `PK`/`SK` attributes of the document, so
/// items returned by queries can be addressed again without re-deriving keys.
pub type Document = Map<String, Value>;

/// Ceiling on continuation-following for scan-with-filter lookups. Bounds
/// worst-case cost on pathological partitions; at the default page size this
/// covers 2500 items per lookup.
pub const MAX_SCAN_PAGES: usize = 50;

#[derive(Debug, Error)]
pub enum MetaError {
    /// The store call itself failed (network, throttling, permissions).
    /// Fatal to the calling operation.
    #[error("metadata store call failed: {0}")]
    Store(String),

    #[error("malformed continuation token")]
    BadContinuation,
}

pub type MetaResult<T> = Result<T, MetaError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    Created,
    /// The composite key already holds a record; nothing was written.
    AlreadyExists,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    Updated,
    /// The record vanished between lookup and write (e.g. a racing delete).
    NotFound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    NotFound,
}

#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    /// Strongly-consistent read, so create-then-lookup works immediately.
    pub consistent_read: bool,
    /// Page size. `None` lets the store choose.
    pub limit: Option<i32>,
    /// Sort-key order. `false` scans in reverse, which for timestamp-prefixed
    /// sort keys means newest first.
    pub scan_forward: bool,
    /// Opaque token from a previous page's `next_continuation`.
    pub continuation: Option<String>,
}

#[derive(Debug, Default)]
pub struct QueryPage {
    pub items: Vec<Document>,
    /// Present when more pages may exist; feed back via
    /// [`QueryOptions::continuation`].
    pub next_continuation: Option<String>,
}

#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Conditional create: never overwrites an existing record.
    async fn put_if_absent(&self, pk: &str, sk: &str, item: Document) -> MetaResult<PutOutcome>;

    /// Conditional update: applies `patch` (a non-empty flat set of attribute
    /// assignments) only if the record exists.
    async fn update_if_exists(
        &self,
        pk: &str,
        sk: &str,
        patch: Document,
    ) -> MetaResult<UpdateOutcome>;

    /// Conditional delete: distinguishes "deleted" from "was already gone".
    async fn delete_if_exists(&self, pk: &str, sk: &str) -> MetaResult<DeleteOutcome>;

    /// Strongly-consistent point lookup.
    async fn get(&self, pk: &str, sk: &str) -> MetaResult<Option<Document>>;

    /// One page of records whose sort key starts with `sk_prefix`.
    async fn query_by_prefix(
        &self,
        pk: &str,
        sk_prefix: &str,
        opts: QueryOptions,
    ) -> MetaResult<QueryPage>;
}

// ---------------------------------------------------------------------------
// DynamoDB implementation
// ---------------------------------------------------------------------------

/// Metadata store backed by a single DynamoDB table with a composite
/// (`PK`, `SK`) primary key.
#[derive(Clone)]
pub struct DynamoMetadataStore {
    client: Client,
    table_name: String,
}

impl DynamoMetadataStore {
    pub fn new(client: Client, table_name: impl Into<String>) -> Self {
        Self {
            client,
            table_name: table_name.into(),
        }
    }

    fn key_attrs(pk: &str, sk: &str) -> HashMap<String, AttributeValue> {
        HashMap::from([
            ("PK".to_string(), AttributeValue::S(pk.to_string())),
            ("SK".to_string(), AttributeValue::S(sk.to_string())),
        ])
    }

    fn is_put_conditional_failed(err: &SdkError<PutItemError>) -> bool {
        match err {
            SdkError::ServiceError(service_err) => matches!(
                service_err.err(),
                PutItemError::ConditionalCheckFailedException(_)
            ),
            _ => false,
        }
    }

    fn is_update_conditional_failed(err: &SdkError<UpdateItemError>) -> bool {
        match err {
            SdkError::ServiceError(service_err) => matches!(
                service_err.err(),
                UpdateItemError::ConditionalCheckFailedException(_)
            ),
            _ => false,
        }
    }

    fn is_delete_conditional_failed(err: &SdkError<DeleteItemError>) -> bool {
        match err {
            SdkError::ServiceError(service_err) => matches!(
                service_err.err(),
                DeleteItemError::ConditionalCheckFailedException(_)
            ),
            _ => false,
        }
    }
}

#[async_trait]
impl MetadataStore for DynamoMetadataStore {
    async fn put_if_absent(&self, pk: &str, sk: &str, item: Document) -> MetaResult<PutOutcome> {
        let mut attrs: HashMap<String, AttributeValue> = item
            .iter()
            .map(|(k, v)| (k.clone(), value_to_attr(v)))
            .collect();
        attrs.extend(Self::key_attrs(pk, sk));

        let result = self
            .client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(attrs))
            .condition_expression("attribute_not_exists(PK) AND attribute_not_exists(SK)")
            .send()
            .await;

        match result {
            Ok(_) => Ok(PutOutcome::Created),
            Err(err) if Self::is_put_conditional_failed(&err) => Ok(PutOutcome::AlreadyExists),
            Err(err) => Err(MetaError::Store(format!("PutItem: {err}"))),
        }
    }

    async fn update_if_exists(
        &self,
        pk: &str,
        sk: &str,
        patch: Document,
    ) -> MetaResult<UpdateOutcome> {
        // Attribute names are always aliased: patched fields include reserved
        // words such as `name` and `status`.
        let mut names = HashMap::new();
        let mut values = HashMap::new();
        let mut sets = Vec::with_capacity(patch.len());
        for (idx, (field, value)) in patch.iter().enumerate() {
            let name_ph = format!("#f{idx}");
            let value_ph = format!(":v{idx}");
            sets.push(format!("{name_ph} = {value_ph}"));
            names.insert(name_ph, field.clone());
            values.insert(value_ph, value_to_attr(value));
        }

        let result = self
            .client
            .update_item()
            .table_name(&self.table_name)
            .set_key(Some(Self::key_attrs(pk, sk)))
            .update_expression(format!("SET {}", sets.join(", ")))
            .condition_expression("attribute_exists(PK) AND attribute_exists(SK)")
            .set_expression_attribute_names(Some(names))
            .set_expression_attribute_values(Some(values))
            .send()
            .await;

        match result {
            Ok(_) => Ok(UpdateOutcome::Updated),
            Err(err) if Self::is_update_conditional_failed(&err) => Ok(UpdateOutcome::NotFound),
            Err(err) => Err(MetaError::Store(format!("UpdateItem: {err}"))),
        }
    }

    async fn delete_if_exists(&self, pk: &str, sk: &str) -> MetaResult<DeleteOutcome> {
        let result = self
            .client
            .delete_item()
            .table_name(&self.table_name)
            .set_key(Some(Self::key_attrs(pk, sk)))
            .condition_expression("attribute_exists(PK) AND attribute_exists(SK)")
            .send()
            .await;

        match result {
            Ok(_) => Ok(DeleteOutcome::Deleted),
            Err(err) if Self::is_delete_conditional_failed(&err) => Ok(DeleteOutcome::NotFound),
            Err(err) => Err(MetaError::Store(format!("DeleteItem: {err}"))),
        }
    }

    async fn get(&self, pk: &str, sk: &str) -> MetaResult<Option<Document>> {
        let response = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .set_key(Some(Self::key_attrs(pk, sk)))
            .consistent_read(true)
            .send()
            .await
            .map_err(|err| MetaError::Store(format!("GetItem: {err}")))?;

        Ok(response.item().map(attrs_to_document))
    }

    async fn query_by_prefix(
        &self,
        pk: &str,
        sk_prefix: &str,
        opts: QueryOptions,
    ) -> MetaResult<QueryPage> {
        let mut request = self
            .client
            .query()
            .table_name(&self.table_name)
            .key_condition_expression("PK = :pk AND begins_with(SK, :prefix)")
            .expression_attribute_values(":pk", AttributeValue::S(pk.to_string()))
            .expression_attribute_values(":prefix", AttributeValue::S(sk_prefix.to_string()))
            .consistent_read(opts.consistent_read)
            .scan_index_forward(opts.scan_forward)
            .set_limit(opts.limit);

        if let Some(token) = opts.continuation.as_deref() {
            let (start_pk, start_sk) = decode_continuation(token)?;
            request = request.set_exclusive_start_key(Some(Self::key_attrs(&start_pk, &start_sk)));
        }

        let response = request
            .send()
            .await
            .map_err(|err| MetaError::Store(format!("Query: {err}")))?;

        let items = response.items().iter().map(attrs_to_document).collect();
        let next_continuation = response.last_evaluated_key().and_then(|key| {
            let pk = key.get("PK")?.as_s().ok()?;
            let sk = key.get("SK")?.as_s().ok()?;
            Some(encode_continuation(pk, sk))
        });

        Ok(QueryPage {
            items,
            next_continuation,
        })
    }
}

fn encode_continuation(pk: &str, sk: &str) -> String {
    general_purpose::STANDARD.encode(format!("{pk}\n{sk}"))
}

fn decode_continuation(token: &str) -> MetaResult<(String, String)> {
    let bytes = general_purpose::STANDARD
        .decode(token)
        .map_err(|_| MetaError::BadContinuation)?;
    let text = String::from_utf8(bytes).map_err(|_| MetaError::BadContinuation)?;
    let (pk, sk) = text.split_once('\n').ok_or(MetaError::BadContinuation)?;
    Ok((pk.to_string(), sk.to_string()))
}

fn value_to_attr(value: &Value) -> AttributeValue {
    match value {
        Value::Null => AttributeValue::Null(true),
        Value::Bool(b) => AttributeValue::Bool(*b),
        Value::Number(n) => AttributeValue::N(n.to_string()),
        Value::String(s) => AttributeValue::S(s.clone()),
        Value::Array(items) => AttributeValue::L(items.iter().map(value_to_attr).collect()),
        Value::Object(map) => AttributeValue::M(
            map.iter()
                .map(|(k, v)| (k.clone(), value_to_attr(v)))
                .collect(),
        ),
    }
}

fn attr_to_value(attr: &AttributeValue) -> Value {
    match attr {
        AttributeValue::S(s) => Value::String(s.clone()),
        AttributeValue::N(n) => {
            if let Ok(i) = n.parse::<i64>() {
                Value::from(i)
            } else {
                n.parse::<f64>()
                    .ok()
                    .and_then(serde_json::Number::from_f64)
                    .map(Value::Number)
                    .unwrap_or(Value::Null)
            }
        }
        AttributeValue::Bool(b) => Value::Bool(*b),
        AttributeValue::Null(_) => Value::Null,
        AttributeValue::L(items) => Value::Array(items.iter().map(attr_to_value).collect()),
        AttributeValue::M(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), attr_to_value(v)))
                .collect(),
        ),
        _ => Value::Null,
    }
}

fn attrs_to_document(attrs: &HashMap<String, AttributeValue>) -> Document {
    attrs
        .iter()
        .map(|(k, v)| (k.clone(), attr_to_value(v)))
        .collect()
}

// ---------------------------------------------------------------------------
// In-memory implementation
// ---------------------------------------------------------------------------

/// Ordered in-memory table with the same conditional and pagination
/// semantics as the DynamoDB store. Used by tests and for local development
/// without AWS credentials.
#[derive(Default)]
pub struct MemoryMetadataStore {
    items: Mutex<BTreeMap<(String, String), Document>>,
}

impl MemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MetadataStore for MemoryMetadataStore {
    async fn put_if_absent(&self, pk: &str, sk: &str, item: Document) -> MetaResult<PutOutcome> {
        let mut items = self.items.lock().expect("metadata table lock");
        let key = (pk.to_string(), sk.to_string());
        if items.contains_key(&key) {
            return Ok(PutOutcome::AlreadyExists);
        }
        let mut doc = item;
        doc.insert("PK".to_string(), Value::String(pk.to_string()));
        doc.insert("SK".to_string(), Value::String(sk.to_string()));
        items.insert(key, doc);
        Ok(PutOutcome::Created)
    }

    async fn update_if_exists(
        &self,
        pk: &str,
        sk: &str,
        patch: Document,
    ) -> MetaResult<UpdateOutcome> {
        let mut items = self.items.lock().expect("metadata table lock");
        match items.get_mut(&(pk.to_string(), sk.to_string())) {
            Some(doc) => {
                for (field, value) in patch {
                    doc.insert(field, value);
                }
                Ok(UpdateOutcome::Updated)
            }
            None => Ok(UpdateOutcome::NotFound),
        }
    }

    async fn delete_if_exists(&self, pk: &str, sk: &str) -> MetaResult<DeleteOutcome> {
        let mut items = self.items.lock().expect("metadata table lock");
        match items.remove(&(pk.to_string(), sk.to_string())) {
            Some(_) => Ok(DeleteOutcome::Deleted),
            None => Ok(DeleteOutcome::NotFound),
        }
    }

    async fn get(&self, pk: &str, sk: &str) -> MetaResult<Option<Document>> {
        let items = self.items.lock().expect("metadata table lock");
        Ok(items.get(&(pk.to_string(), sk.to_string())).cloned())
    }

    async fn query_by_prefix(
        &self,
        pk: &str,
        sk_prefix: &str,
        opts: QueryOptions,
    ) -> MetaResult<QueryPage> {
        let items = self.items.lock().expect("metadata table lock");

        let mut matching: Vec<(&String, &Document)> = items
            .iter()
            .filter(|((item_pk, item_sk), _)| item_pk == pk && item_sk.starts_with(sk_prefix))
            .map(|((_, item_sk), doc)| (item_sk, doc))
            .collect();
        if !opts.scan_forward {
            matching.reverse();
        }

        // Resume strictly after the token's sort key in scan order, mirroring
        // an exclusive start key: rows deleted between pages must not
        // truncate the remainder of the scan.
        let start = match opts.continuation.as_deref() {
            Some(token) => {
                let (_, after_sk) = decode_continuation(token)?;
                matching
                    .iter()
                    .position(|(sk, _)| {
                        if opts.scan_forward {
                            **sk > after_sk
                        } else {
                            **sk < after_sk
                        }
                    })
                    .unwrap_or(matching.len())
            }
            None => 0,
        };

        let limit = opts.limit.map(|l| l.max(0) as usize).unwrap_or(usize::MAX);
        let page: Vec<(&String, &Document)> =
            matching.iter().skip(start).take(limit).cloned().collect();
        let consumed = start + page.len();

        let next_continuation = if consumed < matching.len() {
            page.last().map(|(sk, _)| encode_continuation(pk, sk))
        } else {
            None
        };

        Ok(QueryPage {
            items: page.into_iter().map(|(_, doc)| doc.clone()).collect(),
            next_continuation,
        })
    }
}
