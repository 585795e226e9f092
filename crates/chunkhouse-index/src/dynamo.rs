//! DynamoDB index client.
//!
//! The index table uses a composite primary key: string hash key `h`,
//! binary range key `r`, plus an optional binary attribute `c` carrying
//! inline chunk metadata. Queries are hash-key equality with an optional
//! `BETWEEN` on the range key, paginated through `ExclusiveStartKey`.
//!
//! Consumed capacity is requested on every call and fed into the
//! capacity counter. Retry lives in the caller (the store's dispatcher),
//! so requests here are built once and re-sent verbatim on throttling.

use std::collections::HashMap;

use async_trait::async_trait;
use aws_sdk_dynamodb::error::{ProvideErrorMetadata, SdkError};
use aws_sdk_dynamodb::primitives::Blob;
use aws_sdk_dynamodb::types::{
    AttributeDefinition, AttributeValue, KeySchemaElement, KeyType, ProvisionedThroughput,
    PutRequest, ReturnConsumedCapacity, ScalarAttributeType, WriteRequest,
};
use aws_sdk_dynamodb::Client;
use bytes::Bytes;

use chunkhouse_observability::metrics::INDEX_CONSUMED_CAPACITY;

use crate::error::{IndexError, Result, THROTTLED_ERROR_CODE};
use crate::types::{
    IndexEntry, IndexRow, ProvisionedCapacity, QueryInput, HASH_KEY, METADATA_KEY, RANGE_KEY,
};
use crate::{IndexClient, IndexRequest, QueryPages};

const LIST_TABLES_LIMIT: i32 = 10;

#[derive(Debug, Clone)]
pub struct DynamoIndexClient {
    client: Client,
}

impl DynamoIndexClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

/// Map an SDK error into [`IndexError`], pulling out the remote error
/// code so throttling can be retried and failures counted by reason.
fn classify<E, R>(operation: &'static str, err: SdkError<E, R>) -> IndexError
where
    E: ProvideErrorMetadata,
{
    match err.code() {
        Some(THROTTLED_ERROR_CODE) => IndexError::Throttled,
        code => IndexError::Remote {
            operation,
            code: code.unwrap_or("other").to_string(),
            message: err
                .message()
                .unwrap_or("request dispatch failed")
                .to_string(),
        },
    }
}

fn invalid<E: std::fmt::Display>(err: E) -> IndexError {
    IndexError::InvalidRequest(err.to_string())
}

#[async_trait]
impl IndexClient for DynamoIndexClient {
    async fn list_tables(&self) -> Result<Vec<String>> {
        let output = self
            .client
            .list_tables()
            .limit(LIST_TABLES_LIMIT)
            .send()
            .await
            .map_err(|e| classify("ListTables", e))?;
        Ok(output.table_names().to_vec())
    }

    async fn create_table(&self, name: &str, capacity: ProvisionedCapacity) -> Result<()> {
        let hash_attribute = AttributeDefinition::builder()
            .attribute_name(HASH_KEY)
            .attribute_type(ScalarAttributeType::S)
            .build()
            .map_err(invalid)?;
        let range_attribute = AttributeDefinition::builder()
            .attribute_name(RANGE_KEY)
            .attribute_type(ScalarAttributeType::B)
            .build()
            .map_err(invalid)?;
        let hash_schema = KeySchemaElement::builder()
            .attribute_name(HASH_KEY)
            .key_type(KeyType::Hash)
            .build()
            .map_err(invalid)?;
        let range_schema = KeySchemaElement::builder()
            .attribute_name(RANGE_KEY)
            .key_type(KeyType::Range)
            .build()
            .map_err(invalid)?;
        let throughput = ProvisionedThroughput::builder()
            .read_capacity_units(capacity.read_units)
            .write_capacity_units(capacity.write_units)
            .build()
            .map_err(invalid)?;

        self.client
            .create_table()
            .table_name(name)
            .attribute_definitions(hash_attribute)
            .attribute_definitions(range_attribute)
            .key_schema(hash_schema)
            .key_schema(range_schema)
            .provisioned_throughput(throughput)
            .send()
            .await
            .map_err(|e| classify("CreateTable", e))?;
        Ok(())
    }

    fn batch_put(&self, table: &str, entries: Vec<IndexEntry>) -> Box<dyn IndexRequest> {
        Box::new(DynamoBatchPut {
            client: self.client.clone(),
            table: table.to_string(),
            entries,
        })
    }

    fn query(&self, input: QueryInput) -> Box<dyn QueryPages> {
        Box::new(DynamoQueryPages {
            client: self.client.clone(),
            input,
            exclusive_start_key: None,
            page: Vec::new(),
            more_pages: false,
        })
    }
}

struct DynamoBatchPut {
    client: Client,
    table: String,
    entries: Vec<IndexEntry>,
}

#[async_trait]
impl IndexRequest for DynamoBatchPut {
    fn operation_name(&self) -> &'static str {
        "BatchWriteItem"
    }

    async fn send(&mut self) -> Result<()> {
        let mut writes = Vec::with_capacity(self.entries.len());
        for entry in &self.entries {
            let mut put = PutRequest::builder()
                .item(HASH_KEY, AttributeValue::S(entry.hash_key.clone()))
                .item(
                    RANGE_KEY,
                    AttributeValue::B(Blob::new(entry.range_key.to_vec())),
                );
            if let Some(metadata) = &entry.metadata {
                put = put.item(METADATA_KEY, AttributeValue::B(Blob::new(metadata.to_vec())));
            }
            writes.push(
                WriteRequest::builder()
                    .put_request(put.build().map_err(invalid)?)
                    .build(),
            );
        }

        let output = self
            .client
            .batch_write_item()
            .request_items(&self.table, writes)
            .return_consumed_capacity(ReturnConsumedCapacity::Total)
            .send()
            .await
            .map_err(|e| classify("BatchWriteItem", e))?;

        for consumed in output.consumed_capacity() {
            if let Some(units) = consumed.capacity_units() {
                INDEX_CONSUMED_CAPACITY
                    .with_label_values(&["BatchWriteItem"])
                    .inc_by(units);
            }
        }

        // TODO: resubmit output.unprocessed_items() instead of treating a
        // partially throttled batch as fully applied.
        Ok(())
    }
}

struct DynamoQueryPages {
    client: Client,
    input: QueryInput,
    exclusive_start_key: Option<HashMap<String, AttributeValue>>,
    page: Vec<IndexRow>,
    more_pages: bool,
}

#[async_trait]
impl IndexRequest for DynamoQueryPages {
    fn operation_name(&self) -> &'static str {
        "Query"
    }

    async fn send(&mut self) -> Result<()> {
        let mut query = self
            .client
            .query()
            .table_name(&self.input.table)
            .expression_attribute_names("#h", HASH_KEY)
            .expression_attribute_values(":h", AttributeValue::S(self.input.hash_key.clone()))
            .return_consumed_capacity(ReturnConsumedCapacity::Total)
            .set_exclusive_start_key(self.exclusive_start_key.clone());
        query = match &self.input.range {
            Some(bounds) => query
                .key_condition_expression("#h = :h AND #r BETWEEN :lo AND :hi")
                .expression_attribute_names("#r", RANGE_KEY)
                .expression_attribute_values(
                    ":lo",
                    AttributeValue::B(Blob::new(bounds.low.to_vec())),
                )
                .expression_attribute_values(
                    ":hi",
                    AttributeValue::B(Blob::new(bounds.high.to_vec())),
                ),
            None => query.key_condition_expression("#h = :h"),
        };

        let output = query.send().await.map_err(|e| classify("Query", e))?;

        if let Some(units) = output.consumed_capacity().and_then(|c| c.capacity_units()) {
            INDEX_CONSUMED_CAPACITY
                .with_label_values(&["Query"])
                .inc_by(units);
        }

        let mut rows = Vec::with_capacity(output.items().len());
        for item in output.items() {
            let range_key = item
                .get(RANGE_KEY)
                .and_then(|value| value.as_b().ok())
                .map(|blob| Bytes::copy_from_slice(blob.as_ref()))
                .ok_or(IndexError::MalformedRangeKey)?;
            let metadata = item
                .get(METADATA_KEY)
                .and_then(|value| value.as_b().ok())
                .map(|blob| Bytes::copy_from_slice(blob.as_ref()));
            rows.push(IndexRow {
                range_key,
                metadata,
            });
        }
        self.page = rows;

        match output.last_evaluated_key() {
            Some(key) if !key.is_empty() => {
                self.exclusive_start_key = Some(key.clone());
                self.more_pages = true;
            }
            _ => self.more_pages = false,
        }
        Ok(())
    }
}

impl QueryPages for DynamoQueryPages {
    fn page(&self) -> &[IndexRow] {
        &self.page
    }

    fn has_next_page(&self) -> bool {
        self.more_pages
    }

    fn advance(&mut self) -> bool {
        if !self.more_pages {
            return false;
        }
        // exclusive_start_key is already positioned past the current page
        self.page.clear();
        self.more_pages = false;
        true
    }
}
