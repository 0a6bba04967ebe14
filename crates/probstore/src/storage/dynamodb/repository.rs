//! DynamoDB item store implementation.
//!
//! Implements `ItemStore` from `probstore_core::storage` against a single
//! table. Typed expressions are rendered to DynamoDB syntax here; SDK retries
//! are disabled so that the crate's single transient retry is the only one.

use std::collections::HashMap;

use async_trait::async_trait;
use aws_sdk_dynamodb::types::{
    AttributeValue, DeleteRequest, PutRequest, ReturnValue, Select,
    WriteRequest as DynamoWriteRequest,
};
use aws_sdk_dynamodb::Client;
use aws_smithy_types::retry::RetryConfig;
use aws_smithy_types::timeout::TimeoutConfig;

use probstore_core::storage::{
    Condition, ExpressionBuilder, Item, ItemKey, ItemStore, Query, RepositoryError, Result,
    Update, WriteOutcome, WriteRequest, ATTR_PK, ATTR_SK, MAX_BATCH_WRITE,
};

use super::error::{
    is_put_conditional_check_failed, is_update_conditional_check_failed, map_build_error,
    map_sdk_error,
};
use crate::config::Config;
use crate::retry::{retry_transient, RETRY_DELAY};
use crate::storage::marshal::{
    from_attribute_map, to_attribute_map, to_expression_value, AttributeMap,
};

/// DynamoDB-based item store.
#[derive(Clone)]
pub struct DynamoDbStore {
    client: Client,
    table_name: String,
}

impl std::fmt::Debug for DynamoDbStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamoDbStore")
            .field("table_name", &self.table_name)
            .finish()
    }
}

/// Rendered expressions and placeholder maps for one request.
#[derive(Debug, Default)]
struct Rendered {
    key_condition: Option<String>,
    filter: Option<String>,
    condition: Option<String>,
    update: Option<String>,
    names: Option<HashMap<String, String>>,
    values: Option<HashMap<String, AttributeValue>>,
}

impl Rendered {
    fn finish(mut self, builder: ExpressionBuilder) -> Self {
        let (names, values) = builder.finish();
        if !names.is_empty() {
            self.names = Some(names);
        }
        if !values.is_empty() {
            self.values = Some(
                values
                    .iter()
                    .map(|(placeholder, value)| (placeholder.clone(), to_expression_value(value)))
                    .collect(),
            );
        }
        self
    }

    fn for_condition(condition: Option<&Condition>) -> Self {
        let mut builder = ExpressionBuilder::new();
        let rendered = Self {
            condition: condition.map(|c| builder.condition(c)),
            ..Self::default()
        };
        rendered.finish(builder)
    }

    fn for_query(query: &Query) -> Self {
        let mut builder = ExpressionBuilder::new();
        let rendered = Self {
            key_condition: Some(builder.key_condition(query)),
            filter: query.filter.as_ref().map(|f| builder.condition(f)),
            ..Self::default()
        };
        rendered.finish(builder)
    }

    fn for_update(update: &Update) -> Self {
        let mut builder = ExpressionBuilder::new();
        let rendered = Self {
            update: Some(builder.update(update)),
            condition: update.condition.as_ref().map(|c| builder.condition(c)),
            ..Self::default()
        };
        rendered.finish(builder)
    }
}

impl DynamoDbStore {
    /// Creates a store from the shared SDK configuration.
    ///
    /// Applies the region, endpoint override and operation timeout from
    /// `config`, and disables SDK-level retries.
    pub fn new(sdk_config: &aws_config::SdkConfig, config: &Config) -> Self {
        let mut builder = aws_sdk_dynamodb::config::Builder::from(sdk_config)
            .region(aws_sdk_dynamodb::config::Region::new(config.region.clone()))
            .retry_config(RetryConfig::standard().with_max_attempts(1))
            .timeout_config(
                TimeoutConfig::builder()
                    .operation_timeout(config.timeout())
                    .build(),
            );

        if let Some(endpoint) = &config.endpoint_url {
            builder = builder.endpoint_url(endpoint);
        }

        Self::from_client(Client::from_conf(builder.build()), config.table_name.clone())
    }

    /// Creates a store from a pre-built client (for testing).
    pub fn from_client(client: Client, table_name: impl Into<String>) -> Self {
        Self {
            client,
            table_name: table_name.into(),
        }
    }

    /// Get the table name.
    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    fn key_map(key: &ItemKey) -> AttributeMap {
        HashMap::from([
            (ATTR_PK.to_string(), AttributeValue::S(key.pk.clone())),
            (ATTR_SK.to_string(), AttributeValue::S(key.sk.clone())),
        ])
    }

    /// Runs a query page by page until `limit` items are collected.
    async fn query_pages(&self, query: &Query, count_only: bool) -> Result<(Vec<Item>, usize)> {
        let rendered = Rendered::for_query(query);
        let mut items = Vec::new();
        let mut count = 0usize;
        let mut start_key: Option<AttributeMap> = None;

        loop {
            let store = self;
            let rendered = &rendered;
            let page_start = start_key.take();
            let page_start = &page_start;
            let output = retry_transient("Query", move || async move {
                let mut request = store
                    .client
                    .query()
                    .table_name(&store.table_name)
                    .set_key_condition_expression(rendered.key_condition.clone())
                    .set_filter_expression(rendered.filter.clone())
                    .set_expression_attribute_names(rendered.names.clone())
                    .set_expression_attribute_values(rendered.values.clone())
                    .scan_index_forward(query.ascending)
                    .set_exclusive_start_key(page_start.clone());

                match query.index {
                    Some(index) => request = request.index_name(index.name()),
                    None => request = request.consistent_read(true),
                }
                if count_only {
                    request = request.select(Select::Count);
                }

                request.send().await.map_err(|e| map_sdk_error(e, "Query"))
            })
            .await?;

            if count_only {
                count += output.count().max(0) as usize;
            } else {
                for av in output.items() {
                    items.push(from_attribute_map(av)?);
                }
                count = items.len();
            }

            let reached_limit = query.limit.is_some_and(|limit| count >= limit);
            match output.last_evaluated_key() {
                Some(key) if !key.is_empty() && !reached_limit => {
                    start_key = Some(key.clone());
                }
                _ => break,
            }
        }

        if let Some(limit) = query.limit {
            items.truncate(limit);
            count = count.min(limit);
        }
        Ok((items, count))
    }

    /// Sends one BatchWriteItem, retrying unprocessed requests once.
    async fn write_chunk(&self, requests: Vec<DynamoWriteRequest>) -> Result<()> {
        let total = requests.len();
        let mut pending = requests;

        for attempt in 0..2 {
            let store = self;
            let batch = HashMap::from([(self.table_name.clone(), pending)]);
            let batch = &batch;
            let output = retry_transient("BatchWriteItem", move || async move {
                store
                    .client
                    .batch_write_item()
                    .set_request_items(Some(batch.clone()))
                    .send()
                    .await
                    .map_err(|e| map_sdk_error(e, "BatchWriteItem"))
            })
            .await?;

            pending = output
                .unprocessed_items()
                .and_then(|unprocessed| unprocessed.get(&self.table_name))
                .cloned()
                .unwrap_or_default();

            if pending.is_empty() {
                return Ok(());
            }
            if attempt == 0 {
                tracing::warn!(
                    unprocessed = pending.len(),
                    total,
                    "Retrying unprocessed batch write requests"
                );
                tokio::time::sleep(RETRY_DELAY).await;
            }
        }

        Err(RepositoryError::PartialBatch {
            unprocessed: pending.len(),
            total,
        })
    }
}

fn to_dynamo_write_request(request: WriteRequest) -> Result<DynamoWriteRequest> {
    Ok(match request {
        WriteRequest::Put(item) => DynamoWriteRequest::builder()
            .put_request(
                PutRequest::builder()
                    .set_item(Some(to_attribute_map(&item)))
                    .build()
                    .map_err(map_build_error)?,
            )
            .build(),
        WriteRequest::Delete(key) => DynamoWriteRequest::builder()
            .delete_request(
                DeleteRequest::builder()
                    .set_key(Some(DynamoDbStore::key_map(&key)))
                    .build()
                    .map_err(map_build_error)?,
            )
            .build(),
    })
}

#[async_trait]
impl ItemStore for DynamoDbStore {
    async fn get(&self, key: &ItemKey) -> Result<Option<Item>> {
        let store = self;
        let key_map = &Self::key_map(key);
        let output = retry_transient("GetItem", move || async move {
            store
                .client
                .get_item()
                .table_name(&store.table_name)
                .set_key(Some(key_map.clone()))
                .consistent_read(true)
                .send()
                .await
                .map_err(|e| map_sdk_error(e, "GetItem"))
        })
        .await?;

        tracing::debug!(%key, found = output.item().is_some(), "GetItem");
        output.item().map(from_attribute_map).transpose()
    }

    async fn put(&self, item: Item, condition: Option<Condition>) -> Result<WriteOutcome<()>> {
        let key = ItemKey::from_item(&item)
            .ok_or_else(|| RepositoryError::invalid_data("Item is missing PK or SK"))?;
        let rendered = &Rendered::for_condition(condition.as_ref());
        let attributes = &to_attribute_map(&item);
        let store = self;

        let applied = retry_transient("PutItem", move || async move {
            let result = store
                .client
                .put_item()
                .table_name(&store.table_name)
                .set_item(Some(attributes.clone()))
                .set_condition_expression(rendered.condition.clone())
                .set_expression_attribute_names(rendered.names.clone())
                .set_expression_attribute_values(rendered.values.clone())
                .send()
                .await;
            match result {
                Ok(_) => Ok(true),
                Err(e) if is_put_conditional_check_failed(&e) => Ok(false),
                Err(e) => Err(map_sdk_error(e, "PutItem")),
            }
        })
        .await?;

        tracing::debug!(%key, applied, "PutItem");
        Ok(if applied {
            WriteOutcome::Applied(())
        } else {
            WriteOutcome::ConditionFailed
        })
    }

    async fn query(&self, query: &Query) -> Result<Vec<Item>> {
        let (items, _) = self.query_pages(query, false).await?;
        tracing::debug!(
            partition = %query.partition,
            index = ?query.index,
            count = items.len(),
            "Query"
        );
        Ok(items)
    }

    async fn count(&self, query: &Query) -> Result<usize> {
        let (_, count) = self.query_pages(query, true).await?;
        tracing::debug!(partition = %query.partition, count, "Query COUNT");
        Ok(count)
    }

    async fn scan(&self, filter: Option<&Condition>, limit: Option<usize>) -> Result<Vec<Item>> {
        let rendered = Rendered::for_condition(filter);
        let mut items = Vec::new();
        let mut start_key: Option<AttributeMap> = None;

        loop {
            let store = self;
            let rendered = &rendered;
            let page_start = start_key.take();
            let page_start = &page_start;
            let output = retry_transient("Scan", move || async move {
                store
                    .client
                    .scan()
                    .table_name(&store.table_name)
                    .set_filter_expression(rendered.condition.clone())
                    .set_expression_attribute_names(rendered.names.clone())
                    .set_expression_attribute_values(rendered.values.clone())
                    .set_exclusive_start_key(page_start.clone())
                    .send()
                    .await
                    .map_err(|e| map_sdk_error(e, "Scan"))
            })
            .await?;

            for av in output.items() {
                items.push(from_attribute_map(av)?);
            }

            let reached_limit = limit.is_some_and(|limit| items.len() >= limit);
            match output.last_evaluated_key() {
                Some(key) if !key.is_empty() && !reached_limit => {
                    start_key = Some(key.clone());
                }
                _ => break,
            }
        }

        if let Some(limit) = limit {
            items.truncate(limit);
        }
        tracing::debug!(count = items.len(), "Scan");
        Ok(items)
    }

    async fn update(&self, key: &ItemKey, update: &Update) -> Result<WriteOutcome<Item>> {
        if update.actions.is_empty() {
            return Err(RepositoryError::invalid_data("Update has no actions"));
        }

        let rendered = &Rendered::for_update(update);
        let key_map = &Self::key_map(key);
        let store = self;

        let attempt = move || async move {
            let result = store
                .client
                .update_item()
                .table_name(&store.table_name)
                .set_key(Some(key_map.clone()))
                .set_update_expression(rendered.update.clone())
                .set_condition_expression(rendered.condition.clone())
                .set_expression_attribute_names(rendered.names.clone())
                .set_expression_attribute_values(rendered.values.clone())
                .return_values(ReturnValue::AllNew)
                .send()
                .await;
            match result {
                Ok(output) => Ok(Some(output.attributes().cloned().unwrap_or_default())),
                Err(e) if is_update_conditional_check_failed(&e) => Ok(None),
                Err(e) => Err(map_sdk_error(e, "UpdateItem")),
            }
        };
        // A timed-out increment may already have been applied; resending it
        // would apply it twice.
        let attributes = if update.is_idempotent() {
            retry_transient("UpdateItem", attempt).await?
        } else {
            attempt().await?
        };

        tracing::debug!(%key, applied = attributes.is_some(), "UpdateItem");
        match attributes {
            Some(attributes) => Ok(WriteOutcome::Applied(from_attribute_map(&attributes)?)),
            None => Ok(WriteOutcome::ConditionFailed),
        }
    }

    async fn delete(&self, key: &ItemKey) -> Result<bool> {
        let key_map = &Self::key_map(key);
        let store = self;
        let output = retry_transient("DeleteItem", move || async move {
            store
                .client
                .delete_item()
                .table_name(&store.table_name)
                .set_key(Some(key_map.clone()))
                .return_values(ReturnValue::AllOld)
                .send()
                .await
                .map_err(|e| map_sdk_error(e, "DeleteItem"))
        })
        .await?;

        let existed = output.attributes().is_some_and(|a| !a.is_empty());
        tracing::debug!(%key, existed, "DeleteItem");
        Ok(existed)
    }

    async fn batch_write(&self, requests: Vec<WriteRequest>) -> Result<()> {
        let total = requests.len();
        let requests = requests
            .into_iter()
            .map(to_dynamo_write_request)
            .collect::<Result<Vec<_>>>()?;

        let mut failed = 0;
        let mut chunks = requests.into_iter().peekable();
        while chunks.peek().is_some() {
            let chunk: Vec<_> = chunks.by_ref().take(MAX_BATCH_WRITE).collect();
            match self.write_chunk(chunk).await {
                Ok(()) => {}
                Err(RepositoryError::PartialBatch { unprocessed, .. }) => failed += unprocessed,
                Err(e) => return Err(e),
            }
        }

        tracing::debug!(total, failed, "BatchWriteItem");
        if failed > 0 {
            return Err(RepositoryError::PartialBatch {
                unprocessed: failed,
                total,
            });
        }
        Ok(())
    }
}
