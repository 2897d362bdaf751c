//! The concrete remote source
//!
//! `JsonApiSource` bridges the kernel pipelines to a JSON:API backend:
//! query expressions become `GET` requests, operations become
//! `POST`/`PATCH`/`DELETE` requests, and response documents come back as
//! records (through the serializer) and transforms (for replication into
//! peer sources).
//!
//! The source itself owns no record state; fetched records surface as
//! `updateRecord` transforms that a syncable peer reconciles into its cache.

use crate::request::{FetchRequest, HttpMethod, RequestProcessor};
use crate::serializer::JsonApiSerializer;
use crate::url::UrlBuilder;
use orrery_core::query::expression::{
    AttributeComparison, FilterSpecifier, PageSpecifier, QueryExpression, RelatedRecordMatch,
    SortOrder, SortSpecifier,
};
use orrery_core::query::modifiers::apply_modifiers;
use orrery_core::{
    Error, Query, QueryData, QueryResult, Record, RecordIdentity, RecordOperation, RequestOptions,
    Result, Transform, UpdateData,
};
use orrery_kernel::{
    PullHints, PullPerformer, PushHints, PushPerformer, QueryHints, QueryPerformer, SourceBase,
    SourceKernel, SourceSettings, Task, TaskOutcome, TaskPerformer, UpdateHints, UpdatePerformer,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

/// Construction options for [`JsonApiSource`]
pub struct JsonApiSourceSettings {
    /// Kernel options: name, bucket, activation, queue overrides
    pub source: SourceSettings,
    /// URL construction: host, namespace, resource path overrides
    pub url: UrlBuilder,
    /// Transport driver with fetch settings
    pub processor: RequestProcessor,
    /// Serializer; schema and key map come from `source`
    pub serializer: Arc<dyn JsonApiSerializer>,
}

/// A source whose sink is a remote JSON:API backend
pub struct JsonApiSource {
    kernel: SourceKernel,
    url: UrlBuilder,
    processor: RequestProcessor,
    serializer: Arc<dyn JsonApiSerializer>,
}

impl JsonApiSource {
    /// Create a remote source from settings
    pub fn with_settings(settings: JsonApiSourceSettings) -> Result<Arc<Self>> {
        let kernel = SourceKernel::new(settings.source)?;
        let source = Arc::new(Self {
            kernel,
            url: settings.url,
            processor: settings.processor,
            serializer: settings.serializer,
        });

        let source_dyn: Arc<dyn TaskPerformer> = source.clone();
        let performer: std::sync::Weak<dyn TaskPerformer> = Arc::downgrade(&source_dyn);
        source.kernel.attach_performer(performer);
        if source.kernel.activated() {
            source.kernel.request_queue().start();
            source.kernel.sync_queue().start();
        }

        Ok(source)
    }

    fn remote_id_of(&self, identity: &RecordIdentity) -> String {
        self.serializer
            .remote_id(identity)
            .unwrap_or_else(|| identity.id.clone())
    }

    fn identifier(&self, identity: &RecordIdentity) -> Value {
        json!({"type": identity.kind, "id": self.remote_id_of(identity)})
    }

    // ========================================================================
    // Query requests
    // ========================================================================

    fn fetch_expression(
        &self,
        expression: &QueryExpression,
        options: Option<&RequestOptions>,
        documents: &mut Vec<Value>,
        fetched: &mut Vec<Record>,
    ) -> Result<QueryResult> {
        match expression {
            QueryExpression::FindRecord { record } => {
                let url = self.url.with_params(
                    self.url.resource_url(&record.kind, &self.remote_id_of(record)),
                    &include_params(options),
                );
                let document = self
                    .processor
                    .execute(FetchRequest::get(url))
                    .map_err(|error| match error {
                        Error::Client { status: 404, .. } => {
                            Error::record_not_found(record.clone())
                        }
                        other => other,
                    })?;
                match document {
                    // 304: the caller resolves absent data.
                    None => Ok(QueryResult::None),
                    Some(document) => {
                        let result = match document.get("data") {
                            None | Some(Value::Null) => QueryResult::None,
                            Some(resource) => {
                                let record = self.serializer.deserialize(resource, None)?;
                                fetched.push(record.clone());
                                record.into()
                            }
                        };
                        documents.push(document);
                        Ok(result)
                    }
                }
            }

            QueryExpression::FindRecords {
                kind,
                records,
                filter,
                sort,
                page,
            } => {
                if let Some(identities) = records {
                    // Resolve identities individually, skipping the missing.
                    // The per-resource request form cannot carry collection
                    // params, so filter/sort/page apply client-side over the
                    // resolved records, exactly as the cache evaluates them.
                    let include = include_params(options);
                    let mut resolved = Vec::new();
                    for identity in identities {
                        let url = self.url.with_params(
                            self.url
                                .resource_url(&identity.kind, &self.remote_id_of(identity)),
                            &include,
                        );
                        match self.processor.execute(FetchRequest::get(url)) {
                            Ok(Some(document)) => {
                                if let Some(resource) = document.get("data") {
                                    if !resource.is_null() {
                                        let record = self.serializer.deserialize(resource, None)?;
                                        fetched.push(record.clone());
                                        resolved.push(record);
                                    }
                                }
                                documents.push(document);
                            }
                            Ok(None) => {}
                            Err(Error::Client { status: 404, .. }) => {}
                            Err(error) => return Err(error),
                        }
                    }
                    return Ok(QueryResult::Records(apply_modifiers(
                        resolved, filter, sort, page,
                    )));
                }

                let kind = kind.as_ref().ok_or_else(|| {
                    Error::query_expression_parse(
                        "findRecords requires a type or a list of identities",
                    )
                })?;
                let mut params = include_params(options);
                params.extend(self.filter_params(filter)?);
                params.extend(sort_params(sort));
                params.extend(page_params(page));
                let url = self.url.with_params(self.url.collection_url(kind), &params);
                self.fetch_collection(url, documents, fetched, None)
            }

            QueryExpression::FindRelatedRecord {
                record,
                relationship,
            } => {
                let url = self.url.with_params(
                    self.url
                        .related_url(&record.kind, &self.remote_id_of(record), relationship),
                    &include_params(options),
                );
                // A 404 on an owner-scoped URL means the owner is missing.
                let document = self
                    .processor
                    .execute(FetchRequest::get(url))
                    .map_err(|error| match error {
                        Error::Client { status: 404, .. } => {
                            Error::record_not_found(record.clone())
                        }
                        other => other,
                    })?;
                match document {
                    None => Ok(QueryResult::None),
                    Some(document) => {
                        let result = match document.get("data") {
                            None | Some(Value::Null) => QueryResult::None,
                            Some(resource) => {
                                let record = self.serializer.deserialize(resource, None)?;
                                fetched.push(record.clone());
                                record.into()
                            }
                        };
                        documents.push(document);
                        Ok(result)
                    }
                }
            }

            QueryExpression::FindRelatedRecords {
                record,
                relationship,
                filter,
                sort,
                page,
            } => {
                let mut params = include_params(options);
                params.extend(self.filter_params(filter)?);
                params.extend(sort_params(sort));
                params.extend(page_params(page));
                let url = self.url.with_params(
                    self.url
                        .related_url(&record.kind, &self.remote_id_of(record), relationship),
                    &params,
                );
                self.fetch_collection(
                    url,
                    documents,
                    fetched,
                    Some(Error::record_not_found(record.clone())),
                )
            }
        }
    }

    /// Fetch a collection URL
    ///
    /// `not_found` is the caller's reading of a 404: an owner-scoped URL
    /// raises the owner's `RecordNotFound`; a bare type collection answers
    /// empty, as the cache does for a type it holds nothing of.
    fn fetch_collection(
        &self,
        url: String,
        documents: &mut Vec<Value>,
        fetched: &mut Vec<Record>,
        not_found: Option<Error>,
    ) -> Result<QueryResult> {
        let document = match self.processor.execute(FetchRequest::get(url)) {
            Ok(document) => document,
            Err(Error::Client { status: 404, .. }) => {
                return match not_found {
                    Some(error) => Err(error),
                    None => Ok(QueryResult::Records(Vec::new())),
                }
            }
            Err(error) => return Err(error),
        };
        match document {
            None => Ok(QueryResult::Records(Vec::new())),
            Some(document) => {
                let mut records = Vec::new();
                if let Some(resources) = document.get("data").and_then(Value::as_array) {
                    for resource in resources {
                        let record = self.serializer.deserialize(resource, None)?;
                        fetched.push(record.clone());
                        records.push(record);
                    }
                }
                documents.push(document);
                Ok(QueryResult::Records(records))
            }
        }
    }

    fn filter_params(&self, filter: &[FilterSpecifier]) -> Result<Vec<(String, String)>> {
        let mut params = Vec::with_capacity(filter.len());
        for clause in filter {
            match clause {
                FilterSpecifier::Attribute {
                    attribute,
                    op,
                    value,
                } => {
                    if *op != AttributeComparison::Equal {
                        return Err(Error::query_expression_parse(
                            "remote attribute filters support equality only",
                        ));
                    }
                    params.push((format!("filter[{}]", attribute), param_value(value)));
                }
                FilterSpecifier::RelatedRecord { relation, record } => {
                    let value = match record {
                        RelatedRecordMatch::Absent => "null".to_string(),
                        RelatedRecordMatch::One(identity) => self.remote_id_of(identity),
                        RelatedRecordMatch::Any(identities) => identities
                            .iter()
                            .map(|identity| self.remote_id_of(identity))
                            .collect::<Vec<_>>()
                            .join(","),
                    };
                    params.push((format!("filter[{}]", relation), value));
                }
                FilterSpecifier::RelatedRecords {
                    relation, records, ..
                } => {
                    let value = records
                        .iter()
                        .map(|identity| self.remote_id_of(identity))
                        .collect::<Vec<_>>()
                        .join(",");
                    params.push((format!("filter[{}]", relation), value));
                }
            }
        }
        Ok(params)
    }

    // ========================================================================
    // Write requests
    // ========================================================================

    fn perform_operation(&self, op: &RecordOperation) -> Result<Option<Record>> {
        match op {
            RecordOperation::AddRecord { record } => {
                let body = json!({"data": self.serializer.serialize(record)?});
                let url = self.url.collection_url(record.kind());
                let document = self
                    .processor
                    .execute(FetchRequest::write(HttpMethod::Post, url, body))?;
                self.primary_record(document, record)
            }
            RecordOperation::UpdateRecord { record } => {
                let body = json!({"data": self.serializer.serialize(record)?});
                let url = self
                    .url
                    .resource_url(record.kind(), &self.remote_id_of(&record.identity));
                let document = self
                    .processor
                    .execute(FetchRequest::write(HttpMethod::Patch, url, body))?;
                self.primary_record(document, record)
            }
            RecordOperation::RemoveRecord { record } => {
                let url = self.url.resource_url(&record.kind, &self.remote_id_of(record));
                self.processor.execute(FetchRequest {
                    method: HttpMethod::Delete,
                    url,
                    headers: Vec::new(),
                    body: None,
                })?;
                Ok(None)
            }
            RecordOperation::ReplaceKey { .. } => Err(Error::transform_not_allowed(
                "replaceKey has no remote representation",
            )),
            RecordOperation::ReplaceAttribute {
                record,
                attribute,
                value,
            } => {
                let mut attributes = serde_json::Map::new();
                attributes.insert(attribute.clone(), value.clone());
                let body = json!({"data": {
                    "type": record.kind,
                    "id": self.remote_id_of(record),
                    "attributes": attributes,
                }});
                let url = self.url.resource_url(&record.kind, &self.remote_id_of(record));
                self.processor
                    .execute(FetchRequest::write(HttpMethod::Patch, url, body))?;
                Ok(None)
            }
            RecordOperation::AddToRelatedRecords {
                record,
                relationship,
                related_record,
            } => {
                let url =
                    self.url
                        .relationship_url(&record.kind, &self.remote_id_of(record), relationship);
                let body = json!({"data": [self.identifier(related_record)]});
                self.processor
                    .execute(FetchRequest::write(HttpMethod::Post, url, body))?;
                Ok(None)
            }
            RecordOperation::RemoveFromRelatedRecords {
                record,
                relationship,
                related_record,
            } => {
                let url =
                    self.url
                        .relationship_url(&record.kind, &self.remote_id_of(record), relationship);
                let body = json!({"data": [self.identifier(related_record)]});
                self.processor
                    .execute(FetchRequest::write(HttpMethod::Delete, url, body))?;
                Ok(None)
            }
            RecordOperation::ReplaceRelatedRecords {
                record,
                relationship,
                related_records,
            } => {
                let url =
                    self.url
                        .relationship_url(&record.kind, &self.remote_id_of(record), relationship);
                let identifiers: Vec<Value> = related_records
                    .iter()
                    .map(|identity| self.identifier(identity))
                    .collect();
                self.processor.execute(FetchRequest::write(
                    HttpMethod::Patch,
                    url,
                    json!({"data": identifiers}),
                ))?;
                Ok(None)
            }
            RecordOperation::ReplaceRelatedRecord {
                record,
                relationship,
                related_record,
            } => {
                let url =
                    self.url
                        .relationship_url(&record.kind, &self.remote_id_of(record), relationship);
                let linkage = match related_record {
                    Some(identity) => self.identifier(identity),
                    None => Value::Null,
                };
                self.processor.execute(FetchRequest::write(
                    HttpMethod::Patch,
                    url,
                    json!({"data": linkage}),
                ))?;
                Ok(None)
            }
        }
    }

    /// The primary record of a write: the server's amended resource when the
    /// response carries one (key assignments land in the KeyMap through the
    /// serializer), otherwise the record as sent.
    fn primary_record(&self, document: Option<Value>, sent: &Record) -> Result<Option<Record>> {
        match document.as_ref().and_then(|doc| doc.get("data")) {
            Some(resource) if !resource.is_null() => Ok(Some(
                self.serializer.deserialize(resource, Some(&sent.identity))?,
            )),
            _ => Ok(Some(sent.clone())),
        }
    }
}

fn include_params(options: Option<&RequestOptions>) -> Vec<(String, String)> {
    let Some(include) = options.and_then(|options| options.extra("include")) else {
        return Vec::new();
    };
    let joined = match include {
        Value::String(path) => path.clone(),
        Value::Array(paths) => paths
            .iter()
            .filter_map(Value::as_str)
            .collect::<Vec<_>>()
            .join(","),
        _ => return Vec::new(),
    };
    vec![("include".to_string(), joined)]
}

fn sort_params(sort: &[SortSpecifier]) -> Vec<(String, String)> {
    if sort.is_empty() {
        return Vec::new();
    }
    let fields = sort
        .iter()
        .map(|specifier| match specifier.order {
            SortOrder::Ascending => specifier.attribute.clone(),
            SortOrder::Descending => format!("-{}", specifier.attribute),
        })
        .collect::<Vec<_>>()
        .join(",");
    vec![("sort".to_string(), fields)]
}

fn page_params(page: &Option<PageSpecifier>) -> Vec<(String, String)> {
    let Some(page) = page else {
        return Vec::new();
    };
    let mut params = vec![("page[offset]".to_string(), page.offset.to_string())];
    if let Some(limit) = page.limit {
        params.push(("page[limit]".to_string(), limit.to_string()));
    }
    params
}

fn param_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

fn records_to_transform(records: &[Record]) -> Vec<Transform> {
    if records.is_empty() {
        return Vec::new();
    }
    let operations = records
        .iter()
        .map(|record| RecordOperation::UpdateRecord {
            record: record.clone(),
        })
        .collect();
    vec![Transform::new(operations)]
}

impl SourceBase for JsonApiSource {
    fn kernel(&self) -> &SourceKernel {
        &self.kernel
    }
}

impl QueryPerformer for JsonApiSource {
    fn perform_query(&self, query: &Query, hints: &mut QueryHints) -> Result<TaskOutcome> {
        if let Some(data) = hints.data.take() {
            return Ok(TaskOutcome::query(data));
        }
        let include_details = query
            .options
            .as_ref()
            .is_some_and(|options| options.include_details);

        let mut results = Vec::with_capacity(query.expressions.len());
        let mut documents = Vec::new();
        let mut fetched = Vec::new();
        for expression in &query.expressions {
            results.push(self.fetch_expression(
                expression,
                query.options.as_ref(),
                &mut documents,
                &mut fetched,
            )?);
        }
        debug!(query = %query.id, records = fetched.len(), "remote query fetched");

        let mut outcome = TaskOutcome::query(QueryData::from_results(results, query.is_single()));
        outcome.transforms = records_to_transform(&fetched);
        if include_details {
            outcome = outcome.with_details(Value::Array(documents));
        }
        Ok(outcome)
    }
}

impl UpdatePerformer for JsonApiSource {
    fn perform_update(
        &self,
        transform: &Transform,
        hints: &mut UpdateHints,
    ) -> Result<TaskOutcome> {
        let mut results = Vec::with_capacity(transform.operations.len());
        for op in &transform.operations {
            results.push(self.perform_operation(op)?);
        }
        let data = hints.data.take().unwrap_or_else(|| {
            UpdateData::from_results(results, transform.operations.len() == 1)
        });
        Ok(TaskOutcome::update(data, vec![transform.clone()]))
    }
}

impl PushPerformer for JsonApiSource {
    fn perform_push(&self, transform: &Transform, hints: &mut PushHints) -> Result<TaskOutcome> {
        if let Some(transforms) = hints.transforms.take() {
            return Ok(TaskOutcome::transforms(transforms));
        }
        for op in &transform.operations {
            self.perform_operation(op)?;
        }
        Ok(TaskOutcome::transforms(vec![transform.clone()]))
    }
}

impl PullPerformer for JsonApiSource {
    fn perform_pull(&self, query: &Query, hints: &mut PullHints) -> Result<TaskOutcome> {
        if let Some(transforms) = hints.transforms.take() {
            return Ok(TaskOutcome::transforms(transforms));
        }
        let mut documents = Vec::new();
        let mut fetched = Vec::new();
        for expression in &query.expressions {
            self.fetch_expression(
                expression,
                query.options.as_ref(),
                &mut documents,
                &mut fetched,
            )?;
        }
        Ok(TaskOutcome::transforms(records_to_transform(&fetched)))
    }
}

impl TaskPerformer for JsonApiSource {
    /// Replay path for persisted, drained, or retried tasks
    fn perform(&self, task: &Task) -> Result<TaskOutcome> {
        match task.kind.as_str() {
            "query" => {
                let query: Query = task.request()?;
                let outcome = self.perform_query(&query, &mut QueryHints::default())?;
                self.kernel.transformed(&outcome.transforms)?;
                Ok(outcome)
            }
            "update" => {
                let transform: Transform = task.request()?;
                if self.kernel.transform_log().contains(&transform.id) {
                    return Ok(TaskOutcome::none());
                }
                let outcome = self.perform_update(&transform, &mut UpdateHints::default())?;
                self.kernel.transformed(&outcome.transforms)?;
                Ok(outcome)
            }
            "push" => {
                let transform: Transform = task.request()?;
                if self.kernel.transform_log().contains(&transform.id) {
                    return Ok(TaskOutcome::none());
                }
                let outcome = self.perform_push(&transform, &mut PushHints::default())?;
                self.kernel.transformed(&outcome.transforms)?;
                Ok(outcome)
            }
            "pull" => {
                let query: Query = task.request()?;
                let outcome = self.perform_pull(&query, &mut PullHints::default())?;
                self.kernel.transformed(&outcome.transforms)?;
                Ok(outcome)
            }
            other => Err(Error::operation_not_allowed(format!(
                "JSON:API source cannot perform {} tasks",
                other
            ))),
        }
    }
}
