//! Queryable: the query pipeline
//!
//! The pipeline phases for `query`:
//!
//! 1. Normalize the input through `build_query`.
//! 2. Emit `beforeQuery` serially with shared mutable hints; any listener
//!    failure aborts to `queryFail`.
//! 3. Enqueue the request task; the fresh task performs via `perform_query`
//!    with the live hints, behind any predecessors.
//! 4. On success emit `query` with the result; on failure emit `queryFail`
//!    and leave the task parked at head-of-line.

use crate::hints::QueryHints;
use crate::source::SourceBase;
use crate::task::{Task, TaskOutcome};
use orrery_core::{
    build_query, Error, FullResponse, Query, QueryData, QueryInput, RequestOptions, Result,
};

/// The concrete `_query` handler of a source
pub trait QueryPerformer: SourceBase {
    /// Evaluate a normalized query, honoring hints
    fn perform_query(&self, query: &Query, hints: &mut QueryHints) -> Result<TaskOutcome>;
}

/// Sources that answer queries through the uniform pipeline
pub trait Queryable: QueryPerformer {
    /// Query the source
    fn query(&self, input: impl Into<QueryInput>) -> Result<QueryData>
    where
        Self: Sized,
    {
        Ok(self.query_with_options(input, None)?.data)
    }

    /// Query the source, receiving the full response envelope
    fn query_with_options(
        &self,
        input: impl Into<QueryInput>,
        options: Option<RequestOptions>,
    ) -> Result<FullResponse<QueryData>>
    where
        Self: Sized,
    {
        let query = build_query(input, options, None)?;
        let kernel = self.kernel();
        let events = kernel.events();

        let mut hints = QueryHints::default();
        if let Err(error) = events.before_query.emit(&query, &mut hints) {
            events.query_fail.emit(&(query.clone(), error.clone()));
            return Err(error);
        }

        let task = Task::from_request("query", &query)?;
        let performed = kernel
            .request_queue()
            .push_and_process(task, &mut |_| self.perform_query(&query, &mut hints));

        match performed {
            Ok(Some(outcome)) => {
                // Remote sources answer queries with the transforms that
                // reproduce the fetched records; record them before resolving.
                if let Err(error) = kernel.transformed(&outcome.transforms) {
                    events.query_fail.emit(&(query, error.clone()));
                    return Err(error);
                }
                let data = outcome
                    .query_data
                    .unwrap_or_else(|| QueryData::Batch(Vec::new()));
                events.query.emit(&(query, data.clone()));
                Ok(FullResponse {
                    data,
                    details: outcome.details,
                    transforms: outcome.transforms,
                })
            }
            Ok(None) => {
                let error = Error::queue_busy(
                    kernel.request_queue().name(),
                    "query remained queued without being performed",
                );
                events.query_fail.emit(&(query, error.clone()));
                Err(error)
            }
            Err(error) => {
                events.query_fail.emit(&(query, error.clone()));
                Err(error)
            }
        }
    }
}

impl<T: QueryPerformer> Queryable for T {}
