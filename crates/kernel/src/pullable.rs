//! Pullable: the pull pipeline
//!
//! Pull fetches the transforms that would answer a query from a remote sink,
//! records them locally through `SourceKernel::transformed`, and hands them
//! to the caller for replication into other sources.

use crate::hints::PullHints;
use crate::source::SourceBase;
use crate::task::{Task, TaskOutcome};
use orrery_core::{
    build_query, Error, FullResponse, Query, QueryInput, RequestOptions, Result, Transform,
};

/// The concrete `_pull` handler of a source
pub trait PullPerformer: SourceBase {
    /// Fetch the transforms answering a query, honoring hints
    fn perform_pull(&self, query: &Query, hints: &mut PullHints) -> Result<TaskOutcome>;
}

/// Sources that pull transforms from an upstream sink
pub trait Pullable: PullPerformer {
    /// Pull the transforms answering a query
    fn pull(&self, input: impl Into<QueryInput>) -> Result<Vec<Transform>>
    where
        Self: Sized,
    {
        Ok(self.pull_with_options(input, None)?.data)
    }

    /// Pull transforms, receiving the full response envelope
    fn pull_with_options(
        &self,
        input: impl Into<QueryInput>,
        options: Option<RequestOptions>,
    ) -> Result<FullResponse<Vec<Transform>>>
    where
        Self: Sized,
    {
        let query = build_query(input, options, None)?;
        let kernel = self.kernel();
        let events = kernel.events();

        let mut hints = PullHints::default();
        if let Err(error) = events.before_pull.emit(&query, &mut hints) {
            events.pull_fail.emit(&(query, error.clone()));
            return Err(error);
        }

        let task = Task::from_request("pull", &query)?;
        let performed = kernel
            .request_queue()
            .push_and_process(task, &mut |_| self.perform_pull(&query, &mut hints));

        match performed {
            Ok(Some(outcome)) => {
                if let Err(error) = kernel.transformed(&outcome.transforms) {
                    events.pull_fail.emit(&(query, error.clone()));
                    return Err(error);
                }
                events.pull.emit(&(query, outcome.transforms.clone()));
                Ok(FullResponse {
                    data: outcome.transforms.clone(),
                    details: outcome.details,
                    transforms: outcome.transforms,
                })
            }
            Ok(None) => {
                let error = Error::queue_busy(
                    kernel.request_queue().name(),
                    "pull remained queued without being performed",
                );
                events.pull_fail.emit(&(query, error.clone()));
                Err(error)
            }
            Err(error) => {
                events.pull_fail.emit(&(query, error.clone()));
                Err(error)
            }
        }
    }
}

impl<T: PullPerformer> Pullable for T {}
