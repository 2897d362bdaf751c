//! Pushable: the push pipeline
//!
//! Push hands a transform to a remote sink and answers with the transforms
//! the remote acknowledged applying (which may include server-side
//! amendments such as assigned keys). Acknowledged transforms funnel through
//! `SourceKernel::transformed` before the caller's result resolves.

use crate::hints::PushHints;
use crate::source::SourceBase;
use crate::task::{Task, TaskOutcome};
use orrery_core::{
    build_transform, Error, FullResponse, RequestOptions, Result, Transform, TransformInput,
};

/// The concrete `_push` handler of a source
pub trait PushPerformer: SourceBase {
    /// Push one transform to the sink, honoring hints
    fn perform_push(&self, transform: &Transform, hints: &mut PushHints) -> Result<TaskOutcome>;
}

/// Sources that push transforms to a downstream sink
pub trait Pushable: PushPerformer {
    /// Push a transform, answering with the transforms applied downstream
    fn push(&self, input: impl Into<TransformInput>) -> Result<Vec<Transform>>
    where
        Self: Sized,
    {
        Ok(self.push_with_options(input, None)?.data)
    }

    /// Push a transform, receiving the full response envelope
    fn push_with_options(
        &self,
        input: impl Into<TransformInput>,
        options: Option<RequestOptions>,
    ) -> Result<FullResponse<Vec<Transform>>>
    where
        Self: Sized,
    {
        let transform = build_transform(input, options, None)?;
        let kernel = self.kernel();
        let events = kernel.events();

        if kernel.transform_log().contains(&transform.id) {
            return Ok(FullResponse::of(Vec::new()));
        }

        let mut hints = PushHints::default();
        if let Err(error) = events.before_push.emit(&transform, &mut hints) {
            events.push_fail.emit(&(transform, error.clone()));
            return Err(error);
        }

        let task = Task::from_request("push", &transform)?;
        let performed = kernel
            .request_queue()
            .push_and_process(task, &mut |_| self.perform_push(&transform, &mut hints));

        match performed {
            Ok(Some(outcome)) => {
                if let Err(error) = kernel.transformed(&outcome.transforms) {
                    events.push_fail.emit(&(transform, error.clone()));
                    return Err(error);
                }
                events
                    .push
                    .emit(&(transform, outcome.transforms.clone()));
                Ok(FullResponse {
                    data: outcome.transforms.clone(),
                    details: outcome.details,
                    transforms: outcome.transforms,
                })
            }
            Ok(None) => {
                let error = Error::queue_busy(
                    kernel.request_queue().name(),
                    "push remained queued without being performed",
                );
                events.push_fail.emit(&(transform, error.clone()));
                Err(error)
            }
            Err(error) => {
                events.push_fail.emit(&(transform, error.clone()));
                Err(error)
            }
        }
    }
}

impl<T: PushPerformer> Pushable for T {}
