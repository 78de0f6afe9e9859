//! AttachmentHandler — binds the attachment job queue to the pipeline.

use std::sync::Arc;

use async_trait::async_trait;

use ledgerbox_core::{AttachmentJobPayload, JobType};

use crate::handler::{JobContext, JobHandler, JobResult};
use crate::pipeline::AttachmentPipeline;

/// Worker-side handler for `ProcessAttachment` jobs.
pub struct AttachmentHandler {
    pipeline: Arc<AttachmentPipeline>,
}

impl AttachmentHandler {
    pub fn new(pipeline: Arc<AttachmentPipeline>) -> Self {
        Self { pipeline }
    }
}

#[async_trait]
impl JobHandler for AttachmentHandler {
    fn job_type(&self) -> JobType {
        JobType::ProcessAttachment
    }

    async fn execute(&self, ctx: JobContext) -> JobResult {
        let payload: AttachmentJobPayload = match ctx.parse_payload() {
            Ok(payload) => payload,
            Err(e) => return JobResult::Failed(e),
        };

        match self.pipeline.process_single(&payload).await {
            Ok(()) => JobResult::Success(None),
            Err(e) if e.is_transient() => JobResult::Retry(e.to_string()),
            Err(e) => JobResult::Failed(e.to_string()),
        }
    }
}
