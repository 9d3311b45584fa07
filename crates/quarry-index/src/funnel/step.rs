use std::future::Future;

use crate::error::IndexError;

/// One funnel stage: consumes the previous stage's output.
pub trait Step: Send + Sync {
    type Input: Send;
    type Output: Send;

    fn run(
        &self,
        input: Self::Input,
    ) -> impl Future<Output = Result<Self::Output, IndexError>> + Send;
}
