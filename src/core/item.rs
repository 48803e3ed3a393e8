use crate::error::BatchError;

/// Result of processing one item.
pub type ItemProcessorResult<O> = Result<O, BatchError>;

/// Result of writing a group of items.
pub type ItemWriterResult = Result<(), BatchError>;

/// Turns one input item into one output item.
///
/// In this crate the input is a table row and the output is the outbound
/// request that will be dispatched for it.
pub trait ItemProcessor<I, O> {
    fn process(&self, item: &I) -> ItemProcessorResult<O>;
}

/// Persists items produced by a step.
///
/// Writers are called with interior mutability in mind: all methods take
/// `&self` so a single writer can be shared by reference.
pub trait ItemWriter<O> {
    fn write(&self, items: &[O]) -> ItemWriterResult;

    fn flush(&self) -> ItemWriterResult {
        Ok(())
    }

    fn open(&self) -> ItemWriterResult {
        Ok(())
    }

    fn close(&self) -> ItemWriterResult {
        Ok(())
    }
}
