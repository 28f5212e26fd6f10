use super::*;

/// Downstream consumer of one output.
pub trait Receiver: Send {
    fn receive(&mut self, value: WindowedValue) -> anyhow::Result<()>;

    fn receive_batch(&mut self, batch: WindowedBatch) -> anyhow::Result<()>;

    fn flush(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Discards everything. Used when a runner has no main output.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullReceiver;

impl Receiver for NullReceiver {
    fn receive(&mut self, _value: WindowedValue) -> anyhow::Result<()> {
        Ok(())
    }

    fn receive_batch(&mut self, _batch: WindowedBatch) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Counts the elements in a batch value.
pub trait BatchConverter: Send + Sync {
    fn get_length(&self, batch: &Value) -> anyhow::Result<usize>;
}

/// Batches are lists (or tuples) of elements.
#[derive(Debug, Clone, Copy, Default)]
pub struct ListBatchConverter;

impl BatchConverter for ListBatchConverter {
    fn get_length(&self, batch: &Value) -> anyhow::Result<usize> {
        batch
            .as_items()
            .map(<[Value]>::len)
            .ok_or_else(|| anyhow!("expected a list batch, got {}", batch.kind_name()))
    }
}
