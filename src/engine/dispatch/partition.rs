use arrow_array::RecordBatch;

/// Splits a batch sequence into partitions of at most `max_rows` rows, in order.
pub struct Partitioner {
    max_rows: usize,
    pending: Vec<RecordBatch>,
    pending_rows: usize,
}

impl Partitioner {
    pub fn new(max_rows: usize) -> Self {
        Self {
            max_rows: max_rows.max(1),
            pending: Vec::new(),
            pending_rows: 0,
        }
    }

    /// Adds `batch`, returning every partition it filled.
    pub fn push(&mut self, batch: RecordBatch) -> Vec<Vec<RecordBatch>> {
        let mut full = Vec::new();
        let rows = batch.num_rows();
        let mut offset = 0;
        while offset < rows {
            let take = (self.max_rows - self.pending_rows).min(rows - offset);
            self.pending.push(batch.slice(offset, take));
            self.pending_rows += take;
            offset += take;
            if self.pending_rows == self.max_rows {
                full.push(std::mem::take(&mut self.pending));
                self.pending_rows = 0;
            }
        }
        full
    }

    /// The trailing, partially filled partition.
    pub fn finish(self) -> Option<Vec<RecordBatch>> {
        if self.pending.is_empty() {
            None
        } else {
            Some(self.pending)
        }
    }
}
