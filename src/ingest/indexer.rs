use std::thread;

use crossbeam_channel::{Receiver, Sender, bounded, unbounded};
use tracing::{error, info};

use crate::error::{RagError, Result};
use crate::model::Chunk;
use crate::semantic::Embedder;
use crate::store::VectorStore;

struct IndexBatch {
    id: usize,
    chunks: Vec<Chunk>,
}

struct BatchOutcome {
    id: usize,
    chunk_count: usize,
    result: Result<usize>,
}

#[derive(Debug)]
pub struct BatchFailure {
    pub batch_id: usize,
    pub chunk_count: usize,
    pub error: RagError,
}

#[derive(Debug, Default)]
pub struct IndexReport {
    pub batches_total: usize,
    pub chunks_indexed: usize,
    pub failures: Vec<BatchFailure>,
}

impl IndexReport {
    /// Collapses per-batch outcomes into a single result for the caller.
    pub fn into_result(mut self) -> Result<Self> {
        if self.failures.is_empty() {
            return Ok(self);
        }

        self.failures.sort_by_key(|failure| failure.batch_id);
        let failed = self.failures.len();
        let first = self.failures.remove(0);
        Err(RagError::IndexingBatchFailure {
            failed,
            total: self.batches_total,
            first_batch: first.batch_id,
            first_batch_chunks: first.chunk_count,
            first: Box::new(first.error),
        })
    }
}

/// Embeds and inserts `chunks` in fixed-size batches across a pool of
/// `workers` threads. Each batch is embedded in full before it is inserted in
/// one store transaction; every batch is attempted even when others fail.
pub fn index_chunks(
    store: &VectorStore,
    embedder: &dyn Embedder,
    chunks: Vec<Chunk>,
    batch_size: usize,
    workers: usize,
) -> IndexReport {
    let batch_size = batch_size.max(1);
    let workers = workers.max(1);

    let mut batches = Vec::<IndexBatch>::new();
    let mut remaining = chunks.into_iter().peekable();
    while remaining.peek().is_some() {
        let chunks = remaining.by_ref().take(batch_size).collect::<Vec<Chunk>>();
        batches.push(IndexBatch {
            id: batches.len(),
            chunks,
        });
    }

    let mut report = IndexReport {
        batches_total: batches.len(),
        ..IndexReport::default()
    };
    if batches.is_empty() {
        return report;
    }

    info!(
        batches = report.batches_total,
        batch_size,
        workers,
        model_id = %embedder.model_id(),
        "indexing chunks"
    );

    thread::scope(|scope| {
        let (task_tx, task_rx) = bounded::<IndexBatch>(workers * 2);
        let (result_tx, result_rx) = unbounded::<BatchOutcome>();

        for worker_id in 0..workers {
            let worker_rx = task_rx.clone();
            let worker_tx = result_tx.clone();
            scope.spawn(move || worker_loop(worker_id, worker_rx, worker_tx, store, embedder));
        }
        drop(task_rx);
        drop(result_tx);

        for batch in batches {
            if task_tx.send(batch).is_err() {
                break;
            }
        }
        drop(task_tx);

        for outcome in result_rx.iter() {
            match outcome.result {
                Ok(inserted) => report.chunks_indexed += inserted,
                Err(err) => {
                    error!(
                        batch_id = outcome.id,
                        chunk_count = outcome.chunk_count,
                        error = %err,
                        "indexing batch failed"
                    );
                    report.failures.push(BatchFailure {
                        batch_id: outcome.id,
                        chunk_count: outcome.chunk_count,
                        error: err,
                    });
                }
            }
        }
    });

    info!(
        chunks_indexed = report.chunks_indexed,
        batches_failed = report.failures.len(),
        "indexing finished"
    );
    report
}

fn worker_loop(
    worker_id: usize,
    receiver: Receiver<IndexBatch>,
    sender: Sender<BatchOutcome>,
    store: &VectorStore,
    embedder: &dyn Embedder,
) {
    for batch in receiver.iter() {
        let chunk_count = batch.chunks.len();
        let result = embed_and_insert(store, embedder, &batch.chunks);
        if result.is_ok() {
            info!(worker_id, batch_id = batch.id, chunk_count, "batch indexed");
        }

        let outcome = BatchOutcome {
            id: batch.id,
            chunk_count,
            result,
        };
        if sender.send(outcome).is_err() {
            break;
        }
    }
}

fn embed_and_insert(store: &VectorStore, embedder: &dyn Embedder, chunks: &[Chunk]) -> Result<usize> {
    let inputs = chunks.iter().map(|chunk| chunk.text.as_str()).collect::<Vec<&str>>();
    let embeddings = embedder.embed(&inputs)?;
    store.insert_batch(chunks, &embeddings)
}
