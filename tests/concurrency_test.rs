//! Concurrent writer tests
//!
//! Many OS threads write to the same batch while it is open; every key must
//! come out exactly as its own writer produced it.

use std::sync::{Arc, Barrier};
use std::thread;
use stagewrite::staging::{
    InMemoryObjectStore, InMemoryScratchStore, ObjectStore, StagedWriter, WriterConfig,
};
use stagewrite::Compression;

const THREADS: usize = 8;
const WRITES_PER_THREAD: usize = 200;

fn record(thread: usize, seq: usize) -> String {
    format!("t{:02}-{:04}\n", thread, seq)
}

#[tokio::test]
async fn test_parallel_writers_distinct_keys() {
    let store = InMemoryObjectStore::new();
    let writer = Arc::new(StagedWriter::new(Arc::new(store.clone()), true));
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let writer = Arc::clone(&writer);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                let key = format!("streams/{}.gz", t);
                for seq in 0..WRITES_PER_THREAD {
                    writer.write_str(&key, &record(t, seq)).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(writer.stream_count(), THREADS);
    let summary = writer.commit().await.unwrap();
    assert_eq!(summary.objects, THREADS);

    for t in 0..THREADS {
        let raw = store.get(&format!("streams/{}.gz", t)).await.unwrap();
        let text = String::from_utf8(Compression::gzip().decompress(&raw).unwrap()).unwrap();
        let expected: String = (0..WRITES_PER_THREAD).map(|seq| record(t, seq)).collect();
        assert_eq!(text, expected, "stream {} corrupted", t);
    }
}

#[tokio::test]
async fn test_parallel_writers_shared_key_keep_records_whole() {
    let store = InMemoryObjectStore::new();
    let scratch = Arc::new(InMemoryScratchStore::new());
    let writer = Arc::new(StagedWriter::with_scratch(
        Arc::new(store.clone()),
        scratch,
        WriterConfig::default(),
    ));

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let writer = Arc::clone(&writer);
            thread::spawn(move || {
                for seq in 0..WRITES_PER_THREAD {
                    writer.write_str("shared", &record(t, seq)).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    writer.commit().await.unwrap();

    let text = String::from_utf8(store.get("shared").await.unwrap()).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), THREADS * WRITES_PER_THREAD);

    // Each thread's records appear whole and in its own order
    for t in 0..THREADS {
        let prefix = format!("t{:02}-", t);
        let mine: Vec<&str> = lines.iter().copied().filter(|l| l.starts_with(&prefix)).collect();
        let expected: Vec<String> = (0..WRITES_PER_THREAD)
            .map(|seq| record(t, seq).trim_end().to_string())
            .collect();
        assert_eq!(mine, expected);
    }
}

#[tokio::test]
async fn test_writes_racing_commit_are_either_uploaded_or_closed() {
    let store = InMemoryObjectStore::new();
    let scratch = Arc::new(InMemoryScratchStore::new());
    let writer = Arc::new(StagedWriter::with_scratch(
        Arc::new(store.clone()),
        scratch.clone(),
        WriterConfig::default(),
    ));

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let writer = Arc::clone(&writer);
            thread::spawn(move || {
                let key = format!("race/{}", t);
                let mut accepted = 0usize;
                loop {
                    match writer.write(&key, b"x") {
                        Ok(n) => accepted += n,
                        Err(e) => {
                            assert!(e.is_closed());
                            return (key, accepted);
                        }
                    }
                }
            })
        })
        .collect();

    // Let the writers get going before closing the batch
    while writer.stream_count() < 4 {
        thread::yield_now();
    }
    writer.commit().await.unwrap();

    for handle in handles {
        let (key, accepted) = handle.join().unwrap();
        let uploaded = store.get(&key).await.unwrap();
        assert_eq!(uploaded.len(), accepted, "accepted bytes must all be uploaded for {}", key);
    }
    assert!(scratch.is_empty());
}
