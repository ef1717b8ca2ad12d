//! Block fixtures shared by the tests of this crate.

use blockgate_store::ObjectStore;
use blockgate_tsdb::{BlockWriter, Labels, Sample};
use blockgate_types::paths::{block_object, META_FILENAME, UPLOADING_META_FILENAME};
use blockgate_types::{BlockId, Meta};
use bytes::Bytes;
use chrono::Utc;

use crate::records::upload_meta;

pub(crate) struct TestBlock {
    pub id: BlockId,
    pub meta: Meta,
    /// Data files as `(relative path, content)`.
    pub files: Vec<(String, Bytes)>,
}

impl TestBlock {
    pub fn file(&self, rel: &str) -> Bytes {
        self.files
            .iter()
            .find(|(p, _)| p == rel)
            .map(|(_, d)| d.clone())
            .unwrap()
    }

    pub fn meta_json(&self) -> Vec<u8> {
        self.meta.to_json().unwrap()
    }
}

fn samples(from: i64, n: usize) -> Vec<Sample> {
    (0..n)
        .map(|i| Sample {
            timestamp: from + i as i64 * 15_000,
            value: i as f64,
        })
        .collect()
}

/// Build a small valid block in the past two hours, optionally with one
/// series whose labels are out of order.
pub(crate) fn build_block(unsorted_labels: bool) -> TestBlock {
    let now = Utc::now().timestamp_millis();
    let min_time = now - 2 * 3_600_000;
    let max_time = now - 3_600_000;

    let mut w = BlockWriter::new(min_time, max_time);
    w.add_series(Labels::from_pairs(&[("job", "api"), ("instance", "a")]), samples(min_time, 150));
    if unsorted_labels {
        w.add_series(Labels::from_unsorted(&[("job", "db"), ("instance", "b")]), samples(min_time, 10));
    } else {
        w.add_series(Labels::from_pairs(&[("job", "db")]), samples(min_time, 10));
    }
    let id = w.id();

    let tmp = tempfile::tempdir().unwrap();
    let dir = w.write(tmp.path()).unwrap();
    let meta = Meta::from_json(&std::fs::read(dir.join(META_FILENAME)).unwrap()).unwrap();
    let files = meta
        .ext
        .files
        .iter()
        .filter(|f| !f.is_meta())
        .map(|f| {
            let data = std::fs::read(dir.join(&f.rel_path)).unwrap();
            (f.rel_path.clone(), Bytes::from(data))
        })
        .collect();
    TestBlock { id, meta, files }
}

pub(crate) async fn upload_files(store: &dyn ObjectStore, block: &TestBlock) {
    for (rel, data) in &block.files {
        store.put(&block_object(&block.id, rel), data.clone()).await.unwrap();
    }
}

/// A valid block fully uploaded with its in-flight metadata, ready for
/// validation.
pub(crate) async fn stage_block(store: &dyn ObjectStore) -> TestBlock {
    let block = build_block(false);
    upload_files(store, &block).await;
    upload_meta(store, block.id, &block.meta, UPLOADING_META_FILENAME).await.unwrap();
    block
}

pub(crate) async fn stage_block_with_unsorted_labels(store: &dyn ObjectStore) -> TestBlock {
    let block = build_block(true);
    upload_files(store, &block).await;
    upload_meta(store, block.id, &block.meta, UPLOADING_META_FILENAME).await.unwrap();
    block
}

pub(crate) async fn flip_object_byte(store: &dyn ObjectStore, block: BlockId, rel: &str, at: usize) {
    let name = block_object(&block, rel);
    let mut data = store.get(&name).await.unwrap().to_vec();
    data[at] ^= 0xFF;
    store.put(&name, Bytes::from(data)).await.unwrap();
}
