//! Integration tests for LocalStore used the way the output protocol uses it.

use std::io::{Read, Write};
use std::sync::Arc;

use tempfile::TempDir;
use tessera_fragment::FragmentComputer;
use tessera_store::{open_range, ByteCounter, CancelToken, CountingWriter, FileStore, LocalStore};

#[test]
fn test_write_then_read_fragments_back() {
    let temp = TempDir::new().unwrap();
    let store = LocalStore::with_placement(64, ["node-1", "node-2", "node-3"]).unwrap();
    let path = temp.path().join("data/part-0.bin");

    let content: Vec<u8> = (0..1000u32).map(|i| (i % 251) as u8).collect();
    let written = Arc::new(ByteCounter::new());
    {
        let mut out = CountingWriter::new(store.create(&path).unwrap(), written.clone(), CancelToken::new());
        for chunk in content.chunks(97) {
            out.write_all(chunk).unwrap();
        }
        out.flush().unwrap();
    }
    assert_eq!(written.get(), 1000);

    let status = store.status(&path).unwrap().unwrap();
    let blocks = store.block_placement(&path, 0..status.len).unwrap();
    assert_eq!(blocks.len(), 16);

    let fragments = FragmentComputer::new(100, 300, true, true)
        .compute_fragments(path.to_str().unwrap(), status.len, blocks)
        .unwrap();
    assert!(fragments.len() > 1);

    // reading every fragment reassembles the file
    let read = Arc::new(ByteCounter::new());
    let mut reassembled = Vec::new();
    for fragment in &fragments {
        let mut reader = open_range(
            &store,
            &path,
            fragment.offset(),
            fragment.size(),
            read.clone(),
            CancelToken::new(),
        )
        .unwrap();
        reader.read_to_end(&mut reassembled).unwrap();
    }
    assert_eq!(reassembled, content);
    assert_eq!(read.get(), 1000);
}

#[test]
fn test_store_is_object_safe() {
    let temp = TempDir::new().unwrap();
    let store: Arc<dyn FileStore> = Arc::new(LocalStore::new());
    let dir = temp.path().join("a/b");
    store.mkdirs(&dir).unwrap();
    assert!(store.exists(&dir).unwrap());
    assert!(store.status(&dir).unwrap().unwrap().is_dir);
    assert!(store.list(temp.path(), true).unwrap().iter().all(|s| s.is_dir));
}
