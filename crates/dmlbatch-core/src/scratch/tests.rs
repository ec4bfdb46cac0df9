//! Tests for scratch stores

use super::*;

fn exercise_store(store: &mut dyn ScratchStore) {
    store.write(0, b"hello").unwrap();
    store.write(5, b" world").unwrap();
    assert_eq!(store.len(), 11);

    let mut buf = [0u8; 11];
    store.read(0, &mut buf).unwrap();
    assert_eq!(&buf, b"hello world");

    store.write(0, b"J").unwrap();
    let mut head = [0u8; 5];
    store.read(0, &mut head).unwrap();
    assert_eq!(&head, b"Jello");
    assert_eq!(store.len(), 11);

    let mut past_end = [0u8; 4];
    assert!(matches!(
        store.read(9, &mut past_end),
        Err(BatchError::InternalConsistency(_))
    ));

    store.release(5, 6).unwrap();
    assert_eq!(store.len(), 5);

    store.release(0, 5).unwrap();
    assert!(store.is_empty());
}

mod memory_scratch_tests {
    use super::*;

    #[test]
    fn test_memory_scratch_write_read_release() {
        let mut store = MemoryScratch::new();
        exercise_store(&mut store);
    }

    #[test]
    fn test_memory_scratch_sparse_write_zero_fills() {
        let mut store = MemoryScratch::new();
        store.write(4, b"x").unwrap();

        let mut buf = [0xffu8; 5];
        store.read(0, &mut buf).unwrap();
        assert_eq!(buf, [0, 0, 0, 0, b'x']);
    }

    #[test]
    fn test_memory_release_inside_keeps_data() {
        let mut store = MemoryScratch::new();
        store.write(0, b"abcdef").unwrap();
        store.release(0, 2).unwrap();

        assert_eq!(store.len(), 6);
    }
}

mod temp_file_scratch_tests {
    use super::*;

    #[test]
    fn test_temp_file_scratch_write_read_release() {
        let mut store = TempFileScratch::new().unwrap();
        exercise_store(&mut store);
    }

    #[test]
    fn test_temp_file_scratch_in_directory() {
        let dir = tempfile::tempdir().unwrap();
        let provider = TempFileProvider::with_dir(Some(dir.path().to_path_buf()));
        let mut store = provider.create().unwrap();

        exercise_store(store.as_mut());
    }

    #[test]
    fn test_memory_provider_creates_empty_store() {
        let store = MemoryScratchProvider.create().unwrap();
        assert!(store.is_empty());
    }
}
