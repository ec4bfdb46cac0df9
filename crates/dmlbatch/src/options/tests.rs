//! Tests for batch options and parameter blocks

use super::*;
use pretty_assertions::assert_eq;

mod batch_options_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_batch_options_default() {
        let options = BatchOptions::default();

        assert!(!options.multi_error);
        assert!(!options.record_counts);
        assert!(!options.user_blob_ids);
        assert_eq!(options.detailed_errors, 64);
        assert_eq!(options.buffer_bytes, 16 * 1024 * 1024);
        assert!(options.default_bpb.is_empty());
    }

    #[test]
    fn test_batch_options_builder() {
        let options = BatchOptions::new()
            .with_multi_error(true)
            .with_record_counts(true)
            .with_user_blob_ids(true)
            .with_detailed_errors(10)
            .with_buffer_bytes(65536)
            .with_default_bpb(vec![1, 3, 1, 1]);

        assert!(options.multi_error);
        assert!(options.record_counts);
        assert!(options.user_blob_ids);
        assert_eq!(options.detailed_errors, 10);
        assert_eq!(options.buffer_bytes, 65536);
        assert_eq!(options.default_bpb, vec![1, 3, 1, 1]);
    }

    #[test]
    fn test_clamped_to_ceilings() {
        let limits = BatchLimits::new()
            .with_detailed_error_ceiling(256)
            .with_buffer_bytes_ceiling(1 << 20);
        let options = BatchOptions::new()
            .with_detailed_errors(10_000)
            .with_buffer_bytes(1 << 30)
            .clamped(&limits);

        assert_eq!(options.detailed_errors, 256);
        assert_eq!(options.buffer_bytes, 1 << 20);
    }
}

mod decode_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_decode_empty_block_gives_defaults() {
        let options = BatchOptions::decode(&[], &BatchLimits::default()).unwrap();

        assert_eq!(options, BatchOptions::default());
    }

    #[test]
    fn test_decode_encoded_options() {
        let original = BatchOptions::new()
            .with_multi_error(true)
            .with_record_counts(true)
            .with_detailed_errors(5)
            .with_buffer_bytes(65536)
            .with_default_bpb(vec![1, 3, 1, 1]);

        let decoded = BatchOptions::decode(&original.encode(), &BatchLimits::default()).unwrap();

        assert_eq!(decoded, original);
    }

    #[test]
    fn test_decode_clamps_oversized_values() {
        let block = BatchParamsBuilder::new()
            .insert_int(TAG_DETAILED_ERRORS, 100_000)
            .insert_int(TAG_BUFFER_BYTES, u32::MAX)
            .finish();

        let options = BatchOptions::decode(&block, &BatchLimits::default()).unwrap();

        assert_eq!(options.detailed_errors, 256);
        assert_eq!(options.buffer_bytes, 256 * 1024 * 1024);
    }

    #[test]
    fn test_decode_zero_buffer_bytes_means_default() {
        let block = BatchParamsBuilder::new()
            .insert_int(TAG_BUFFER_BYTES, 0)
            .finish();

        let options = BatchOptions::decode(&block, &BatchLimits::default()).unwrap();

        assert_eq!(options.buffer_bytes, DEFAULT_BUFFER_BYTES);
    }

    #[test]
    fn test_decode_short_integer_values() {
        let block = BatchParamsBuilder::new()
            .insert_bytes(TAG_MULTI_ERROR, &[1])
            .insert_bytes(TAG_DETAILED_ERRORS, &[7, 0])
            .finish();

        let options = BatchOptions::decode(&block, &BatchLimits::default()).unwrap();

        assert!(options.multi_error);
        assert_eq!(options.detailed_errors, 7);
    }

    #[test]
    fn test_decode_skips_unknown_tags() {
        let block = BatchParamsBuilder::new()
            .insert_bytes(200, b"future")
            .insert_int(TAG_RECORD_COUNTS, 1)
            .finish();

        let options = BatchOptions::decode(&block, &BatchLimits::default()).unwrap();

        assert!(options.record_counts);
    }

    #[test]
    fn test_decode_rejects_wrong_version() {
        let result = BatchOptions::decode(&[2], &BatchLimits::default());

        assert!(matches!(result, Err(BatchError::Configuration(_))));
    }

    #[test]
    fn test_decode_rejects_truncated_item() {
        let mut block = BatchParamsBuilder::new()
            .insert_int(TAG_MULTI_ERROR, 1)
            .finish();
        block.truncate(block.len() - 2);

        let result = BatchOptions::decode(&block, &BatchLimits::default());

        assert!(matches!(result, Err(BatchError::Configuration(_))));
    }

    #[test]
    fn test_decode_rejects_truncated_header() {
        let result = BatchOptions::decode(&[PARAMS_VERSION, TAG_MULTI_ERROR, 4], &BatchLimits::default());

        assert!(matches!(result, Err(BatchError::Configuration(_))));
    }

    #[test]
    fn test_decode_rejects_oversized_integer() {
        let block = BatchParamsBuilder::new()
            .insert_bytes(TAG_MULTI_ERROR, &[1, 0, 0, 0, 0])
            .finish();

        let result = BatchOptions::decode(&block, &BatchLimits::default());

        assert!(matches!(result, Err(BatchError::Configuration(_))));
    }
}

mod params_builder_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_builder_layout() {
        let block = BatchParamsBuilder::new()
            .insert_int(TAG_MULTI_ERROR, 1)
            .finish();

        assert_eq!(block, vec![PARAMS_VERSION, TAG_MULTI_ERROR, 4, 0, 0, 0, 1, 0, 0, 0]);
    }

    #[test]
    fn test_empty_builder_is_version_only() {
        assert_eq!(BatchParamsBuilder::default().finish(), vec![PARAMS_VERSION]);
    }
}
