//! Tests for completion tracking

use super::*;
use pretty_assertions::assert_eq;

fn detail(n: usize) -> ErrorDetail {
    ErrorDetail::new(format!("row {} failed", n)).with_code("23000")
}

mod state_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_all_rows_succeed_with_counts() {
        let mut tracker = CompletionTracker::new(true, 64);
        for i in 0..5 {
            tracker.reg_update(i);
        }

        assert_eq!(tracker.size(), 5);
        for i in 0..5 {
            assert_eq!(tracker.state(i).unwrap(), RowState::RowCount(i as u32));
        }
        assert_eq!(tracker.find_error(0), None);
    }

    #[test]
    fn test_all_rows_succeed_without_counts() {
        let mut tracker = CompletionTracker::new(false, 64);
        for _ in 0..3 {
            tracker.reg_update(1);
        }

        for i in 0..3 {
            assert_eq!(tracker.state(i).unwrap(), RowState::NoInfo);
        }
    }

    #[test]
    fn test_failed_row_among_counts() {
        let mut tracker = CompletionTracker::new(true, 64);
        tracker.reg_update(1);
        tracker.reg_error(detail(1));
        tracker.reg_update(1);

        assert_eq!(tracker.size(), 3);
        assert_eq!(tracker.state(0).unwrap(), RowState::RowCount(1));
        assert_eq!(tracker.state(1).unwrap(), RowState::Failed);
        assert_eq!(tracker.state(2).unwrap(), RowState::RowCount(1));
        assert_eq!(tracker.find_error(0), Some(1));
        assert_eq!(tracker.find_error(2), None);
    }

    #[test]
    fn test_state_out_of_range() {
        let mut tracker = CompletionTracker::new(false, 64);
        tracker.reg_update(1);

        assert!(matches!(
            tracker.state(1),
            Err(BatchError::OutOfRange { position: 1, size: 1 })
        ));
    }

    #[test]
    fn test_huge_count_saturates() {
        let mut tracker = CompletionTracker::new(true, 64);
        tracker.reg_update(u64::MAX);

        assert_eq!(tracker.state(0).unwrap(), RowState::RowCount(u32::MAX));
    }
}

mod error_detail_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_detail_cap() {
        let mut tracker = CompletionTracker::new(false, 2);
        let failed_positions = [0usize, 3, 4, 7, 9];
        for i in 0..10 {
            if failed_positions.contains(&i) {
                tracker.reg_error(detail(i));
            } else {
                tracker.reg_update(1);
            }
        }

        let mut visited = Vec::new();
        let mut from = 0;
        while let Some(pos) = tracker.find_error(from) {
            visited.push(pos);
            from = pos + 1;
        }
        assert_eq!(visited, failed_positions.to_vec());
        assert_eq!(tracker.errors().collect::<Vec<_>>(), failed_positions.to_vec());

        assert_eq!(tracker.status(0).unwrap(), &detail(0));
        assert_eq!(tracker.status(3).unwrap(), &detail(3));
        for pos in [4, 7, 9] {
            assert!(matches!(
                tracker.status(pos),
                Err(BatchError::MissingDetail(p)) if p == pos
            ));
        }
    }

    #[test]
    fn test_status_of_successful_row() {
        let mut tracker = CompletionTracker::new(false, 2);
        tracker.reg_update(1);

        assert!(matches!(tracker.status(0), Err(BatchError::NotFailed(0))));
    }

    #[test]
    fn test_status_out_of_range() {
        let tracker = CompletionTracker::new(false, 2);

        assert!(matches!(
            tracker.status(0),
            Err(BatchError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_zero_detail_limit_keeps_positions_only() {
        let mut tracker = CompletionTracker::new(false, 0);
        tracker.reg_error(detail(0));

        assert_eq!(tracker.state(0).unwrap(), RowState::Failed);
        assert!(matches!(tracker.status(0), Err(BatchError::MissingDetail(0))));
    }

    #[test]
    fn test_find_error_past_end() {
        let mut tracker = CompletionTracker::new(false, 4);
        tracker.reg_error(detail(0));

        assert_eq!(tracker.find_error(1), None);
        assert_eq!(tracker.find_error(100), None);
    }
}

mod summary_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_summary_with_counts() {
        let mut tracker = CompletionTracker::new(true, 4);
        tracker.reg_update(1);
        tracker.reg_error(detail(1));
        tracker.reg_update(2);

        assert_eq!(
            tracker.summary(),
            CompletionSummary {
                total: 3,
                succeeded: 2,
                no_info: 0,
                failed: 1,
            }
        );
    }

    #[test]
    fn test_summary_without_counts() {
        let mut tracker = CompletionTracker::new(false, 4);
        tracker.reg_update(1);
        tracker.reg_update(1);
        tracker.reg_error(detail(2));

        let summary = tracker.summary();
        assert_eq!(summary.no_info, 2);
        assert_eq!(summary.succeeded, 0);
        assert_eq!(summary.failed, 1);
        tracker.dispose();
    }
}
