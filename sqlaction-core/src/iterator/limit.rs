use super::{close_on_drop, ensure_open, ResultIterator};
use crate::error::AccessResult;
use crate::row::DataRow;

/// In-memory OFFSET/LIMIT.
///
/// The offset is consumed when the iterator is built. A limit of `0` means no limit.
pub struct LimitResultIterator<I: ResultIterator> {
    inner: I,
    limit: usize,
    fetched: usize,
    closed: bool,
}

impl<I: ResultIterator> LimitResultIterator<I> {
    pub fn new(mut inner: I, offset: usize, limit: usize) -> AccessResult<Self> {
        for _ in 0..offset {
            if !inner.skip_row()? {
                break;
            }
        }
        Ok(Self {
            inner,
            limit,
            fetched: 0,
            closed: false,
        })
    }

    fn limit_reached(&self) -> bool {
        self.limit > 0 && self.fetched >= self.limit
    }
}

impl<I: ResultIterator> ResultIterator for LimitResultIterator<I> {
    fn has_next_row(&mut self) -> AccessResult<bool> {
        ensure_open(self.closed)?;
        if self.limit_reached() {
            return Ok(false);
        }
        self.inner.has_next_row()
    }

    fn next_row(&mut self) -> AccessResult<Option<DataRow>> {
        ensure_open(self.closed)?;
        if self.limit_reached() {
            return Ok(None);
        }
        let row = self.inner.next_row()?;
        if row.is_some() {
            self.fetched += 1;
        }
        Ok(row)
    }

    fn skip_row(&mut self) -> AccessResult<bool> {
        ensure_open(self.closed)?;
        if self.limit_reached() {
            return Ok(false);
        }
        let skipped = self.inner.skip_row()?;
        if skipped {
            self.fetched += 1;
        }
        Ok(skipped)
    }

    fn close(&mut self) -> AccessResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.inner.close()
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

impl<I: ResultIterator> Drop for LimitResultIterator<I> {
    fn drop(&mut self) {
        close_on_drop(self, "limit result iterator");
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{ids, read_ids};
    use super::super::{DistinctMode, DistinctResultIterator};
    use super::*;
    use crate::error::AccessError;

    const INPUT: [i64; 6] = [1, 2, 3, 4, 5, 6];

    #[test]
    fn test_offset_and_limit() {
        let mut it = LimitResultIterator::new(ids(&INPUT), 2, 3).unwrap();
        assert_eq!(read_ids(&mut it), vec![3, 4, 5]);
        assert!(!it.has_next_row().unwrap());
    }

    #[test]
    fn test_zero_limit_is_unbounded() {
        let mut it = LimitResultIterator::new(ids(&INPUT), 4, 0).unwrap();
        assert_eq!(read_ids(&mut it), vec![5, 6]);
    }

    #[test]
    fn test_offset_past_end_is_empty() {
        let mut it = LimitResultIterator::new(ids(&INPUT), 10, 2).unwrap();
        assert!(!it.has_next_row().unwrap());
        assert_eq!(it.next_row().unwrap(), None);
    }

    #[test]
    fn test_skip_counts_against_limit() {
        let mut it = LimitResultIterator::new(ids(&INPUT), 0, 2).unwrap();
        assert!(it.skip_row().unwrap());
        assert_eq!(read_ids(&mut it), vec![2]);
        assert!(!it.skip_row().unwrap());
    }

    #[test]
    fn test_limit_counts_distinct_rows() {
        let distinct = DistinctResultIterator::new(
            ids(&[1, 1, 2, 2, 3, 4]),
            DistinctMode::PrimaryKey(vec!["ID".to_string()]),
        )
        .unwrap();
        let mut it = LimitResultIterator::new(distinct, 1, 2).unwrap();
        assert_eq!(read_ids(&mut it), vec![2, 3]);
    }

    #[test]
    fn test_reads_after_close_fail() {
        let mut it = LimitResultIterator::new(ids(&INPUT), 0, 0).unwrap();
        it.close().unwrap();
        it.close().unwrap();
        assert!(matches!(it.next_row(), Err(AccessError::IteratorClosed)));
    }
}
