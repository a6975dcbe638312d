use crate::utils::error::{Error, Result};
use std::cmp::min;
use std::ops::Range;

/// Forward-only cursor over `[0, len)` in chunks of `batch_size`. The last
/// chunk holds the remainder. Build a new one to enumerate again.
#[derive(Debug, Clone)]
pub struct Batches {
    batch_size: usize,
    len: usize,
    count: usize,
}

impl Batches {
    pub fn new(batch_size: usize, len: usize) -> Result<Self> {
        if len == 0 || batch_size == 0 || batch_size > len {
            return Err(Error::EmptyBatchSet { batch_size, len });
        }
        Ok(Self {
            batch_size,
            len,
            count: 0,
        })
    }

    /// Batches for a scoring pass: `batch_size` is clamped to `len`.
    pub fn for_eval(batch_size: usize, len: usize) -> Result<Self> {
        Self::new(min(batch_size, len), len)
    }
}

impl Iterator for Batches {
    type Item = Range<usize>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.count >= self.len {
            None
        } else {
            let left = self.len - self.count;
            let sz = min(left, self.batch_size);
            let ret = self.count..self.count + sz;
            self.count += sz;
            Some(ret)
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = (self.len - self.count + self.batch_size - 1) / self.batch_size;
        (left, Some(left))
    }
}

impl ExactSizeIterator for Batches {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ranges_partition_the_index_space() {
        for len in 1..60 {
            for b in 1..=len {
                let ranges: Vec<_> = Batches::new(b, len).unwrap().collect();
                assert_eq!(ranges.len(), (len + b - 1) / b);

                let mut next = 0;
                for r in &ranges {
                    assert_eq!(r.start, next);
                    next = r.end;
                }
                assert_eq!(next, len);

                let (last, rest) = ranges.split_last().unwrap();
                assert!(rest.iter().all(|r| r.len() == b));
                let expected_last = if len % b == 0 { b } else { len % b };
                assert_eq!(last.len(), expected_last);
            }
        }
    }

    #[test]
    fn size_hint_is_exact() {
        let mut batches = Batches::new(3, 10).unwrap();
        assert_eq!(batches.len(), 4);
        batches.next();
        assert_eq!(batches.len(), 3);
        assert_eq!(batches.by_ref().count(), 3);
        assert_eq!(batches.next(), None);
    }

    #[test]
    fn empty_batch_sets_are_rejected() {
        assert!(matches!(
            Batches::new(10, 0),
            Err(Error::EmptyBatchSet { batch_size: 10, len: 0 })
        ));
        assert!(Batches::new(0, 5).is_err());
        assert!(Batches::new(6, 5).is_err());
    }

    #[test]
    fn eval_batches_clamp_to_the_dataset() {
        let ranges: Vec<_> = Batches::for_eval(2048, 100).unwrap().collect();
        assert_eq!(ranges, vec![0..100]);
        assert!(Batches::for_eval(2048, 0).is_err());
    }
}
