//! Buffer run views and result sinks for the batch protocol.
//!
//! Batched verbs traffic in *runs*: one flat byte buffer holding `n`
//! concatenated elements next to a parallel size array of length `n`.
//! [`ByteRun`] is the non-owning input view. [`ValueSink`] is the output
//! side; it supports the two result layouts:
//!
//! - **Unpacked**: the size array arrives pre-populated with per-slot
//!   capacities. Slot `i` occupies the fixed window starting at the sum of
//!   the capacities before it; the sink overwrites `sizes[i]` with the
//!   actual length or a sentinel.
//! - **Packed**: elements are appended contiguously and `sizes[i]` receives
//!   each length. Once an element no longer fits, that slot and every later
//!   one in the stream is stamped [`SIZE_TOO_SMALL`] and no further bytes
//!   are written.

use crate::sentinel::{KEY_NOT_FOUND, NO_MORE_KEYS, SIZE_TOO_SMALL};
use crate::{Error, Result};

/// Non-owning view over a run of concatenated byte elements.
#[derive(Clone, Copy)]
pub struct ByteRun<'a> {
    data: &'a [u8],
    sizes: &'a [usize],
}

impl<'a> ByteRun<'a> {
    /// Wraps `data` as `sizes.len()` elements. Fails with `InvalidArgs` when
    /// the declared sizes overrun the buffer.
    pub fn new(data: &'a [u8], sizes: &'a [usize]) -> Result<Self> {
        let mut total: usize = 0;
        for &size in sizes {
            total = total
                .checked_add(size)
                .ok_or_else(|| Error::invalid_args("element sizes overflow"))?;
        }
        if total > data.len() {
            return Err(Error::invalid_args("element sizes overrun the buffer"));
        }
        Ok(Self { data, sizes })
    }

    /// Number of elements in the run.
    pub fn len(&self) -> usize {
        self.sizes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sizes.is_empty()
    }

    /// Sum of all element sizes.
    pub fn total_size(&self) -> usize {
        self.sizes.iter().sum()
    }

    /// True when some element has size zero.
    pub fn has_empty_element(&self) -> bool {
        self.sizes.iter().any(|&s| s == 0)
    }

    pub fn iter(&self) -> ByteRunIter<'a> {
        ByteRunIter {
            data: self.data,
            sizes: self.sizes,
            index: 0,
            offset: 0,
        }
    }

    /// Element at position `i`, walking the run from the start.
    pub fn get(&self, i: usize) -> Option<&'a [u8]> {
        self.iter().nth(i)
    }
}

impl<'a, 'r> IntoIterator for &'r ByteRun<'a> {
    type Item = &'a [u8];
    type IntoIter = ByteRunIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

pub struct ByteRunIter<'a> {
    data: &'a [u8],
    sizes: &'a [usize],
    index: usize,
    offset: usize,
}

impl<'a> Iterator for ByteRunIter<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<&'a [u8]> {
        let size = *self.sizes.get(self.index)?;
        let element = &self.data[self.offset..self.offset + size];
        self.index += 1;
        self.offset += size;
        Some(element)
    }
}

/// Output sink writing sized elements into a result region.
///
/// Slots must be driven in index order: each of [`write`](Self::write) and
/// [`miss`](Self::miss) consumes the next slot, and
/// [`exhaust`](Self::exhaust) stamps every slot that remains.
pub struct ValueSink<'a> {
    data: &'a mut [u8],
    sizes: &'a mut [u64],
    packed: bool,
    next: usize,
    cursor: usize,
    overflowed: bool,
}

impl<'a> ValueSink<'a> {
    /// Packed layout: elements are appended contiguously.
    pub fn packed(data: &'a mut [u8], sizes: &'a mut [u64]) -> Self {
        Self {
            data,
            sizes,
            packed: true,
            next: 0,
            cursor: 0,
            overflowed: false,
        }
    }

    /// Unpacked layout: `sizes` holds the per-slot capacities chosen by the
    /// caller. Fails with `InvalidArgs` when the capacities overrun `data`.
    pub fn unpacked(data: &'a mut [u8], sizes: &'a mut [u64]) -> Result<Self> {
        let mut total: usize = 0;
        for &capacity in sizes.iter() {
            let capacity = usize::try_from(capacity)
                .map_err(|_| Error::invalid_args("slot capacity exceeds address space"))?;
            total = total
                .checked_add(capacity)
                .ok_or_else(|| Error::invalid_args("slot capacities overflow"))?;
        }
        if total > data.len() {
            return Err(Error::invalid_args("slot capacities overrun the buffer"));
        }
        Ok(Self {
            data,
            sizes,
            packed: false,
            next: 0,
            cursor: 0,
            overflowed: false,
        })
    }

    /// Number of result slots.
    pub fn slots(&self) -> usize {
        self.sizes.len()
    }

    /// Slots not yet consumed by `write`/`miss`.
    pub fn remaining(&self) -> usize {
        self.sizes.len() - self.next
    }

    /// Extent of the region consumed so far: appended bytes in packed
    /// layout, capacity windows walked in unpacked layout.
    pub fn extent(&self) -> usize {
        self.cursor
    }

    /// Emits `bytes` into the next slot, recording its length or
    /// [`SIZE_TOO_SMALL`] when the destination cannot hold it.
    pub fn write(&mut self, bytes: &[u8]) {
        let i = self.take_slot();
        if self.packed {
            if self.overflowed || bytes.len() > self.data.len() - self.cursor {
                self.overflowed = true;
                self.sizes[i] = SIZE_TOO_SMALL;
                return;
            }
            self.data[self.cursor..self.cursor + bytes.len()].copy_from_slice(bytes);
            self.sizes[i] = bytes.len() as u64;
            self.cursor += bytes.len();
        } else {
            let capacity = self.sizes[i] as usize;
            if bytes.len() > capacity {
                self.sizes[i] = SIZE_TOO_SMALL;
            } else {
                self.data[self.cursor..self.cursor + bytes.len()].copy_from_slice(bytes);
                self.sizes[i] = bytes.len() as u64;
            }
            self.cursor += capacity;
        }
    }

    /// Records a missing key in the next slot.
    pub fn miss(&mut self) {
        let i = self.take_slot();
        if self.packed {
            // An overflowed packed stream stays poisoned even across misses.
            self.sizes[i] = if self.overflowed {
                SIZE_TOO_SMALL
            } else {
                KEY_NOT_FOUND
            };
        } else {
            let capacity = self.sizes[i] as usize;
            self.sizes[i] = KEY_NOT_FOUND;
            self.cursor += capacity;
        }
    }

    /// Stamps every remaining slot with [`NO_MORE_KEYS`].
    pub fn exhaust(&mut self) {
        while self.next < self.sizes.len() {
            self.sizes[self.next] = NO_MORE_KEYS;
            self.next += 1;
        }
    }

    fn take_slot(&mut self) -> usize {
        let i = self.next;
        assert!(i < self.sizes.len(), "sink slot overrun");
        self.next += 1;
        i
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_iterate_run_elements() {
        // given
        let data = b"abccde";
        let sizes = [2usize, 1, 3];

        // when
        let run = ByteRun::new(data, &sizes).unwrap();
        let elements: Vec<&[u8]> = run.iter().collect();

        // then
        assert_eq!(elements, vec![b"ab".as_ref(), b"c".as_ref(), b"cde".as_ref()]);
        assert_eq!(run.total_size(), 6);
        assert_eq!(run.get(1), Some(b"c".as_ref()));
        assert_eq!(run.get(3), None);
    }

    #[test]
    fn should_reject_run_overrunning_buffer() {
        let sizes = [3usize, 3];
        let result = ByteRun::new(b"abcd", &sizes);
        assert!(matches!(result, Err(Error::InvalidArgs(_))));
    }

    #[test]
    fn should_detect_empty_elements() {
        let run = ByteRun::new(b"ab", &[1usize, 0, 1]).unwrap();
        assert!(run.has_empty_element());
        assert_eq!(run.get(1), Some(b"".as_ref()));
    }

    #[test]
    fn should_pack_until_overflow_then_poison_stream() {
        // given - 5 bytes of room for "ab", "cde", "fghi"
        let mut data = [0u8; 5];
        let mut sizes = [0u64; 3];
        let mut sink = ValueSink::packed(&mut data, &mut sizes);

        // when
        sink.write(b"ab");
        sink.write(b"cde");
        sink.write(b"fghi");

        // then
        assert_eq!(sink.extent(), 5);
        assert_eq!(sizes, [2, 3, SIZE_TOO_SMALL]);
        assert_eq!(&data, b"abcde");
    }

    #[test]
    fn should_keep_packed_stream_poisoned_across_misses() {
        let mut data = [0u8; 2];
        let mut sizes = [0u64; 3];
        let mut sink = ValueSink::packed(&mut data, &mut sizes);

        sink.write(b"abc");
        sink.miss();
        sink.write(b"x");

        assert_eq!(sizes, [SIZE_TOO_SMALL, SIZE_TOO_SMALL, SIZE_TOO_SMALL]);
        assert_eq!(&data, &[0, 0]);
    }

    #[test]
    fn should_fill_exact_packed_buffer_without_sentinels() {
        let mut data = [0u8; 4];
        let mut sizes = [0u64; 2];
        let mut sink = ValueSink::packed(&mut data, &mut sizes);

        sink.write(b"ab");
        sink.write(b"cd");

        assert_eq!(sizes, [2, 2]);
        assert_eq!(&data, b"abcd");
    }

    #[test]
    fn should_write_unpacked_into_fixed_windows() {
        // given - capacities 4, 2, 3
        let mut data = [0u8; 9];
        let mut sizes = [4u64, 2, 3];
        let mut sink = ValueSink::unpacked(&mut data, &mut sizes).unwrap();

        // when - second element larger than its window
        sink.write(b"ab");
        sink.write(b"xyz");
        sink.write(b"pq");

        // then - each element sits at its window start
        assert_eq!(sink.extent(), 9);
        assert_eq!(sizes, [2, SIZE_TOO_SMALL, 2]);
        assert_eq!(&data[..2], b"ab");
        assert_eq!(&data[6..8], b"pq");
    }

    #[test]
    fn should_mark_unpacked_miss_and_advance_window() {
        let mut data = [0u8; 6];
        let mut sizes = [3u64, 3];
        let mut sink = ValueSink::unpacked(&mut data, &mut sizes).unwrap();

        sink.miss();
        sink.write(b"ok");

        assert_eq!(sizes, [KEY_NOT_FOUND, 2]);
        assert_eq!(&data[3..5], b"ok");
    }

    #[test]
    fn should_report_too_small_for_zero_capacity_slot() {
        let mut data = [0u8; 4];
        let mut sizes = [0u64, 4];
        let mut sink = ValueSink::unpacked(&mut data, &mut sizes).unwrap();

        sink.write(b"a");
        sink.write(b"bcd");

        assert_eq!(sizes, [SIZE_TOO_SMALL, 3]);
        assert_eq!(&data[..4], b"bcd\0");
    }

    #[test]
    fn should_accept_empty_element_in_zero_capacity_slot() {
        let mut data = [0u8; 0];
        let mut sizes = [0u64];
        let mut sink = ValueSink::unpacked(&mut data, &mut sizes).unwrap();

        sink.write(b"");

        assert_eq!(sizes, [0]);
    }

    #[test]
    fn should_exhaust_remaining_slots() {
        let mut data = [0u8; 8];
        let mut sizes = [0u64; 4];
        let mut sink = ValueSink::packed(&mut data, &mut sizes);

        sink.write(b"k");
        sink.exhaust();

        assert_eq!(sizes, [1, NO_MORE_KEYS, NO_MORE_KEYS, NO_MORE_KEYS]);
    }

    #[test]
    fn should_reject_unpacked_capacities_overrunning_buffer() {
        let mut data = [0u8; 4];
        let mut sizes = [3u64, 3];
        let result = ValueSink::unpacked(&mut data, &mut sizes);
        assert!(matches!(result, Err(Error::InvalidArgs(_))));
    }

    mod properties {
        use proptest::prelude::*;

        use super::*;

        proptest! {
            /// A packed buffer of exactly the right total size round-trips
            /// every element with no sentinels.
            #[test]
            fn should_round_trip_exactly_sized_packed_stream(
                elements in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..16), 1..8)
            ) {
                let total: usize = elements.iter().map(Vec::len).sum();
                let mut data = vec![0u8; total];
                let mut sizes = vec![0u64; elements.len()];
                let mut sink = ValueSink::packed(&mut data, &mut sizes);

                for element in &elements {
                    sink.write(element);
                }

                let expected: Vec<u8> = elements.iter().flatten().copied().collect();
                prop_assert_eq!(&data, &expected);
                for (size, element) in sizes.iter().zip(&elements) {
                    prop_assert_eq!(*size, element.len() as u64);
                }
            }

            /// Once a packed stream reports SIZE_TOO_SMALL, every later slot
            /// does too.
            #[test]
            fn should_keep_packed_overflow_monotonic(
                elements in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..16), 1..8),
                room in 0usize..32,
            ) {
                let mut data = vec![0u8; room];
                let mut sizes = vec![0u64; elements.len()];
                let mut sink = ValueSink::packed(&mut data, &mut sizes);

                for element in &elements {
                    sink.write(element);
                }

                let first_overflow = sizes.iter().position(|&s| s == SIZE_TOO_SMALL);
                if let Some(at) = first_overflow {
                    prop_assert!(sizes[at..].iter().all(|&s| s == SIZE_TOO_SMALL));
                }
            }
        }
    }
}
