//! Checkpoint ordering of decoded events.

use rayon::slice::ParallelSliceMut;

use crate::checkpoint::Checkpoint;
use crate::event::{Event, RawEvent};

/// Anything carrying a [`Checkpoint`].
pub trait Checkpointed {
    fn checkpoint(&self) -> &Checkpoint;
}

impl Checkpointed for Event {
    fn checkpoint(&self) -> &Checkpoint {
        &self.checkpoint
    }
}

impl Checkpointed for RawEvent {
    fn checkpoint(&self) -> &Checkpoint {
        &self.checkpoint
    }
}

/// Stable ascending sort by checkpoint.
pub fn sort_by_checkpoint<T: Checkpointed + Send>(items: &mut [T]) {
    items.par_sort_by(|a, b| a.checkpoint().cmp(b.checkpoint()));
}

pub fn is_ordered<T: Checkpointed>(items: &[T]) -> bool {
    items.windows(2).all(|w| w[0].checkpoint() <= w[1].checkpoint())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::EventType;

    struct Item(Checkpoint, &'static str);

    impl Checkpointed for Item {
        fn checkpoint(&self) -> &Checkpoint {
            &self.0
        }
    }

    fn at(ts: u64, chain: u64, idx: u64) -> Checkpoint {
        Checkpoint {
            block_timestamp: ts,
            chain_id: chain,
            block_number: ts / 12,
            transaction_index: 0,
            event_type: EventType::Log,
            event_index: idx,
        }
    }

    #[test]
    fn interleaves_chains_by_timestamp() {
        let mut items = vec![
            Item(at(24, 1, 0), "a2"),
            Item(at(12, 1, 0), "a1"),
            Item(at(14, 10, 0), "b1"),
            Item(at(30, 10, 0), "b2"),
        ];
        sort_by_checkpoint(&mut items);
        let names: Vec<_> = items.iter().map(|i| i.1).collect();
        assert_eq!(names, ["a1", "b1", "a2", "b2"]);
        assert!(is_ordered(&items));
    }

    #[test]
    fn equal_checkpoints_keep_input_order() {
        let mut items = vec![Item(at(12, 1, 0), "first"), Item(at(12, 1, 0), "second")];
        sort_by_checkpoint(&mut items);
        assert_eq!(items[0].1, "first");
    }
}
