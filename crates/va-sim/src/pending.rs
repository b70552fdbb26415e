//! Buffer of writes waiting for the next evaluation cycle.

use indexmap::IndexMap;
use va_core::PointValue;

/// Ordered write buffer: one entry per name, latest value wins.
///
/// A rewrite keeps the name's original position, so a batch replays names in
/// the order they were first written since the last swap.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct PendingWrites {
    entries: IndexMap<String, PointValue>,
}

impl PendingWrites {
    pub fn insert(&mut self, name: &str, value: PointValue) {
        self.entries.insert(name.to_string(), value);
    }

    /// Swap the buffer for an empty one.
    pub fn take(&mut self) -> Vec<(String, PointValue)> {
        std::mem::take(&mut self.entries).into_iter().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rewrite_keeps_first_position() {
        let mut p = PendingWrites::default();
        p.insert("A", PointValue::Int(1));
        p.insert("B", PointValue::Int(2));
        p.insert("A", PointValue::Int(3));
        assert_eq!(
            p.take(),
            [
                ("A".to_string(), PointValue::Int(3)),
                ("B".to_string(), PointValue::Int(2))
            ]
        );
        assert!(p.is_empty());
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn batch_holds_last_value_per_name_in_first_write_order(
                writes in prop::collection::vec((0usize..6, any::<i64>()), 0..40)
            ) {
                let mut p = PendingWrites::default();
                for (n, v) in &writes {
                    p.insert(&format!("P{}", n), PointValue::Int(*v));
                }
                let batch = p.take();

                // Expected: names in order of first sighting, each with its last value.
                let mut expected: Vec<(String, PointValue)> = Vec::new();
                for (n, v) in &writes {
                    let name = format!("P{}", n);
                    match expected.iter_mut().find(|(e, _)| *e == name) {
                        Some(entry) => entry.1 = PointValue::Int(*v),
                        None => expected.push((name, PointValue::Int(*v))),
                    }
                }

                prop_assert_eq!(batch, expected);
            }
        }
    }
}
