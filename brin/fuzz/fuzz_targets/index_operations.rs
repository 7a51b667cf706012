#![no_main]
use arbitrary::Arbitrary;
use commonware_brin::{Config, Error, Index};
use commonware_runtime::{deterministic, Runner};
use libfuzzer_sys::fuzz_target;
use std::collections::BTreeMap;

#[derive(Arbitrary, Debug, Clone)]
enum IndexOperation {
    Put { key: u8, value: u8 },
    Delete { key: u8, value: u8 },
    Search(u8),
    LookUpRange { low: Option<u8>, high: Option<u8> },
    ContainsKey(u8),
    Checkpoint,
    Clear,
}

#[derive(Arbitrary, Debug)]
struct FuzzInput {
    capacity: u8,
    operations: Vec<IndexOperation>,
}

fn sorted(mut values: Vec<u8>) -> Vec<u8> {
    values.sort();
    values
}

fn fuzz(input: FuzzInput) {
    if input.operations.is_empty() || input.operations.len() > 256 {
        return;
    }
    let capacity = (input.capacity % 16) as usize + 1;

    let executor = deterministic::Runner::default();
    executor.start(|context| async move {
        let index = Index::init(context, Config { capacity }).unwrap();
        let mut reference: BTreeMap<u8, Vec<u8>> = BTreeMap::new();

        for op in &input.operations {
            match op {
                IndexOperation::Put { key, value } => {
                    index.put(*key, *value);
                    reference.entry(*key).or_default().push(*value);
                    assert!(
                        index.search(key).contains(value),
                        "value {value} missing for key {key} after put"
                    );
                }

                IndexOperation::Delete { key, value } => {
                    let mut expected = false;
                    if let Some(values) = reference.get_mut(key) {
                        if let Some(position) = values.iter().position(|v| v == value) {
                            values.remove(position);
                            expected = true;
                        }
                        if values.is_empty() {
                            reference.remove(key);
                        }
                    }
                    assert_eq!(index.delete(key, value), expected);
                }

                IndexOperation::Search(key) => {
                    let expected = reference.get(key).cloned().unwrap_or_default();
                    assert_eq!(sorted(index.search(key)), sorted(expected));
                }

                IndexOperation::LookUpRange { low, high } => {
                    let result = index.look_up_range(low.as_ref(), high.as_ref());
                    if let (Some(low), Some(high)) = (low, high) {
                        if low > high {
                            assert!(matches!(result, Err(Error::InvalidRange)));
                            continue;
                        }
                    }
                    let result = result.unwrap();

                    // Results are ordered by key: compare per-key groups as multisets
                    let groups: Vec<(&u8, &Vec<u8>)> = reference
                        .iter()
                        .filter(|(k, _)| {
                            low.is_none_or(|low| **k >= low) && high.is_none_or(|high| **k <= high)
                        })
                        .collect();
                    let expected_len: usize = groups.iter().map(|(_, values)| values.len()).sum();
                    assert_eq!(result.len(), expected_len);
                    let mut offset = 0;
                    for (key, values) in groups {
                        let group = &result[offset..offset + values.len()];
                        assert_eq!(
                            sorted(group.to_vec()),
                            sorted(values.clone()),
                            "unexpected values for key {key}"
                        );
                        offset += values.len();
                    }
                }

                IndexOperation::ContainsKey(key) => {
                    assert_eq!(index.contains_key(key), reference.contains_key(key));
                }

                IndexOperation::Checkpoint => {
                    let snapshots = index.checkpoint();
                    assert_eq!(snapshots.len(), index.segments());
                    for snapshot in &snapshots {
                        assert!(!snapshot.entries.is_empty());
                        assert!(snapshot.entries.len() <= capacity);
                    }
                }

                IndexOperation::Clear => {
                    index.clear();
                    reference.clear();
                    assert_eq!(index.segments(), 0);
                }
            }

            let items: usize = reference.values().map(Vec::len).sum();
            assert_eq!(index.len(), items);
            assert_eq!(index.is_empty(), reference.is_empty());
        }
    });
}

fuzz_target!(|input: FuzzInput| {
    fuzz(input);
});
