//! Multi-source merge: combines several source datasets into one under a
//! conflict policy.
//!
//! Every strategy is a single pure pass over its inputs in the given order.
//! Items are never merged: all strategies concatenate them in input order,
//! tagging each row with the id of the dataset it came from.

use std::collections::{BTreeMap, HashSet};

use serde_json::Value;
use tracing::debug;

use crate::errors::PipelineError;
use crate::models::dataset::{Fields, MergeStrategy, MergedDataset, SourceDataset, ITEM_SOURCE_KEY};
use crate::pipeline::completeness::score;

/// Merges `datasets` under `strategy`.
///
/// Fails only when `datasets` is empty; callers drop sources they could not
/// fetch before calling this.
pub fn merge(
    datasets: &[SourceDataset],
    strategy: MergeStrategy,
) -> Result<MergedDataset, PipelineError> {
    if datasets.is_empty() {
        return Err(PipelineError::EmptyInput);
    }

    let merged = match strategy {
        MergeStrategy::Prioritized => merge_prioritized(datasets),
        MergeStrategy::BestAvailable => merge_best_available(datasets),
        MergeStrategy::AllRequired => merge_all_required(datasets),
    };

    debug!(
        "Merged {} datasets with {:?}: {} fields, {} items",
        datasets.len(),
        strategy,
        merged.fields.len(),
        merged.items.len()
    );

    Ok(merged)
}

fn merge_prioritized(datasets: &[SourceDataset]) -> MergedDataset {
    let mut fields = Fields::new();
    let mut field_sources = BTreeMap::new();

    for dataset in datasets {
        for (key, value) in &dataset.fields {
            let replace = match fields.get(key) {
                None => true,
                // Only a null placeholder from an earlier dataset may be replaced.
                Some(Value::Null) => !value.is_null(),
                Some(_) => false,
            };
            if replace {
                fields.insert(key.clone(), value.clone());
                field_sources.insert(key.clone(), dataset.source_id.clone());
            }
        }
    }

    MergedDataset {
        fields,
        items: concat_items(datasets),
        field_sources,
        field_scores: None,
        excluded_field_count: None,
        strategy: MergeStrategy::Prioritized,
    }
}

fn merge_best_available(datasets: &[SourceDataset]) -> MergedDataset {
    let mut fields = Fields::new();
    let mut field_sources = BTreeMap::new();
    let mut field_scores: BTreeMap<String, u8> = BTreeMap::new();

    for dataset in datasets {
        for (key, value) in &dataset.fields {
            let candidate = score(value);
            let replace = match field_scores.get(key) {
                None => true,
                Some(&best) => candidate > best,
            };
            if replace {
                fields.insert(key.clone(), value.clone());
                field_sources.insert(key.clone(), dataset.source_id.clone());
                field_scores.insert(key.clone(), candidate);
            }
        }
    }

    MergedDataset {
        fields,
        items: concat_items(datasets),
        field_sources,
        field_scores: Some(field_scores),
        excluded_field_count: None,
        strategy: MergeStrategy::BestAvailable,
    }
}

fn merge_all_required(datasets: &[SourceDataset]) -> MergedDataset {
    let first = &datasets[0];

    let mut common: HashSet<&str> = first.fields.keys().map(String::as_str).collect();
    for dataset in &datasets[1..] {
        common.retain(|key| dataset.fields.contains_key(*key));
    }

    let mut fields = Fields::new();
    let mut field_sources = BTreeMap::new();
    // Iterate the first dataset to keep its field order.
    for (key, value) in &first.fields {
        if common.contains(key.as_str()) {
            fields.insert(key.clone(), value.clone());
            field_sources.insert(key.clone(), first.source_id.clone());
        }
    }

    let excluded_field_count = first.fields.len() - fields.len();

    MergedDataset {
        fields,
        items: concat_items(datasets),
        field_sources,
        field_scores: None,
        excluded_field_count: Some(excluded_field_count),
        strategy: MergeStrategy::AllRequired,
    }
}

fn concat_items(datasets: &[SourceDataset]) -> Vec<Fields> {
    datasets
        .iter()
        .flat_map(|dataset| {
            dataset.items.iter().map(move |item| {
                let mut tagged = item.clone();
                tagged.insert(
                    ITEM_SOURCE_KEY.to_string(),
                    Value::String(dataset.source_id.clone()),
                );
                tagged
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn dataset(id: &str, fields: Value) -> SourceDataset {
        let fields = match fields {
            Value::Object(map) => map,
            _ => panic!("fields must be an object"),
        };
        SourceDataset::new(id, fields)
    }

    fn item(value: Value) -> Fields {
        match value {
            Value::Object(map) => map,
            _ => panic!("item must be an object"),
        }
    }

    #[test]
    fn test_empty_input_is_rejected() {
        for strategy in [
            MergeStrategy::Prioritized,
            MergeStrategy::BestAvailable,
            MergeStrategy::AllRequired,
        ] {
            assert_eq!(merge(&[], strategy), Err(PipelineError::EmptyInput));
        }
    }

    #[test]
    fn test_prioritized_first_non_null_wins() {
        let a = dataset("A", json!({"name": "John", "amount": null}));
        let b = dataset("B", json!({"name": "J. Doe", "amount": 100}));

        let merged = merge(&[a, b], MergeStrategy::Prioritized).unwrap();

        assert_eq!(merged.fields["name"], json!("John"));
        assert_eq!(merged.fields["amount"], json!(100));
        assert_eq!(merged.source_of("name"), Some("A"));
        assert_eq!(merged.source_of("amount"), Some("B"));
        assert!(merged.field_scores.is_none());
    }

    #[test]
    fn test_prioritized_order_is_priority() {
        let a = dataset("A", json!({"name": "John"}));
        let b = dataset("B", json!({"name": "J. Doe"}));

        let merged = merge(&[b.clone(), a.clone()], MergeStrategy::Prioritized).unwrap();
        assert_eq!(merged.fields["name"], json!("J. Doe"));

        let merged = merge(&[a, b], MergeStrategy::Prioritized).unwrap();
        assert_eq!(merged.fields["name"], json!("John"));
    }

    #[test]
    fn test_prioritized_all_null_field_kept_from_first() {
        let a = dataset("A", json!({"memo": null}));
        let b = dataset("B", json!({"memo": null}));

        let merged = merge(&[a, b], MergeStrategy::Prioritized).unwrap();
        assert_eq!(merged.fields["memo"], Value::Null);
        assert_eq!(merged.source_of("memo"), Some("A"));
    }

    #[test]
    fn test_best_available_prefers_higher_score() {
        let a = dataset("A", json!({"amt": "TBD"}));
        let b = dataset("B", json!({"amt": "1200.00"}));

        let merged = merge(&[a, b], MergeStrategy::BestAvailable).unwrap();

        assert_eq!(merged.fields["amt"], json!("1200.00"));
        assert_eq!(merged.source_of("amt"), Some("B"));
        assert_eq!(merged.score_of("amt"), Some(70));
    }

    #[test]
    fn test_best_available_tie_keeps_earlier() {
        let a = dataset("A", json!({"city": "Paris"}));
        let b = dataset("B", json!({"city": "Lyon"}));

        let merged = merge(&[a, b], MergeStrategy::BestAvailable).unwrap();
        assert_eq!(merged.fields["city"], json!("Paris"));
        assert_eq!(merged.source_of("city"), Some("A"));
    }

    #[test]
    fn test_best_available_scores_every_field() {
        let a = dataset("A", json!({"x": null, "y": "2024-01-05"}));
        let b = dataset("B", json!({"x": "N/A", "z": {"nested": true}}));

        let merged = merge(&[a, b], MergeStrategy::BestAvailable).unwrap();

        assert_eq!(merged.fields["x"], json!("N/A"));
        assert_eq!(merged.score_of("x"), Some(5));
        assert_eq!(merged.score_of("y"), Some(75));
        assert_eq!(merged.score_of("z"), Some(0));
        assert_eq!(merged.field_sources.len(), merged.fields.len());
    }

    #[test]
    fn test_all_required_keeps_intersection() {
        let a = dataset("A", json!({"name": "John", "amount": 5, "ref": "X1"}));
        let b = dataset("B", json!({"name": "J. Doe", "amount": 7}));
        let c = dataset("C", json!({"amount": 9, "name": "Johnny", "extra": true}));

        let merged = merge(&[a, b, c], MergeStrategy::AllRequired).unwrap();

        let keys: Vec<&str> = merged.fields.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["name", "amount"]);
        assert_eq!(merged.fields["name"], json!("John"));
        assert_eq!(merged.excluded_field_count, Some(1));
        assert!(merged.field_sources.values().all(|s| s == "A"));
    }

    #[test]
    fn test_all_required_disjoint_inputs() {
        let a = dataset("A", json!({"p": 1, "q": 2}));
        let b = dataset("B", json!({"r": 3}));

        let merged = merge(&[a, b], MergeStrategy::AllRequired).unwrap();
        assert!(merged.fields.is_empty());
        assert!(merged.field_sources.is_empty());
        assert_eq!(merged.excluded_field_count, Some(2));
    }

    #[test]
    fn test_items_concatenated_and_tagged() {
        let a = dataset("A", json!({"k": 1})).with_items(vec![item(json!({"sku": "1"}))]);
        let b = dataset("B", json!({"k": 2}))
            .with_items(vec![item(json!({"sku": "1"})), item(json!({"sku": "2"}))]);

        for strategy in [
            MergeStrategy::Prioritized,
            MergeStrategy::BestAvailable,
            MergeStrategy::AllRequired,
        ] {
            let merged = merge(&[a.clone(), b.clone()], strategy).unwrap();
            let sources: Vec<&Value> = merged.items.iter().map(|i| &i[ITEM_SOURCE_KEY]).collect();
            assert_eq!(sources, vec![&json!("A"), &json!("B"), &json!("B")]);
            assert_eq!(merged.items[1]["sku"], json!("1"));
        }
    }

    #[test]
    fn test_single_dataset_passes_through() {
        let a = dataset("A", json!({"name": "John", "memo": null}));
        let merged = merge(std::slice::from_ref(&a), MergeStrategy::Prioritized).unwrap();
        assert_eq!(merged.fields, a.fields);
        assert_eq!(merged.field_sources.len(), 2);
    }

    mod laws {
        use super::*;
        use proptest::prelude::*;

        fn arb_value() -> impl Strategy<Value = Value> {
            prop_oneof![
                Just(Value::Null),
                any::<i64>().prop_map(Value::from),
                any::<bool>().prop_map(Value::from),
                "[a-zA-Z ]{0,8}".prop_map(Value::from),
            ]
        }

        /// Up to four datasets over a small shared key space, so keys overlap.
        fn arb_datasets() -> impl Strategy<Value = Vec<SourceDataset>> {
            prop::collection::vec(
                prop::collection::vec(("[a-f]", arb_value()), 0..6),
                1..5,
            )
            .prop_map(|sets| {
                sets.into_iter()
                    .enumerate()
                    .map(|(i, pairs)| SourceDataset::new(format!("S{i}"), pairs.into_iter().collect()))
                    .collect()
            })
        }

        fn arb_strategy() -> impl Strategy<Value = MergeStrategy> {
            prop_oneof![
                Just(MergeStrategy::Prioritized),
                Just(MergeStrategy::BestAvailable),
                Just(MergeStrategy::AllRequired),
            ]
        }

        proptest! {
            #[test]
            fn prioritized_takes_first_non_null(datasets in arb_datasets()) {
                let merged = merge(&datasets, MergeStrategy::Prioritized).unwrap();

                let mut union: Vec<&String> = Vec::new();
                for dataset in &datasets {
                    for key in dataset.fields.keys() {
                        if !union.contains(&key) {
                            union.push(key);
                        }
                    }
                }
                prop_assert_eq!(merged.fields.len(), union.len());

                for key in union {
                    let winner = datasets
                        .iter()
                        .find(|d| d.fields.get(key).is_some_and(|v| !v.is_null()))
                        .or_else(|| datasets.iter().find(|d| d.fields.contains_key(key)))
                        .unwrap();
                    prop_assert_eq!(&merged.fields[key], &winner.fields[key]);
                    prop_assert_eq!(merged.source_of(key), Some(winner.source_id.as_str()));
                }

                prop_assert_eq!(merge(&datasets, MergeStrategy::Prioritized).unwrap(), merged);
            }

            #[test]
            fn all_required_keeps_exact_intersection(datasets in arb_datasets()) {
                let merged = merge(&datasets, MergeStrategy::AllRequired).unwrap();

                let first = &datasets[0];
                let intersection: HashSet<&String> = first
                    .fields
                    .keys()
                    .filter(|key| datasets.iter().all(|d| d.fields.contains_key(*key)))
                    .collect();
                let kept: HashSet<&String> = merged.fields.keys().collect();

                prop_assert_eq!(&kept, &intersection);
                prop_assert_eq!(
                    merged.excluded_field_count,
                    Some(first.fields.len() - intersection.len())
                );
                for key in kept {
                    prop_assert_eq!(&merged.fields[key], &first.fields[key]);
                }
            }

            #[test]
            fn every_field_has_one_source(
                datasets in arb_datasets(),
                strategy in arb_strategy(),
            ) {
                let merged = merge(&datasets, strategy).unwrap();

                prop_assert_eq!(merged.field_sources.len(), merged.fields.len());
                for key in merged.fields.keys() {
                    prop_assert!(merged.field_sources.contains_key(key));
                }
                if strategy == MergeStrategy::BestAvailable {
                    prop_assert_eq!(merged.field_scores.as_ref().map(BTreeMap::len), Some(merged.fields.len()));
                }
            }
        }
    }
}
