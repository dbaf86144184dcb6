//! Input order stabilization.
//!
//! Fleet returns inputs keyed by id with no ordering guarantee. Without
//! reordering, every read after a write would look like a reorder-only
//! change to the cached model.

use crate::policy::InputModel;
use std::collections::HashMap;

/// Order `incoming` by each element's position in `existing`.
///
/// Elements whose id is not in `existing` go last, keeping their relative
/// order from `incoming`.
pub fn sort_inputs(incoming: Vec<InputModel>, existing: &[InputModel]) -> Vec<InputModel> {
    sort_by_reference(incoming, existing, |input| input.input_id.as_str())
}

pub fn sort_by_reference<T, F>(mut incoming: Vec<T>, existing: &[T], key: F) -> Vec<T>
where
    F: Fn(&T) -> &str,
{
    let mut order: HashMap<&str, usize> = HashMap::with_capacity(existing.len());
    for (index, item) in existing.iter().enumerate() {
        order.entry(key(item)).or_insert(index);
    }

    // sort_by_key is stable, which keeps unmatched elements in arrival order.
    incoming.sort_by_key(|item| order.get(key(item)).copied().unwrap_or(usize::MAX));
    incoming
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn inputs(ids: &[&str]) -> Vec<InputModel> {
        ids.iter()
            .map(|id| InputModel {
                input_id: id.to_string(),
                ..Default::default()
            })
            .collect()
    }

    fn ids(list: &[InputModel]) -> Vec<&str> {
        list.iter().map(|i| i.input_id.as_str()).collect()
    }

    #[test]
    fn orders_by_existing_and_appends_unknown() {
        let existing = inputs(&["B", "C", "A"]);
        let sorted = sort_inputs(inputs(&["A", "B", "D", "C"]), &existing);
        assert_eq!(ids(&sorted), vec!["B", "C", "A", "D"]);
    }

    #[test]
    fn unmatched_keep_their_arrival_order() {
        let existing = inputs(&["A"]);
        let sorted = sort_inputs(inputs(&["Z", "Y", "A", "X"]), &existing);
        assert_eq!(ids(&sorted), vec!["A", "Z", "Y", "X"]);
    }

    #[test]
    fn empty_reference_is_identity() {
        let sorted = sort_inputs(inputs(&["C", "A", "B"]), &[]);
        assert_eq!(ids(&sorted), vec!["C", "A", "B"]);
    }

    fn permutations(items: &[&'static str]) -> Vec<Vec<&'static str>> {
        if items.len() <= 1 {
            return vec![items.to_vec()];
        }
        let mut out = Vec::new();
        for (i, head) in items.iter().enumerate() {
            let mut rest = items.to_vec();
            rest.remove(i);
            for mut tail in permutations(&rest) {
                tail.insert(0, *head);
                out.push(tail);
            }
        }
        out
    }

    #[test]
    fn idempotent_for_every_ordering() {
        let references: &[&[&str]] = &[
            &[],
            &["A"],
            &["D", "B"],
            &["C", "A", "D", "B"],
            &["B", "X", "A", "Y"],
            &["A", "A", "B"],
        ];

        let lists = permutations(&["A", "B", "C", "D"]);
        assert_eq!(lists.len(), 24);

        for reference in references {
            let reference = inputs(reference);
            for list in &lists {
                let once = sort_inputs(inputs(list), &reference);
                let twice = sort_inputs(once.clone(), &reference);
                assert_eq!(once, twice, "list {list:?}");

                let matched: Vec<&str> = ids(&once)
                    .into_iter()
                    .filter(|id| reference.iter().any(|r| r.input_id == *id))
                    .collect();
                let unmatched: Vec<&str> = list
                    .iter()
                    .copied()
                    .filter(|id| !reference.iter().any(|r| r.input_id == *id))
                    .collect();
                // matched first, then unmatched in arrival order
                assert_eq!(ids(&once)[matched.len()..], unmatched[..], "list {list:?}");
            }
        }
    }

    #[test]
    fn sorting_twice_changes_nothing() {
        let cases: &[(&[&str], &[&str])] = &[
            (&["A", "B", "D", "C"], &["B", "C", "A"]),
            (&["D", "C", "B", "A"], &["A", "Q"]),
            (&["A", "B"], &[]),
            (&[], &["A"]),
            (&["E", "A", "F", "B"], &["F", "E", "B", "A"]),
        ];

        for (list, reference) in cases {
            let reference = inputs(reference);
            let once = sort_inputs(inputs(list), &reference);
            let twice = sort_inputs(once.clone(), &reference);
            assert_eq!(once, twice, "list {list:?}");
        }
    }
}
