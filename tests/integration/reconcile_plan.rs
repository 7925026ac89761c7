use proptest::prelude::*;
use stacksync::reconcile::plan;
use std::collections::BTreeSet;
use std::path::PathBuf;

fn paths() -> impl Strategy<Value = BTreeSet<PathBuf>> {
    prop::collection::btree_set(
        "[a-e]\\.[0-9a-f]{2}\\.generated\\.md".prop_map(PathBuf::from),
        0..12,
    )
}

proptest! {
    #[test]
    fn plan_splits_paths_between_delete_and_download(
        local in paths(),
        required in paths(),
        invalid in paths(),
    ) {
        let invalid: Vec<PathBuf> = invalid.into_iter().collect();
        let plan = plan(&local, &required, &invalid);

        prop_assert!(plan.delete.is_disjoint(&plan.download));
        prop_assert!(plan.download.is_subset(&required));
        prop_assert!(plan.delete.is_disjoint(&required));

        for path in &required {
            let stale = !local.contains(path) || invalid.contains(path);
            prop_assert_eq!(plan.download.contains(path), stale);
        }
        for path in &local {
            if !required.contains(path) {
                prop_assert!(plan.delete.contains(path));
            }
        }
        for path in &plan.delete {
            prop_assert!(local.contains(path) || invalid.contains(path));
        }
    }
}

#[test]
fn matching_directory_needs_no_work() {
    let local: BTreeSet<PathBuf> = [PathBuf::from("A/b.66.generated.md")].into();
    let plan = plan(&local, &local.clone(), &[]);
    assert!(plan.delete.is_empty());
    assert!(plan.download.is_empty());
}
