use proptest::prelude::*;
use savesync_detect::{diff, ScannedFile};
use savesync_manifest::{FileRecord, WorldEntry, WorldName};
use std::collections::{BTreeMap, BTreeSet};

fn world() -> WorldName {
    WorldName::parse("Prop").unwrap()
}

fn path_strategy() -> impl Strategy<Value = String> {
    prop::sample::select(vec!["a", "b", "c", "d", "e", "f", "g", "h"]).prop_map(String::from)
}

fn previous_strategy() -> impl Strategy<Value = BTreeMap<String, Option<u64>>> {
    prop::collection::btree_map(path_strategy(), prop::option::weighted(0.8, 0u64..4), 0..8)
}

fn current_strategy() -> impl Strategy<Value = BTreeMap<String, (u64, u64)>> {
    prop::collection::btree_map(path_strategy(), (0u64..4, 0u64..100), 0..8)
}

proptest! {
    #[test]
    fn prop_diff_partitions_union(
        previous in previous_strategy(),
        current in current_strategy(),
    ) {
        let w = world();
        let entry = WorldEntry::from_files(
            w.clone(),
            previous.iter().map(|(path, size)| {
                let record = match size {
                    Some(size) => FileRecord::new(&w, 0, *size),
                    None => FileRecord::unsized_record(&w, 0),
                };
                (path.clone(), record)
            }),
        );
        let scan: Vec<ScannedFile> = current
            .iter()
            .map(|(path, (size, playtime))| ScannedFile::new(path.clone(), *size, *playtime))
            .collect();

        let changes = diff(&scan, Some(&entry));

        let prev_keys: BTreeSet<String> = previous.keys().cloned().collect();
        let cur_keys: BTreeSet<String> = current.keys().cloned().collect();

        // B \ A, A \ B
        let only_current: BTreeSet<String> = cur_keys.difference(&prev_keys).cloned().collect();
        let only_previous: BTreeSet<String> = prev_keys.difference(&cur_keys).cloned().collect();
        prop_assert_eq!(&changes.added, &only_current);
        prop_assert_eq!(&changes.removed, &only_previous);

        // A ∩ B split by size
        for path in cur_keys.intersection(&prev_keys) {
            let same = matches!(previous[path], Some(size) if size == current[path].0);
            prop_assert_eq!(changes.unchanged.contains(path), same);
            prop_assert_eq!(changes.modified.contains(path), !same);
        }

        // pairwise disjoint, union is A ∪ B
        let parts = [&changes.added, &changes.modified, &changes.removed, &changes.unchanged];
        let total: usize = parts.iter().map(|p| p.len()).sum();
        let union: BTreeSet<String> = parts.iter().flat_map(|p| p.iter().cloned()).collect();
        prop_assert_eq!(total, union.len());
        prop_assert_eq!(union, prev_keys.union(&cur_keys).cloned().collect::<BTreeSet<_>>());
    }

    #[test]
    fn prop_unknown_size_is_always_modified(size in 0u64..u64::MAX, playtime in 0u64..1000) {
        let w = world();
        let entry = WorldEntry::new(w.clone())
            .with_file("save.dat", FileRecord::unsized_record(&w, playtime));
        let scan = vec![ScannedFile::new("save.dat", size, playtime)];

        let changes = diff(&scan, Some(&entry));
        prop_assert!(changes.modified.contains("save.dat"));
        prop_assert!(!changes.is_empty());
    }

    #[test]
    fn prop_rescan_after_commit_is_empty(current in current_strategy()) {
        let w = world();
        let scan: Vec<ScannedFile> = current
            .iter()
            .map(|(path, (size, playtime))| ScannedFile::new(path.clone(), *size, *playtime))
            .collect();

        let committed = savesync_detect::world_entry_from_scan(&w, &scan);
        prop_assert!(diff(&scan, Some(&committed)).is_empty());
    }
}
