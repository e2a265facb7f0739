//! Property-based tests for package identities and pin encoding.
//!
//! These tests use proptest to generate random inputs and verify that
//! invariants hold for all possible inputs.

#[cfg(test)]
mod proptest_tests {
    use crate::ledger::ExclusivityLedger;
    use crate::package::{PackageId, PackageSet};
    use crate::path::encode_pin;
    use proptest::prelude::*;

    fn component() -> impl Strategy<Value = String> {
        "[a-z0-9][a-z0-9_+-]{0,15}"
    }

    // ============================================================================
    // PackageId property tests
    // ============================================================================

    proptest! {
        /// Property: a parsed id displays as the text it was parsed from
        #[test]
        fn package_id_display_matches_input(cat in component(), name in component()) {
            let text = format!("{}/{}", cat, name);
            let id: PackageId = text.parse().unwrap();
            prop_assert_eq!(id.to_string(), text);
            prop_assert_eq!(id.category, cat);
            prop_assert_eq!(id.name, name);
        }

        /// Property: text without exactly one separator is rejected
        #[test]
        fn package_id_requires_one_separator(a in component(), b in component(), c in component()) {
            prop_assert!(a.parse::<PackageId>().is_err());
            let nested = format!("{}/{}/{}", a, b, c);
            prop_assert!(nested.parse::<PackageId>().is_err());
        }

        /// Property: relative path has exactly two components
        #[test]
        fn package_id_rel_path_has_two_components(cat in component(), name in component()) {
            let id = PackageId::new(cat, name);
            prop_assert_eq!(id.rel_path().components().count(), 2);
        }
    }

    // ============================================================================
    // PackageSet property tests
    // ============================================================================

    proptest! {
        /// Property: a category wildcard matches every package of the category
        #[test]
        fn category_wildcard_matches_category(cat in component(), name in component()) {
            let set = PackageSet::from_patterns([format!("{}/*", cat)]).unwrap();
            prop_assert!(set.matches(&PackageId::new(cat, name)));
        }

        /// Property: an exclusion always wins over an inclusion
        #[test]
        fn exclusion_wins(cat in component(), name in component()) {
            let id = PackageId::new(cat.clone(), name);
            let set = PackageSet::from_patterns([format!("{}/*", cat), format!("!{}", id)]).unwrap();
            prop_assert!(!set.matches(&id));
        }
    }

    // ============================================================================
    // Ledger property tests
    // ============================================================================

    proptest! {
        /// Property: within one scope every package has at most one owner,
        /// whatever order kits try to claim in
        #[test]
        fn ledger_claims_are_exclusive(
            claims in prop::collection::vec((component(), 0usize..4), 1..40)
        ) {
            let mut ledger = ExclusivityLedger::new();
            let mut first_owner = std::collections::BTreeMap::new();
            for (name, kit) in &claims {
                let id = PackageId::new("cat", name.clone());
                let kit = format!("kit{}", kit);
                let won = ledger.claim(id.clone(), &kit);
                prop_assert_eq!(won, !first_owner.contains_key(&id));
                first_owner.entry(id).or_insert(kit);
            }
            for (id, kit) in &first_owner {
                prop_assert_eq!(ledger.owner(id), Some(kit.as_str()));
            }
        }
    }

    // ============================================================================
    // encode_pin property tests
    // ============================================================================

    proptest! {
        /// Property: encode_pin never produces a path separator
        #[test]
        fn encode_pin_has_no_separators(input in ".*") {
            let result = encode_pin(&input);
            prop_assert!(!result.contains('/'));
            prop_assert!(!result.contains('\\'));
        }

        /// Property: ordinary branch names and commit ids pass through unchanged
        #[test]
        fn encode_pin_preserves_plain_refs(input in "[a-zA-Z0-9._-]+") {
            prop_assert_eq!(encode_pin(&input), input);
        }
    }
}
