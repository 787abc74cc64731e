//! Property tests for the capability table.
//!
//! Drives random operation sequences against a plain map model and checks
//! the table agrees on membership and reference counts throughout.

use alloc::collections::BTreeMap;
use alloc::vec::Vec;

use proptest::prelude::*;
use weft_common::{CapSel, Label};

use super::object::{KObject, SGateObject};
use super::table::{CapTable, Capability};

#[derive(Clone, Debug)]
enum Op {
    Insert(CapSel),
    Remove(CapSel),
    Exchange(CapSel),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0u32..16).prop_map(Op::Insert),
        (0u32..16).prop_map(Op::Remove),
        (0u32..16).prop_map(Op::Exchange),
    ]
}

fn gate() -> KObject {
    KObject::sgate(SGateObject::new(0, 0, 0, Label::NONE, 64, 6))
}

proptest! {
    #[test]
    fn table_membership_matches_model(ops in prop::collection::vec(op_strategy(), 0..64)) {
        let mut table = CapTable::new(7);
        let mut model: BTreeMap<CapSel, ()> = BTreeMap::new();

        for op in ops {
            match op {
                Op::Insert(sel) => {
                    let res = table.insert(Capability::new(sel, gate()));
                    if model.contains_key(&sel) {
                        prop_assert!(res.is_err());
                    } else {
                        prop_assert!(res.is_ok());
                        model.insert(sel, ());
                    }
                }
                Op::Remove(sel) => {
                    let res = table.remove(sel);
                    prop_assert_eq!(res.is_ok(), model.remove(&sel).is_some());
                }
                Op::Exchange(sel) => {
                    let res = table.exchange(sel, gate());
                    prop_assert_eq!(res.is_ok(), model.contains_key(&sel));
                }
            }
        }

        prop_assert_eq!(table.len(), model.len());
        for sel in 0u32..16 {
            prop_assert_eq!(table.get(sel).is_some(), model.contains_key(&sel));
        }
    }

    #[test]
    fn removed_selectors_stay_gone(sels in prop::collection::vec(0u32..8, 1..32)) {
        let mut table = CapTable::new(1);
        for &sel in &sels {
            let _ = table.insert(Capability::new(sel, gate()));
        }
        for &sel in &sels {
            let _ = table.remove(sel);
            prop_assert!(table.get(sel).is_none());
        }
        prop_assert!(table.is_empty());
    }

    #[test]
    fn shared_object_count_tracks_holding_tables(n in 1usize..8) {
        let obj = gate();
        let mut tables: Vec<CapTable> = (0..n).map(|i| CapTable::new(i as u16)).collect();
        for (i, t) in tables.iter_mut().enumerate() {
            t.insert(Capability::new(i as u32, obj.clone())).unwrap();
        }
        prop_assert_eq!(obj.strong_count(), n + 1);

        while let Some(mut t) = tables.pop() {
            let cap = t.remove(tables.len() as u32).unwrap();
            drop(cap);
            drop(t);
            prop_assert_eq!(obj.strong_count(), tables.len() + 1);
        }
        prop_assert_eq!(obj.strong_count(), 1);
    }
}
