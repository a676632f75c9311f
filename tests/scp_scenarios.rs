//! End-to-end federation scenarios driven directly over `Slot` (its
//! nomination/ballot fields are public precisely so a harness can seed
//! vote sets without fighting leader election) plus the synchronous
//! flooding driver in `tests/common`.

mod common;

use std::collections::BTreeMap;

use federated_scp::scp::node_id::NodeId;
use federated_scp::scp::slot::Slot;
use federated_scp::scp::slot_id::SlotId;

use common::{
    all_externalized, externalized_value, flood, flood_with_delay, force_nominate, qset, qset_slices, Food,
};

fn three_node_federation(slot_id: SlotId) -> BTreeMap<NodeId, Slot<Food>> {
    let q = qset(&["a", "b", "c"]);
    ["a", "b", "c"]
        .into_iter()
        .map(|name| {
            let id = NodeId::new(name);
            (id.clone(), Slot::<Food>::new(slot_id, id, q.clone()))
        })
        .collect()
}

#[test]
fn even_slot_symmetric_federation_converges_on_the_greatest_value() {
    let slot_id = SlotId::new(2); // even: combine picks the greatest
    let mut slots = three_node_federation(slot_id);

    let mut seed = Vec::new();
    seed.extend(force_nominate(slots.get_mut(&NodeId::new("a")).unwrap(), Food::new("burgers")));
    seed.extend(force_nominate(slots.get_mut(&NodeId::new("b")).unwrap(), Food::new("pasta")));
    seed.extend(force_nominate(slots.get_mut(&NodeId::new("c")).unwrap(), Food::new("salads")));

    flood(&mut slots, seed, 500);

    assert!(all_externalized(&slots), "federation should agree within the step budget");
    let values: Vec<Food> = slots.values().map(externalized_value).collect();
    assert!(values.iter().all(|v| *v == values[0]), "every node must externalize the same value");
    // "salads" > "pasta" > "burgers" lexicographically.
    assert_eq!(values[0], Food::new("salads"));
}

#[test]
fn odd_slot_symmetric_federation_converges_on_the_least_value() {
    let slot_id = SlotId::new(3); // odd: combine picks the least
    let mut slots = three_node_federation(slot_id);

    let mut seed = Vec::new();
    seed.extend(force_nominate(slots.get_mut(&NodeId::new("a")).unwrap(), Food::new("burgers")));
    seed.extend(force_nominate(slots.get_mut(&NodeId::new("b")).unwrap(), Food::new("pasta")));
    seed.extend(force_nominate(slots.get_mut(&NodeId::new("c")).unwrap(), Food::new("salads")));

    flood(&mut slots, seed, 500);

    assert!(all_externalized(&slots));
    let values: Vec<Food> = slots.values().map(externalized_value).collect();
    assert!(values.iter().all(|v| *v == values[0]));
    assert_eq!(values[0], Food::new("burgers"));
}

#[test]
fn single_sender_among_three_cannot_force_a_value() {
    // Only "a" ever votes for "sushi"; "b" and "c" never nominate, so
    // their round-leader sets stay empty and the echo rule never
    // copies "a"'s vote into either. With a single {a,b,c} slice
    // quorum, "a" alone can neither reach a voted-or-accepted quorum
    // nor a v-blocking set, so the federation must make no progress.
    let slot_id = SlotId::new(1);
    let mut slots = three_node_federation(slot_id);

    let seed = force_nominate(slots.get_mut(&NodeId::new("a")).unwrap(), Food::new("sushi"))
        .into_iter()
        .collect();

    flood(&mut slots, seed, 100);

    assert!(!all_externalized(&slots));
    for slot in slots.values() {
        assert!(!slot.is_externalized());
    }
}

#[test]
fn delayed_peer_four_node_federation_still_converges() {
    // Two overlapping 3-of-4 slices, {a,b,c} and {b,c,d}: {a,b,c} is
    // itself a satisfying quorum, so those three can converge while
    // "d"'s envelopes lag behind everyone else's. "d" must still land
    // on the same externalized value once its messages catch up.
    let slot_id = SlotId::new(4);
    let q = qset_slices(&[&["a", "b", "c"], &["b", "c", "d"]]);
    let mut slots: BTreeMap<NodeId, Slot<Food>> = ["a", "b", "c", "d"]
        .into_iter()
        .map(|name| {
            let id = NodeId::new(name);
            (id.clone(), Slot::<Food>::new(slot_id, id, q.clone()))
        })
        .collect();

    let mut seed = Vec::new();
    seed.extend(force_nominate(slots.get_mut(&NodeId::new("a")).unwrap(), Food::new("indian")));
    seed.extend(force_nominate(slots.get_mut(&NodeId::new("b")).unwrap(), Food::new("indian")));
    seed.extend(force_nominate(slots.get_mut(&NodeId::new("c")).unwrap(), Food::new("indian")));
    seed.extend(force_nominate(slots.get_mut(&NodeId::new("d")).unwrap(), Food::new("soup")));

    flood_with_delay(&mut slots, seed, &NodeId::new("d"), 20, 2000);

    for name in ["a", "b", "c", "d"] {
        assert!(
            slots[&NodeId::new(name)].is_externalized(),
            "{name} should reach externalize"
        );
    }
    let agreed = externalized_value(&slots[&NodeId::new("a")]);
    assert_eq!(agreed, Food::new("indian"));
    for name in ["b", "c", "d"] {
        assert_eq!(externalized_value(&slots[&NodeId::new(name)]), agreed);
    }
}
