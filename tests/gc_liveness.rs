//! GC Liveness Property
//!
//! Collecting at a mark never changes what a revision at or after the
//! mark observes, however writes, overlapping transactions and GC passes
//! interleave. No revision ever sees two live rows for one key.

mod common;

use std::collections::BTreeSet;

use proptest::prelude::*;

use permstore::datastore::DatastoreError;
use permstore::gc::{CancelSignal, GarbageCollector};
use permstore::model::{Relationship, RelationshipUpdate};
use permstore::revision::{Revision, RevisionOrdering};

use common::*;

#[derive(Debug, Clone)]
enum Op {
    Touch(u8),
    Delete(u8),
    Noop,
    /// `outer` begins, `inner` begins and commits, then `outer` commits.
    Overlap { outer: u8, inner: u8 },
    /// Collect at one of the revisions recorded so far.
    Gc(prop::sample::Index),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (0u8..4).prop_map(Op::Touch),
        2 => (0u8..4).prop_map(Op::Delete),
        1 => Just(Op::Noop),
        2 => (0u8..4, 0u8..4).prop_map(|(outer, inner)| Op::Overlap { outer, inner }),
        2 => any::<prop::sample::Index>().prop_map(Op::Gc),
    ]
}

fn tpl(i: u8) -> Relationship {
    rel(&format!("resource:r{i}#reader@user:u"))
}

/// A revision and the rows it saw when it was recorded.
struct Observed {
    revision: Revision,
    rows: Vec<Relationship>,
}

impl Observed {
    fn record(fx: &Fixture, revision: Revision) -> Self {
        let rows = relationships_at(&fx.ds, &revision, "resource");
        Self { revision, rows }
    }
}

fn at_or_after(revision: &Revision, mark: &Revision) -> bool {
    matches!(
        revision.compare(mark),
        RevisionOrdering::Equal | RevisionOrdering::Greater
    )
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 128,
        .. ProptestConfig::default()
    })]

    #[test]
    fn prop_gc_preserves_liveness_at_or_after_mark(
        ops in prop::collection::vec(op(), 1..40),
        batch in 1usize..8,
    ) {
        let fx = Fixture::with_config(
            permstore::DatastoreConfig::default().with_gc_batch_size(batch),
        );
        // every revision handed out, and the ones no GC may have disturbed
        let mut handed_out = vec![fx.ds.head_revision().unwrap()];
        let mut tracked = vec![Observed::record(&fx, handed_out[0].clone())];
        let mut live: BTreeSet<u8> = BTreeSet::new();

        for op in &ops {
            let mut committed = Vec::new();
            match op {
                Op::Touch(i) => {
                    committed.push(write(&fx.ds, RelationshipUpdate::touch, &[tpl(*i)]));
                    live.insert(*i);
                }
                Op::Delete(i) => {
                    committed.push(write(&fx.ds, RelationshipUpdate::delete, &[tpl(*i)]));
                    live.remove(i);
                }
                Op::Noop => committed.push(noop(&fx.ds)),
                Op::Overlap { outer, inner } => {
                    let mut inner_rev = None;
                    let outer_result = fx.ds.read_write_tx(|tx| {
                        inner_rev = Some(write(&fx.ds, RelationshipUpdate::touch, &[tpl(*inner)]));
                        tx.write_relationships([RelationshipUpdate::touch(tpl(*outer))])
                    });
                    committed.push(inner_rev.unwrap());
                    live.insert(*inner);

                    match outer_result {
                        Ok(revision) => {
                            prop_assert_ne!(outer, inner);
                            committed.push(revision);
                            live.insert(*outer);
                        }
                        Err(err) => {
                            prop_assert_eq!(outer, inner);
                            prop_assert!(matches!(err, DatastoreError::Conflict(_)));
                        }
                    }
                }
                Op::Gc(pick) => {
                    let mark = handed_out[pick.index(handed_out.len())].clone();
                    fx.ds.delete_before_tx(&mark, &CancelSignal::none()).unwrap();
                    tracked.retain(|seen| at_or_after(&seen.revision, &mark));
                }
            }

            for revision in committed {
                handed_out.push(revision.clone());
                tracked.push(Observed::record(&fx, revision));
            }

            for seen in &tracked {
                let rows = relationships_at(&fx.ds, &seen.revision, "resource");
                prop_assert!(rows.windows(2).all(|w| w[0].key != w[1].key));
                prop_assert_eq!(&rows, &seen.rows, "changed at {}", seen.revision);
            }

            let head = fx.ds.head_revision().unwrap();
            let expected: Vec<Relationship> = live.iter().map(|i| tpl(*i)).collect();
            prop_assert_eq!(relationships_at(&fx.ds, &head, "resource"), expected);
        }
    }
}
