use std::sync::Arc;
use tempfile::{TempDir, tempdir};
use tenderhub::core::config::EngineConfig;
use tenderhub::core::engine::Engine;
use tenderhub::core::error::{ErrorKind, TenderError};
use tenderhub::core::model::{AuthorType, Coordination, OrganizationType, ServiceType, Status, Verdict};
use tenderhub::core::store::Store;
use tenderhub::core::validate::Page;
use tenderhub::plugins::bid::Bid;
use tenderhub::plugins::directory::{self, Directory, Responsibility};
use tenderhub::plugins::tender::Tender;

const DECIDERS: [&str; 5] = ["p1", "p2", "p3", "p4", "p5"];

struct Fixture {
    _tmp: TempDir,
    engine: Engine,
    vendor_id: String,
    tender: Tender,
}

fn setup_with(config: EngineConfig) -> Fixture {
    let tmp = tempdir().unwrap();
    let store = Store::open(tmp.path()).unwrap();
    let buyer = directory::add_organization(&store, "Buyer", "", OrganizationType::LLC).unwrap();
    let seller = directory::add_organization(&store, "Seller", "", OrganizationType::LLC).unwrap();
    for username in DECIDERS {
        directory::add_employee(&store, username, "", "").unwrap();
        directory::assign_responsible(&store, &buyer.id, username).unwrap();
    }
    let vendor = directory::add_employee(&store, "vendor", "", "").unwrap();
    directory::add_employee(&store, "seller_rep", "", "").unwrap();
    directory::assign_responsible(&store, &seller.id, "seller_rep").unwrap();

    let authority = Box::new(Directory::new(store.clone()));
    let engine = Engine::new(store, authority, config);
    let tender = engine
        .create_tender("Fleet", "trucks", ServiceType::Delivery, &buyer.id, "p1")
        .unwrap();
    let tender = engine
        .set_tender_status(&tender.id, Status::Published, "p1")
        .unwrap();
    Fixture {
        _tmp: tmp,
        engine,
        vendor_id: vendor.id,
        tender,
    }
}

fn setup() -> Fixture {
    setup_with(EngineConfig::default())
}

fn published_bid(f: &Fixture, name: &str) -> Bid {
    let bid = f
        .engine
        .create_bid(name, "offer", &f.tender.id, AuthorType::User, &f.vendor_id)
        .unwrap();
    f.engine
        .set_bid_status(&bid.id, Status::Published, "vendor")
        .unwrap()
}

fn reload(f: &Fixture, bid: &Bid) -> Bid {
    f.engine
        .list_bids_for_tender(&f.tender.id, "p1", Page::new(100, 0).unwrap())
        .unwrap()
        .into_iter()
        .find(|b| b.id == bid.id)
        .unwrap()
}

fn assert_closed_iff_terminal(f: &Fixture) {
    for bid in f
        .engine
        .list_bids_for_tender(&f.tender.id, "p1", Page::new(100, 0).unwrap())
        .unwrap()
    {
        assert_eq!(
            bid.status == Status::Closed,
            bid.coordination != Coordination::Expectation,
            "bid {} is {} / {}",
            bid.name,
            bid.status,
            bid.coordination
        );
    }
}

#[test]
fn test_quorum_approves_and_cascades_to_siblings() {
    let f = setup();
    let bid = published_bid(&f, "Winner");
    let sibling = published_bid(&f, "Sibling");
    let draft_sibling = f
        .engine
        .create_bid("Draft", "offer", &f.tender.id, AuthorType::User, &f.vendor_id)
        .unwrap();

    let after_p1 = f.engine.submit_decision(&bid.id, "p1", Verdict::Approved).unwrap();
    let after_p2 = f.engine.submit_decision(&bid.id, "p2", Verdict::Approved).unwrap();
    assert_eq!(after_p1.coordination, Coordination::Expectation);
    assert_eq!(after_p2.coordination, Coordination::Expectation);
    assert_eq!(after_p2.status, Status::Published);
    assert_eq!(after_p2.decisions.len(), 2);

    let after_p3 = f.engine.submit_decision(&bid.id, "p3", Verdict::Approved).unwrap();
    assert_eq!(after_p3.coordination, Coordination::Approved);
    assert_eq!(after_p3.status, Status::Closed);
    let deciders: Vec<Verdict> = after_p3.decisions.iter().map(|d| d.decision).collect();
    assert_eq!(deciders, vec![Verdict::Approved; 3]);

    for other in [&sibling, &draft_sibling] {
        let other = reload(&f, other);
        assert_eq!(other.coordination, Coordination::RejectedByConflict);
        assert_eq!(other.status, Status::Closed);
    }
    assert_closed_iff_terminal(&f);
}

#[test]
fn test_single_reject_wins_immediately() {
    let f = setup();
    let bid = published_bid(&f, "Offer");
    let sibling = published_bid(&f, "Sibling");
    f.engine.submit_decision(&bid.id, "p1", Verdict::Approved).unwrap();
    f.engine.submit_decision(&bid.id, "p2", Verdict::Approved).unwrap();

    let rejected = f.engine.submit_decision(&bid.id, "p3", Verdict::Rejected).unwrap();
    assert_eq!(rejected.coordination, Coordination::Rejected);
    assert_eq!(rejected.status, Status::Closed);

    // No cascade on rejection.
    assert_eq!(reload(&f, &sibling).coordination, Coordination::Expectation);

    let err = f
        .engine
        .submit_decision(&bid.id, "p4", Verdict::Approved)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PreconditionFailed);
    assert_eq!(reload(&f, &bid).coordination, Coordination::Rejected);
    assert_closed_iff_terminal(&f);
}

#[test]
fn test_duplicate_decision_is_conflict_before_and_after_close() {
    let f = setup();
    let bid = published_bid(&f, "Offer");
    f.engine.submit_decision(&bid.id, "p1", Verdict::Approved).unwrap();
    let err = f
        .engine
        .submit_decision(&bid.id, "p1", Verdict::Approved)
        .unwrap_err();
    assert!(matches!(err, TenderError::Conflict(_)));

    f.engine.submit_decision(&bid.id, "p2", Verdict::Approved).unwrap();
    f.engine.submit_decision(&bid.id, "p3", Verdict::Approved).unwrap();
    for verdict in [Verdict::Approved, Verdict::Rejected] {
        let err = f.engine.submit_decision(&bid.id, "p2", verdict).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }
    assert_eq!(reload(&f, &bid).decisions.len(), 3);
}

#[test]
fn test_revoked_decider_is_forbidden_not_conflict() {
    let f = setup();
    let bid = published_bid(&f, "Offer");
    f.engine.submit_decision(&bid.id, "p2", Verdict::Approved).unwrap();
    f.engine
        .store()
        .with_write("test.revoke", |conn| {
            conn.execute(
                "DELETE FROM organization_responsible
                 WHERE user_id = (SELECT id FROM employee WHERE username = ?1)",
                rusqlite::params!["p2"],
            )?;
            Ok(())
        })
        .unwrap();

    for verdict in [Verdict::Approved, Verdict::Rejected] {
        let err = f.engine.submit_decision(&bid.id, "p2", verdict).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
    }
    assert_eq!(reload(&f, &bid).decisions.len(), 1);
}

#[test]
fn test_cascade_failure_is_resumable() {
    let f = setup();
    let winner = published_bid(&f, "Winner");
    let first = published_bid(&f, "S1");
    let blocked = published_bid(&f, "S2");
    let last = published_bid(&f, "S3");
    f.engine
        .store()
        .with_write("test.block_sibling", |conn| {
            conn.execute(
                &format!(
                    "CREATE TRIGGER block_sibling BEFORE UPDATE OF coordination ON bid
                     WHEN OLD.id = '{}'
                     BEGIN SELECT RAISE(ABORT, 'blocked'); END",
                    blocked.id
                ),
                [],
            )?;
            Ok(())
        })
        .unwrap();

    f.engine.submit_decision(&winner.id, "p1", Verdict::Approved).unwrap();
    f.engine.submit_decision(&winner.id, "p2", Verdict::Approved).unwrap();
    let err = f
        .engine
        .submit_decision(&winner.id, "p3", Verdict::Approved)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Storage);
    let reason = err.reason();
    assert!(reason.contains(&blocked.id), "{}", reason);
    assert!(reason.contains(&last.id), "{}", reason);
    assert!(!reason.contains(&first.id), "{}", reason);

    assert_eq!(reload(&f, &winner).coordination, Coordination::Approved);
    assert_eq!(reload(&f, &first).coordination, Coordination::RejectedByConflict);
    for open in [&blocked, &last] {
        let open = reload(&f, open);
        assert_eq!(open.coordination, Coordination::Expectation);
        assert_eq!(open.status, Status::Published);
    }
    assert_closed_iff_terminal(&f);

    f.engine
        .store()
        .with_write("test.unblock_sibling", |conn| {
            conn.execute("DROP TRIGGER block_sibling", [])?;
            Ok(())
        })
        .unwrap();
    let closed = f.engine.close_competitors(&winner.id, "p1").unwrap();
    assert_eq!(closed, vec![blocked.id.clone(), last.id.clone()]);
    assert_eq!(reload(&f, &first).coordination, Coordination::RejectedByConflict);
    assert!(f.engine.close_competitors(&winner.id, "p1").unwrap().is_empty());
    assert_closed_iff_terminal(&f);
}

#[test]
fn test_cascade_leaves_closed_siblings_untouched() {
    let f = setup();
    let rejected_earlier = published_bid(&f, "Rejected earlier");
    f.engine
        .submit_decision(&rejected_earlier.id, "p5", Verdict::Rejected)
        .unwrap();
    let bid = published_bid(&f, "Winner");
    for p in ["p1", "p2", "p3"] {
        f.engine.submit_decision(&bid.id, p, Verdict::Approved).unwrap();
    }
    assert_eq!(
        reload(&f, &rejected_earlier).coordination,
        Coordination::Rejected
    );

    // Re-running the cascade closes nothing new.
    assert!(f.engine.close_competitors(&bid.id, "p1").unwrap().is_empty());
    assert_closed_iff_terminal(&f);
}

#[test]
fn test_decisions_require_published_bid_and_tender() {
    let f = setup();
    let draft = f
        .engine
        .create_bid("Draft", "offer", &f.tender.id, AuthorType::User, &f.vendor_id)
        .unwrap();
    let err = f
        .engine
        .submit_decision(&draft.id, "p1", Verdict::Approved)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PreconditionFailed);

    let bid = published_bid(&f, "Offer");
    f.engine
        .set_tender_status(&f.tender.id, Status::Closed, "p1")
        .unwrap();
    let err = f
        .engine
        .submit_decision(&bid.id, "p1", Verdict::Approved)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PreconditionFailed);
}

#[test]
fn test_decider_must_answer_for_the_tender_organization() {
    let f = setup();
    let bid = published_bid(&f, "Offer");
    for username in ["seller_rep", "vendor"] {
        let err = f
            .engine
            .submit_decision(&bid.id, username, Verdict::Approved)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden, "{}", username);
    }
    assert_eq!(
        f.engine
            .submit_decision(&bid.id, "ghost", Verdict::Approved)
            .unwrap_err()
            .kind(),
        ErrorKind::Forbidden
    );
    assert_eq!(
        f.engine
            .submit_decision("BD_missing", "p1", Verdict::Approved)
            .unwrap_err()
            .kind(),
        ErrorKind::NotFound
    );
    assert!(reload(&f, &bid).decisions.is_empty());
}

#[test]
fn test_close_competitors_requires_approved_bid() {
    let f = setup();
    let bid = published_bid(&f, "Offer");
    let err = f.engine.close_competitors(&bid.id, "p1").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PreconditionFailed);
    let err = f.engine.close_competitors(&bid.id, "vendor").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);
}

#[test]
fn test_configured_quorum_is_honored() {
    let f = setup_with(EngineConfig {
        quorum: 2,
        ..EngineConfig::default()
    });
    let bid = published_bid(&f, "Offer");
    f.engine.submit_decision(&bid.id, "p1", Verdict::Approved).unwrap();
    let closed = f.engine.submit_decision(&bid.id, "p2", Verdict::Approved).unwrap();
    assert_eq!(closed.coordination, Coordination::Approved);
}

#[test]
fn test_concurrent_approvals_close_the_bid_once() {
    let f = setup();
    let bid = published_bid(&f, "Raced");
    let siblings: Vec<Bid> = (0..3).map(|i| published_bid(&f, &format!("S{}", i))).collect();

    let results: Vec<Result<Bid, TenderError>> = std::thread::scope(|s| {
        let handles: Vec<_> = DECIDERS
            .iter()
            .copied()
            .map(|p| {
                let engine = &f.engine;
                let id = bid.id.clone();
                s.spawn(move || engine.submit_decision(&id, p, Verdict::Approved))
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let accepted = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(accepted, 3);
    for err in results.iter().filter_map(|r| r.as_ref().err()) {
        assert_eq!(err.kind(), ErrorKind::PreconditionFailed);
    }
    let bid = reload(&f, &bid);
    assert_eq!(bid.coordination, Coordination::Approved);
    assert_eq!(bid.decisions.len(), 3);
    for sibling in &siblings {
        assert_eq!(reload(&f, sibling).coordination, Coordination::RejectedByConflict);
    }
    assert_closed_iff_terminal(&f);
}

/// Grants everything; decisions still need a known principal.
struct AllowAll;

impl Responsibility for AllowAll {
    fn is_responsible(&self, _username: &str, _organization_id: &str) -> Result<bool, TenderError> {
        Ok(true)
    }
}

#[test]
fn test_engine_uses_injected_authority() {
    let f = setup();
    let bid = published_bid(&f, "Offer");
    let store = f.engine.store().clone();
    let permissive = Engine::new(
        store,
        Box::new(AllowAll),
        EngineConfig {
            quorum: 1,
            ..EngineConfig::default()
        },
    );
    let approved = permissive
        .submit_decision(&bid.id, "seller_rep", Verdict::Approved)
        .unwrap();
    assert_eq!(approved.coordination, Coordination::Approved);
}

#[test]
fn test_engine_is_shareable_across_threads() {
    let f = setup();
    let engine = Arc::new(f.engine);
    let bids: Vec<String> = (0..4)
        .map(|i| {
            let bid = engine
                .create_bid(&format!("B{}", i), "offer", &f.tender.id, AuthorType::User, &f.vendor_id)
                .unwrap();
            engine
                .set_bid_status(&bid.id, Status::Published, "vendor")
                .unwrap()
                .id
        })
        .collect();

    let handles: Vec<_> = bids
        .iter()
        .cloned()
        .map(|id| {
            let engine = Arc::clone(&engine);
            std::thread::spawn(move || engine.submit_decision(&id, "p1", Verdict::Approved))
        })
        .collect();
    for handle in handles {
        let bid = handle.join().unwrap().unwrap();
        assert_eq!(bid.decisions.len(), 1);
    }
}
