use tempfile::{TempDir, tempdir};
use tenderhub::core::engine::Engine;
use tenderhub::core::error::ErrorKind;
use tenderhub::core::model::{AuthorType, Coordination, OrganizationType, ServiceType, Status};
use tenderhub::core::validate::Page;
use tenderhub::plugins::bid::{Bid, BidPatch};
use tenderhub::plugins::directory;
use tenderhub::plugins::tender::Tender;

struct Fixture {
    _tmp: TempDir,
    engine: Engine,
    vendor_id: String,
    supplier_org: String,
    tender: Tender,
}

/// "owner" runs the buying organization; "vendor" bids personally;
/// "sales" answers for the supplier organization.
fn setup() -> Fixture {
    let tmp = tempdir().unwrap();
    let engine = Engine::open(tmp.path()).unwrap();
    let store = engine.store();
    let buyer = directory::add_organization(store, "Buyer", "", OrganizationType::JSC).unwrap();
    let supplier = directory::add_organization(store, "Supplier", "", OrganizationType::IE).unwrap();
    directory::add_employee(store, "owner", "Olga", "Owner").unwrap();
    let vendor = directory::add_employee(store, "vendor", "Vic", "Vendor").unwrap();
    directory::add_employee(store, "sales", "", "").unwrap();
    directory::add_employee(store, "stranger", "", "").unwrap();
    directory::assign_responsible(store, &buyer.id, "owner").unwrap();
    directory::assign_responsible(store, &supplier.id, "sales").unwrap();

    let tender = engine
        .create_tender("Bridge", "steel bridge", ServiceType::Construction, &buyer.id, "owner")
        .unwrap();
    let tender = engine
        .set_tender_status(&tender.id, Status::Published, "owner")
        .unwrap();
    Fixture {
        _tmp: tmp,
        engine,
        vendor_id: vendor.id,
        supplier_org: supplier.id,
        tender,
    }
}

fn user_bid(f: &Fixture, name: &str) -> Bid {
    f.engine
        .create_bid(name, "offer", &f.tender.id, AuthorType::User, &f.vendor_id)
        .unwrap()
}

#[test]
fn test_create_bid_on_published_tender() {
    let f = setup();
    let bid = user_bid(&f, "Offer A");
    assert!(bid.id.starts_with("BD_"));
    assert_eq!(bid.status, Status::Created);
    assert_eq!(bid.coordination, Coordination::Expectation);
    assert_eq!(bid.version, 1);
    assert!(bid.decisions.is_empty());
    assert!(bid.feedback.is_empty());
}

#[test]
fn test_create_bid_requires_published_tender() {
    let f = setup();
    f.engine
        .set_tender_status(&f.tender.id, Status::Closed, "owner")
        .unwrap();
    let err = f
        .engine
        .create_bid("Late", "offer", &f.tender.id, AuthorType::User, &f.vendor_id)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PreconditionFailed);
}

#[test]
fn test_create_bid_missing_references_are_not_found() {
    let f = setup();
    let err = f
        .engine
        .create_bid("X", "offer", "TN_missing", AuthorType::User, &f.vendor_id)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let err = f
        .engine
        .create_bid("X", "offer", &f.tender.id, AuthorType::User, "EM_missing")
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    // An employee id is not an organization.
    let err = f
        .engine
        .create_bid("X", "offer", &f.tender.id, AuthorType::Organization, &f.vendor_id)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn test_user_bid_is_edited_only_by_its_author() {
    let f = setup();
    let bid = user_bid(&f, "Offer");
    let patch = BidPatch {
        description: Some("cheaper".into()),
        ..Default::default()
    };
    let edited = f.engine.edit_bid(&bid.id, &patch, "vendor").unwrap();
    assert_eq!(edited.version, 2);
    assert_eq!(edited.name, "Offer");
    assert_eq!(edited.description, "cheaper");

    for actor in ["owner", "sales", "stranger"] {
        let err = f.engine.edit_bid(&bid.id, &patch, actor).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden, "actor {}", actor);
    }
    let err = f.engine.edit_bid(&bid.id, &patch, "nobody").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);
}

#[test]
fn test_organization_bid_is_edited_by_responsible_users() {
    let f = setup();
    let bid = f
        .engine
        .create_bid("Org offer", "offer", &f.tender.id, AuthorType::Organization, &f.supplier_org)
        .unwrap();
    let patch = BidPatch {
        name: Some("Org offer v2".into()),
        ..Default::default()
    };
    assert_eq!(f.engine.edit_bid(&bid.id, &patch, "sales").unwrap().version, 2);
    assert_eq!(
        f.engine.edit_bid(&bid.id, &patch, "vendor").unwrap_err().kind(),
        ErrorKind::Forbidden
    );
}

#[test]
fn test_bid_edit_and_rollback_keep_history() {
    let f = setup();
    let bid = user_bid(&f, "One");
    for name in ["Two", "Three"] {
        let patch = BidPatch {
            name: Some(name.into()),
            ..Default::default()
        };
        f.engine.edit_bid(&bid.id, &patch, "vendor").unwrap();
    }
    let rolled = f.engine.rollback_bid(&bid.id, 1, "vendor").unwrap();
    assert_eq!(rolled.version, 4);
    assert_eq!(rolled.name, "One");

    let history = f.engine.bid_history(&bid.id, "vendor").unwrap();
    let names: Vec<&str> = history.iter().map(|h| h.content.name.as_str()).collect();
    assert_eq!(names, vec!["One", "Two", "Three"]);
    assert_eq!(history.iter().map(|h| h.version).collect::<Vec<_>>(), vec![1, 2, 3]);

    assert_eq!(
        f.engine.edit_bid(&bid.id, &BidPatch::default(), "vendor").unwrap_err().kind(),
        ErrorKind::Validation
    );
    assert_eq!(
        f.engine.rollback_bid(&bid.id, 4, "vendor").unwrap_err().kind(),
        ErrorKind::Validation
    );
    assert_eq!(
        f.engine.rollback_bid("BD_missing", 1, "vendor").unwrap_err().kind(),
        ErrorKind::NotFound
    );
}

#[test]
fn test_bid_status_write_cannot_close() {
    let f = setup();
    let bid = user_bid(&f, "Offer");
    let published = f
        .engine
        .set_bid_status(&bid.id, Status::Published, "vendor")
        .unwrap();
    assert_eq!(published.status, Status::Published);
    assert_eq!(published.coordination, Coordination::Expectation);

    let err = f
        .engine
        .set_bid_status(&bid.id, Status::Closed, "vendor")
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PreconditionFailed);

    let err = f
        .engine
        .set_bid_status(&bid.id, Status::Created, "owner")
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);

    let withdrawn = f
        .engine
        .set_bid_status(&bid.id, Status::Created, "vendor")
        .unwrap();
    assert_eq!(withdrawn.status, Status::Created);
}

#[test]
fn test_bid_status_visibility() {
    let f = setup();
    let bid = user_bid(&f, "Offer");
    assert_eq!(f.engine.bid_status(&bid.id, "vendor").unwrap(), Status::Created);
    assert_eq!(f.engine.bid_status(&bid.id, "owner").unwrap(), Status::Created);
    assert_eq!(
        f.engine.bid_status(&bid.id, "stranger").unwrap_err().kind(),
        ErrorKind::Forbidden
    );
    assert_eq!(
        f.engine.bid_status("BD_missing", "vendor").unwrap_err().kind(),
        ErrorKind::NotFound
    );
}

#[test]
fn test_list_bids_for_tender_requires_tender_responsibility() {
    let f = setup();
    user_bid(&f, "Zulu");
    user_bid(&f, "Alpha");
    f.engine
        .create_bid("Mike", "offer", &f.tender.id, AuthorType::Organization, &f.supplier_org)
        .unwrap();

    let bids = f
        .engine
        .list_bids_for_tender(&f.tender.id, "owner", Page::new(10, 0).unwrap())
        .unwrap();
    let names: Vec<&str> = bids.iter().map(|b| b.name.as_str()).collect();
    assert_eq!(names, vec!["Alpha", "Mike", "Zulu"]);

    let second = f
        .engine
        .list_bids_for_tender(&f.tender.id, "owner", Page::new(1, 1).unwrap())
        .unwrap();
    assert_eq!(second[0].name, "Mike");

    let err = f
        .engine
        .list_bids_for_tender(&f.tender.id, "vendor", Page::new(10, 0).unwrap())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);
    let err = f
        .engine
        .list_bids_for_tender("TN_missing", "owner", Page::new(10, 0).unwrap())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn test_list_my_bids_returns_personal_bids() {
    let f = setup();
    user_bid(&f, "B");
    user_bid(&f, "A");
    f.engine
        .create_bid("Org", "offer", &f.tender.id, AuthorType::Organization, &f.supplier_org)
        .unwrap();

    let mine = f.engine.list_my_bids("vendor", Page::new(5, 0).unwrap()).unwrap();
    let names: Vec<&str> = mine.iter().map(|b| b.name.as_str()).collect();
    assert_eq!(names, vec!["A", "B"]);
    assert!(f
        .engine
        .list_my_bids("sales", Page::new(5, 0).unwrap())
        .unwrap()
        .is_empty());
    assert_eq!(
        f.engine
            .list_my_bids("ghost", Page::new(5, 0).unwrap())
            .unwrap_err()
            .kind(),
        ErrorKind::Forbidden
    );
}
