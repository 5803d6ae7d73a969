use std::sync::Arc;
use std::sync::Mutex;

use pretty_assertions::assert_eq;

use lattice_protocol::ExtractionQuery;
use lattice_protocol::QueryOutcome;
use lattice_protocol::QueryReply;

use crate::proxy::DataProxy;
use crate::proxy::ExtractionStore;
use crate::proxy::NullStore;
use crate::proxy::ProxyBinding;
use crate::proxy::StoreError;

/// Counts how many queries actually reach the store.
struct CountingStore {
    hits: Mutex<usize>,
}

impl CountingStore {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            hits: Mutex::new(0),
        })
    }

    fn hits(&self) -> usize {
        *self.hits.lock().unwrap()
    }
}

impl ExtractionStore for CountingStore {
    fn query(&self, _query: &ExtractionQuery) -> Result<QueryReply, StoreError> {
        *self.hits.lock().unwrap() += 1;
        Ok(QueryReply::Count { count: 3 })
    }
}

fn binding_for(user: &str) -> ProxyBinding {
    ProxyBinding {
        module: "safety".to_string(),
        session_id: Some("sess-1".to_string()),
        user_id: Some(user.to_string()),
    }
}

#[test]
fn same_user_query_reaches_the_store() {
    let store = CountingStore::new();
    let proxy = DataProxy::new(Arc::<CountingStore>::clone(&store));

    let outcome = proxy.execute(&binding_for("u1"), &ExtractionQuery::UserExtractions {
        user_id: "u1".to_string(),
        class_id: "c1".to_string(),
    });
    assert!(matches!(outcome, QueryOutcome::Ok { .. }));
    assert_eq!(store.hits(), 1);
}

#[test]
fn cross_user_query_is_denied_before_the_store() {
    let store = CountingStore::new();
    let proxy = DataProxy::new(Arc::<CountingStore>::clone(&store));

    let outcome = proxy.execute(&binding_for("u1"), &ExtractionQuery::UserExtractions {
        user_id: "u2".to_string(),
        class_id: "c1".to_string(),
    });
    match outcome {
        QueryOutcome::Denied { reason } => assert!(reason.contains("u2"), "{reason}"),
        other => panic!("expected denial, got {other:?}"),
    }
    assert_eq!(store.hits(), 0);
}

#[test]
fn unbound_user_cannot_read_user_scoped_data() {
    let store = CountingStore::new();
    let proxy = DataProxy::new(Arc::<CountingStore>::clone(&store));
    let binding = ProxyBinding {
        module: "analytics".to_string(),
        session_id: None,
        user_id: None,
    };

    let outcome = proxy.execute(&binding, &ExtractionQuery::ByType {
        kind: "pii_detected".to_string(),
        session_id: None,
        user_id: Some("u1".to_string()),
        limit: Some(10),
    });
    assert!(matches!(outcome, QueryOutcome::Denied { .. }));
    assert_eq!(store.hits(), 0);
}

#[test]
fn session_scoped_query_needs_no_user_check() {
    let store = CountingStore::new();
    let proxy = DataProxy::new(Arc::<CountingStore>::clone(&store));
    let binding = ProxyBinding {
        module: "analytics".to_string(),
        session_id: Some("sess-9".to_string()),
        user_id: None,
    };

    let outcome = proxy.execute(&binding, &ExtractionQuery::SessionExtractions {
        session_id: "sess-9".to_string(),
    });
    assert!(matches!(outcome, QueryOutcome::Ok { .. }));
}

#[test]
fn store_failure_comes_back_as_failed_outcome() {
    let proxy = DataProxy::new(Arc::new(NullStore));
    let outcome = proxy.execute(&binding_for("u1"), &ExtractionQuery::Count {
        kind: None,
        session_id: Some("sess-1".to_string()),
        user_id: None,
        since: None,
    });
    match outcome {
        QueryOutcome::Failed { message } => {
            assert!(message.contains("no extraction store"), "{message}");
        }
        other => panic!("expected failure, got {other:?}"),
    }
}
