use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use odoo_client::{
    fetch_records, CancelToken, Credentials, FetchOptions, OdooClient, Session, Transport,
};
use odoo_common::{
    Domain, Fault, MethodCall, MethodResponse, OdooError, RemoteRecord, ResPartner,
    TransportError, Value,
};

const SECRET: &str = "pw";

/// Authentication endpoint that accepts everyone as uid 2.
struct FakeCommon;

#[async_trait]
impl Transport for FakeCommon {
    async fn call(&self, _call: &MethodCall) -> Result<MethodResponse, TransportError> {
        Ok(MethodResponse::Success(Value::Int(2)))
    }
}

/// Model endpoint backed by an in-memory partner table.
struct FakeObject {
    partners: Vec<RemoteRecord>,
    /// Batches containing this id answer with a fault.
    failing_id: Option<i64>,
    /// Batches containing this id are answered last.
    slow_id: Option<i64>,
    delay: Duration,
    searches: AtomicUsize,
    reads: AtomicUsize,
    inflight: AtomicUsize,
    max_inflight: AtomicUsize,
}

impl FakeObject {
    fn with_partners(count: i64) -> Self {
        FakeObject {
            partners: (1..=count).map(partner).collect(),
            failing_id: None,
            slow_id: None,
            delay: Duration::from_millis(20),
            searches: AtomicUsize::new(0),
            reads: AtomicUsize::new(0),
            inflight: AtomicUsize::new(0),
            max_inflight: AtomicUsize::new(0),
        }
    }

    fn search(&self) -> Value {
        self.searches.fetch_add(1, Ordering::SeqCst);
        Value::Array(
            self.partners
                .iter()
                .filter_map(|record| record.get("id").cloned())
                .collect(),
        )
    }

    async fn search_read(&self, domain: &Value) -> MethodResponse {
        let ids = ids_in(domain);
        self.reads.fetch_add(1, Ordering::SeqCst);
        let now = self.inflight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_inflight.fetch_max(now, Ordering::SeqCst);

        let mut delay = self.delay;
        if self.slow_id.is_some_and(|slow| ids.contains(&slow)) {
            delay += Duration::from_millis(200);
        }
        tokio::time::sleep(delay).await;
        self.inflight.fetch_sub(1, Ordering::SeqCst);

        if self.failing_id.is_some_and(|failing| ids.contains(&failing)) {
            return MethodResponse::Fault(Fault::new(2, "batch exploded"));
        }
        let rows = self
            .partners
            .iter()
            .filter(|record| {
                record
                    .get("id")
                    .and_then(Value::as_i64)
                    .is_some_and(|id| ids.contains(&id))
            })
            .cloned()
            .map(Value::Struct)
            .collect();
        MethodResponse::Success(Value::Array(rows))
    }
}

#[async_trait]
impl Transport for FakeObject {
    async fn call(&self, call: &MethodCall) -> Result<MethodResponse, TransportError> {
        if call.params.get(2).and_then(Value::as_str) != Some(SECRET) {
            return Ok(MethodResponse::Fault(Fault::new(3, "Access Denied")));
        }
        let method = call.params.get(4).and_then(Value::as_str).unwrap_or_default();
        let domain = call
            .params
            .get(5)
            .and_then(Value::as_array)
            .and_then(|args| args.first())
            .cloned()
            .unwrap_or_default();
        match method {
            "search" => Ok(MethodResponse::Success(self.search())),
            "search_read" => Ok(self.search_read(&domain).await),
            other => Ok(MethodResponse::Fault(Fault::new(
                1,
                format!("unknown method {}", other),
            ))),
        }
    }
}

fn partner(id: i64) -> RemoteRecord {
    let mut record = RemoteRecord::new();
    record.insert("id".to_string(), Value::Int(id));
    record.insert("name".to_string(), Value::from(format!("Partner {}", id)));
    let email = if id % 2 == 0 {
        Value::from(format!("p{}@example.test", id))
    } else {
        Value::Bool(false)
    };
    record.insert("email".to_string(), email);
    record.insert("is_company".to_string(), Value::Bool(id % 10 == 0));
    record
}

/// Extracts the id list from `[["id", "in", [..]]]`.
fn ids_in(domain: &Value) -> Vec<i64> {
    domain
        .as_array()
        .and_then(|clauses| clauses.first())
        .and_then(Value::as_array)
        .and_then(|clause| clause.get(2))
        .and_then(Value::as_array)
        .map(|ids| ids.iter().filter_map(Value::as_i64).collect())
        .unwrap_or_default()
}

async fn client_with(object: Arc<FakeObject>, secret: &str) -> Arc<OdooClient> {
    let credentials = Credentials::new("db", "admin", secret, "http://erp.test");
    let session = Session::new(credentials, Arc::new(FakeCommon), object);
    Arc::new(OdooClient::login(session).await.expect("login"))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn fetch_delivers_every_record_across_batches() {
    let mut object = FakeObject::with_partners(250);
    object.slow_id = Some(1);
    let object = Arc::new(object);
    let client = client_with(Arc::clone(&object), SECRET).await;

    let options = FetchOptions::default().with_batch_size(100);
    let stream = fetch_records::<ResPartner>(client, &Domain::all(), &options, CancelToken::new())
        .await
        .expect("fetch");
    let (partners, summary) = stream.collect().await;

    assert_eq!(partners.len(), 250);
    let mut ids: Vec<i64> = partners.iter().map(|partner| partner.id).collect();
    // The slow first batch lands after the other two.
    assert!(ids.last().is_some_and(|id| *id <= 100));
    ids.sort_unstable();
    assert_eq!(ids, (1..=250).collect::<Vec<_>>());

    assert_eq!(summary.ids_total, 250);
    assert_eq!(summary.batches_total, 3);
    assert_eq!(summary.batches_failed, 0);
    assert_eq!(summary.records_sent, 250);
    assert!(!summary.cancelled);

    assert_eq!(object.reads.load(Ordering::SeqCst), 3);
    assert!(object.max_inflight.load(Ordering::SeqCst) > 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn fetch_contains_a_failing_batch() {
    let mut object = FakeObject::with_partners(300);
    object.failing_id = Some(150);
    let client = client_with(Arc::new(object), SECRET).await;

    let options = FetchOptions::default();
    let stream = fetch_records::<ResPartner>(client, &Domain::all(), &options, CancelToken::new())
        .await
        .expect("fetch");
    let (partners, summary) = stream.collect().await;

    assert_eq!(partners.len(), 200);
    assert!(partners.iter().all(|partner| !(101..=200).contains(&partner.id)));
    assert_eq!(summary.batches_total, 3);
    assert_eq!(summary.batches_failed, 1);
    assert_eq!(summary.records_sent, 200);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn fetch_respects_max_ids() {
    let object = Arc::new(FakeObject::with_partners(250));
    let client = client_with(object, SECRET).await;

    let options = FetchOptions::default().with_batch_size(50).with_max_ids(120);
    let stream = fetch_records::<ResPartner>(client, &Domain::all(), &options, CancelToken::new())
        .await
        .expect("fetch");
    let (partners, summary) = stream.collect().await;

    assert_eq!(summary.ids_total, 120);
    assert_eq!(summary.batches_total, 3);
    assert_eq!(partners.len(), 120);
    assert!(partners.iter().all(|partner| partner.id <= 120));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn fetch_with_no_matches_closes_immediately() {
    let object = Arc::new(FakeObject::with_partners(0));
    let client = client_with(Arc::clone(&object), SECRET).await;

    let stream = fetch_records::<ResPartner>(
        client,
        &Domain::all(),
        &FetchOptions::default(),
        CancelToken::new(),
    )
    .await
    .expect("fetch");
    let (partners, summary) = stream.collect().await;

    assert!(partners.is_empty());
    assert_eq!(summary.batches_total, 0);
    assert_eq!(object.reads.load(Ordering::SeqCst), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn fetch_skips_unmappable_records() {
    let mut object = FakeObject::with_partners(10);
    object.partners[3].insert("is_company".to_string(), Value::from("maybe"));
    let client = client_with(Arc::new(object), SECRET).await;

    let stream = fetch_records::<ResPartner>(
        client,
        &Domain::all(),
        &FetchOptions::default(),
        CancelToken::new(),
    )
    .await
    .expect("fetch");
    let (partners, summary) = stream.collect().await;

    assert_eq!(partners.len(), 9);
    assert!(partners.iter().all(|partner| partner.id != 4));
    assert_eq!(summary.mapping_failures, 1);
    assert_eq!(summary.batches_failed, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn fetch_honours_cancellation() {
    let object = Arc::new(FakeObject::with_partners(250));
    let client = client_with(Arc::clone(&object), SECRET).await;

    let cancel = CancelToken::new();
    cancel.cancel();
    let stream = fetch_records::<ResPartner>(client, &Domain::all(), &FetchOptions::default(), cancel)
        .await
        .expect("fetch");
    let (partners, summary) = stream.collect().await;

    assert!(partners.is_empty());
    assert!(summary.cancelled);
    assert_eq!(summary.batches_skipped, 3);
    assert_eq!(object.reads.load(Ordering::SeqCst), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn fetch_cancelled_mid_stream_stops_pending_sends() {
    let mut object = FakeObject::with_partners(250);
    object.slow_id = Some(1);
    let client = client_with(Arc::new(object), SECRET).await;

    let cancel = CancelToken::new();
    let mut stream = fetch_records::<ResPartner>(
        client,
        &Domain::all(),
        &FetchOptions::default(),
        cancel.clone(),
    )
    .await
    .expect("fetch");

    // The first record comes from a fast batch; the slow one is still reading.
    let first = stream.next().await.expect("first record");
    assert!(first.id > 100);
    cancel.cancel();

    let (rest, summary) = stream.collect().await;
    let received = rest.len() + 1;
    assert!(received < 250);
    assert!(rest.iter().all(|partner| partner.id > 100));
    assert!(summary.cancelled);
    assert!(summary.batches_skipped >= 1);
    assert!(summary.records_sent <= 150);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn fetch_stops_when_consumer_leaves() {
    let mut object = FakeObject::with_partners(250);
    object.delay = Duration::from_millis(100);
    let client = client_with(Arc::new(object), SECRET).await;

    let stream = fetch_records::<ResPartner>(
        client,
        &Domain::all(),
        &FetchOptions::default(),
        CancelToken::new(),
    )
    .await
    .expect("fetch");
    let summary = stream.finish().await;

    assert_eq!(summary.records_sent, 0);
    assert_eq!(summary.batches_skipped, 3);
    assert!(!summary.cancelled);
}

#[tokio::test]
async fn search_is_idempotent() {
    let object = Arc::new(FakeObject::with_partners(25));
    let client = client_with(Arc::clone(&object), SECRET).await;

    let first = client.search("res.partner", &Domain::all()).await.expect("search");
    let second = client.search("res.partner", &Domain::all()).await.expect("search");
    assert_eq!(first, second);
    assert_eq!(first.len(), 25);
    assert_eq!(object.searches.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn forged_secret_is_access_denied() {
    let object = Arc::new(FakeObject::with_partners(5));
    let client = client_with(object, "forged").await;
    assert!(client.uid().is_some_and(|uid| uid > 0));

    let err = client.search("res.partner", &Domain::all()).await.unwrap_err();
    assert!(err.is_access_denied());

    let err = fetch_records::<ResPartner>(
        client,
        &Domain::all(),
        &FetchOptions::default(),
        CancelToken::new(),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, OdooError::AccessDenied { .. }));
}

#[tokio::test]
async fn fetch_rejects_zero_batch_size() {
    let object = Arc::new(FakeObject::with_partners(5));
    let client = client_with(Arc::clone(&object), SECRET).await;

    let options = FetchOptions::default().with_batch_size(0);
    let err = fetch_records::<ResPartner>(client, &Domain::all(), &options, CancelToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, OdooError::Config(_)));
    assert_eq!(object.searches.load(Ordering::SeqCst), 0);
}
