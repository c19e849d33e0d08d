#![allow(dead_code)]

use std::{
    collections::{HashMap, HashSet, VecDeque},
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use storefront_api::{
    checkout::{
        BagClearer, BagSnapshot, BagSnapshotReader, CaptureError, CaptureRequest, ChargeReceipt,
        CheckoutError, CheckoutJournal, CheckoutLocks, CheckoutOrchestrator, CheckoutSettings, ItemFields, OrderDraft,
        OrderMaterializer, PaymentCaptureClient, PaymentGateway, RetryPolicy, SnapshotLine,
        StoreError,
    },
    dto::orders::OrderWithItems,
    middleware::auth::{Actor, Permission},
    models::{Order, OrderItem},
};
use uuid::Uuid;

pub fn actor(user_id: Uuid) -> Actor {
    Actor {
        user_id,
        permissions: vec![Permission::User],
    }
}

pub fn item(title: &str, price: i64) -> ItemFields {
    ItemFields {
        item_id: Uuid::new_v4(),
        title: title.to_string(),
        description: format!("{title} description"),
        price,
        image: None,
        large_image: None,
    }
}

#[derive(Debug, Clone)]
struct StoredEntry {
    id: Uuid,
    user_id: Uuid,
    item: ItemFields,
    quantity: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JournalEntry {
    Completed(Uuid),
    Reconciliation(String),
}

#[derive(Default)]
struct StoreInner {
    entries: Vec<StoredEntry>,
    orders: Vec<OrderWithItems>,
    settled: HashSet<Uuid>,
    journal: Vec<JournalEntry>,
}

impl StoreInner {
    /// Quantity per bag entry claimed by orders whose bag is not settled yet.
    fn pending(&self) -> HashMap<Uuid, i32> {
        let mut pending = HashMap::new();
        for order in self.orders.iter().filter(|o| !self.settled.contains(&o.order.id)) {
            for line in &order.items {
                if let Some(entry_id) = line.bag_entry_id {
                    *pending.entry(entry_id).or_insert(0) += line.quantity;
                }
            }
        }
        pending
    }

    fn settle(&mut self, order_id: Uuid) -> u64 {
        if !self.settled.insert(order_id) {
            return 0;
        }
        let Some(order) = self.orders.iter().find(|o| o.order.id == order_id).cloned() else {
            return 0;
        };
        let mut touched = 0;
        for line in &order.items {
            let Some(entry_id) = line.bag_entry_id else {
                continue;
            };
            let Some(pos) = self
                .entries
                .iter()
                .position(|e| e.id == entry_id && e.user_id == order.order.user_id)
            else {
                continue;
            };
            if self.entries[pos].quantity <= line.quantity {
                self.entries.remove(pos);
            } else {
                self.entries[pos].quantity -= line.quantity;
            }
            touched += 1;
        }
        touched
    }
}

/// In-memory store with the same observable rules as the Postgres one:
/// unsettled order lines are subtracted from snapshots, clearing takes out
/// only the charged quantity, and orders are unique per charge id.
pub struct MemoryStore {
    inner: Mutex<StoreInner>,
    taken_at: DateTime<Utc>,
    pub fail_snapshot: AtomicBool,
    pub fail_materialize: AtomicBool,
    pub fail_clear: AtomicBool,
    pub materialize_calls: AtomicUsize,
    pub clear_calls: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(StoreInner::default()),
            taken_at: Utc
                .timestamp_opt(1_700_000_100, 0)
                .single()
                .expect("valid timestamp"),
            fail_snapshot: AtomicBool::new(false),
            fail_materialize: AtomicBool::new(false),
            fail_clear: AtomicBool::new(false),
            materialize_calls: AtomicUsize::new(0),
            clear_calls: AtomicUsize::new(0),
        })
    }

    pub fn add_entry(&self, user_id: Uuid, item: ItemFields, quantity: i32) -> Uuid {
        let id = Uuid::new_v4();
        self.inner.lock().unwrap().entries.push(StoredEntry {
            id,
            user_id,
            item,
            quantity,
        });
        id
    }

    /// Adds one unit to an existing entry, like a second add-to-bag.
    pub fn bump(&self, entry_id: Uuid) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(entry) = inner.entries.iter_mut().find(|e| e.id == entry_id) {
            entry.quantity += 1;
        }
    }

    pub fn quantity(&self, entry_id: Uuid) -> Option<i32> {
        self.inner
            .lock()
            .unwrap()
            .entries
            .iter()
            .find(|e| e.id == entry_id)
            .map(|e| e.quantity)
    }

    pub fn journal(&self) -> Vec<JournalEntry> {
        self.inner.lock().unwrap().journal.clone()
    }

    pub fn entry_ids(&self, user_id: Uuid) -> Vec<Uuid> {
        self.inner
            .lock()
            .unwrap()
            .entries
            .iter()
            .filter(|e| e.user_id == user_id)
            .map(|e| e.id)
            .collect()
    }

    pub fn orders(&self) -> Vec<OrderWithItems> {
        self.inner.lock().unwrap().orders.clone()
    }
}

#[async_trait]
impl BagSnapshotReader for MemoryStore {
    async fn snapshot(&self, user_id: Uuid) -> Result<BagSnapshot, StoreError> {
        if self.fail_snapshot.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("snapshot offline".into()));
        }
        let inner = self.inner.lock().unwrap();
        let pending = inner.pending();
        let lines = inner
            .entries
            .iter()
            .filter(|e| e.user_id == user_id)
            .filter_map(|e| match pending.get(&e.id) {
                None => Some((e, e.quantity)),
                Some(&claimed) if e.quantity > claimed => Some((e, e.quantity - claimed)),
                Some(_) => None,
            })
            .map(|(e, quantity)| SnapshotLine {
                bag_entry_id: e.id,
                item: e.item.clone(),
                quantity,
            })
            .collect();
        Ok(BagSnapshot::new(user_id, lines, self.taken_at))
    }
}

#[async_trait]
impl OrderMaterializer for MemoryStore {
    async fn materialize(&self, draft: &OrderDraft) -> Result<OrderWithItems, StoreError> {
        self.materialize_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_materialize.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("order write offline".into()));
        }
        let mut inner = self.inner.lock().unwrap();
        if let Some(existing) = inner
            .orders
            .iter()
            .find(|o| o.order.charge_id == draft.receipt.external_id)
        {
            return Ok(existing.clone());
        }

        let order_id = Uuid::new_v4();
        let now = Utc::now();
        let order = OrderWithItems {
            order: Order {
                id: order_id,
                user_id: draft.user_id,
                total: draft.receipt.captured_amount,
                currency: draft.currency.clone(),
                charge_id: draft.receipt.external_id.clone(),
                created_at: now,
            },
            items: draft
                .snapshot
                .lines
                .iter()
                .map(|line| OrderItem {
                    id: Uuid::new_v4(),
                    order_id,
                    item_id: Some(line.item.item_id),
                    bag_entry_id: Some(line.bag_entry_id),
                    title: line.item.title.clone(),
                    description: line.item.description.clone(),
                    price: line.item.price,
                    image: line.item.image.clone(),
                    large_image: line.item.large_image.clone(),
                    quantity: line.quantity,
                    created_at: now,
                })
                .collect(),
        };
        inner.orders.push(order.clone());
        Ok(order)
    }
}

#[async_trait]
impl BagClearer for MemoryStore {
    async fn clear(&self, order: &OrderWithItems) -> Result<u64, StoreError> {
        self.clear_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_clear.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("clear offline".into()));
        }
        Ok(self.inner.lock().unwrap().settle(order.order.id))
    }

    async fn sweep_consumed(&self, user_id: Uuid) -> Result<u64, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let unsettled: Vec<Uuid> = inner
            .orders
            .iter()
            .filter(|o| o.order.user_id == user_id && !inner.settled.contains(&o.order.id))
            .map(|o| o.order.id)
            .collect();
        Ok(unsettled.into_iter().map(|id| inner.settle(id)).sum())
    }
}

#[async_trait]
impl CheckoutJournal for MemoryStore {
    async fn completed(&self, order: &OrderWithItems) {
        self.inner
            .lock()
            .unwrap()
            .journal
            .push(JournalEntry::Completed(order.order.id));
    }

    async fn needs_reconciliation(&self, _user_id: Uuid, error: &CheckoutError) {
        if let Some(receipt) = error.charge_receipt() {
            self.inner
                .lock()
                .unwrap()
                .journal
                .push(JournalEntry::Reconciliation(receipt.external_id.clone()));
        }
    }
}

type CaptureHook = Box<dyn Fn() + Send + Sync>;

/// Scripted gateway. Responses are consumed per call; once the script is
/// empty every call succeeds. Calls sharing an idempotency key share one charge.
pub struct FakeGateway {
    script: Mutex<VecDeque<Result<(), CaptureError>>>,
    charges: Mutex<HashMap<String, ChargeReceipt>>,
    delay: Option<Duration>,
    amount_override: Option<i64>,
    on_capture: Option<CaptureHook>,
    pub calls: AtomicUsize,
    pub effective_captures: AtomicUsize,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            charges: Mutex::new(HashMap::new()),
            delay: None,
            amount_override: None,
            on_capture: None,
            calls: AtomicUsize::new(0),
            effective_captures: AtomicUsize::new(0),
        }
    }

    pub fn scripted(responses: Vec<Result<(), CaptureError>>) -> Self {
        let gateway = Self::new();
        *gateway.script.lock().unwrap() = responses.into();
        gateway
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn capturing(mut self, amount: i64) -> Self {
        self.amount_override = Some(amount);
        self
    }

    pub fn on_capture(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_capture = Some(Box::new(hook));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn effective_captures(&self) -> usize {
        self.effective_captures.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn capture(&self, request: &CaptureRequest) -> Result<ChargeReceipt, CaptureError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let scripted = self.script.lock().unwrap().pop_front();
        if let Some(Err(err)) = scripted {
            return Err(err);
        }

        let receipt = {
            let mut charges = self.charges.lock().unwrap();
            charges
                .entry(request.idempotency_key.as_str().to_string())
                .or_insert_with(|| {
                    self.effective_captures.fetch_add(1, Ordering::SeqCst);
                    ChargeReceipt {
                        external_id: format!("ch_{}", Uuid::new_v4().simple()),
                        captured_amount: self.amount_override.unwrap_or(request.amount),
                    }
                })
                .clone()
        };

        if let Some(hook) = &self.on_capture {
            hook();
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(receipt)
    }
}

pub fn orchestrator_with(
    store: Arc<MemoryStore>,
    gateway: Arc<FakeGateway>,
    locks: CheckoutLocks,
    policy: RetryPolicy,
) -> CheckoutOrchestrator {
    CheckoutOrchestrator::new(
        store.clone(),
        PaymentCaptureClient::new(gateway, policy),
        store.clone(),
        store.clone(),
        store,
        locks,
        CheckoutSettings::default(),
    )
}

pub fn orchestrator(store: Arc<MemoryStore>, gateway: Arc<FakeGateway>) -> CheckoutOrchestrator {
    orchestrator_with(
        store,
        gateway,
        CheckoutLocks::new(),
        RetryPolicy::new(3, Duration::ZERO),
    )
}
