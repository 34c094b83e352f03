use crate::domain::enrollment::{CourseStats, EnrollmentGrant, GrantOutcome, UserEntitlements};
use crate::domain::payment::{CourseId, Payment, PaymentId, PaymentStatus, UserId};
use crate::domain::ports::{EntitlementStore, PaymentLedger, SwapOutcome, validate_swap};
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, IteratorMode, Options, WriteBatch};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Column Family for Payment records, keyed by payment id.
pub const CF_PAYMENTS: &str = "payments";
/// Column Family mapping gateway order ids to payment ids.
pub const CF_ORDER_INDEX: &str = "order_index";
/// Column Family for per-user entitlements.
pub const CF_ENTITLEMENTS: &str = "entitlements";
/// Column Family for per-course counters.
pub const CF_COURSE_STATS: &str = "course_stats";
/// Column Family recording which payments already granted access.
pub const CF_GRANTS: &str = "grants";
/// Column Family mapping (user, course) to the payment holding that purchase.
///
/// Written when a payment completes and kept after a refund.
pub const CF_PURCHASES: &str = "purchases";

const COLUMN_FAMILIES: [&str; 6] = [
    CF_PAYMENTS,
    CF_ORDER_INDEX,
    CF_ENTITLEMENTS,
    CF_COURSE_STATS,
    CF_GRANTS,
    CF_PURCHASES,
];

fn purchase_key(user: &UserId, course: &CourseId) -> Vec<u8> {
    let mut key = Vec::with_capacity(user.as_str().len() + course.as_str().len() + 1);
    key.extend_from_slice(user.as_str().as_bytes());
    key.push(0);
    key.extend_from_slice(course.as_str().as_bytes());
    key
}

/// A persistent ledger and entitlement store backed by RocksDB.
///
/// Reads go straight to the database. Every write path (insert, compare-and-swap, grant)
/// runs under a single write mutex and commits through one `WriteBatch`, so a swap can't
/// interleave with another writer and a grant never lands half-applied.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>`).
#[derive(Clone)]
pub struct RocksDBStore {
    db: Arc<DB>,
    write_guard: Arc<Mutex<()>>,
}

impl RocksDBStore {
    /// Opens or creates a RocksDB instance at the specified path, creating any missing
    /// column families.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let descriptors = COLUMN_FAMILIES
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()))
            .collect::<Vec<_>>();

        let db = DB::open_cf_descriptors(&opts, path, descriptors)?;

        Ok(Self {
            db: Arc::new(db),
            write_guard: Arc::new(Mutex::new(())),
        })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| PaymentError::StoreError(format!("{} column family not found", name)))
    }

    fn read<T: DeserializeOwned>(&self, cf: &str, key: &[u8]) -> Result<Option<T>> {
        match self.db.get_cf(self.cf(cf)?, key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn all_payments(&self) -> Result<Vec<Payment>> {
        let mut payments = Vec::new();
        for item in self.db.iterator_cf(self.cf(CF_PAYMENTS)?, IteratorMode::Start) {
            let (_key, value) = item?;
            payments.push(serde_json::from_slice(&value)?);
        }
        Ok(payments)
    }

    fn put_json<T: Serialize>(
        &self,
        batch: &mut WriteBatch,
        cf: &str,
        key: &[u8],
        value: &T,
    ) -> Result<()> {
        batch.put_cf(self.cf(cf)?, key, serde_json::to_vec(value)?);
        Ok(())
    }
}

#[async_trait]
impl PaymentLedger for RocksDBStore {
    async fn insert(&self, payment: Payment) -> Result<()> {
        let _guard = self.write_guard.lock().await;

        let key = payment.id.0.as_bytes();
        if self.db.get_pinned_cf(self.cf(CF_PAYMENTS)?, key)?.is_some() {
            return Err(PaymentError::StoreError(format!(
                "payment {} already exists",
                payment.id
            )));
        }
        let order_key = payment.gateway_order_id.as_bytes();
        if self
            .db
            .get_pinned_cf(self.cf(CF_ORDER_INDEX)?, order_key)?
            .is_some()
        {
            return Err(PaymentError::StoreError(format!(
                "gateway order {} already recorded",
                payment.gateway_order_id
            )));
        }

        let mut batch = WriteBatch::default();
        self.put_json(&mut batch, CF_PAYMENTS, key, &payment)?;
        batch.put_cf(self.cf(CF_ORDER_INDEX)?, order_key, key);
        self.db.write(batch)?;
        Ok(())
    }

    async fn get(&self, id: PaymentId) -> Result<Option<Payment>> {
        self.read(CF_PAYMENTS, id.0.as_bytes())
    }

    async fn find_by_order(&self, gateway_order_id: &str) -> Result<Option<Payment>> {
        let Some(id) = self
            .db
            .get_cf(self.cf(CF_ORDER_INDEX)?, gateway_order_id.as_bytes())?
        else {
            return Ok(None);
        };
        self.read(CF_PAYMENTS, &id)
    }

    async fn list_by_user(&self, user: &UserId) -> Result<Vec<Payment>> {
        let mut payments: Vec<Payment> = self
            .all_payments()?
            .into_iter()
            .filter(|p| &p.user == user)
            .collect();
        payments.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(payments)
    }

    async fn has_purchased(&self, user: &UserId, course: &CourseId) -> Result<bool> {
        Ok(self
            .db
            .get_pinned_cf(self.cf(CF_PURCHASES)?, purchase_key(user, course))?
            .is_some())
    }

    async fn compare_and_swap(&self, expected: PaymentStatus, next: Payment) -> Result<SwapOutcome> {
        let _guard = self.write_guard.lock().await;

        let key = next.id.0.as_bytes();
        let current: Payment = self
            .read(CF_PAYMENTS, key)?
            .ok_or_else(|| PaymentError::NotFound(format!("payment {}", next.id)))?;

        if !validate_swap(&current, expected, &next)? {
            return Ok(SwapOutcome::Conflict(current));
        }

        let purchase = purchase_key(&next.user, &next.course);
        let mut batch = WriteBatch::default();
        if next.status == PaymentStatus::Completed {
            if let Some(holder) = self.db.get_cf(self.cf(CF_PURCHASES)?, &purchase)?
                && holder != key
            {
                return Err(PaymentError::AlreadyEnrolled {
                    user: next.user.to_string(),
                    course: next.course.to_string(),
                });
            }
            batch.put_cf(self.cf(CF_PURCHASES)?, &purchase, key);
        }
        self.put_json(&mut batch, CF_PAYMENTS, key, &next)?;
        self.db.write(batch)?;
        Ok(SwapOutcome::Applied)
    }
}

#[async_trait]
impl EntitlementStore for RocksDBStore {
    async fn grant(&self, grant: EnrollmentGrant) -> Result<GrantOutcome> {
        let _guard = self.write_guard.lock().await;

        let grant_key = grant.payment.0.as_bytes();
        if self.db.get_pinned_cf(self.cf(CF_GRANTS)?, grant_key)?.is_some() {
            return Ok(GrantOutcome::AlreadyGranted);
        }

        let user_key = grant.user.as_str().as_bytes();
        let mut entitlements: UserEntitlements = self
            .read(CF_ENTITLEMENTS, user_key)?
            .unwrap_or_else(|| UserEntitlements::new(grant.user.clone()));
        entitlements.apply(&grant);

        let course_key = grant.course.as_str().as_bytes();
        let mut stats: CourseStats = self.read(CF_COURSE_STATS, course_key)?.unwrap_or_default();
        stats.enrollment_count += 1;

        let mut batch = WriteBatch::default();
        batch.put_cf(self.cf(CF_GRANTS)?, grant_key, b"");
        self.put_json(&mut batch, CF_ENTITLEMENTS, user_key, &entitlements)?;
        self.put_json(&mut batch, CF_COURSE_STATS, course_key, &stats)?;
        self.db.write(batch)?;

        Ok(GrantOutcome::Granted)
    }

    async fn entitlements(&self, user: &UserId) -> Result<UserEntitlements> {
        Ok(self
            .read(CF_ENTITLEMENTS, user.as_str().as_bytes())?
            .unwrap_or_else(|| UserEntitlements::new(user.clone())))
    }

    async fn enrollment_count(&self, course: &CourseId) -> Result<u64> {
        let stats: Option<CourseStats> = self.read(CF_COURSE_STATS, course.as_str().as_bytes())?;
        Ok(stats.map(|s| s.enrollment_count).unwrap_or(0))
    }

    async fn is_granted(&self, payment: PaymentId) -> Result<bool> {
        Ok(self
            .db
            .get_pinned_cf(self.cf(CF_GRANTS)?, payment.0.as_bytes())?
            .is_some())
    }
}
