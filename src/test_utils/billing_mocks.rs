//! In-memory mocks for the billing repositories and the payment provider port.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use uuid::Uuid;

use crate::{
    app_error::{AppError, AppResult},
    application::{
        ports::payment_provider::{CheckoutUrls, PaymentProviderPort, RedirectSession},
        use_cases::billing::{
            NewPayment, PaymentProfile, PaymentRepo, SubscriptionProfile, SubscriptionRepo,
            SubscriptionStatusUpdate, SubscriptionSync, free_subscription,
        },
    },
    adapters::persistence::MISSING_REFERENCE,
    domain::entities::stripe_event::{Customer, Subscription},
    test_utils::{InMemoryUserRepo, stripe_customer, stripe_subscription},
};

/// Mirrors the `REFERENCES users (id)` constraint on billing tables.
fn ensure_user_exists(users: &InMemoryUserRepo, user_id: Uuid) -> AppResult<()> {
    if users.contains(user_id) {
        Ok(())
    } else {
        Err(AppError::not_found(MISSING_REFERENCE))
    }
}

// ============================================================================
// InMemorySubscriptionRepo
// ============================================================================

/// Subscriptions keyed by user id, mirroring the `UNIQUE (user_id)` constraint. Inserts
/// for a user missing from `users` fail like the foreign key does.
pub struct InMemorySubscriptionRepo {
    pub subscriptions: Mutex<HashMap<Uuid, SubscriptionProfile>>,
    users: Arc<InMemoryUserRepo>,
    writes: AtomicUsize,
}

impl InMemorySubscriptionRepo {
    pub fn new(users: Arc<InMemoryUserRepo>) -> Self {
        Self::with_subscriptions(users, Vec::new())
    }

    pub fn with_subscriptions(
        users: Arc<InMemoryUserRepo>,
        subscriptions: Vec<SubscriptionProfile>,
    ) -> Self {
        Self {
            subscriptions: Mutex::new(subscriptions.into_iter().map(|s| (s.user_id, s)).collect()),
            users,
            writes: AtomicUsize::new(0),
        }
    }

    pub fn get(&self, user_id: Uuid) -> Option<SubscriptionProfile> {
        self.subscriptions.lock().unwrap().get(&user_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.subscriptions.lock().unwrap().len()
    }

    /// Number of writes that inserted or modified a record.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn record_write(&self) {
        self.writes.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl SubscriptionRepo for InMemorySubscriptionRepo {
    async fn get_by_user_id(&self, user_id: Uuid) -> AppResult<Option<SubscriptionProfile>> {
        Ok(self.get(user_id))
    }

    async fn get_by_stripe_subscription_id(
        &self,
        stripe_subscription_id: &str,
    ) -> AppResult<Option<SubscriptionProfile>> {
        Ok(self
            .subscriptions
            .lock()
            .unwrap()
            .values()
            .find(|s| s.stripe_subscription_id.as_deref() == Some(stripe_subscription_id))
            .cloned())
    }

    async fn attach_customer(
        &self,
        user_id: Uuid,
        stripe_customer_id: &str,
        now: chrono::DateTime<Utc>,
    ) -> AppResult<SubscriptionProfile> {
        let mut subscriptions = self.subscriptions.lock().unwrap();
        if !subscriptions.contains_key(&user_id) {
            ensure_user_exists(&self.users, user_id)?;
        }
        let subscription = subscriptions
            .entry(user_id)
            .and_modify(|s| {
                s.stripe_customer_id = Some(stripe_customer_id.to_string());
                s.updated_at = now;
            })
            .or_insert_with(|| free_subscription(user_id, stripe_customer_id, now))
            .clone();
        self.record_write();
        Ok(subscription)
    }

    async fn upsert_for_user(
        &self,
        user_id: Uuid,
        sync: &SubscriptionSync,
    ) -> AppResult<SubscriptionProfile> {
        let mut subscriptions = self.subscriptions.lock().unwrap();
        if !subscriptions.contains_key(&user_id) {
            ensure_user_exists(&self.users, user_id)?;
        }
        let now = Utc::now();
        let existing = subscriptions.get(&user_id);

        let subscription = SubscriptionProfile {
            id: existing.map(|s| s.id).unwrap_or_else(Uuid::new_v4),
            user_id,
            plan_name: sync.plan_name.clone(),
            plan_price: sync.plan_price,
            billing_cycle: sync.billing_cycle,
            status: sync.status,
            current_period_start: sync.current_period_start,
            current_period_end: sync.current_period_end,
            cancel_at_period_end: sync.cancel_at_period_end,
            stripe_customer_id: sync
                .stripe_customer_id
                .clone()
                .or_else(|| existing.and_then(|s| s.stripe_customer_id.clone())),
            stripe_subscription_id: Some(sync.stripe_subscription_id.clone()),
            created_at: existing.map(|s| s.created_at).unwrap_or(now),
            updated_at: now,
        };
        subscriptions.insert(user_id, subscription.clone());
        self.record_write();
        Ok(subscription)
    }

    async fn update_by_stripe_subscription_id(
        &self,
        stripe_subscription_id: &str,
        update: &SubscriptionStatusUpdate,
    ) -> AppResult<bool> {
        let mut subscriptions = self.subscriptions.lock().unwrap();
        let Some(subscription) = subscriptions
            .values_mut()
            .find(|s| s.stripe_subscription_id.as_deref() == Some(stripe_subscription_id))
        else {
            return Ok(false);
        };

        if let Some(status) = update.status {
            subscription.status = status;
        }
        if let Some(start) = update.current_period_start {
            subscription.current_period_start = start;
        }
        if let Some(end) = update.current_period_end {
            subscription.current_period_end = end;
        }
        if let Some(flag) = update.cancel_at_period_end {
            subscription.cancel_at_period_end = flag;
        }
        subscription.updated_at = Utc::now();
        self.record_write();
        Ok(true)
    }

    async fn set_cancel_at_period_end(
        &self,
        user_id: Uuid,
        cancel_at_period_end: bool,
    ) -> AppResult<Option<SubscriptionProfile>> {
        let mut subscriptions = self.subscriptions.lock().unwrap();
        let Some(subscription) = subscriptions.get_mut(&user_id) else {
            return Ok(None);
        };
        subscription.cancel_at_period_end = cancel_at_period_end;
        subscription.updated_at = Utc::now();
        self.record_write();
        Ok(Some(subscription.clone()))
    }
}

// ============================================================================
// InMemoryPaymentRepo
// ============================================================================

/// Payments deduplicated on invoice and payment intent. Inserts for a user missing from
/// `users` fail like the foreign key does.
pub struct InMemoryPaymentRepo {
    pub payments: Mutex<Vec<PaymentProfile>>,
    users: Arc<InMemoryUserRepo>,
}

impl InMemoryPaymentRepo {
    pub fn new(users: Arc<InMemoryUserRepo>) -> Self {
        Self {
            payments: Mutex::new(Vec::new()),
            users,
        }
    }

    pub fn all(&self) -> Vec<PaymentProfile> {
        self.payments.lock().unwrap().clone()
    }
}

#[async_trait]
impl PaymentRepo for InMemoryPaymentRepo {
    async fn insert_if_absent(&self, payment: &NewPayment) -> AppResult<bool> {
        let mut payments = self.payments.lock().unwrap();
        let duplicate = payments.iter().any(|p| {
            p.stripe_invoice_id == payment.stripe_invoice_id
                || (payment.stripe_payment_intent_id.is_some()
                    && p.stripe_payment_intent_id == payment.stripe_payment_intent_id)
        });
        if duplicate {
            return Ok(false);
        }
        ensure_user_exists(&self.users, payment.user_id)?;

        payments.push(PaymentProfile {
            id: Uuid::new_v4(),
            user_id: payment.user_id,
            stripe_subscription_id: payment.stripe_subscription_id.clone(),
            stripe_invoice_id: payment.stripe_invoice_id.clone(),
            stripe_payment_intent_id: payment.stripe_payment_intent_id.clone(),
            amount: payment.amount,
            currency: payment.currency.clone(),
            status: payment.status,
            invoice_url: payment.invoice_url.clone(),
            created_at: Utc::now(),
        });
        Ok(true)
    }

    async fn list_by_user(&self, user_id: Uuid) -> AppResult<Vec<PaymentProfile>> {
        let mut found: Vec<PaymentProfile> = self
            .payments
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.user_id == user_id)
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(found)
    }
}

// ============================================================================
// MockPaymentProvider
// ============================================================================

/// Arguments of one `create_checkout_session` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutSessionCall {
    pub customer_id: String,
    pub price_id: String,
    pub success_url: String,
    pub cancel_url: String,
}

/// Payment provider double. Serves customers and subscriptions registered up front and
/// records every outbound call for assertions.
#[derive(Default)]
pub struct MockPaymentProvider {
    customers: Mutex<HashMap<String, Customer>>,
    subscriptions: Mutex<HashMap<String, Subscription>>,
    fail_internal: AtomicBool,
    next_id: AtomicUsize,
    created_customers: Mutex<Vec<(String, Uuid)>>,
    checkout_sessions: Mutex<Vec<CheckoutSessionCall>>,
    portal_return_urls: Mutex<Vec<String>>,
    cancel_flag_calls: Mutex<Vec<(String, bool)>>,
}

impl MockPaymentProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_customer(&self, customer: Customer) {
        self.customers
            .lock()
            .unwrap()
            .insert(customer.id.clone(), customer);
    }

    pub fn add_subscription(&self, subscription: Subscription) {
        self.subscriptions
            .lock()
            .unwrap()
            .insert(subscription.id.clone(), subscription);
    }

    /// Make every subsequent call fail as if the provider were unreachable.
    pub fn fail_with_internal_error(&self) {
        self.fail_internal.store(true, Ordering::SeqCst);
    }

    /// `(email, user_id)` of each created customer.
    pub fn created_customers(&self) -> Vec<(String, Uuid)> {
        self.created_customers.lock().unwrap().clone()
    }

    pub fn checkout_sessions(&self) -> Vec<CheckoutSessionCall> {
        self.checkout_sessions.lock().unwrap().clone()
    }

    pub fn portal_return_urls(&self) -> Vec<String> {
        self.portal_return_urls.lock().unwrap().clone()
    }

    pub fn cancel_flag_calls(&self) -> Vec<(String, bool)> {
        self.cancel_flag_calls.lock().unwrap().clone()
    }

    fn check_available(&self) -> AppResult<()> {
        if self.fail_internal.load(Ordering::SeqCst) {
            return Err(AppError::Internal("payment provider unavailable".into()));
        }
        Ok(())
    }

    fn next_id(&self) -> usize {
        self.next_id.fetch_add(1, Ordering::SeqCst) + 1
    }
}

#[async_trait]
impl PaymentProviderPort for MockPaymentProvider {
    async fn create_customer(
        &self,
        email: &str,
        _name: Option<&str>,
        user_id: Uuid,
    ) -> AppResult<Customer> {
        self.check_available()?;
        let mut customer = stripe_customer(&format!("cus_test_{}", self.next_id()), Some(user_id));
        customer.email = Some(email.to_string());
        self.add_customer(customer.clone());
        self.created_customers
            .lock()
            .unwrap()
            .push((email.to_string(), user_id));
        Ok(customer)
    }

    async fn retrieve_customer(&self, customer_id: &str) -> AppResult<Customer> {
        self.check_available()?;
        self.customers
            .lock()
            .unwrap()
            .get(customer_id)
            .cloned()
            .ok_or_else(|| AppError::not_found(format!("No such customer: {customer_id}")))
    }

    async fn retrieve_subscription(&self, subscription_id: &str) -> AppResult<Subscription> {
        self.check_available()?;
        self.subscriptions
            .lock()
            .unwrap()
            .get(subscription_id)
            .cloned()
            .ok_or_else(|| AppError::not_found(format!("No such subscription: {subscription_id}")))
    }

    async fn create_checkout_session(
        &self,
        customer_id: &str,
        price_id: &str,
        _user_id: Uuid,
        urls: &CheckoutUrls,
    ) -> AppResult<RedirectSession> {
        self.check_available()?;
        self.checkout_sessions
            .lock()
            .unwrap()
            .push(CheckoutSessionCall {
                customer_id: customer_id.to_string(),
                price_id: price_id.to_string(),
                success_url: urls.success_url.clone(),
                cancel_url: urls.cancel_url.clone(),
            });
        let id = format!("cs_{}", self.next_id());
        Ok(RedirectSession {
            url: format!("https://checkout.test/{id}"),
            id,
        })
    }

    async fn create_portal_session(
        &self,
        _customer_id: &str,
        return_url: &str,
    ) -> AppResult<RedirectSession> {
        self.check_available()?;
        self.portal_return_urls
            .lock()
            .unwrap()
            .push(return_url.to_string());
        let id = format!("bps_{}", self.next_id());
        Ok(RedirectSession {
            url: format!("https://portal.test/{id}"),
            id,
        })
    }

    async fn set_cancel_at_period_end(
        &self,
        subscription_id: &str,
        cancel_at_period_end: bool,
    ) -> AppResult<Subscription> {
        self.check_available()?;
        self.cancel_flag_calls
            .lock()
            .unwrap()
            .push((subscription_id.to_string(), cancel_at_period_end));

        let mut subscriptions = self.subscriptions.lock().unwrap();
        let subscription = subscriptions
            .entry(subscription_id.to_string())
            .or_insert_with(|| stripe_subscription(subscription_id, "active", None, 0, "month"));
        subscription.cancel_at_period_end = cancel_at_period_end;
        Ok(subscription.clone())
    }
}
