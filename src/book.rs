//! The loan book: every owner-facing operation, run against a store.
//!
//! Balance changes on a loan are serialised through a per-loan lock held
//! across read, decrement and write. Lazy overdue transitions found while
//! reading take the same lock and re-read the loan before persisting, so a
//! read never overwrites a balance a concurrent payment has just stored.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use hourglass_rs::SafeTimeProvider;
use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, error, info, instrument, warn};

use crate::config::LedgerConfig;
use crate::customer::{Customer, CustomerUpdate, NewCustomer};
use crate::dashboard::{self, DashboardSummary};
use crate::errors::{LedgerError, Result};
use crate::events::{Event, EventStore};
use crate::interest::{InterestBreakdown, InterestTerms};
use crate::lifecycle;
use crate::loan::{Loan, LoanUpdate, NewLoan};
use crate::payments::{self, NewPayment, Payment, PaymentReceipt};
use crate::store::{LedgerStore, MemoryStore, StoreError};
use crate::types::{CustomerId, LoanId, OwnerId};

/// registry of per-loan exclusive locks; an entry lives only while leased
#[derive(Debug, Default)]
struct LoanLocks {
    inner: Mutex<HashMap<LoanId, Arc<Mutex<()>>>>,
}

impl LoanLocks {
    fn lease(&self, loan_id: LoanId) -> LoanLease<'_> {
        let handle = self.inner.lock().entry(loan_id).or_default().clone();
        LoanLease {
            locks: self,
            loan_id,
            handle,
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.inner.lock().len()
    }
}

/// a claim on one loan's lock; drops the registry entry when it is the last
struct LoanLease<'a> {
    locks: &'a LoanLocks,
    loan_id: LoanId,
    handle: Arc<Mutex<()>>,
}

impl LoanLease<'_> {
    fn lock(&self) -> MutexGuard<'_, ()> {
        self.handle.lock()
    }
}

impl Drop for LoanLease<'_> {
    fn drop(&mut self) {
        let mut inner = self.locks.inner.lock();
        // the registry and this lease; clones are only made under `inner`
        if Arc::strong_count(&self.handle) == 2 {
            inner.remove(&self.loan_id);
        }
    }
}

pub struct LoanBook<S> {
    store: S,
    config: LedgerConfig,
    locks: LoanLocks,
    events: Mutex<EventStore>,
}

impl LoanBook<MemoryStore> {
    pub fn in_memory(config: LedgerConfig) -> Self {
        Self::new(MemoryStore::new(), config)
    }
}

impl<S: LedgerStore> LoanBook<S> {
    pub fn new(store: S, config: LedgerConfig) -> Self {
        Self {
            store,
            config,
            locks: LoanLocks::default(),
            events: Mutex::new(EventStore::new()),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// drain events emitted since the last call
    pub fn take_events(&self) -> Vec<Event> {
        self.events.lock().take_events()
    }

    fn emit(&self, event: Event) {
        self.events.lock().emit(event);
    }

    fn find_loan(&self, owner_id: OwnerId, loan_id: LoanId) -> Result<Loan> {
        self.store
            .find_loan(owner_id, loan_id)?
            .ok_or_else(|| LedgerError::loan_not_found(loan_id))
    }

    fn find_customer(&self, owner_id: OwnerId, customer_id: CustomerId) -> Result<Customer> {
        self.store
            .find_customer(owner_id, customer_id)?
            .ok_or_else(|| LedgerError::customer_not_found(customer_id))
    }

    /// Persist the overdue transition of a loan just read, if it has one.
    ///
    /// `None` when the loan was deleted between the read and the lock.
    fn refresh(&self, loan: Loan, now: DateTime<Utc>) -> Result<Option<Loan>> {
        if lifecycle::status_at(&loan, now) == loan.status {
            return Ok(Some(loan));
        }

        let lease = self.locks.lease(loan.id);
        let _guard = lease.lock();

        let Some(mut current) = self.store.find_loan(loan.owner_id, loan.id)? else {
            return Ok(None);
        };
        if let Some(transition) = lifecycle::refresh_status(&mut current, now) {
            self.store.update_loan(&current)?;
            info!(
                loan_id = %current.id,
                from = ?transition.from,
                to = ?transition.to,
                "loan status changed on read"
            );
            self.emit(Event::status_changed(current.id, transition, now));
        }
        Ok(Some(current))
    }

    fn refreshed_loans(&self, owner_id: OwnerId, now: DateTime<Utc>) -> Result<Vec<Loan>> {
        let mut loans = Vec::new();
        for loan in self.store.list_loans(owner_id)? {
            if let Some(loan) = self.refresh(loan, now)? {
                loans.push(loan);
            }
        }
        Ok(loans)
    }

    // ---- interest ----

    /// interest for a set of terms, without creating anything
    pub fn preview_interest(&self, terms: &InterestTerms) -> Result<InterestBreakdown> {
        terms.validate()?;
        terms.compute()
    }

    // ---- loans ----

    #[instrument(name = "loan_ledger.create_loan", skip(self, request, time), fields(customer_id = %request.customer_id))]
    pub fn create_loan(&self, owner_id: OwnerId, request: NewLoan, time: &SafeTimeProvider) -> Result<Loan> {
        let now = time.now();
        self.find_customer(owner_id, request.customer_id)?;

        let loan = Loan::originate(owner_id, request, now)?;
        self.store.insert_loan(&loan)?;

        info!(
            loan_id = %loan.id,
            loan_type = ?loan.loan_type,
            total_amount = %loan.total_amount,
            due_date = %loan.due_date,
            "loan originated"
        );
        self.emit(Event::LoanOriginated {
            loan_id: loan.id,
            owner_id,
            loan_type: loan.loan_type,
            principal: loan.principal_amount,
            total_amount: loan.total_amount,
            due_date: loan.due_date,
            timestamp: now,
        });
        Ok(loan)
    }

    #[instrument(name = "loan_ledger.get_loan", skip(self, time))]
    pub fn get_loan(&self, owner_id: OwnerId, loan_id: LoanId, time: &SafeTimeProvider) -> Result<Loan> {
        let loan = self.find_loan(owner_id, loan_id)?;
        self.refresh(loan, time.now())?
            .ok_or_else(|| LedgerError::loan_not_found(loan_id))
    }

    /// the owner's loans, newest created first
    #[instrument(name = "loan_ledger.list_loans", skip(self, time))]
    pub fn list_loans(&self, owner_id: OwnerId, time: &SafeTimeProvider) -> Result<Vec<Loan>> {
        let mut loans = self.refreshed_loans(owner_id, time.now())?;
        loans.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        debug!(count = loans.len(), "loans listed");
        Ok(loans)
    }

    /// Apply an allow-listed change to a loan.
    ///
    /// New terms recompute every derived field; the balance becomes the new
    /// total less what the payment history already covers.
    #[instrument(name = "loan_ledger.update_loan", skip(self, update, time))]
    pub fn update_loan(
        &self,
        owner_id: OwnerId,
        loan_id: LoanId,
        update: LoanUpdate,
        time: &SafeTimeProvider,
    ) -> Result<Loan> {
        let now = time.now();
        let lease = self.locks.lease(loan_id);
        let _guard = lease.lock();

        let mut loan = self.find_loan(owner_id, loan_id)?;
        let mut transitions = Vec::new();
        transitions.extend(lifecycle::refresh_status(&mut loan, now));

        let mut recalculated = None;
        if let Some(terms) = update.terms {
            let history = self.store.list_payments(owner_id, Some(loan_id))?;
            let paid = payments::total_paid(&history);
            let old_total = loan.total_amount;
            loan.apply_terms(terms, paid, now)?;
            transitions.extend(lifecycle::refresh_status(&mut loan, now));
            transitions.extend(lifecycle::settle_if_repaid(&mut loan, now));
            recalculated = Some(old_total);
        }
        if let Some(notes) = update.notes {
            loan.notes = notes;
        }
        if let Some(document_ref) = update.document_ref {
            loan.document_ref = document_ref;
        }
        loan.updated_at = now;

        if !self.store.update_loan(&loan)? {
            return Err(LedgerError::loan_not_found(loan_id));
        }

        if let Some(old_total) = recalculated {
            info!(
                old_total = %old_total,
                new_total = %loan.total_amount,
                remaining_balance = %loan.remaining_balance,
                "loan terms recalculated"
            );
            self.emit(Event::TermsRecalculated {
                loan_id,
                old_total,
                new_total: loan.total_amount,
                remaining_balance: loan.remaining_balance,
                timestamp: now,
            });
        }
        for transition in transitions {
            self.emit(Event::status_changed(loan_id, transition, now));
        }
        if loan.is_completed() && recalculated.is_some() {
            self.emit(Event::LoanCompleted {
                loan_id,
                final_payment: None,
                timestamp: now,
            });
        }
        Ok(loan)
    }

    /// remove a loan; its payments stay on record
    #[instrument(name = "loan_ledger.delete_loan", skip(self, time))]
    pub fn delete_loan(&self, owner_id: OwnerId, loan_id: LoanId, time: &SafeTimeProvider) -> Result<()> {
        let now = time.now();
        let lease = self.locks.lease(loan_id);
        let _guard = lease.lock();

        if !self.store.delete_loan(owner_id, loan_id)? {
            return Err(LedgerError::loan_not_found(loan_id));
        }
        let orphaned_payments = self.store.list_payments(owner_id, Some(loan_id))?.len();

        info!(orphaned_payments, "loan deleted");
        self.emit(Event::LoanDeleted {
            loan_id,
            orphaned_payments,
            timestamp: now,
        });
        Ok(())
    }

    // ---- payments ----

    /// Record a repayment and decrement the loan's balance.
    ///
    /// Overpayment is absorbed: the balance floors at zero and the loan
    /// completes. Payments on a completed loan are recorded and change
    /// nothing else.
    #[instrument(
        name = "loan_ledger.record_payment",
        skip(self, request, time),
        fields(loan_id = %request.loan_id, amount = %request.amount)
    )]
    pub fn record_payment(
        &self,
        owner_id: OwnerId,
        request: NewPayment,
        time: &SafeTimeProvider,
    ) -> Result<PaymentReceipt> {
        request.validate()?;
        let now = time.now();
        let loan_id = request.loan_id;

        let lease = self.locks.lease(loan_id);
        let _guard = lease.lock();

        let mut loan = self.find_loan(owner_id, loan_id)?;
        let overdue = lifecycle::refresh_status(&mut loan, now);

        let payment = Payment::record(owner_id, request, now);
        self.store.insert_payment(&payment)?;

        let application = payments::apply_to_balance(&mut loan, payment.amount, now);
        let settled = lifecycle::settle_if_repaid(&mut loan, now);

        match self.store.update_loan(&loan) {
            Ok(true) => {}
            Ok(false) => {
                error!(payment_id = %payment.id, "loan vanished after payment was stored");
                return Err(StoreError::Backend(format!(
                    "loan {loan_id} missing while applying payment {}",
                    payment.id
                ))
                .into());
            }
            Err(e) => {
                error!(
                    payment_id = %payment.id,
                    error = %e,
                    "payment stored but loan balance not updated; reconcile the loan"
                );
                return Err(e.into());
            }
        }

        if !application.excess.is_zero() {
            warn!(excess = %application.excess, "overpayment absorbed");
        }
        info!(
            payment_id = %payment.id,
            remaining_balance = %loan.remaining_balance,
            status = ?loan.status,
            "payment recorded"
        );

        if let Some(transition) = overdue {
            self.emit(Event::status_changed(loan_id, transition, now));
        }
        self.emit(Event::PaymentReceived {
            loan_id,
            payment_id: payment.id,
            amount: payment.amount,
            applied: application.applied,
            excess: application.excess,
            remaining_balance: application.remaining_balance,
            timestamp: now,
        });
        if let Some(transition) = settled {
            self.emit(Event::status_changed(loan_id, transition, now));
            self.emit(Event::LoanCompleted {
                loan_id,
                final_payment: Some(payment.amount),
                timestamp: now,
            });
        }

        Ok(PaymentReceipt {
            remaining_balance: loan.remaining_balance,
            loan_status: loan.status,
            payment,
        })
    }

    /// A loan's payments, newest payment date first.
    ///
    /// Works for deleted loans too, whose payments are kept.
    #[instrument(name = "loan_ledger.list_payments", skip(self))]
    pub fn list_payments(&self, owner_id: OwnerId, loan_id: LoanId) -> Result<Vec<Payment>> {
        let mut history = self.store.list_payments(owner_id, Some(loan_id))?;
        payments::sort_newest_first(&mut history);
        Ok(history)
    }

    /// Recompute a loan's balance from its payment history.
    ///
    /// Repairs a loan whose payment was stored but whose balance update
    /// failed. Completed loans are left as they are.
    #[instrument(name = "loan_ledger.reconcile_loan", skip(self, time))]
    pub fn reconcile_loan(&self, owner_id: OwnerId, loan_id: LoanId, time: &SafeTimeProvider) -> Result<Loan> {
        let now = time.now();
        let lease = self.locks.lease(loan_id);
        let _guard = lease.lock();

        let mut loan = self.find_loan(owner_id, loan_id)?;
        if loan.is_completed() {
            return Ok(loan);
        }

        let history = self.store.list_payments(owner_id, Some(loan_id))?;
        let payments_total = payments::total_paid(&history);
        let new_balance = payments::reconciled_balance(loan.total_amount, &history);
        let old_balance = loan.remaining_balance;

        let mut transitions = Vec::new();
        if new_balance != old_balance {
            loan.remaining_balance = new_balance;
            loan.updated_at = now;
        }
        transitions.extend(lifecycle::refresh_status(&mut loan, now));
        transitions.extend(lifecycle::settle_if_repaid(&mut loan, now));

        if new_balance == old_balance && transitions.is_empty() {
            debug!("balance consistent with payment history");
            return Ok(loan);
        }

        if !self.store.update_loan(&loan)? {
            return Err(LedgerError::loan_not_found(loan_id));
        }

        if new_balance != old_balance {
            warn!(
                old_balance = %old_balance,
                new_balance = %new_balance,
                payments_total = %payments_total,
                "loan balance reconciled with payment history"
            );
            self.emit(Event::BalanceReconciled {
                loan_id,
                old_balance,
                new_balance,
                payments_total,
                timestamp: now,
            });
        }
        let completed = transitions.iter().any(|t| t.to == crate::types::LoanStatus::Completed);
        for transition in transitions {
            self.emit(Event::status_changed(loan_id, transition, now));
        }
        if completed {
            self.emit(Event::LoanCompleted {
                loan_id,
                final_payment: None,
                timestamp: now,
            });
        }
        Ok(loan)
    }

    // ---- dashboard ----

    #[instrument(name = "loan_ledger.dashboard_summary", skip(self, time))]
    pub fn dashboard_summary(&self, owner_id: OwnerId, time: &SafeTimeProvider) -> Result<DashboardSummary> {
        let now = time.now();
        let loans = self.refreshed_loans(owner_id, now)?;
        let history = self.store.list_payments(owner_id, None)?;

        let summary = dashboard::summarize(&loans, &history, now, &self.config);
        debug!(
            total_loans = summary.total_loans,
            overdue_count = summary.overdue_count,
            "dashboard summarised"
        );
        Ok(summary)
    }

    // ---- customers ----

    #[instrument(name = "loan_ledger.create_customer", skip(self, request, time))]
    pub fn create_customer(
        &self,
        owner_id: OwnerId,
        request: NewCustomer,
        time: &SafeTimeProvider,
    ) -> Result<Customer> {
        let customer = Customer::create(owner_id, request, time.now())?;
        self.store.insert_customer(&customer)?;
        info!(customer_id = %customer.id, "customer created");
        Ok(customer)
    }

    pub fn get_customer(&self, owner_id: OwnerId, customer_id: CustomerId) -> Result<Customer> {
        self.find_customer(owner_id, customer_id)
    }

    /// newest first
    pub fn list_customers(&self, owner_id: OwnerId) -> Result<Vec<Customer>> {
        let mut customers = self.store.list_customers(owner_id)?;
        customers.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(customers)
    }

    #[instrument(name = "loan_ledger.update_customer", skip(self, update, time))]
    pub fn update_customer(
        &self,
        owner_id: OwnerId,
        customer_id: CustomerId,
        update: CustomerUpdate,
        time: &SafeTimeProvider,
    ) -> Result<Customer> {
        let mut customer = self.find_customer(owner_id, customer_id)?;
        customer.apply(update, time.now())?;
        if !self.store.update_customer(&customer)? {
            return Err(LedgerError::customer_not_found(customer_id));
        }
        Ok(customer)
    }

    #[instrument(name = "loan_ledger.delete_customer", skip(self))]
    pub fn delete_customer(&self, owner_id: OwnerId, customer_id: CustomerId) -> Result<()> {
        if !self.store.delete_customer(owner_id, customer_id)? {
            return Err(LedgerError::customer_not_found(customer_id));
        }
        info!("customer deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::customer::Customer;
    use crate::decimal::{Money, Rate};
    use crate::loan::tests::sample_request;
    use crate::loan::LoanTerms;
    use crate::store::{CustomerStore, LoanStore, PaymentStore, StoreResult};
    use crate::types::{InterestFrequency, InterestType, LoanStatus, LoanType, PaymentMethod};
    use chrono::{Duration, TimeZone};
    use hourglass_rs::TimeSource;
    use std::sync::atomic::{AtomicBool, Ordering};
    use uuid::Uuid;

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }

    fn clock() -> SafeTimeProvider {
        SafeTimeProvider::new(TimeSource::Test(
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        ))
    }

    /// owner with one customer on a fresh book
    fn setup<S: LedgerStore>(store: S, time: &SafeTimeProvider) -> (LoanBook<S>, OwnerId, NewLoan) {
        init_tracing();
        let book = LoanBook::new(store, LedgerConfig::default());
        let owner = Uuid::new_v4();
        let customer = book
            .create_customer(owner, NewCustomer::named("Ravi Kumar"), time)
            .unwrap();
        let request = NewLoan {
            customer_id: customer.id,
            ..sample_request(time.now())
        };
        (book, owner, request)
    }

    fn pay(book: &LoanBook<impl LedgerStore>, owner: OwnerId, loan_id: LoanId, amount: i64, time: &SafeTimeProvider) -> PaymentReceipt {
        book.record_payment(owner, NewPayment::new(loan_id, Money::from_major(amount)), time)
            .unwrap()
    }

    #[test]
    fn test_create_loan_computes_and_emits() {
        let time = clock();
        let (book, owner, request) = setup(MemoryStore::new(), &time);

        let loan = book.create_loan(owner, request, &time).unwrap();

        assert_eq!(loan.total_amount, Money::from_major(12_400));
        assert_eq!(loan.remaining_balance, Money::from_major(12_400));
        assert_eq!(loan.status, LoanStatus::Active);
        assert_eq!(book.get_loan(owner, loan.id, &time).unwrap(), loan);

        let events = book.take_events();
        assert!(matches!(events[..], [Event::LoanOriginated { .. }]));
        assert!(book.take_events().is_empty());
    }

    #[test]
    fn test_create_loan_requires_customer() {
        let time = clock();
        let (book, owner, request) = setup(MemoryStore::new(), &time);

        let stranger = NewLoan {
            customer_id: Uuid::new_v4(),
            ..request.clone()
        };
        let err = book.create_loan(owner, stranger, &time).unwrap_err();
        assert!(matches!(err, LedgerError::NotFound { entity: "customer", .. }));

        // someone else's customer is just as unknown
        let err = book.create_loan(Uuid::new_v4(), request, &time).unwrap_err();
        assert!(err.is_not_found());
        assert!(book.store().list_loans(owner).unwrap().is_empty());
    }

    #[test]
    fn test_create_loan_rejects_bad_terms() {
        let time = clock();
        let (book, owner, mut request) = setup(MemoryStore::new(), &time);
        request.terms.principal_amount = Money::ZERO;

        let err = book.create_loan(owner, request, &time).unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_payments_complete_loan() {
        let time = clock();
        let (book, owner, request) = setup(MemoryStore::new(), &time);
        let loan = book.create_loan(owner, request, &time).unwrap();
        book.take_events();

        let receipt = pay(&book, owner, loan.id, 3_000, &time);
        assert_eq!(receipt.remaining_balance, Money::from_major(9_400));
        assert_eq!(receipt.loan_status, LoanStatus::Active);
        assert_eq!(receipt.payment.payment_method, PaymentMethod::Cash);

        let receipt = pay(&book, owner, loan.id, 4_000, &time);
        assert_eq!(receipt.remaining_balance, Money::from_major(5_400));

        // overpay by 600
        let receipt = pay(&book, owner, loan.id, 6_000, &time);
        assert_eq!(receipt.remaining_balance, Money::ZERO);
        assert_eq!(receipt.loan_status, LoanStatus::Completed);

        let stored = book.get_loan(owner, loan.id, &time).unwrap();
        assert_eq!(stored.remaining_balance, Money::ZERO);
        assert_eq!(stored.status, LoanStatus::Completed);

        let events = book.take_events();
        let received = events
            .iter()
            .filter(|e| matches!(e, Event::PaymentReceived { .. }))
            .count();
        assert_eq!(received, 3);
        assert!(events.iter().any(|e| matches!(
            e,
            Event::PaymentReceived { excess, .. } if *excess == Money::from_major(600)
        )));
        assert!(matches!(
            events.last(),
            Some(Event::LoanCompleted { final_payment: Some(amount), .. }) if *amount == Money::from_major(6_000)
        ));
    }

    #[test]
    fn test_completed_is_terminal() {
        let time = clock();
        let control = time.test_control().unwrap();
        let (book, owner, request) = setup(MemoryStore::new(), &time);
        let loan = book.create_loan(owner, request, &time).unwrap();
        pay(&book, owner, loan.id, 12_400, &time);

        control.advance(Duration::days(800));

        let receipt = pay(&book, owner, loan.id, 100, &time);
        assert_eq!(receipt.remaining_balance, Money::ZERO);
        assert_eq!(receipt.loan_status, LoanStatus::Completed);
        assert_eq!(book.get_loan(owner, loan.id, &time).unwrap().status, LoanStatus::Completed);
        assert_eq!(book.list_payments(owner, loan.id).unwrap().len(), 2);
    }

    #[test]
    fn test_payment_validation() {
        let time = clock();
        let (book, owner, request) = setup(MemoryStore::new(), &time);
        let loan = book.create_loan(owner, request, &time).unwrap();

        let err = book
            .record_payment(owner, NewPayment::new(loan.id, Money::ZERO), &time)
            .unwrap_err();
        assert!(err.is_validation());

        let err = book
            .record_payment(owner, NewPayment::new(Uuid::new_v4(), Money::from_major(10)), &time)
            .unwrap_err();
        assert!(err.is_not_found());
        assert!(book.store().list_payments(owner, None).unwrap().is_empty());
    }

    #[test]
    fn test_overdue_on_read_is_persisted_once() {
        let time = clock();
        let control = time.test_control().unwrap();
        let (book, owner, mut request) = setup(MemoryStore::new(), &time);
        request.terms.duration_months = 1;
        let loan = book.create_loan(owner, request, &time).unwrap();
        book.take_events();

        control.advance(Duration::days(60));

        let listed = book.list_loans(owner, &time).unwrap();
        assert_eq!(listed[0].status, LoanStatus::Overdue);
        let stored = book.store().find_loan(owner, loan.id).unwrap().unwrap();
        assert_eq!(stored.status, LoanStatus::Overdue);

        // repeated reads see the same thing and write nothing new
        assert_eq!(book.list_loans(owner, &time).unwrap(), listed);
        assert_eq!(book.get_loan(owner, loan.id, &time).unwrap().status, LoanStatus::Overdue);

        let events = book.take_events();
        assert_eq!(events.len(), 1);
        assert!(matches!(
            events[0],
            Event::StatusChanged { old_status: LoanStatus::Active, new_status: LoanStatus::Overdue, .. }
        ));
    }

    #[test]
    fn test_overdue_loan_completes_on_repayment() {
        let time = clock();
        let control = time.test_control().unwrap();
        let (book, owner, mut request) = setup(MemoryStore::new(), &time);
        request.terms.duration_months = 1;
        let loan = book.create_loan(owner, request, &time).unwrap();

        control.advance(Duration::days(45));

        let receipt = pay(&book, owner, loan.id, 10_200, &time);
        assert_eq!(receipt.loan_status, LoanStatus::Completed);

        let transitions: Vec<(LoanStatus, LoanStatus)> = book
            .take_events()
            .into_iter()
            .filter_map(|e| match e {
                Event::StatusChanged { old_status, new_status, .. } => Some((old_status, new_status)),
                _ => None,
            })
            .collect();
        assert_eq!(
            transitions,
            vec![
                (LoanStatus::Active, LoanStatus::Overdue),
                (LoanStatus::Overdue, LoanStatus::Completed)
            ]
        );
    }

    #[test]
    fn test_foreign_owner_sees_nothing() {
        let time = clock();
        let (book, owner, request) = setup(MemoryStore::new(), &time);
        let loan = book.create_loan(owner, request, &time).unwrap();
        let customer_id = loan.customer_id;
        let intruder = Uuid::new_v4();

        assert!(book.get_loan(intruder, loan.id, &time).unwrap_err().is_not_found());
        assert!(book.list_loans(intruder, &time).unwrap().is_empty());
        assert!(book
            .update_loan(intruder, loan.id, LoanUpdate { notes: Some(Some("mine".into())), ..Default::default() }, &time)
            .unwrap_err()
            .is_not_found());
        assert!(book
            .record_payment(intruder, NewPayment::new(loan.id, Money::from_major(1)), &time)
            .unwrap_err()
            .is_not_found());
        assert!(book.reconcile_loan(intruder, loan.id, &time).unwrap_err().is_not_found());
        assert!(book.delete_loan(intruder, loan.id, &time).unwrap_err().is_not_found());
        assert!(book.get_customer(intruder, customer_id).unwrap_err().is_not_found());
        assert!(book.delete_customer(intruder, customer_id).unwrap_err().is_not_found());
        assert_eq!(book.dashboard_summary(intruder, &time).unwrap().total_loans, 0);

        // nothing changed for the owner
        let stored = book.get_loan(owner, loan.id, &time).unwrap();
        assert_eq!(stored.remaining_balance, loan.remaining_balance);
        assert_eq!(stored.notes, loan.notes);
    }

    #[test]
    fn test_concurrent_payments_are_serialised() {
        let time = clock();
        let (book, owner, request) = setup(MemoryStore::new(), &time);
        let loan = book.create_loan(owner, request, &time).unwrap();

        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    let time = clock();
                    for _ in 0..10 {
                        pay(&book, owner, loan.id, 100, &time);
                    }
                });
            }
        });

        let stored = book.get_loan(owner, loan.id, &time).unwrap();
        assert_eq!(stored.remaining_balance, Money::from_major(4_400));
        assert_eq!(book.list_payments(owner, loan.id).unwrap().len(), 80);
        assert_eq!(book.locks.len(), 0);
    }

    #[test]
    fn test_lock_registry_empty_after_not_found_calls() {
        let time = clock();
        let (book, owner, request) = setup(MemoryStore::new(), &time);
        let loan = book.create_loan(owner, request, &time).unwrap();
        let intruder = Uuid::new_v4();

        for _ in 0..1_000 {
            let unknown = Uuid::new_v4();
            assert!(book
                .record_payment(owner, NewPayment::new(unknown, Money::from_major(1)), &time)
                .unwrap_err()
                .is_not_found());
            assert!(book.reconcile_loan(owner, unknown, &time).unwrap_err().is_not_found());
            assert!(book
                .update_loan(owner, unknown, LoanUpdate::default(), &time)
                .unwrap_err()
                .is_not_found());
            assert!(book.delete_loan(owner, unknown, &time).unwrap_err().is_not_found());
        }
        assert!(book
            .record_payment(intruder, NewPayment::new(loan.id, Money::from_major(1)), &time)
            .unwrap_err()
            .is_not_found());
        assert_eq!(book.locks.len(), 0);

        // successful calls release their entry too
        pay(&book, owner, loan.id, 100, &time);
        book.reconcile_loan(owner, loan.id, &time).unwrap();
        book.delete_loan(owner, loan.id, &time).unwrap();
        assert_eq!(book.locks.len(), 0);
    }

    #[test]
    fn test_concurrent_reads_do_not_lose_payments() {
        let time = clock();
        let (book, owner, mut request) = setup(MemoryStore::new(), &time);
        request.terms.duration_months = 1;
        let loan = book.create_loan(owner, request, &time).unwrap();

        std::thread::scope(|scope| {
            scope.spawn(|| {
                let time = clock();
                time.test_control().unwrap().advance(Duration::days(60));
                for _ in 0..20 {
                    book.list_loans(owner, &time).unwrap();
                }
            });
            scope.spawn(|| {
                let time = clock();
                for _ in 0..20 {
                    pay(&book, owner, loan.id, 10, &time);
                }
            });
        });

        let stored = book.store().find_loan(owner, loan.id).unwrap().unwrap();
        assert_eq!(stored.remaining_balance, Money::from_major(10_000));
    }

    /// store whose loan updates can be switched off
    #[derive(Default)]
    struct FlakyStore {
        inner: MemoryStore,
        fail_loan_updates: AtomicBool,
    }

    impl LoanStore for FlakyStore {
        fn find_loan(&self, owner_id: OwnerId, id: LoanId) -> StoreResult<Option<Loan>> {
            self.inner.find_loan(owner_id, id)
        }
        fn list_loans(&self, owner_id: OwnerId) -> StoreResult<Vec<Loan>> {
            self.inner.list_loans(owner_id)
        }
        fn insert_loan(&self, loan: &Loan) -> StoreResult<()> {
            self.inner.insert_loan(loan)
        }
        fn update_loan(&self, loan: &Loan) -> StoreResult<bool> {
            if self.fail_loan_updates.load(Ordering::SeqCst) {
                return Err(StoreError::Unavailable("connection reset".to_string()));
            }
            self.inner.update_loan(loan)
        }
        fn delete_loan(&self, owner_id: OwnerId, id: LoanId) -> StoreResult<bool> {
            self.inner.delete_loan(owner_id, id)
        }
    }

    impl PaymentStore for FlakyStore {
        fn insert_payment(&self, payment: &Payment) -> StoreResult<()> {
            self.inner.insert_payment(payment)
        }
        fn list_payments(&self, owner_id: OwnerId, loan_id: Option<LoanId>) -> StoreResult<Vec<Payment>> {
            self.inner.list_payments(owner_id, loan_id)
        }
    }

    impl CustomerStore for FlakyStore {
        fn find_customer(&self, owner_id: OwnerId, id: CustomerId) -> StoreResult<Option<Customer>> {
            self.inner.find_customer(owner_id, id)
        }
        fn list_customers(&self, owner_id: OwnerId) -> StoreResult<Vec<Customer>> {
            self.inner.list_customers(owner_id)
        }
        fn insert_customer(&self, customer: &Customer) -> StoreResult<()> {
            self.inner.insert_customer(customer)
        }
        fn update_customer(&self, customer: &Customer) -> StoreResult<bool> {
            self.inner.update_customer(customer)
        }
        fn delete_customer(&self, owner_id: OwnerId, id: CustomerId) -> StoreResult<bool> {
            self.inner.delete_customer(owner_id, id)
        }
    }

    #[test]
    fn test_reconcile_after_failed_balance_update() {
        let time = clock();
        let (book, owner, request) = setup(FlakyStore::default(), &time);
        let loan = book.create_loan(owner, request, &time).unwrap();
        pay(&book, owner, loan.id, 2_000, &time);

        book.store().fail_loan_updates.store(true, Ordering::SeqCst);
        let err = book
            .record_payment(owner, NewPayment::new(loan.id, Money::from_major(3_000)), &time)
            .unwrap_err();
        assert!(matches!(err, LedgerError::Storage(StoreError::Unavailable(_))));
        book.store().fail_loan_updates.store(false, Ordering::SeqCst);

        // the payment landed, the balance did not move
        assert_eq!(book.list_payments(owner, loan.id).unwrap().len(), 2);
        let stale = book.get_loan(owner, loan.id, &time).unwrap();
        assert_eq!(stale.remaining_balance, Money::from_major(10_400));
        book.take_events();

        let repaired = book.reconcile_loan(owner, loan.id, &time).unwrap();
        assert_eq!(repaired.remaining_balance, Money::from_major(7_400));
        assert_eq!(
            book.get_loan(owner, loan.id, &time).unwrap().remaining_balance,
            Money::from_major(7_400)
        );
        assert!(matches!(
            book.take_events()[..],
            [Event::BalanceReconciled { payments_total, .. }] if payments_total == Money::from_major(5_000)
        ));

        // a consistent loan is left alone
        book.reconcile_loan(owner, loan.id, &time).unwrap();
        assert!(book.take_events().is_empty());
    }

    #[test]
    fn test_reconcile_completes_fully_paid_loan() {
        let time = clock();
        let (book, owner, request) = setup(FlakyStore::default(), &time);
        let loan = book.create_loan(owner, request, &time).unwrap();

        book.store().fail_loan_updates.store(true, Ordering::SeqCst);
        assert!(book
            .record_payment(owner, NewPayment::new(loan.id, Money::from_major(12_400)), &time)
            .is_err());
        book.store().fail_loan_updates.store(false, Ordering::SeqCst);

        let repaired = book.reconcile_loan(owner, loan.id, &time).unwrap();
        assert_eq!(repaired.remaining_balance, Money::ZERO);
        assert_eq!(repaired.status, LoanStatus::Completed);
    }

    #[test]
    fn test_update_terms_recomputes_from_history() {
        let time = clock();
        let (book, owner, request) = setup(MemoryStore::new(), &time);
        let loan = book.create_loan(owner, request, &time).unwrap();
        pay(&book, owner, loan.id, 1_000, &time);
        book.take_events();

        let mut terms = loan.terms();
        terms.duration_months = 6;
        let update = LoanUpdate {
            terms: Some(terms),
            notes: Some(Some("shortened".to_string())),
            ..Default::default()
        };
        let updated = book.update_loan(owner, loan.id, update, &time).unwrap();

        assert_eq!(updated.total_amount, Money::from_major(11_200));
        assert_eq!(updated.total_interest, Money::from_major(1_200));
        assert_eq!(updated.remaining_balance, Money::from_major(10_200));
        assert_eq!(updated.due_date, Utc.with_ymd_and_hms(2024, 7, 1, 0, 0, 0).unwrap());
        assert_eq!(updated.notes.as_deref(), Some("shortened"));
        assert!(matches!(
            book.take_events()[..],
            [Event::TermsRecalculated { old_total, .. }] if old_total == Money::from_major(12_400)
        ));
    }

    #[test]
    fn test_update_terms_can_complete_loan() {
        let time = clock();
        let (book, owner, request) = setup(MemoryStore::new(), &time);
        let loan = book.create_loan(owner, request, &time).unwrap();
        pay(&book, owner, loan.id, 5_000, &time);

        let terms = LoanTerms {
            principal_amount: Money::from_major(4_000),
            interest_rate: Rate::from_percentage(1),
            interest_type: InterestType::Simple,
            interest_frequency: InterestFrequency::Yearly,
            ..loan.terms()
        };
        let updated = book
            .update_loan(owner, loan.id, LoanUpdate { terms: Some(terms), ..Default::default() }, &time)
            .unwrap();
        assert_eq!(updated.remaining_balance, Money::ZERO);
        assert_eq!(updated.status, LoanStatus::Completed);

        // frozen from here on
        let err = book
            .update_loan(owner, loan.id, LoanUpdate { terms: Some(loan.terms()), ..Default::default() }, &time)
            .unwrap_err();
        assert!(err.is_validation());
        // notes are still editable
        let updated = book
            .update_loan(
                owner,
                loan.id,
                LoanUpdate { document_ref: Some(Some("receipt-17".into())), ..Default::default() },
                &time,
            )
            .unwrap();
        assert_eq!(updated.document_ref.as_deref(), Some("receipt-17"));
        assert_eq!(updated.status, LoanStatus::Completed);

        // and can be detached again
        let updated = book
            .update_loan(
                owner,
                loan.id,
                LoanUpdate { document_ref: Some(None), ..Default::default() },
                &time,
            )
            .unwrap();
        assert_eq!(updated.document_ref, None);
        assert_eq!(book.get_loan(owner, loan.id, &time).unwrap().document_ref, None);
        assert_eq!(updated.notes, loan.notes);
    }

    #[test]
    fn test_delete_keeps_payments() {
        let time = clock();
        let (book, owner, request) = setup(MemoryStore::new(), &time);
        let loan = book.create_loan(owner, request, &time).unwrap();
        pay(&book, owner, loan.id, 500, &time);
        pay(&book, owner, loan.id, 700, &time);
        book.take_events();

        book.delete_loan(owner, loan.id, &time).unwrap();

        assert!(book.get_loan(owner, loan.id, &time).unwrap_err().is_not_found());
        assert_eq!(book.list_payments(owner, loan.id).unwrap().len(), 2);
        assert!(matches!(
            book.take_events()[..],
            [Event::LoanDeleted { orphaned_payments: 2, .. }]
        ));
        assert!(book.delete_loan(owner, loan.id, &time).unwrap_err().is_not_found());

        // the dashboard still lists them, without loan details
        let summary = book.dashboard_summary(owner, &time).unwrap();
        assert_eq!(summary.recent_transactions.len(), 2);
        assert!(summary.recent_transactions.iter().all(|t| t.loan_type.is_none()));
    }

    #[test]
    fn test_list_loans_newest_first() {
        let time = clock();
        let control = time.test_control().unwrap();
        let (book, owner, request) = setup(MemoryStore::new(), &time);

        let first = book.create_loan(owner, request.clone(), &time).unwrap();
        control.advance(Duration::hours(1));
        let second = book.create_loan(owner, request, &time).unwrap();

        let ids: Vec<LoanId> = book.list_loans(owner, &time).unwrap().iter().map(|l| l.id).collect();
        assert_eq!(ids, vec![second.id, first.id]);
    }

    #[test]
    fn test_dashboard_summary() {
        let time = clock();
        let control = time.test_control().unwrap();
        let (book, owner, request) = setup(MemoryStore::new(), &time);

        // given 10000 at 2% for 12 months: 12400
        let given = book.create_loan(owner, request.clone(), &time).unwrap();
        // given 1000 at 2% for 1 month: 1020, will be overdue
        let short = NewLoan {
            terms: LoanTerms {
                principal_amount: Money::from_major(1_000),
                duration_months: 1,
                ..request.terms
            },
            ..request.clone()
        };
        let short = book.create_loan(owner, short, &time).unwrap();
        // taken 5000
        let taken = NewLoan {
            loan_type: LoanType::Taken,
            terms: LoanTerms {
                principal_amount: Money::from_major(5_000),
                ..request.terms
            },
            ..request
        };
        let taken = book.create_loan(owner, taken, &time).unwrap();

        pay(&book, owner, given.id, 400, &time);
        control.advance(Duration::days(40));
        pay(&book, owner, taken.id, 300, &time);

        let summary = book.dashboard_summary(owner, &time).unwrap();

        assert_eq!(summary.total_lent, Money::from_major(11_000));
        assert_eq!(summary.total_borrowed, Money::from_major(5_000));
        assert_eq!(summary.total_interest_earned, Money::ZERO);
        assert_eq!(summary.total_outstanding, Money::from_major(12_000 + 1_020));
        assert_eq!(summary.total_loans, 3);
        assert_eq!(summary.active_loans, 2);
        assert_eq!(summary.overdue_count, 1);
        assert_eq!(summary.overdue_payments[0].id, short.id);
        assert!(summary.upcoming_payments.is_empty());
        assert_eq!(summary.recent_transactions[0].loan_type, Some(LoanType::Taken));
        assert_eq!(summary.recent_transactions[1].principal_amount, Some(Money::from_major(10_000)));

        // the overdue transition was persisted by the dashboard read
        assert_eq!(
            book.store().find_loan(owner, short.id).unwrap().unwrap().status,
            LoanStatus::Overdue
        );

        // settling the short loan moves its interest into earnings
        pay(&book, owner, short.id, 1_020, &time);
        let summary = book.dashboard_summary(owner, &time).unwrap();
        assert_eq!(summary.total_interest_earned, Money::from_major(20));
        assert_eq!(summary.total_outstanding, Money::from_major(12_000));
        assert_eq!(summary.overdue_count, 0);
    }

    #[test]
    fn test_preview_interest() {
        let book = LoanBook::in_memory(LedgerConfig::default());
        let terms = InterestTerms::new(
            Money::from_major(10_000),
            Rate::from_percentage(2),
            12,
            InterestType::Compound,
            InterestFrequency::Monthly,
        );

        let breakdown = book.preview_interest(&terms).unwrap();
        assert_eq!(breakdown.total_amount, Money::from_str_exact("12682.42").unwrap());

        let bad = InterestTerms { duration_months: 0, ..terms };
        assert!(book.preview_interest(&bad).unwrap_err().is_validation());
    }

    #[test]
    fn test_customer_crud() {
        let time = clock();
        let control = time.test_control().unwrap();
        let (book, owner, request) = setup(MemoryStore::new(), &time);
        control.advance(Duration::minutes(5));
        let asha = book.create_customer(owner, NewCustomer::named("Asha"), &time).unwrap();

        let names: Vec<String> = book.list_customers(owner).unwrap().into_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["Asha".to_string(), "Ravi Kumar".to_string()]);

        let updated = book
            .update_customer(
                owner,
                asha.id,
                CustomerUpdate { phone: Some(Some("98450 12345".into())), ..Default::default() },
                &time,
            )
            .unwrap();
        assert_eq!(book.get_customer(owner, asha.id).unwrap(), updated);

        book.delete_customer(owner, asha.id).unwrap();
        assert!(book.get_customer(owner, asha.id).unwrap_err().is_not_found());
        assert!(book.get_customer(owner, request.customer_id).is_ok());
    }
}
