use parking_lot::RwLock;

use super::{CustomerStore, LoanStore, PaymentStore, StoreError, StoreResult};
use crate::customer::Customer;
use crate::loan::Loan;
use crate::payments::Payment;
use crate::types::{CustomerId, LoanId, OwnerId};

/// In-process store keeping records in insertion order.
#[derive(Debug, Default)]
pub struct MemoryStore {
    loans: RwLock<Vec<Loan>>,
    payments: RwLock<Vec<Payment>>,
    customers: RwLock<Vec<Customer>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LoanStore for MemoryStore {
    fn find_loan(&self, owner_id: OwnerId, id: LoanId) -> StoreResult<Option<Loan>> {
        Ok(self
            .loans
            .read()
            .iter()
            .find(|l| l.id == id && l.owner_id == owner_id)
            .cloned())
    }

    fn list_loans(&self, owner_id: OwnerId) -> StoreResult<Vec<Loan>> {
        Ok(self
            .loans
            .read()
            .iter()
            .filter(|l| l.owner_id == owner_id)
            .cloned()
            .collect())
    }

    fn insert_loan(&self, loan: &Loan) -> StoreResult<()> {
        let mut loans = self.loans.write();
        if loans.iter().any(|l| l.id == loan.id) {
            return Err(StoreError::Duplicate { entity: "loan", id: loan.id });
        }
        loans.push(loan.clone());
        Ok(())
    }

    fn update_loan(&self, loan: &Loan) -> StoreResult<bool> {
        let mut loans = self.loans.write();
        match loans
            .iter_mut()
            .find(|l| l.id == loan.id && l.owner_id == loan.owner_id)
        {
            Some(stored) => {
                *stored = loan.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn delete_loan(&self, owner_id: OwnerId, id: LoanId) -> StoreResult<bool> {
        let mut loans = self.loans.write();
        let before = loans.len();
        loans.retain(|l| !(l.id == id && l.owner_id == owner_id));
        Ok(loans.len() != before)
    }
}

impl PaymentStore for MemoryStore {
    fn insert_payment(&self, payment: &Payment) -> StoreResult<()> {
        let mut payments = self.payments.write();
        if payments.iter().any(|p| p.id == payment.id) {
            return Err(StoreError::Duplicate { entity: "payment", id: payment.id });
        }
        payments.push(payment.clone());
        Ok(())
    }

    fn list_payments(&self, owner_id: OwnerId, loan_id: Option<LoanId>) -> StoreResult<Vec<Payment>> {
        Ok(self
            .payments
            .read()
            .iter()
            .filter(|p| p.owner_id == owner_id && loan_id.map_or(true, |id| p.loan_id == id))
            .cloned()
            .collect())
    }
}

impl CustomerStore for MemoryStore {
    fn find_customer(&self, owner_id: OwnerId, id: CustomerId) -> StoreResult<Option<Customer>> {
        Ok(self
            .customers
            .read()
            .iter()
            .find(|c| c.id == id && c.owner_id == owner_id)
            .cloned())
    }

    fn list_customers(&self, owner_id: OwnerId) -> StoreResult<Vec<Customer>> {
        Ok(self
            .customers
            .read()
            .iter()
            .filter(|c| c.owner_id == owner_id)
            .cloned()
            .collect())
    }

    fn insert_customer(&self, customer: &Customer) -> StoreResult<()> {
        let mut customers = self.customers.write();
        if customers.iter().any(|c| c.id == customer.id) {
            return Err(StoreError::Duplicate { entity: "customer", id: customer.id });
        }
        customers.push(customer.clone());
        Ok(())
    }

    fn update_customer(&self, customer: &Customer) -> StoreResult<bool> {
        let mut customers = self.customers.write();
        match customers
            .iter_mut()
            .find(|c| c.id == customer.id && c.owner_id == customer.owner_id)
        {
            Some(stored) => {
                *stored = customer.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn delete_customer(&self, owner_id: OwnerId, id: CustomerId) -> StoreResult<bool> {
        let mut customers = self.customers.write();
        let before = customers.len();
        customers.retain(|c| !(c.id == id && c.owner_id == owner_id));
        Ok(customers.len() != before)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loan::tests::sample_request;
    use chrono::{TimeZone, Utc};
    use uuid::Uuid;

    #[test]
    fn test_loans_are_owner_scoped() {
        let store = MemoryStore::new();
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let owner = Uuid::new_v4();
        let intruder = Uuid::new_v4();
        let loan = Loan::originate(owner, sample_request(now), now).unwrap();
        store.insert_loan(&loan).unwrap();

        assert!(store.find_loan(owner, loan.id).unwrap().is_some());
        assert!(store.find_loan(intruder, loan.id).unwrap().is_none());
        assert!(store.list_loans(intruder).unwrap().is_empty());
        assert!(!store.delete_loan(intruder, loan.id).unwrap());

        let mut forged = loan.clone();
        forged.owner_id = intruder;
        assert!(!store.update_loan(&forged).unwrap());

        assert!(store.delete_loan(owner, loan.id).unwrap());
        assert!(store.find_loan(owner, loan.id).unwrap().is_none());
    }

    #[test]
    fn test_duplicate_insert_rejected() {
        let store = MemoryStore::new();
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let loan = Loan::originate(Uuid::new_v4(), sample_request(now), now).unwrap();

        store.insert_loan(&loan).unwrap();
        assert!(matches!(
            store.insert_loan(&loan),
            Err(StoreError::Duplicate { entity: "loan", .. })
        ));
    }
}
