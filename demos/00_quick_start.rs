/// quick start - record a loan and a repayment
use loan_ledger_rs::{
    LedgerConfig, LoanBook, LoanTerms, LoanType, Money, NewCustomer, NewLoan, NewPayment, Rate,
    SafeTimeProvider, TimeSource, Uuid,
};
use chrono::Utc;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let time = SafeTimeProvider::new(TimeSource::Test(Utc::now()));
    let book = LoanBook::in_memory(LedgerConfig::default());
    let owner = Uuid::new_v4();

    let customer = book.create_customer(owner, NewCustomer::named("Ravi Kumar"), &time)?;

    // lend 10,000 at 2% a month for a year
    let loan = book.create_loan(
        owner,
        NewLoan {
            customer_id: customer.id,
            loan_type: LoanType::Given,
            terms: LoanTerms {
                principal_amount: Money::from_major(10_000),
                interest_rate: Rate::from_percentage(2),
                interest_type: Default::default(),
                interest_frequency: Default::default(),
                start_date: time.now(),
                duration_months: 12,
            },
            notes: None,
            document_ref: None,
        },
        &time,
    )?;

    // collect the first instalment
    let receipt = book.record_payment(owner, NewPayment::new(loan.id, Money::from_major(1_000)), &time)?;

    println!("{}", serde_json::to_string_pretty(&receipt)?);

    Ok(())
}
