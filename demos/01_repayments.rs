/// repayments - a loan through overdue and back to completed
use loan_ledger_rs::{
    Event, InterestFrequency, InterestType, LedgerConfig, LoanBook, LoanTerms, LoanType, Money,
    NewCustomer, NewLoan, NewPayment, PaymentMethod, Rate, SafeTimeProvider, TimeSource, Uuid,
};
use chrono::{Duration, TimeZone, Utc};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== repayments example ===\n");

    let time = SafeTimeProvider::new(TimeSource::Test(
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    ));
    let controller = time.test_control().unwrap();

    let book = LoanBook::in_memory(LedgerConfig::default());
    let owner = Uuid::new_v4();
    let customer = book.create_customer(owner, NewCustomer::named("Asha"), &time)?;

    // 50,000 at 12% a year, compounded monthly, over 6 months
    let loan = book.create_loan(
        owner,
        NewLoan {
            customer_id: customer.id,
            loan_type: LoanType::Given,
            terms: LoanTerms {
                principal_amount: Money::from_major(50_000),
                interest_rate: Rate::from_percentage(12),
                interest_type: InterestType::Compound,
                interest_frequency: InterestFrequency::Yearly,
                start_date: time.now(),
                duration_months: 6,
            },
            notes: Some("shop renovation".to_string()),
            document_ref: None,
        },
        &time,
    )?;
    println!("total to repay: {} (interest {})", loan.total_amount, loan.total_interest);
    println!("due on: {}", loan.due_date.format("%Y-%m-%d"));

    // two monthly instalments
    for _ in 0..2 {
        controller.advance(Duration::days(30));
        let receipt = book.record_payment(
            owner,
            NewPayment::new(loan.id, Money::from_major(10_000)).via(PaymentMethod::Upi),
            &time,
        )?;
        println!(
            "{}: paid 10000, remaining {}",
            time.now().format("%Y-%m-%d"),
            receipt.remaining_balance
        );
    }

    // nothing more until well after the due date
    controller.advance(Duration::days(150));
    let late = book.get_loan(owner, loan.id, &time)?;
    println!("\n{}: status {:?}", time.now().format("%Y-%m-%d"), late.status);

    // settle everything, with a little extra
    let receipt = book.record_payment(
        owner,
        NewPayment::new(loan.id, late.remaining_balance + Money::from_major(50)),
        &time,
    )?;
    println!("final payment leaves {} ({:?})", receipt.remaining_balance, receipt.loan_status);

    println!("\nevents:");
    for event in book.take_events() {
        match event {
            Event::StatusChanged { old_status, new_status, reason, .. } => {
                println!("  status {:?} -> {:?}: {}", old_status, new_status, reason)
            }
            Event::PaymentReceived { amount, excess, .. } => {
                println!("  payment {} (excess {})", amount, excess)
            }
            other => println!("  {:?}", other),
        }
    }

    Ok(())
}
