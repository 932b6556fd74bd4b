/// dashboard - totals across lent and borrowed loans
use loan_ledger_rs::{
    LedgerConfig, LoanBook, LoanTerms, LoanType, Money, NewCustomer, NewLoan, NewPayment, Rate,
    SafeTimeProvider, TimeSource, Uuid,
};
use chrono::{Duration, TimeZone, Utc};
use rust_decimal_macros::dec;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== dashboard example ===\n");

    let time = SafeTimeProvider::new(TimeSource::Test(
        Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()
    ));
    let controller = time.test_control().unwrap();

    // look three weeks ahead for upcoming due dates
    let config = LedgerConfig::from_json_str(r#"{"upcoming_window_days": 21}"#)?;
    let book = LoanBook::in_memory(config);
    let owner = Uuid::new_v4();

    let loans = [
        ("Ravi", LoanType::Given, 20_000, 2),
        ("Meena", LoanType::Given, 5_000, 1),
        ("Cooperative bank", LoanType::Taken, 100_000, 24),
    ];

    let mut ids = Vec::new();
    for (name, loan_type, principal, months) in loans {
        let customer = book.create_customer(owner, NewCustomer::named(name), &time)?;
        let loan = book.create_loan(
            owner,
            NewLoan {
                customer_id: customer.id,
                loan_type,
                terms: LoanTerms {
                    principal_amount: Money::from_major(principal),
                    interest_rate: Rate::from_percentage(dec!(1.5)),
                    interest_type: Default::default(),
                    interest_frequency: Default::default(),
                    start_date: time.now(),
                    duration_months: months,
                },
                notes: None,
                document_ref: None,
            },
            &time,
        )?;
        println!("{:<18} {:?} {} due {}", name, loan_type, loan.total_amount, loan.due_date.format("%Y-%m-%d"));
        ids.push(loan.id);
    }

    controller.advance(Duration::days(20));
    book.record_payment(owner, NewPayment::new(ids[0], Money::from_major(4_000)), &time)?;
    book.record_payment(owner, NewPayment::new(ids[2], Money::from_major(6_000)), &time)?;

    // Meena's loan falls due on April 1
    controller.advance(Duration::days(25));

    let summary = book.dashboard_summary(owner, &time)?;
    println!("\nas of {}:", time.now().format("%Y-%m-%d"));
    println!("  lent:        {}", summary.total_lent);
    println!("  borrowed:    {}", summary.total_borrowed);
    println!("  outstanding: {}", summary.total_outstanding);
    println!("  earned:      {}", summary.total_interest_earned);
    println!("  loans: {} ({} active, {} overdue)", summary.total_loans, summary.active_loans, summary.overdue_count);
    for loan in &summary.upcoming_payments {
        println!("  upcoming: {} due {}", loan.remaining_balance, loan.due_date.format("%Y-%m-%d"));
    }
    for loan in &summary.overdue_payments {
        println!("  overdue:  {} since {}", loan.remaining_balance, loan.due_date.format("%Y-%m-%d"));
    }

    println!("\n{}", serde_json::to_string_pretty(&summary.recent_transactions)?);

    Ok(())
}
