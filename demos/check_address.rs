//! Check a single address against the live services.
//!
//! This example demonstrates:
//! - Parsing a street line
//! - Setting up the checker from a credentials file
//! - Reconciling one record and printing the verdict
//!
//! Run with: cargo run --example check_address -- "Kerkstraat 12" 1234AB Amsterdam

use postal_labels::{AddressChecker, AddressRecord, Error, Service, Verdict};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter("postal_labels=debug")
        .with_writer(std::io::stderr)
        .init();

    let mut args = std::env::args().skip(1);
    let address = args.next().unwrap_or_else(|| "Kerkstraat 12".to_string());
    let postal_code = args.next().unwrap_or_else(|| "1234AB".to_string());
    let city = args.next().unwrap_or_else(|| "Amsterdam".to_string());
    let country = args.next().unwrap_or_else(|| "Netherlands".to_string());

    println!("postal-labels Address Check Example");
    println!("===================================\n");

    println!("Setting up checker...");
    let checker = AddressChecker::new().await?;

    let parsed = checker.parser().parse(&address);
    println!("Street line: {address}");
    match (&parsed.street, &parsed.house_number) {
        (Some(street), Some(number)) => {
            println!("  Street:       {street}");
            println!("  House number: {number}");
            if let Some(suffix) = &parsed.house_number_suffix {
                println!("  Suffix:       {suffix}");
            }
        }
        _ => println!("  (no house number found, the register cannot be used)"),
    }
    println!();

    let mut record = AddressRecord {
        first_name: "Example".to_string(),
        last_name: "Person".to_string(),
        address,
        postal_code,
        city,
        country,
        ..Default::default()
    };
    let before = record.clone();

    match checker.check_record(&mut record).await {
        Verdict::Confirmed { strategy } => println!("Confirmed by {strategy}"),
        Verdict::Corrected { changes, strategy } => {
            println!("Corrected by {strategy}:");
            for change in changes {
                println!("  {}: '{}' -> '{}'", change.field, change.old, change.new);
            }
        }
        Verdict::Rejected(reason) => println!("Rejected: {reason}"),
        Verdict::Undecided { reason } => println!("Undecided: {reason}"),
    }

    println!("\nBefore:\n{}", before.block(checker.home()));
    println!("After:\n{}", record.block(checker.home()));

    println!();
    for service in [Service::Register, Service::Geocoder] {
        println!("{}", checker.profiler().summary(service));
    }

    Ok(())
}
