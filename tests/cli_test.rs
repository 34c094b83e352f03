use assert_cmd::cargo_bin;
use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::io::Write;
use std::process::Command;

const HEADER: &str = "command,user,course,amount,currency,order,payment,signature,reason";

fn script(rows: &[&str]) -> tempfile::NamedTempFile {
    let mut csv = tempfile::NamedTempFile::new().unwrap();
    writeln!(csv, "{}", HEADER).unwrap();
    for row in rows {
        writeln!(csv, "{}", row).unwrap();
    }
    csv
}

fn enrollpay() -> Command {
    let mut cmd = Command::new(cargo_bin!("enrollpay"));
    cmd.env_remove("RAZORPAY_KEY_ID")
        .env_remove("RAZORPAY_KEY_SECRET")
        .env_remove("ENROLLPAY_GATEWAY_SECRET");
    cmd
}

#[test]
fn test_cli_end_to_end() -> Result<(), Box<dyn std::error::Error>> {
    let csv = script(&[
        "issue, u1, c1, 29.99, INR",
        "pay,,,,, order_1",
        "issue, u2, c1, 10, USD",
        "pay,,,,, order_2",
        "refund,,, 10,, order_2,,, duplicate purchase",
    ]);

    enrollpay()
        .arg("process")
        .arg(csv.path())
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "payment,user,course,amount,currency,status,order,gateway_payment,method,refunded,enrollments",
        ))
        .stdout(predicate::str::contains(
            ",u1,c1,29.99,INR,completed,order_1,pay_1,card,0,2",
        ))
        .stdout(predicate::str::contains(
            ",u2,c1,10,USD,refunded,order_2,pay_2,card,10,2",
        ));

    Ok(())
}

#[test]
fn test_cli_reports_bad_rows_and_continues() {
    let csv = script(&[
        "issue, u1, c1, 29.99, INR",
        "verify,,,,, order_1, pay_1, deadbeef",
        "charge, u1, c1, 1, INR",
        "issue, u1, c1, 0.001, INR",
        "issue, u1, c1, 29.99, INR",
        "pay,,,,, order_2",
    ]);

    enrollpay()
        .arg("process")
        .arg(csv.path())
        .assert()
        .success()
        .stderr(predicate::str::contains("Error processing command"))
        .stderr(predicate::str::contains("Error reading command"))
        .stdout(predicate::str::contains(",u1,c1,29.99,INR,failed,order_1,,,0,1"))
        .stdout(predicate::str::contains(
            ",u1,c1,29.99,INR,completed,order_2,pay_2,card,0,1",
        ));
}

#[test]
fn test_sign_matches_gateway_secret() {
    let secret = enrollpay::domain::signature::GatewaySecret::new("cli_secret");

    enrollpay()
        .env("ENROLLPAY_GATEWAY_SECRET", "cli_secret")
        .args(["sign", "--order", "order_1", "--payment", "pay_1"])
        .assert()
        .success()
        .stdout(format!("{}\n", secret.sign("order_1", "pay_1")));
}

#[test]
fn test_missing_input_fails() {
    enrollpay()
        .args(["process", "does/not/exist.csv"])
        .assert()
        .failure();
}
