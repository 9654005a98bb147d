#![cfg(feature = "storage-rocksdb")]

use assert_cmd::cargo_bin;
use std::io::Write;
use std::process::Command;
use tempfile::tempdir;

#[test]
fn test_rocksdb_persistence_recovery() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("test_db");

    // 1. First run: register, grant and originate
    let mut csv1 = tempfile::NamedTempFile::new().unwrap();
    writeln!(csv1, "op, customer, tenor, amount, installment, reference, name").unwrap();
    writeln!(csv1, "register, , , 8000000, , 3578011705920001, Siti Rahayu").unwrap();
    writeln!(csv1, "grant, 1, 12, 20000000, , ,").unwrap();
    writeln!(csv1, "contract, 1, 12, 10000000, , Laptop, website").unwrap();

    let mut cmd1 = Command::new(cargo_bin!("lending"));
    cmd1.arg(csv1.path()).arg("--db-path").arg(&db_path);

    let output1 = cmd1.output().expect("Failed to execute command");
    assert!(output1.status.success());
    let stdout1 = String::from_utf8_lossy(&output1.stdout);
    assert!(stdout1.contains("1,12,20000000,10100000,9900000,2"));

    // 2. Second run: the NIK is still taken and the limit keeps its usage
    let mut csv2 = tempfile::NamedTempFile::new().unwrap();
    writeln!(csv2, "op, customer, tenor, amount, installment, reference, name").unwrap();
    writeln!(csv2, "register, , , 8000000, , 3578011705920001, Siti Rahayu").unwrap();
    writeln!(csv2, "contract, 1, 12, 4000000, , Phone, website").unwrap();
    writeln!(csv2, "pay, , , , 1, ,").unwrap();

    let mut cmd2 = Command::new(cargo_bin!("lending"));
    cmd2.arg(csv2.path()).arg("--db-path").arg(&db_path);

    let output2 = cmd2.output().expect("Failed to execute command");
    assert!(output2.status.success());
    let stdout2 = String::from_utf8_lossy(&output2.stdout);
    let stderr2 = String::from_utf8_lossy(&output2.stderr);

    assert!(stderr2.contains("already exists"));
    assert!(!stderr2.contains("installment 1"));
    // 10_100_000 recovered plus 4_100_000 for the new contract
    assert!(stdout2.contains("1,12,20000000,14200000,5800000,3"));
}
